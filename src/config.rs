//! Logger configuration file.
//!
//! The configuration lives on the SD card in a small line oriented text file:
//!
//! ```text
//! # PolyDAQ 2 logger configuration
//! H: PolyDAQ 2
//! T: 100
//! C: 0, 1.0, 0.0, "Strain 1"
//! C: X, 0.0039, 0.0, 'Accel X'
//! ```
//!
//! | Tag | Meaning |
//! |:---:|:--------|
//! | `#` | Comment up to the end of the line |
//! | `T` | Milliseconds per data row |
//! | `C` | Column: command character, slope, offset, quoted label |
//!
//! Any other leading character makes the parser skip the line (`H` and `B` lines
//! written by the PC software end up there). Each `C` line appends one column; the
//! order of the lines is the order of the CSV columns.
use embedded_io::Read;
use heapless::{String, Vec};
use log::warn;

use crate::{acquisition::Command, storage::BlockStorage, Duration};

/// Name of the configuration file in the card's root directory.
pub const CONFIG_FILE_NAME: &str = "polydaq2.cfg";

/// Longest column label kept. Longer labels are truncated.
pub const MAX_LABEL_LEN: usize = 24;

/// Most columns in one configuration (one per A/D channel).
pub const MAX_COLUMNS: usize = 16;

pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::millis(100);
pub const MIN_MS_PER_SAMPLE: u32 = 1;
pub const MAX_MS_PER_SAMPLE: u32 = 60_000;

const COMMENT: u8 = b'#';
const PERIOD_TAG: u8 = b'T';
const COLUMN_TAG: u8 = b'C';

const BLANKS: &[u8] = b" \t\r";
const TAG_SEPARATORS: &[u8] = b" \t\r:";
const FIELD_SEPARATORS: &[u8] = b" \t\r,";

const MAX_NUMBER_LEN: usize = 16;

pub type Label = String<MAX_LABEL_LEN>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The configuration file is missing or cannot be opened.
    Open,
    /// The card failed while the file was being read.
    Read,
}

/// Schema of one logged quantity.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDescriptor {
    pub command: Command,
    pub slope: f32,
    pub offset: f32,
    pub label: Label,
}

impl ColumnDescriptor {
    /// Linear calibration from a raw reading to the stored value.
    pub fn calibrate(&self, raw: i16) -> f32 {
        raw as f32 * self.slope + self.offset
    }
}

impl Default for ColumnDescriptor {
    fn default() -> Self {
        Self {
            command: Command::default(),
            slope: 1.0,
            offset: 0.0,
            label: Label::new(),
        }
    }
}

/// A complete, valid logger configuration.
///
/// Only produced by a parse that ran to the end of the file. It is never modified
/// after that; a new card brings a new configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct LoggerConfiguration {
    sample_period: Duration,
    columns: Vec<ColumnDescriptor, MAX_COLUMNS>,
}

impl Default for LoggerConfiguration {
    fn default() -> Self {
        Self {
            sample_period: DEFAULT_SAMPLE_PERIOD,
            columns: Vec::new(),
        }
    }
}

impl LoggerConfiguration {
    pub fn new(ms_per_sample: u32) -> Self {
        Self {
            sample_period: Duration::millis(
                ms_per_sample.clamp(MIN_MS_PER_SAMPLE, MAX_MS_PER_SAMPLE),
            ),
            columns: Vec::new(),
        }
    }

    /// Append a column. Gives the column back if the configuration is full.
    pub fn push(&mut self, column: ColumnDescriptor) -> Result<(), ColumnDescriptor> {
        self.columns.push(column)
    }

    /// Time between two data rows.
    pub fn sample_period(&self) -> Duration {
        self.sample_period
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Read and parse the configuration file `name` from a mounted card.
    pub fn read<S: BlockStorage>(storage: &mut S, name: &str) -> Result<Self, Error> {
        let reader = storage.open_read_only(name).map_err(|e| {
            warn!("Cannot open config file {name}: {e:?}");
            Error::Open
        })?;
        Self::parse(reader)
    }

    /// Parse a configuration from a byte stream.
    pub fn parse<R: Read>(reader: R) -> Result<Self, Error> {
        Parser {
            reader,
            peeked: None,
            config: Self::default(),
        }
        .run()
    }
}

/// Receiver of configuration snapshots.
///
/// The card logger replaces the whole snapshot at once, `None` meaning "not
/// logging". Implementations must make the swap appear atomic to readers.
pub trait Publish {
    fn publish(&mut self, config: Option<LoggerConfiguration>);
}

/// Single task use: the slot is the snapshot.
impl Publish for Option<LoggerConfiguration> {
    fn publish(&mut self, config: Option<LoggerConfiguration>) {
        *self = config;
    }
}

struct Parser<R> {
    reader: R,
    peeked: Option<u8>,
    config: LoggerConfiguration,
}

impl<R: Read> Parser<R> {
    fn run(mut self) -> Result<LoggerConfiguration, Error> {
        loop {
            self.skip(BLANKS)?;
            match self.next()? {
                None => break,
                Some(b'\n') => {}
                Some(COMMENT) => self.skip_line()?,
                Some(PERIOD_TAG) => {
                    self.read_period()?;
                    self.skip_line()?;
                }
                Some(COLUMN_TAG) => {
                    if self.read_column()? {
                        self.skip_line()?;
                    }
                }
                Some(_) => self.skip_line()?,
            }
        }
        if self.config.columns.is_empty() {
            warn!("Logger config has no columns");
        }
        Ok(self.config)
    }

    fn peek(&mut self) -> Result<Option<u8>, Error> {
        if self.peeked.is_none() {
            let mut byte = [0u8; 1];
            match self.reader.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => self.peeked = Some(byte[0]),
                Err(e) => {
                    warn!("Config file read error: {e:?}");
                    return Err(Error::Read);
                }
            }
        }
        Ok(self.peeked)
    }

    fn next(&mut self) -> Result<Option<u8>, Error> {
        let byte = self.peek()?;
        self.peeked = None;
        Ok(byte)
    }

    /// Skip any bytes in `set`. Stops in front of anything else.
    fn skip(&mut self, set: &[u8]) -> Result<(), Error> {
        while let Some(byte) = self.peek()? {
            if !set.contains(&byte) {
                break;
            }
            self.peeked = None;
        }
        Ok(())
    }

    /// Consume the rest of the line including the newline.
    fn skip_line(&mut self) -> Result<(), Error> {
        while let Some(byte) = self.next()? {
            if byte == b'\n' {
                break;
            }
        }
        Ok(())
    }

    /// Next numeric token, `None` if it is too long to be a number.
    fn token(&mut self) -> Result<Option<String<MAX_NUMBER_LEN>>, Error> {
        self.skip(FIELD_SEPARATORS)?;
        let mut token = String::new();
        let mut overlong = false;
        while let Some(byte) = self.peek()? {
            if !(byte.is_ascii_digit() || b"+-.eE".contains(&byte)) {
                break;
            }
            self.peeked = None;
            overlong |= token.push(byte as char).is_err();
        }
        Ok((!overlong).then_some(token))
    }

    fn number(&mut self, what: &str, default: f32) -> Result<f32, Error> {
        let token = self.token()?;
        match token.as_deref().map(str::parse::<f32>) {
            Some(Ok(value)) => Ok(value),
            _ => {
                warn!("Malformed {what} in column line, using {default}");
                Ok(default)
            }
        }
    }

    fn read_period(&mut self) -> Result<(), Error> {
        self.skip(TAG_SEPARATORS)?;
        let token = self.token()?;
        match token.as_deref().map(str::parse::<u32>) {
            Some(Ok(ms)) => {
                let clamped = ms.clamp(MIN_MS_PER_SAMPLE, MAX_MS_PER_SAMPLE);
                if clamped != ms {
                    warn!("Sample period {ms} ms out of range, using {clamped} ms");
                }
                self.config.sample_period = Duration::millis(clamped);
            }
            _ => warn!(
                "Malformed sample period, keeping {} ms",
                self.config.sample_period.ticks()
            ),
        }
        Ok(())
    }

    /// Parse a column line after its tag.
    ///
    /// Returns true if the line has not been consumed up to its newline yet.
    fn read_column(&mut self) -> Result<bool, Error> {
        self.skip(TAG_SEPARATORS)?;
        let command = match self.peek()? {
            None | Some(b'\n') => {
                warn!("Column line without command");
                return Ok(true);
            }
            Some(byte) => {
                self.peeked = None;
                Command::new(byte as char)
            }
        };
        let Some(command) = command else {
            warn!("Column line with unprintable command");
            return Ok(true);
        };

        let defaults = ColumnDescriptor::default();
        let slope = self.number("slope", defaults.slope)?;
        let offset = self.number("offset", defaults.offset)?;
        let (label, open) = self.label()?;

        let column = ColumnDescriptor {
            command,
            slope,
            offset,
            label,
        };
        if let Err(column) = self.config.columns.push(column) {
            warn!(
                "More than {MAX_COLUMNS} columns, ignoring \"{}\"",
                column.label
            );
        }
        Ok(open)
    }

    /// Read a label delimited by `"` or `'`.
    ///
    /// A missing closing quote ends the label at the end of the line. Non-ASCII
    /// bytes are replaced by `?`.
    fn label(&mut self) -> Result<(Label, bool), Error> {
        let mut label = Label::new();
        loop {
            match self.next()? {
                None | Some(b'\n') => return Ok((label, false)),
                Some(b'"' | b'\'') => break,
                Some(_) => {}
            }
        }
        loop {
            match self.peek()? {
                None => return Ok((label, false)),
                Some(b'\n') => return Ok((label, true)),
                Some(b'\r' | b'"' | b'\'') => {
                    self.peeked = None;
                    return Ok((label, true));
                }
                Some(byte) => {
                    self.peeked = None;
                    let c = if byte.is_ascii() { byte as char } else { '?' };
                    if label.push(c).is_err() {
                        return Ok((label, true));
                    }
                }
            }
        }
    }
}
