//! Raw sample sources.
//!
//! Every logged column names its source with a single command character. The
//! characters follow the PolyDAQ 2 serial protocol so that configuration files are
//! interchangeable with the PC interface.

use num_enum::TryFromPrimitive;

/// Single character selecting which physical source a column reads.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Command(char);

impl Command {
    /// Construct a command from a printable ASCII character.
    pub fn new(c: char) -> Option<Self> {
        c.is_ascii_graphic().then_some(Self(c))
    }

    pub fn as_char(&self) -> char {
        self.0
    }

    /// Decode the physical source this command selects.
    pub fn source(&self) -> Source {
        let c = self.0 as u8;
        match c {
            b'0'..=b'9' => Source::Adc(c - b'0'),
            b'A'..=b'F' => Source::Adc(c - b'A' + 10),
            b'X'..=b'Z' => Axis::try_from(c - b'X')
                .map(Source::Accelerometer)
                .unwrap_or(Source::Unknown),
            b'x'..=b'z' => Axis::try_from(c - b'x')
                .map(Source::ExternalAccelerometer)
                .unwrap_or(Source::Unknown),
            _ => Source::Unknown,
        }
    }
}

impl Default for Command {
    fn default() -> Self {
        Self('0')
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
}

/// Physical data source behind a [Command].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Source {
    /// A/D converter channel 0 to 15.
    Adc(u8),
    /// On-board accelerometer.
    Accelerometer(Axis),
    /// Accelerometer on the external I2C connector.
    ExternalAccelerometer(Axis),
    /// Not a known source. Reads as zero.
    Unknown,
}

/// Acquisition hardware as seen by the sample producer.
pub trait RawSource {
    /// Take one uncalibrated reading from the source selected by `command`.
    fn get_raw(&mut self, command: Command) -> i16;
}
