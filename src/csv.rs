//! CSV rendering of the data file.
//!
//! ```text
//! Time,"RawA","RawB"
//! 0,100.0,-5.0
//! 100,200.0,95.0
//! ```
//!
//! The first field of every row is the sample time in milliseconds. Values use the
//! shortest representation that reads back as the same `f32`.
use core::fmt::{self, Write};

use crate::config::{LoggerConfiguration, MAX_COLUMNS, MAX_LABEL_LEN};

pub const EOL: char = '\n';

/// Widest value field: comma plus up to 19 characters (`-1234567900000000.0`).
const VALUE_WIDTH: usize = 20;

/// Largest single data row: timestamp plus one value per column.
pub type Row = heapless::String<{ 11 + MAX_COLUMNS * VALUE_WIDTH }>;

/// Largest header: `Time` plus one quoted label per column.
pub type Header = heapless::String<{ 4 + MAX_COLUMNS * (MAX_LABEL_LEN + 3) + 1 }>;

/// Render the header line naming every column.
pub fn write_header<W: Write>(w: &mut W, config: &LoggerConfiguration) -> fmt::Result {
    w.write_str("Time")?;
    for column in config.columns() {
        write!(w, ",\"{}\"", column.label)?;
    }
    w.write_char(EOL)
}

/// Render one data row.
pub fn write_row<W: Write>(
    w: &mut W,
    timestamp: u32,
    values: impl IntoIterator<Item = f32>,
) -> fmt::Result {
    write!(w, "{timestamp}")?;
    for value in values {
        write!(w, ",{value:?}")?;
    }
    w.write_char(EOL)
}
