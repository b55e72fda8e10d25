//! SD card storage contract.
//!
//! # Design
//! The logger never touches the card's filesystem directly. Everything it needs is
//! expressed by [BlockStorage]: card detection, mounting, opening the configuration
//! file for reading and creating data files. Only one data file is open at a time.
//!
//! Every call is fallible and must return within a bounded time, even if the card is
//! pulled in the middle of a transfer. Implementations report a timeout as an error;
//! the logger treats it like any other I/O failure.
use core::fmt::Write as _;

use heapless::String;

/// Base name of the automatically numbered data files.
pub const DATA_FILE_BASE: &str = "data_";

/// Data file extension.
pub const DATA_FILE_EXT: &str = "csv";

/// Number of distinct sequence numbers (three digits).
pub const MAX_SEQUENCE: u16 = 1000;

/// An 8.3 file name.
pub type FileName = String<12>;

#[derive(Debug)]
pub enum OpenError<E> {
    /// Every sequence number is taken.
    Exhausted,
    /// Base name and extension do not fit an 8.3 name.
    Name,
    Storage(E),
}

pub trait BlockStorage {
    type Error: core::fmt::Debug;

    /// Data file handle. `flush()` commits buffered bytes to the medium.
    type File: embedded_io::Write;

    /// Read only handle for the configuration file.
    type Reader: embedded_io::Read;

    /// Check the card detect switch.
    fn detect(&mut self) -> bool;

    fn mount(&mut self) -> Result<(), Self::Error>;

    /// Release the filesystem. Must be safe to call after the card has been removed.
    fn unmount(&mut self);

    fn exists(&mut self, name: &str) -> Result<bool, Self::Error>;

    /// Create (or truncate) a file and open it for writing.
    fn create(&mut self, name: &str) -> Result<Self::File, Self::Error>;

    fn open_read_only(&mut self, name: &str) -> Result<Self::Reader, Self::Error>;

    fn close(&mut self, file: Self::File) -> Result<(), Self::Error>;

    /// Create a new data file named `<base>NNN.<ext>`, probing sequence numbers from
    /// zero upwards until an unused name is found.
    fn open_new_sequenced(
        &mut self,
        base: &str,
        ext: &str,
    ) -> Result<(FileName, Self::File), OpenError<Self::Error>> {
        for number in 0..MAX_SEQUENCE {
            let name = sequenced_name(base, number, ext).ok_or(OpenError::Name)?;
            if !self.exists(&name).map_err(OpenError::Storage)? {
                let file = self.create(&name).map_err(OpenError::Storage)?;
                return Ok((name, file));
            }
        }
        Err(OpenError::Exhausted)
    }
}

/// Format a numbered file name, e.g. `data_007.csv`.
pub fn sequenced_name(base: &str, number: u16, ext: &str) -> Option<FileName> {
    let mut name = FileName::new();
    write!(name, "{base}{number:03}.{ext}").ok()?;
    Some(name)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mock::MockCard;

    fn mounted_card() -> MockCard {
        let mut card = MockCard::new();
        card.insert(None);
        card.mount().unwrap();
        card
    }

    #[test]
    fn names() {
        assert_eq!(sequenced_name("data_", 7, "csv").unwrap(), "data_007.csv");
        assert_eq!(sequenced_name("data_", 999, "csv").unwrap(), "data_999.csv");
        assert!(sequenced_name("too_long_", 0, "csv").is_none());
    }

    #[test]
    fn next_name_skips_existing() {
        let mut card = mounted_card();
        card.create("data_000.csv").unwrap();
        card.create("data_001.csv").unwrap();
        let (name, _) = card.open_new_sequenced("data_", "csv").unwrap();
        assert_eq!(name, "data_002.csv");
    }

    #[test]
    fn successive_names_never_collide() {
        let mut card = mounted_card();
        let mut names = std::vec::Vec::new();
        for _ in 0..20 {
            let (name, file) = card.open_new_sequenced("data_", "csv").unwrap();
            card.close(file).unwrap();
            assert!(!names.contains(&name), "{name} reused");
            names.push(name);
        }
    }

    #[test]
    fn exhausted() {
        let mut card = mounted_card();
        for n in 0..MAX_SEQUENCE {
            card.create(&sequenced_name("data_", n, "csv").unwrap())
                .unwrap();
        }
        assert!(matches!(
            card.open_new_sequenced("data_", "csv"),
            Err(OpenError::Exhausted)
        ));
    }

    #[test]
    fn unmounted_is_storage_error() {
        let mut card = MockCard::new();
        card.insert(None);
        assert!(matches!(
            card.open_new_sequenced("data_", "csv"),
            Err(OpenError::Storage(_))
        ));
    }
}
