//! A host directory standing in for the SD card.
//!
//! The card counts as inserted while the directory exists: create it to insert,
//! rename or delete it to pull the card. Data files are buffered in memory and
//! committed with `sync_data` on flush.
use std::{
    fs::File,
    io::{self, BufReader, BufWriter},
    path::PathBuf,
};

use embedded_io::{ErrorKind, ErrorType, Read, Write};
use polydaq_logger::storage::BlockStorage;

#[derive(Debug)]
pub enum CardError {
    Absent,
    NotMounted,
    Io(io::ErrorKind),
}

impl From<io::Error> for CardError {
    fn from(e: io::Error) -> Self {
        Self::Io(e.kind())
    }
}

impl embedded_io::Error for CardError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(io::ErrorKind::NotFound) => ErrorKind::NotFound,
            Self::Io(io::ErrorKind::PermissionDenied) => ErrorKind::PermissionDenied,
            _ => ErrorKind::Other,
        }
    }
}

pub struct CardDir {
    root: PathBuf,
    mounted: bool,
}

impl CardDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mounted: false,
        }
    }

    fn path(&self, name: &str) -> Result<PathBuf, CardError> {
        if !self.root.is_dir() {
            return Err(CardError::Absent);
        }
        if !self.mounted {
            return Err(CardError::NotMounted);
        }
        Ok(self.root.join(name))
    }
}

impl BlockStorage for CardDir {
    type Error = CardError;
    type File = CardFile;
    type Reader = CardReader;

    fn detect(&mut self) -> bool {
        self.root.is_dir()
    }

    fn mount(&mut self) -> Result<(), CardError> {
        if !self.root.is_dir() {
            return Err(CardError::Absent);
        }
        self.mounted = true;
        Ok(())
    }

    fn unmount(&mut self) {
        self.mounted = false;
    }

    fn exists(&mut self, name: &str) -> Result<bool, CardError> {
        Ok(self.path(name)?.try_exists()?)
    }

    fn create(&mut self, name: &str) -> Result<CardFile, CardError> {
        let file = File::create(self.path(name)?)?;
        Ok(CardFile(BufWriter::new(file)))
    }

    fn open_read_only(&mut self, name: &str) -> Result<CardReader, CardError> {
        let file = File::open(self.path(name)?)?;
        Ok(CardReader(BufReader::new(file)))
    }

    fn close(&mut self, mut file: CardFile) -> Result<(), CardError> {
        file.flush()
    }
}

pub struct CardFile(BufWriter<File>);

impl ErrorType for CardFile {
    type Error = CardError;
}

impl Write for CardFile {
    fn write(&mut self, buf: &[u8]) -> Result<usize, CardError> {
        Ok(io::Write::write(&mut self.0, buf)?)
    }

    fn flush(&mut self) -> Result<(), CardError> {
        io::Write::flush(&mut self.0)?;
        self.0.get_ref().sync_data()?;
        Ok(())
    }
}

pub struct CardReader(BufReader<File>);

impl ErrorType for CardReader {
    type Error = CardError;
}

impl Read for CardReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, CardError> {
        Ok(io::Read::read(&mut self.0, buf)?)
    }
}
