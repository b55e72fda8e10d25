//! In-memory SD card and sample source for tests.
//!
//! File contents are split into bytes committed to the medium and bytes still
//! buffered. Only `flush()`/`close()` commit; pulling the card loses the buffer.

use std::{
    cell::RefCell,
    collections::BTreeMap,
    rc::Rc,
    string::{String, ToString},
    vec::Vec,
};

use embedded_io::{ErrorKind, ErrorType, Read, Write};

use crate::{
    acquisition::{Command, RawSource},
    config::CONFIG_FILE_NAME,
    storage::BlockStorage,
};

#[derive(Default, Debug)]
pub struct Entry {
    pub committed: Vec<u8>,
    pub pending: Vec<u8>,
}

#[derive(Default, Debug)]
pub struct Card {
    pub present: bool,
    pub mounted: bool,
    pub files: BTreeMap<String, Entry>,
    pub fail_mount: bool,
    pub fail_write: bool,
    pub fail_read: bool,
    pub mounts: u32,
    pub unmounts: u32,
    pub syncs: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockError {
    Absent,
    NotMounted,
    NotFound,
    Injected,
}

impl embedded_io::Error for MockError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

fn ensure_mounted(card: &Card) -> Result<(), MockError> {
    if !card.present {
        Err(MockError::Absent)
    } else if !card.mounted {
        Err(MockError::NotMounted)
    } else {
        Ok(())
    }
}

/// Shared handle; tests keep a clone to insert/pull the card under a running logger.
#[derive(Clone, Default)]
pub struct MockCard(pub Rc<RefCell<Card>>);

impl MockCard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the card, optionally with a configuration file on it.
    pub fn insert(&self, config: Option<&str>) {
        let mut card = self.0.borrow_mut();
        card.present = true;
        match config {
            Some(config) => {
                card.files.insert(
                    CONFIG_FILE_NAME.to_string(),
                    Entry {
                        committed: config.as_bytes().to_vec(),
                        pending: Vec::new(),
                    },
                );
            }
            None => {
                card.files.remove(CONFIG_FILE_NAME);
            }
        }
    }

    /// Pull the card. Everything not yet flushed is lost.
    pub fn remove(&self) {
        let mut card = self.0.borrow_mut();
        card.present = false;
        card.mounted = false;
        for entry in card.files.values_mut() {
            entry.pending.clear();
        }
    }

    /// Bytes that made it onto the medium.
    pub fn committed(&self, name: &str) -> String {
        let card = self.0.borrow();
        let entry = card.files.get(name).expect("no such file");
        String::from_utf8(entry.committed.clone()).unwrap()
    }

    /// Committed plus buffered bytes.
    pub fn written(&self, name: &str) -> String {
        let card = self.0.borrow();
        let entry = card.files.get(name).expect("no such file");
        let mut bytes = entry.committed.clone();
        bytes.extend_from_slice(&entry.pending);
        String::from_utf8(bytes).unwrap()
    }

    pub fn data_files(&self) -> Vec<String> {
        self.0
            .borrow()
            .files
            .keys()
            .filter(|name| name.as_str() != CONFIG_FILE_NAME)
            .cloned()
            .collect()
    }
}

impl BlockStorage for MockCard {
    type Error = MockError;
    type File = MockFile;
    type Reader = MockReader;

    fn detect(&mut self) -> bool {
        self.0.borrow().present
    }

    fn mount(&mut self) -> Result<(), MockError> {
        let mut card = self.0.borrow_mut();
        if !card.present {
            return Err(MockError::Absent);
        }
        if card.fail_mount {
            return Err(MockError::Injected);
        }
        card.mounted = true;
        card.mounts += 1;
        Ok(())
    }

    fn unmount(&mut self) {
        let mut card = self.0.borrow_mut();
        card.mounted = false;
        card.unmounts += 1;
    }

    fn exists(&mut self, name: &str) -> Result<bool, MockError> {
        let card = self.0.borrow();
        ensure_mounted(&card)?;
        Ok(card.files.contains_key(name))
    }

    fn create(&mut self, name: &str) -> Result<MockFile, MockError> {
        let mut card = self.0.borrow_mut();
        ensure_mounted(&card)?;
        card.files.insert(name.to_string(), Entry::default());
        Ok(MockFile {
            card: self.0.clone(),
            name: name.to_string(),
        })
    }

    fn open_read_only(&mut self, name: &str) -> Result<MockReader, MockError> {
        let card = self.0.borrow();
        ensure_mounted(&card)?;
        let entry = card.files.get(name).ok_or(MockError::NotFound)?;
        Ok(MockReader {
            data: entry.committed.clone(),
            pos: 0,
            fail: card.fail_read,
        })
    }

    fn close(&mut self, mut file: MockFile) -> Result<(), MockError> {
        file.flush()
    }
}

pub struct MockFile {
    card: Rc<RefCell<Card>>,
    name: String,
}

impl ErrorType for MockFile {
    type Error = MockError;
}

impl Write for MockFile {
    fn write(&mut self, buf: &[u8]) -> Result<usize, MockError> {
        let mut card = self.card.borrow_mut();
        ensure_mounted(&card)?;
        if card.fail_write {
            return Err(MockError::Injected);
        }
        let entry = card.files.get_mut(&self.name).ok_or(MockError::NotFound)?;
        entry.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), MockError> {
        let mut card = self.card.borrow_mut();
        ensure_mounted(&card)?;
        let entry = card.files.get_mut(&self.name).ok_or(MockError::NotFound)?;
        let mut pending = core::mem::take(&mut entry.pending);
        entry.committed.append(&mut pending);
        card.syncs += 1;
        Ok(())
    }
}

pub struct MockReader {
    data: Vec<u8>,
    pos: usize,
    fail: bool,
}

impl MockReader {
    pub fn new(text: &str) -> Self {
        Self {
            data: text.as_bytes().to_vec(),
            pos: 0,
            fail: false,
        }
    }
}

impl ErrorType for MockReader {
    type Error = MockError;
}

impl Read for MockReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, MockError> {
        if self.fail {
            return Err(MockError::Injected);
        }
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Raw readings keyed by command character; unknown commands read zero.
#[derive(Default)]
pub struct ScriptedSource(pub BTreeMap<char, i16>);

impl ScriptedSource {
    pub fn set(&mut self, command: char, raw: i16) {
        self.0.insert(command, raw);
    }
}

impl RawSource for ScriptedSource {
    fn get_raw(&mut self, command: Command) -> i16 {
        self.0.get(&command.as_char()).copied().unwrap_or(0)
    }
}
