//! Bounded byte FIFO between the sample producer and the card logger.
//!
//! Rows are appended whole or not at all, so the file never sees a truncated row
//! because of a full queue. The consumer side reads byte runs of any length.
use heapless::Deque;

/// Queue size in bytes.
pub const QUEUE_CAPACITY: usize = 1000;

/// The row did not fit into the free space of the queue.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Overflow;

/// Producer side of the queue.
pub trait RowSink {
    /// Append a complete row. Nothing is appended on overflow.
    fn push_row(&mut self, row: &[u8]) -> Result<(), Overflow>;
}

/// Consumer side of the queue.
pub trait ByteSource {
    /// Move up to `buf.len()` of the oldest bytes into `buf`.
    fn read_available(&mut self, buf: &mut [u8]) -> usize;

    /// Drop everything currently queued.
    fn discard(&mut self);
}

pub struct ByteQueue<const N: usize = QUEUE_CAPACITY> {
    bytes: Deque<u8, N>,
}

impl<const N: usize> ByteQueue<N> {
    pub const fn new() -> Self {
        Self {
            bytes: Deque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn free(&self) -> usize {
        N - self.bytes.len()
    }
}

impl<const N: usize> Default for ByteQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RowSink for ByteQueue<N> {
    fn push_row(&mut self, row: &[u8]) -> Result<(), Overflow> {
        if row.len() > self.free() {
            return Err(Overflow);
        }
        for &b in row {
            self.bytes.push_back(b).map_err(|_| Overflow)?;
        }
        Ok(())
    }
}

impl<const N: usize> ByteSource for ByteQueue<N> {
    fn read_available(&mut self, buf: &mut [u8]) -> usize {
        let mut n = 0;
        for slot in buf.iter_mut() {
            let Some(b) = self.bytes.pop_front() else {
                break;
            };
            *slot = b;
            n += 1;
        }
        n
    }

    fn discard(&mut self) {
        self.bytes.clear();
    }
}
