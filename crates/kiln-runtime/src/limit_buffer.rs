//! Fixed-capacity capture buffer for worker stderr.
//!
//! A worker that loops or logs verbosely must not be able to exhaust host
//! memory through its diagnostic stream. [`LimitBuffer`] accepts at most
//! `capacity` bytes over its whole lifetime; everything past that is dropped.
//! Truncation is tail-lossy: the head of the output is kept, the tail is not.

use std::sync::Mutex;

/// Capped FIFO byte sink used for diagnostic capture.
///
/// Writers append with [`write`](LimitBuffer::write); readers drain FIFO with
/// [`drain`](LimitBuffer::drain). Both sides may run concurrently — the
/// buffer is internally synchronized and never blocks beyond the short
/// critical section.
#[derive(Debug)]
pub struct LimitBuffer {
    capacity: usize,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    // Bytes accepted over the buffer's lifetime; never shrinks, so the
    // lifetime write/read caps fall out of `data.len() <= capacity`.
    data: Vec<u8>,
    read_pos: usize,
    truncated: bool,
}

impl LimitBuffer {
    /// Create a buffer accepting at most `capacity` bytes, lifetime.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                data: Vec::new(),
                read_pos: 0,
                truncated: false,
            }),
        }
    }

    /// Maximum number of bytes this buffer will ever hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append up to `capacity - written` bytes from `chunk`.
    ///
    /// Returns the number of bytes accepted. A return value smaller than
    /// `chunk.len()` means the tail was dropped; [`truncated`](Self::truncated)
    /// reports that permanently.
    pub fn write(&self, chunk: &[u8]) -> usize {
        let mut inner = self.inner.lock().expect("limit buffer poisoned");
        let room = self.capacity - inner.data.len();
        let n = room.min(chunk.len());
        inner.data.extend_from_slice(&chunk[..n]);
        if n < chunk.len() {
            inner.truncated = true;
        }
        n
    }

    /// Number of captured bytes not yet drained.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().expect("limit buffer poisoned");
        inner.data.len() - inner.read_pos
    }

    /// True when no undrained bytes remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once any write has been dropped for lack of room.
    pub fn truncated(&self) -> bool {
        self.inner.lock().expect("limit buffer poisoned").truncated
    }

    /// Drain all undrained bytes, FIFO.
    pub fn drain(&self) -> Vec<u8> {
        let mut inner = self.inner.lock().expect("limit buffer poisoned");
        let out = inner.data[inner.read_pos..].to_vec();
        inner.read_pos = inner.data.len();
        out
    }

    /// Drain all undrained bytes as (lossy) UTF-8 text.
    pub fn drain_to_string(&self) -> String {
        String::from_utf8_lossy(&self.drain()).into_owned()
    }
}
