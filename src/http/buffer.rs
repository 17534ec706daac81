//! Growable byte buffer used for URLs and header names/values.

use std::fmt;

use crate::error::Result;

/// Owned, growable byte sequence.
///
/// Growth is amortized (the backing `Vec` doubles) and fallible: a failed
/// allocation surfaces as [`Error::OutOfMemory`](crate::Error::OutOfMemory)
/// instead of aborting.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct ByteBuffer {
    storage: Vec<u8>,
}

impl ByteBuffer {
    /// Creates an empty buffer. Nothing is allocated until the first append.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` at the end of the buffer.
    ///
    /// # Example
    ///
    /// ```
    /// # use lantern::http::buffer::ByteBuffer;
    /// let mut buf = ByteBuffer::new();
    /// buf.append(b"Hello").unwrap();
    /// buf.append(b" world").unwrap();
    /// assert_eq!(buf.as_bytes(), b"Hello world");
    /// ```
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.storage.try_reserve(bytes.len())?;
        self.storage.extend_from_slice(bytes);
        Ok(())
    }

    /// Drops the contents and releases the storage.
    pub fn clear(&mut self) {
        self.storage = Vec::new();
    }

    /// Takes the storage of `other`, leaving `other` empty. No bytes are copied.
    pub fn move_from(&mut self, other: &mut ByteBuffer) {
        self.storage = std::mem::take(&mut other.storage);
    }

    /// Moves the contents out into a new buffer, leaving `self` empty.
    pub fn take(&mut self) -> ByteBuffer {
        let mut out = ByteBuffer::new();
        out.move_from(self);
        out
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// Borrowed view of the contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.storage
    }

    /// The contents as text, if they are valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.storage).ok()
    }

    /// ASCII case-insensitive comparison against `other`.
    pub fn eq_ignore_ascii_case(&self, other: &[u8]) -> bool {
        self.storage.eq_ignore_ascii_case(other)
    }
}

impl From<&[u8]> for ByteBuffer {
    fn from(bytes: &[u8]) -> Self {
        Self {
            storage: bytes.to_vec(),
        }
    }
}

impl From<&str> for ByteBuffer {
    fn from(s: &str) -> Self {
        s.as_bytes().into()
    }
}

impl fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.storage))
    }
}
