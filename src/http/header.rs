use crate::error::Result;
use crate::http::buffer::ByteBuffer;

/// A single `field: value` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    field: ByteBuffer,
    value: ByteBuffer,
}

impl Header {
    pub fn new(field: ByteBuffer, value: ByteBuffer) -> Self {
        Self { field, value }
    }

    pub fn field(&self) -> &[u8] {
        self.field.as_bytes()
    }

    pub fn value(&self) -> &[u8] {
        self.value.as_bytes()
    }

    /// Field name as text. Header names are tokens, so this only fails on garbage.
    pub fn field_str(&self) -> &str {
        self.field.as_str().unwrap_or("")
    }

    pub fn value_str(&self) -> Option<&str> {
        self.value.as_str()
    }

    /// Returns true if this header's field matches `field`, ignoring ASCII case.
    pub fn is(&self, field: &str) -> bool {
        self.field.eq_ignore_ascii_case(field.as_bytes())
    }
}

/// Ordered list of headers.
///
/// Insertion order is preserved and duplicate fields are allowed. Lookups are
/// a linear scan; lists hold tens of entries at most.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HeaderList {
    headers: Vec<Header>,
}

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an already built header without copying its storage.
    pub fn insert_tail(&mut self, header: Header) -> Result<()> {
        self.headers.try_reserve(1)?;
        self.headers.push(header);
        Ok(())
    }

    /// Copies `field` and `value` into a new header at the end of the list.
    pub fn push(&mut self, field: &[u8], value: &[u8]) -> Result<()> {
        let mut f = ByteBuffer::new();
        f.append(field)?;
        let mut v = ByteBuffer::new();
        v.append(value)?;
        self.insert_tail(Header::new(f, v))
    }

    /// First header whose field matches `field`, ignoring ASCII case.
    ///
    /// # Example
    ///
    /// ```
    /// # use lantern::http::header::HeaderList;
    /// let mut headers = HeaderList::new();
    /// headers.push(b"Content-Type", b"text/plain").unwrap();
    /// let found = headers.find("content-type").unwrap();
    /// assert_eq!(found.value(), b"text/plain");
    /// ```
    pub fn find(&self, field: &str) -> Option<&Header> {
        self.headers.iter().find(|h| h.is(field))
    }

    /// Removes every header matching `field` and returns how many were removed.
    pub fn remove_all(&mut self, field: &str) -> usize {
        let before = self.headers.len();
        self.headers.retain(|h| !h.is(field));
        before - self.headers.len()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.find(field).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Header> {
        self.headers.iter()
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Drops every header and releases the storage.
    pub fn clear(&mut self) {
        self.headers = Vec::new();
    }

    /// Moves every header out, leaving the list empty.
    pub fn drain(&mut self) -> std::vec::Drain<'_, Header> {
        self.headers.drain(..)
    }
}

impl From<Vec<Header>> for HeaderList {
    fn from(headers: Vec<Header>) -> Self {
        Self { headers }
    }
}

impl<'a> IntoIterator for &'a HeaderList {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
