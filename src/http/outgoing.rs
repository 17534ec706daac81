//! Queue of owned byte chunks waiting to be written to a socket.

use std::collections::VecDeque;
use std::io::IoSlice;

use bytes::{Buf, Bytes};

use crate::error::Result;

/// FIFO of outgoing chunks.
///
/// Chunks are never reordered and never empty: zero-length pushes are
/// dropped and fully written chunks are removed by [`drain_written`].
///
/// [`drain_written`]: OutgoingQueue::drain_written
#[derive(Debug, Default)]
pub struct OutgoingQueue {
    chunks: VecDeque<Bytes>,
}

impl OutgoingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies `bytes` into a new chunk at the back of the queue.
    pub fn push_back(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let mut owned = Vec::new();
        owned.try_reserve_exact(bytes.len())?;
        owned.extend_from_slice(bytes);
        self.push_owned(owned)
    }

    /// Queues an already owned chunk without copying it.
    pub fn push_owned(&mut self, bytes: impl Into<Bytes>) -> Result<()> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Ok(());
        }
        self.chunks.try_reserve(1)?;
        self.chunks.push_back(bytes);
        Ok(())
    }

    /// Moves every chunk of `other` to the back of this queue.
    pub fn append(&mut self, other: &mut OutgoingQueue) -> Result<()> {
        self.chunks.try_reserve(other.chunks.len())?;
        self.chunks.append(&mut other.chunks);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of queued chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Total bytes still to be sent.
    pub fn pending_bytes(&self) -> usize {
        self.chunks.iter().map(Bytes::len).sum()
    }

    pub fn front(&self) -> Option<&[u8]> {
        self.chunks.front().map(|c| &c[..])
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.chunks.iter().map(|c| &c[..])
    }

    /// Concatenation of every pending chunk.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pending_bytes());
        for chunk in &self.chunks {
            out.extend_from_slice(chunk);
        }
        out
    }

    /// Scatter/gather view of at most `max` leading chunks.
    pub fn io_slices(&self, max: usize) -> Vec<IoSlice<'_>> {
        self.chunks
            .iter()
            .take(max)
            .map(|c| IoSlice::new(c))
            .collect()
    }

    /// Accounts for `n` bytes written from the front of the queue.
    ///
    /// Fully written chunks are dropped; a partially written chunk keeps its
    /// storage and only its start moves forward.
    pub fn drain_written(&mut self, mut n: usize) {
        while n > 0 {
            let Some(front) = self.chunks.front_mut() else {
                break;
            };
            if front.len() <= n {
                n -= front.len();
                self.chunks.pop_front();
            } else {
                front.advance(n);
                n = 0;
            }
        }
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }
}
