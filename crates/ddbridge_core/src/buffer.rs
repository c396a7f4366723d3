//! Flat buffer exchange.
//!
//! Bulk updates and deltas can cross the boundary as an encoded byte
//! region. The bridge never interprets the encoding; it hands the region
//! to the caller and takes it back through an explicit release call that
//! must present the same buffer, size and offset the engine issued.

use bytes::Bytes;

/// An encoded region issued by the engine.
///
/// The message occupies `size` bytes starting at `offset` within the
/// underlying buffer. Release it with `EngineHandle::flatbuf_free`.
#[derive(Debug)]
pub struct FlatBuffer {
    buf: Bytes,
    size: usize,
    offset: usize,
}

impl FlatBuffer {
    /// Wraps an engine-owned region.
    pub fn new(buf: Bytes, size: usize, offset: usize) -> Self {
        Self { buf, size, offset }
    }

    /// Returns the whole underlying buffer.
    pub fn buffer(&self) -> &Bytes {
        &self.buf
    }

    /// Returns the message size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the message offset within the buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the message bytes, or an empty slice if the triple is out of
    /// bounds.
    pub fn message(&self) -> &[u8] {
        self.offset
            .checked_add(self.size)
            .and_then(|end| self.buf.get(self.offset..end))
            .unwrap_or(&[])
    }

    /// Returns the address identifying the underlying allocation.
    pub(crate) fn addr(&self) -> usize {
        self.buf.as_ptr() as usize
    }
}
