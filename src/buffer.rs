//! The undecoded-chunk buffer.
//!
//! Bytes offered to the decoder are appended to the tail of a single growable buffer; every
//! scanner primitive reads from the head without actually discarding bytes, so a short read can
//! roll the read cursor back to where it started. Bytes are only dropped for real during
//! [`ChunkBuffer::compact`], which the decoder calls once per `offer()`, never mid-parse.

use bytes::{Buf, BytesMut};

/// Default discard threshold: compact once the buffer holds more than 10 MiB of bytes before
/// the read cursor.
pub const DEFAULT_DISCARD_THRESHOLD: usize = 10 * 1024 * 1024;

/// An append-only-from-the-right, read-from-the-left byte buffer with a readable region
/// `[read_idx, write_idx)`.
///
/// `write_idx` is always `buf.len()`; it is not tracked separately.
#[derive(Debug)]
pub(crate) struct ChunkBuffer {
    buf: BytesMut,
    read_idx: usize,
    discard_threshold: usize,
}

/// An opaque read-cursor snapshot, restored by every scanner primitive on a short read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Snapshot(usize);

impl ChunkBuffer {
    pub(crate) fn new(discard_threshold: usize) -> Self {
        Self { buf: BytesMut::new(), read_idx: 0, discard_threshold }
    }

    pub(crate) fn set_discard_threshold(&mut self, bytes: usize) {
        self.discard_threshold = bytes;
    }

    /// Copies `bytes` onto the tail of the buffer.
    pub(crate) fn append(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of unread bytes currently available.
    pub(crate) fn readable(&self) -> usize {
        self.buf.len() - self.read_idx
    }

    /// Peeks at the byte `offset` positions past the read cursor, without consuming it.
    pub(crate) fn peek_byte(&self, offset: usize) -> Option<u8> {
        self.buf.get(self.read_idx + offset).copied()
    }

    /// Reads and consumes the next byte, advancing the read cursor.
    pub(crate) fn read_byte(&mut self) -> Option<u8> {
        let b = self.peek_byte(0)?;
        self.read_idx += 1;
        Some(b)
    }

    /// The unread region as a contiguous slice.
    pub(crate) fn remaining(&self) -> &[u8] {
        &self.buf[self.read_idx..]
    }

    /// Captures the current read cursor so it can be restored on a short read.
    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot(self.read_idx)
    }

    /// Restores a previously captured read cursor. Used by every scanner primitive to implement
    /// transactional rollback on `NeedMore`.
    pub(crate) fn restore(&mut self, snapshot: Snapshot) {
        self.read_idx = snapshot.0;
    }

    /// Advances the read cursor by `n` bytes without otherwise consuming them (i.e. they are
    /// considered "read" but the caller is responsible for having copied out anything it needs).
    pub(crate) fn advance_read(&mut self, n: usize) {
        debug_assert!(self.read_idx + n <= self.buf.len());
        self.read_idx += n;
    }

    /// Copies out `len` bytes starting `start` positions past the read cursor.
    pub(crate) fn copy(&self, start: usize, len: usize) -> Vec<u8> {
        self.buf[self.read_idx + start..self.read_idx + start + len].to_vec()
    }

    /// Drops already-read bytes from the front of the buffer once it has grown past the
    /// discard threshold, shifting the readable region down to index 0.
    ///
    /// Called after each `offer()`'s parsing pass, never mid-parse, so that no snapshot taken
    /// during the pass is ever invalidated by a compaction happening underneath it.
    pub(crate) fn compact(&mut self) {
        if self.buf.len() > self.discard_threshold && self.read_idx > 0 {
            self.buf.advance(self.read_idx);
            self.read_idx = 0;
            tracing::trace!(remaining = self.buf.len(), "compacted chunk buffer");
        }
    }
}
