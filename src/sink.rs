//! Write-side binary cursor over a byte sink
//!
//! A [`ChunkSink`] appends little-endian integers, tags and padded chunks
//! while tracking a byte position. Two sink strategies exist and are
//! mutually exclusive per handle: a bounded in-memory buffer (exceeding its
//! capacity is an immediate error, not a reallocation) or a seekable file
//! (header fields are patched via seek-write-seek).

use crate::chunks::{pad_even, FourCC};
use crate::error::{AviError, Result};
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};

enum SinkKind {
    Buffer(Vec<u8>),
    File(File),
}

/// Sequential writer over a memory buffer or file, tracking `pos`
pub struct ChunkSink {
    kind: SinkKind,
    pos: u64,
    /// Total sink capacity in bytes; writes past it fail with
    /// `CapacityExceeded`
    limit: u64,
}

impl ChunkSink {
    /// Create a memory-buffer sink bounded by `capacity` bytes
    pub fn buffer(capacity: u64) -> Self {
        ChunkSink {
            kind: SinkKind::Buffer(Vec::new()),
            pos: 0,
            limit: capacity,
        }
    }

    /// Create a file sink bounded by `capacity` bytes
    pub fn file(file: File, capacity: u64) -> Self {
        ChunkSink {
            kind: SinkKind::File(file),
            pos: 0,
            limit: capacity,
        }
    }

    /// Current write position
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Total sink capacity
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Move the write position. For a file sink this seeks; for a buffer
    /// sink the gap up to the new position is zero-filled on the next write.
    pub fn seek_to(&mut self, pos: u64) -> Result<()> {
        if pos > self.limit {
            return Err(AviError::CapacityExceeded("seek past sink capacity"));
        }
        if let SinkKind::File(f) = &mut self.kind {
            f.seek(SeekFrom::Start(pos))?;
        }
        self.pos = pos;
        Ok(())
    }

    /// Write raw bytes at the current position, advancing it
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        let end = self.pos + data.len() as u64;
        if end > self.limit {
            return Err(AviError::CapacityExceeded("sink full"));
        }
        match &mut self.kind {
            SinkKind::Buffer(buf) => {
                let pos = self.pos as usize;
                if buf.len() < pos {
                    buf.resize(pos, 0);
                }
                if buf.len() < end as usize {
                    buf.resize(end as usize, 0);
                }
                buf[pos..end as usize].copy_from_slice(data);
            }
            SinkKind::File(f) => f.write_all(data)?,
        }
        self.pos = end;
        Ok(())
    }

    pub fn write_tag(&mut self, tag: FourCC) -> Result<()> {
        self.write_bytes(tag.as_bytes())
    }

    pub fn write_u32_le(&mut self, n: u32) -> Result<()> {
        self.write_bytes(&n.to_le_bytes())
    }

    pub fn write_u16_le(&mut self, n: u16) -> Result<()> {
        self.write_bytes(&n.to_le_bytes())
    }

    /// Append a chunk: 8-byte tag+length header, body, and a zero pad byte
    /// when the body length is odd. The declared length excludes the pad
    /// byte; the position advance includes it. On failure the position is
    /// restored so a half-written chunk is not counted.
    pub fn add_chunk(&mut self, tag: FourCC, data: &[u8]) -> Result<()> {
        let start = self.pos;
        let length = data.len() as u32;
        let result = (|| {
            self.write_tag(tag)?;
            self.write_u32_le(length)?;
            self.write_bytes(data)?;
            if length & 1 != 0 {
                self.write_bytes(&[0])?;
            }
            Ok(())
        })();
        if result.is_err() {
            // restore so the caller may still finalize what was valid
            let _ = self.seek_to(start);
        }
        debug_assert!(result.is_err() || self.pos == start + 8 + pad_even(length) as u64);
        result
    }

    /// Overwrite `data` at absolute position `at` without disturbing the
    /// current append position. Used to backpatch the reserved header region.
    pub fn write_block_at(&mut self, at: u64, data: &[u8]) -> Result<()> {
        let end = at + data.len() as u64;
        if end > self.limit {
            return Err(AviError::CapacityExceeded("patch past sink capacity"));
        }
        match &mut self.kind {
            SinkKind::Buffer(buf) => {
                if buf.len() < end as usize {
                    buf.resize(end as usize, 0);
                }
                buf[at as usize..end as usize].copy_from_slice(data);
            }
            SinkKind::File(f) => {
                f.seek(SeekFrom::Start(at))?;
                f.write_all(data)?;
                f.seek(SeekFrom::Start(self.pos))?;
            }
        }
        Ok(())
    }

    /// Consume the sink, returning the payload for a buffer sink.
    /// A file sink has already flushed everything to storage.
    pub fn into_buffer(self) -> Option<Vec<u8>> {
        match self.kind {
            SinkKind::Buffer(buf) => Some(buf),
            SinkKind::File(_) => None,
        }
    }
}
