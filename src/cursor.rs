//! Read-side binary cursor
//!
//! Sequential reader over anything `Read + Seek`, consuming little-endian
//! integers and fixed-length tags. Every chunk-header read consumes 8
//! bytes, so scan loops built on it always make forward progress.

use crate::chunks::FourCC;
use crate::error::Result;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Read, Seek, SeekFrom};

pub struct ChunkCursor<R: Read + Seek> {
    inner: R,
}

impl<R: Read + Seek> ChunkCursor<R> {
    pub fn new(inner: R) -> Self {
        ChunkCursor { inner }
    }

    pub fn pos(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn seek_to(&mut self, pos: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    pub fn skip(&mut self, n: i64) -> Result<()> {
        self.inner.seek(SeekFrom::Current(n))?;
        Ok(())
    }

    pub fn read_tag(&mut self) -> Result<FourCC> {
        let mut tag = [0u8; 4];
        self.inner.read_exact(&mut tag)?;
        Ok(FourCC(tag))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        Ok(self.inner.read_u32::<LittleEndian>()?)
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        Ok(self.inner.read_u16::<LittleEndian>()?)
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf)?;
        Ok(())
    }

    /// Read bytes into `buf`, stopping early at end of stream. Returns the
    /// number of bytes actually read.
    pub fn read_up_to(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.inner.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Read the next 8-byte chunk header. `None` means a clean end of
    /// stream (fewer than 8 bytes remained).
    pub fn read_chunk_header(&mut self) -> Result<Option<(FourCC, u32)>> {
        let mut header = [0u8; 8];
        let got = self.read_up_to(&mut header)?;
        if got < 8 {
            return Ok(None);
        }
        let tag = FourCC([header[0], header[1], header[2], header[3]]);
        let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        Ok(Some((tag, len)))
    }
}
