//! RIFF chunk tags, padding rules and index entry codecs

use crate::error::{AviError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

/// Number of bytes reserved at the start of every file for the header region.
/// The header is written last, once all chunk and index positions are known.
pub const HEADER_BYTES: u64 = 2048;

/// ASCII marker embedded in the JUNK padding of self-authored files.
/// Recovery treats it as a hint only, never as a correctness condition.
pub const SIGNATURE: &[u8] = b"avirec";

/// Round a chunk body length up to the next even value. RIFF chunk bodies
/// are word-aligned: the declared length excludes the pad byte, the cursor
/// advance includes it.
#[inline]
pub fn pad_even(n: u32) -> u32 {
    (n + 1) & !1
}

/// FourCC (Four Character Code) identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const fn new(bytes: [u8; 4]) -> Self {
        FourCC(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Case-insensitive comparison, matching how RIFF tags are compared
    /// in the wild (some writers emit upper-case chunk suffixes)
    pub fn eq_ignore_case(&self, other: &[u8; 4]) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }

    /// Compare only the first three characters; used to match both `##db`
    /// and `##dc` video chunks against one stream tag
    pub fn prefix_matches(&self, other: &[u8; 4]) -> bool {
        self.0[..3].eq_ignore_ascii_case(&other[..3])
    }
}

impl std::fmt::Debug for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FourCC(\"{}\")", String::from_utf8_lossy(&self.0))
    }
}

impl std::fmt::Display for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl From<[u8; 4]> for FourCC {
    fn from(bytes: [u8; 4]) -> Self {
        FourCC(bytes)
    }
}

/// Well-known chunk IDs
pub mod chunk_ids {
    use super::FourCC;

    pub const RIFF: FourCC = FourCC(*b"RIFF");
    pub const AVI: FourCC = FourCC(*b"AVI ");
    pub const LIST: FourCC = FourCC(*b"LIST");
    pub const HDRL: FourCC = FourCC(*b"hdrl");
    pub const AVIH: FourCC = FourCC(*b"avih");
    pub const STRL: FourCC = FourCC(*b"strl");
    pub const STRH: FourCC = FourCC(*b"strh");
    pub const STRF: FourCC = FourCC(*b"strf");
    pub const MOVI: FourCC = FourCC(*b"movi");
    pub const IDX1: FourCC = FourCC(*b"idx1");
    pub const JUNK: FourCC = FourCC(*b"JUNK");
    pub const VIDS: FourCC = FourCC(*b"vids");
    pub const AUDS: FourCC = FourCC(*b"auds");
}

/// Build the chunk tag for a video stream (`00dc` for stream 0).
/// The `db` form is used as the *match* tag on read, where only the first
/// three characters are compared so both `db` and `dc` chunks are accepted.
pub fn video_tag(stream: u32, compressed: bool) -> FourCC {
    FourCC([
        b'0' + (stream / 10) as u8,
        b'0' + (stream % 10) as u8,
        b'd',
        if compressed { b'c' } else { b'b' },
    ])
}

/// Build the chunk tag for an audio stream (`01wb` for stream 1).
/// Files with no audio use stream number 99.
pub fn audio_tag(stream: u32) -> FourCC {
    FourCC([
        b'0' + (stream / 10) as u8,
        b'0' + (stream % 10) as u8,
        b'w',
        b'b',
    ])
}

/// Check whether a tag looks like a stream data chunk: `##db`, `##dc`
/// (video) or `##wb` (audio). Used by the index rebuild scan.
pub fn is_stream_chunk(tag: &FourCC) -> bool {
    let b = tag.as_bytes();
    let video = matches!(b[2], b'd' | b'D') && matches!(b[3], b'b' | b'B' | b'c' | b'C');
    let audio = matches!(b[2], b'w' | b'W') && matches!(b[3], b'b' | b'B');
    video || audio
}

/// One raw `idx1` record: 16 bytes on disk, emitted in write order.
/// Offsets are either absolute-from-file-start or relative to the movi
/// list start; the base is resolved once per file, never per entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub tag: FourCC,
    pub flags: u32,
    pub offset: u32,
    pub size: u32,
}

impl IndexEntry {
    /// Flag bit marking a video keyframe per this writer's convention
    pub const KEYFRAME: u32 = 0x10;

    /// Encoded size on disk
    pub const SIZE: usize = 16;

    pub fn read(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(AviError::MalformedStream { offset: 0 });
        }
        let mut cursor = Cursor::new(data);
        let mut tag = [0u8; 4];
        cursor.read_exact(&mut tag)?;
        Ok(IndexEntry {
            tag: FourCC(tag),
            flags: cursor.read_u32::<LittleEndian>()?,
            offset: cursor.read_u32::<LittleEndian>()?,
            size: cursor.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(self.tag.as_bytes())?;
        writer.write_u32::<LittleEndian>(self.flags)?;
        writer.write_u32::<LittleEndian>(self.offset)?;
        writer.write_u32::<LittleEndian>(self.size)?;
        Ok(())
    }

    pub fn is_keyframe(&self) -> bool {
        (self.flags & Self::KEYFRAME) != 0
    }
}

/// Parse the payload of an `idx1` chunk. The length should be a multiple
/// of 16 but parsing does not fail when it is not; the trailing partial
/// record is dropped.
pub fn parse_index(data: &[u8]) -> Vec<IndexEntry> {
    let mut entries = Vec::with_capacity(data.len() / IndexEntry::SIZE);
    let mut offset = 0;
    while offset + IndexEntry::SIZE <= data.len() {
        if let Ok(entry) = IndexEntry::read(&data[offset..]) {
            entries.push(entry);
        }
        offset += IndexEntry::SIZE;
    }
    entries
}
