//! Index management: the append-only entry log kept while writing, and
//! the derived per-stream tables built when reading

use crate::chunks::{FourCC, IndexEntry};
use crate::error::{AviError, Result};

/// How the raw `idx1` offsets are based. AVI offset bases are not
/// self-describing; both conventions occur in the wild and the base is
/// resolved once per file, then applied to every entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetBase {
    /// Offsets count from the start of the file and point at the chunk's
    /// 8-byte header
    Absolute,
    /// Offsets count from the start of the movi LIST
    MoviRelative,
}

impl OffsetBase {
    /// Correction added to a raw entry offset to reach the chunk's data
    /// bytes as an absolute file position
    pub fn data_offset(self, movi_start: u64) -> u64 {
        match self {
            OffsetBase::Absolute => 8,
            OffsetBase::MoviRelative => movi_start + 4,
        }
    }
}

/// Append-only log of raw index entries recorded as frames are written.
/// Capacity is fixed at creation; exceeding it is an error, not a
/// reallocation.
#[derive(Debug)]
pub struct IndexLog {
    entries: Vec<IndexEntry>,
    capacity: usize,
}

impl IndexLog {
    /// Allocate storage for an index sized by the declared recording
    /// duration in seconds (a duration-proportional upper bound on the
    /// number of frames).
    pub fn with_duration(duration_secs: u32) -> Result<Self> {
        let capacity = duration_secs as usize * 80 + 1024;
        Self::with_capacity(capacity)
    }

    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut entries = Vec::new();
        if entries.try_reserve_exact(capacity).is_err() {
            return Err(AviError::OutOfMemory { entries: capacity });
        }
        Ok(IndexLog { entries, capacity })
    }

    pub fn push(&mut self, tag: FourCC, flags: u32, offset: u32, size: u32) -> Result<()> {
        if self.entries.len() >= self.capacity {
            return Err(AviError::CapacityExceeded("index storage full"));
        }
        self.entries.push(IndexEntry {
            tag,
            flags,
            offset,
            size,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode all entries as the idx1 chunk body, in write order
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.entries.len() * IndexEntry::SIZE);
        for entry in &self.entries {
            // writing into a Vec cannot fail
            entry.write(&mut out).expect("vec write");
        }
        out
    }
}

/// One video frame in the derived table, ordered by frame number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoIndexEntry {
    /// Keyframe flag from the raw entry
    pub key: bool,
    /// Absolute file offset of the frame data
    pub pos: u64,
    /// Frame length in bytes
    pub len: u32,
}

/// One audio chunk in the derived table, with the cumulative byte offset
/// of all prior chunks to enable byte-addressed seeking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioIndexEntry {
    /// Absolute file offset of the chunk data
    pub pos: u64,
    /// Chunk length in bytes
    pub len: u32,
    /// Cumulative byte offset of all prior audio chunks
    pub tot: u64,
}

/// Derived per-stream index tables
#[derive(Debug, Default)]
pub struct StreamIndex {
    pub video: Vec<VideoIndexEntry>,
    pub audio: Vec<AudioIndexEntry>,
}

impl StreamIndex {
    /// Build the ordered video and audio tables from raw entries. Video
    /// entries match on the first three tag characters (so `db` and `dc`
    /// chunks both count); audio entries match the full tag.
    pub fn build(
        raw: &[IndexEntry],
        video_tag: &FourCC,
        audio_tag: &FourCC,
        base: OffsetBase,
        movi_start: u64,
    ) -> Self {
        let ioff = base.data_offset(movi_start);
        let mut video = Vec::new();
        let mut audio = Vec::new();
        let mut tot = 0u64;

        for entry in raw {
            if entry.tag.prefix_matches(video_tag.as_bytes()) {
                video.push(VideoIndexEntry {
                    key: entry.is_keyframe(),
                    pos: entry.offset as u64 + ioff,
                    len: entry.size,
                });
            }
            if entry.tag.eq_ignore_case(audio_tag.as_bytes()) {
                audio.push(AudioIndexEntry {
                    pos: entry.offset as u64 + ioff,
                    len: entry.size,
                    tot,
                });
                tot += entry.size as u64;
            }
        }

        StreamIndex { video, audio }
    }

    /// Total audio bytes across all chunks
    pub fn audio_bytes(&self) -> u64 {
        self.audio
            .last()
            .map(|e| e.tot + e.len as u64)
            .unwrap_or(0)
    }
}

/// Resolve a byte-addressed audio position to (chunk index, byte offset
/// within that chunk): binary search for the greatest chunk whose
/// cumulative total does not exceed `byte`.
pub fn audio_seek(audio: &[AudioIndexEntry], byte: u64) -> Option<(usize, u64)> {
    if audio.is_empty() {
        return None;
    }
    let mut lo = 0usize;
    let mut hi = audio.len();
    while lo < hi - 1 {
        let mid = (lo + hi) / 2;
        if audio[mid].tot > byte {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    Some((lo, byte - audio[lo].tot))
}
