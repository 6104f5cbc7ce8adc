//! Index recovery for interrupted recordings
//!
//! A recording that lost power before finalize has its frame data intact
//! behind the reserved header region but no idx1 chunk and a header that
//! still describes the last completed finalize. Recovery requires that
//! stale header to be parseable (a blank header region fails outright):
//! it rescans the data region, accepting only the chunk tags the recorder
//! emits, rebuilds the index from what it finds, and rewrites the header
//! in place. The process is deterministic and
//! idempotent: rerunning it on a recovered file finds the same chunks and
//! produces the same bytes.

use crate::chunks::{audio_tag, pad_even, video_tag, IndexEntry, HEADER_BYTES};
use crate::cursor::ChunkCursor;
use crate::demuxer::parse_hdrl;
use crate::error::{AviError, Result};
use crate::index::IndexLog;
use crate::muxer::AviWriter;
use crate::sink::ChunkSink;
use crate::tracks::{wave_format, AudioTrack};
use byteorder::{ByteOrder, LittleEndian};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Recovery rewrites can grow a file up to 1 GiB
pub const RECOVERY_MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// What recovery found and restored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Video frames found in the data region
    pub frames: u32,
    /// Audio payload bytes found in the data region
    pub audio_bytes: u64,
    /// Recovered duration in whole seconds, from the frame count and
    /// the header frame rate
    pub duration_secs: u32,
    /// Final file size after the index and header rewrite
    pub file_size: u64,
}

/// Outcome of a recovery attempt
#[derive(Debug)]
pub enum RecoveryOutcome {
    /// The index was rebuilt and the header rewritten
    Recovered(RecoveryReport),
    /// The file is not a candidate: too small to hold any data past the
    /// header region, or not openable for rewriting
    UnableToRecover(&'static str),
    /// The file looked like a candidate but recovery did not complete;
    /// any chunks scanned before the failure are left untouched
    Failed(AviError),
}

impl RecoveryOutcome {
    pub fn is_recovered(&self) -> bool {
        matches!(self, RecoveryOutcome::Recovered(_))
    }
}

/// Attempt to rebuild the index and header of a damaged recording in
/// place
pub fn recover_file<P: AsRef<Path>>(path: P) -> RecoveryOutcome {
    let path = path.as_ref();
    let file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(f) => f,
        Err(e) => {
            log::warn!("cannot open {} for rewriting: {}", path.display(), e);
            return RecoveryOutcome::UnableToRecover("cannot open for rewriting");
        }
    };
    let len = match file.metadata() {
        Ok(m) => m.len(),
        Err(e) => return RecoveryOutcome::Failed(e.into()),
    };
    if len <= HEADER_BYTES {
        return RecoveryOutcome::UnableToRecover("no data past the header region");
    }
    match try_recover(file, len, path) {
        Ok(report) => {
            log::debug!(
                "recovered {}: {} frames, {} audio bytes, {} seconds",
                path.display(),
                report.frames,
                report.audio_bytes,
                report.duration_secs
            );
            RecoveryOutcome::Recovered(report)
        }
        Err(e) => RecoveryOutcome::Failed(e),
    }
}

fn try_recover(mut file: File, len: u64, path: &Path) -> Result<RecoveryReport> {
    // stream parameters come from the existing header region
    let mut header = vec![0u8; HEADER_BYTES as usize];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut header)?;
    if !header[0..4].eq_ignore_ascii_case(b"RIFF") || !header[8..12].eq_ignore_ascii_case(b"AVI ")
    {
        return Err(AviError::NotAnAviFile);
    }
    let hdrl = find_hdrl(&header).ok_or(AviError::MissingHeaderList)?;
    let parsed = parse_hdrl(hdrl)?;

    let (entries, frames, audio_bytes, data_end) = scan_data(&mut file, len)?;
    if frames == 0 {
        return Err(AviError::NoVideoStream);
    }

    let mut index = IndexLog::with_capacity(entries.len())?;
    for e in &entries {
        index.push(e.tag, e.flags, e.offset, e.size)?;
    }

    let mut video = parsed.video;
    video.frames = frames;
    let duration_secs = if video.fps > 0.0 {
        (frames as f64 / video.fps) as u32
    } else {
        0
    };
    let audio = parsed
        .audio
        .current()
        .cloned()
        .unwrap_or_else(|| AudioTrack::new(1, 8000, 16, wave_format::PCM));

    let mut sink = ChunkSink::file(file, RECOVERY_MAX_FILE_SIZE);
    sink.seek_to(data_end)?;
    let mut writer = AviWriter::from_recovered_parts(
        sink,
        video,
        audio,
        index,
        audio_bytes,
        parsed.start_time,
    );
    writer.finalize()?;
    let file_size = writer.pos();
    writer.close();

    // drop whatever trailed the old index
    let trim = OpenOptions::new().write(true).open(path)?;
    trim.set_len(file_size)?;

    Ok(RecoveryReport {
        frames,
        audio_bytes,
        duration_secs,
        file_size,
    })
}

/// Locate the hdrl list payload inside the header region
fn find_hdrl(header: &[u8]) -> Option<&[u8]> {
    let mut i = 12usize;
    while i + 12 <= header.len() {
        let len = LittleEndian::read_u32(&header[i + 4..i + 8]) as usize;
        if header[i..i + 4].eq_ignore_ascii_case(b"LIST")
            && header[i + 8..i + 12].eq_ignore_ascii_case(b"hdrl")
        {
            let end = (i + 8 + len).min(header.len());
            return Some(&header[i + 12..end]);
        }
        if len == 0 {
            return None;
        }
        i += 8 + pad_even(len as u32) as usize;
    }
    None
}

/// Walk the data region from the end of the header, accepting only the
/// exact chunk tags the recorder writes. The first foreign tag ends the
/// scan; everything gathered up to that point stands. A final chunk whose
/// declared length overruns the file is dropped as torn.
fn scan_data(file: &mut File, len: u64) -> Result<(Vec<IndexEntry>, u32, u64, u64)> {
    let vtag = video_tag(0, true);
    let atag = audio_tag(1);
    let mut cursor = ChunkCursor::new(file);
    let mut entries: Vec<IndexEntry> = Vec::new();
    let mut frames = 0u32;
    let mut audio_bytes = 0u64;
    let mut end = HEADER_BYTES;

    cursor.seek_to(end)?;
    while let Some((tag, chunk_len)) = cursor.read_chunk_header()? {
        let next = end + 8 + pad_even(chunk_len) as u64;
        if next > len {
            break;
        }
        let (flags, is_video) = if tag.eq_ignore_case(vtag.as_bytes()) {
            (IndexEntry::KEYFRAME, true)
        } else if tag.eq_ignore_case(atag.as_bytes()) {
            (0, false)
        } else {
            break;
        };
        entries.push(IndexEntry {
            tag,
            flags,
            offset: end as u32,
            size: chunk_len,
        });
        if is_video {
            frames += 1;
        } else {
            audio_bytes += chunk_len as u64;
        }
        end = next;
        cursor.seek_to(end)?;
    }

    Ok((entries, frames, audio_bytes, end))
}
