//! AVI container reader
//!
//! Opening a file runs three phases: the RIFF preamble check, a top-level
//! chunk scan that buffers the hdrl payload and locates the movi list, and
//! index resolution. The hdrl walk is flat: LIST headers are descended
//! into, and each strf is interpreted according to the strh that preceded
//! it. Index offsets are disambiguated by probing the file, falling back
//! to a linear rebuild scan when the stored index is absent or unusable.

use crate::chunks::{audio_tag, is_stream_chunk, pad_even, parse_index, video_tag, FourCC, IndexEntry};
use crate::cursor::ChunkCursor;
use crate::error::{AviError, Result};
use crate::index::{audio_seek, AudioIndexEntry, OffsetBase, StreamIndex};
use crate::tracks::{AudioTrack, AudioTracks, VideoTrack};
use byteorder::{ByteOrder, LittleEndian};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

/// One sequentially-read movi chunk, for index-less consumption
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataChunk {
    Video(Vec<u8>),
    Audio(Vec<u8>),
}

/// AVI container reader with positional frame and audio access
pub struct AviReader<R: Read + Seek> {
    cursor: ChunkCursor<R>,
    video: VideoTrack,
    audio: AudioTracks,
    audio_bytes: u64,
    start_time: u32,
    movi_start: u64,
    index: StreamIndex,
    /// Current video frame for sequential reads
    video_pos: u32,
    /// Current audio position: chunk number and byte offset within it
    audio_posc: usize,
    audio_posb: u64,
}

impl AviReader<BufReader<File>> {
    /// Open an AVI file for reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::open_for_read(BufReader::new(file))
    }
}

impl<R: Read + Seek> AviReader<R> {
    /// Parse the container structure from any seekable byte source
    pub fn open_for_read(inner: R) -> Result<Self> {
        let mut cursor = ChunkCursor::new(inner);

        // 12-byte preamble, tags matched case-insensitively
        let riff = cursor.read_tag()?;
        let _riff_len = cursor.read_u32_le()?;
        let avi = cursor.read_tag()?;
        if !riff.eq_ignore_case(b"RIFF") || !avi.eq_ignore_case(b"AVI ") {
            return Err(AviError::NotAnAviFile);
        }

        let mut hdrl: Option<Vec<u8>> = None;
        let mut movi_start: Option<u64> = None;
        let mut raw_index: Vec<IndexEntry> = Vec::new();

        while let Some((tag, len)) = cursor.read_chunk_header()? {
            let body_start = cursor.pos()?;
            if tag.eq_ignore_case(b"LIST") && len >= 4 {
                let list_type = cursor.read_tag()?;
                if list_type.eq_ignore_case(b"hdrl") {
                    let mut data = vec![0u8; (len - 4) as usize];
                    cursor.read_exact(&mut data)?;
                    hdrl = Some(data);
                } else if list_type.eq_ignore_case(b"movi") {
                    movi_start = Some(cursor.pos()?);
                }
            } else if tag.eq_ignore_case(b"idx1") {
                let mut data = vec![0u8; len as usize];
                cursor.read_exact(&mut data)?;
                raw_index = parse_index(&data);
            }
            cursor.seek_to(body_start + pad_even(len) as u64)?;
        }

        let hdrl = hdrl.ok_or(AviError::MissingHeaderList)?;
        let movi_start = movi_start.ok_or(AviError::MissingMoviList)?;

        let ParsedHeader {
            video,
            audio,
            audio_bytes,
            start_time,
        } = parse_hdrl(&hdrl)?;

        let vtag = video_tag(video.stream, true);
        let atag = audio
            .current()
            .map(|a| audio_tag(a.stream))
            // stream 99 never occurs; keeps the tag type uniform
            .unwrap_or_else(|| audio_tag(99));

        let (raw, base) = resolve_index(&mut cursor, raw_index, &vtag, movi_start)?;
        let index = StreamIndex::build(&raw, &vtag, &atag, base, movi_start);

        log::debug!(
            "opened: {}x{} @ {} fps, {} frames, {} audio tracks, movi at {}",
            video.width,
            video.height,
            video.fps,
            index.video.len(),
            audio.len(),
            movi_start
        );

        Ok(AviReader {
            cursor,
            video,
            audio,
            audio_bytes,
            start_time,
            movi_start,
            index,
            video_pos: 0,
            audio_posc: 0,
            audio_posb: 0,
        })
    }

    /// Video frame width in pixels
    pub fn width(&self) -> u32 {
        self.video.width
    }

    /// Video frame height in pixels
    pub fn height(&self) -> u32 {
        self.video.height
    }

    /// Frames per second as declared by the video stream header
    pub fn frame_rate(&self) -> f64 {
        self.video.fps
    }

    /// Video compressor FourCC
    pub fn compressor(&self) -> [u8; 4] {
        self.video.compressor
    }

    /// Number of video frames in the index
    pub fn frame_count(&self) -> u32 {
        self.index.video.len() as u32
    }

    /// Offset of the movi list payload
    pub fn movi_start(&self) -> u64 {
        self.movi_start
    }

    pub fn has_audio(&self) -> bool {
        !self.audio.is_empty()
    }

    pub fn audio_channels(&self) -> u16 {
        self.audio.current().map_or(0, |a| a.channels)
    }

    pub fn audio_rate(&self) -> u32 {
        self.audio.current().map_or(0, |a| a.rate)
    }

    pub fn audio_bits(&self) -> u16 {
        self.audio.current().map_or(0, |a| a.bits)
    }

    pub fn audio_format(&self) -> u16 {
        self.audio.current().map_or(0, |a| a.format)
    }

    /// Total audio payload bytes as declared by the header
    pub fn audio_bytes(&self) -> u64 {
        self.audio_bytes
    }

    /// Recording start time from the avih header, whole seconds since
    /// the epoch, zero when the writer did not record one
    pub fn start_time(&self) -> u32 {
        self.start_time
    }

    /// Payload size of frame `n` in bytes
    pub fn frame_size(&self, n: u32) -> Result<u32> {
        self.index
            .video
            .get(n as usize)
            .map(|e| e.len)
            .ok_or(AviError::IndexUnavailable)
    }

    /// Position the sequential frame cursor at frame `n`
    pub fn seek_to_frame(&mut self, n: u32) -> Result<()> {
        if (n as usize) > self.index.video.len() {
            return Err(AviError::IndexUnavailable);
        }
        self.video_pos = n;
        Ok(())
    }

    /// Rewind both the frame cursor and the audio position
    pub fn seek_start(&mut self) {
        self.video_pos = 0;
        self.audio_posc = 0;
        self.audio_posb = 0;
    }

    /// Read the next video frame and advance the frame cursor.
    /// Returns `None` past the last frame.
    pub fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let entry = match self.index.video.get(self.video_pos as usize) {
            Some(e) => *e,
            None => return Ok(None),
        };
        self.cursor.seek_to(entry.pos)?;
        let mut data = vec![0u8; entry.len as usize];
        self.cursor.read_exact(&mut data)?;
        self.video_pos += 1;
        Ok(Some(data))
    }

    /// Whether the indexed frame is a keyframe
    pub fn is_keyframe(&self, n: u32) -> Result<bool> {
        self.index
            .video
            .get(n as usize)
            .map(|e| e.key)
            .ok_or(AviError::IndexUnavailable)
    }

    /// Position the audio cursor at an absolute byte offset into the
    /// audio stream
    pub fn seek_audio_byte(&mut self, byte: u64) -> Result<()> {
        match audio_seek(&self.index.audio, byte) {
            Some((chunk, within)) => {
                self.audio_posc = chunk;
                self.audio_posb = within;
                Ok(())
            }
            None => Err(AviError::IndexUnavailable),
        }
    }

    /// Fill `buf` with audio bytes from the current position, crossing
    /// chunk boundaries as needed. Returns the number of bytes read,
    /// short only at end of stream.
    pub fn read_audio(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0usize;
        while filled < buf.len() {
            let entry: &AudioIndexEntry = match self.index.audio.get(self.audio_posc) {
                Some(e) => e,
                None => break,
            };
            // a past-the-end seek leaves posb beyond the last chunk
            let left = (entry.len as u64).saturating_sub(self.audio_posb) as usize;
            if left == 0 {
                self.audio_posc += 1;
                self.audio_posb = 0;
                continue;
            }
            let todo = left.min(buf.len() - filled);
            self.cursor.seek_to(entry.pos + self.audio_posb)?;
            self.cursor.read_exact(&mut buf[filled..filled + todo])?;
            self.audio_posb += todo as u64;
            filled += todo;
        }
        Ok(filled)
    }

    /// Sequentially read the next stream chunk from the movi list without
    /// consulting any index. Intended for files whose index could not be
    /// resolved; unknown chunks are skipped.
    pub fn read_data(&mut self) -> Result<Option<DataChunk>> {
        let vtag = video_tag(self.video.stream, true);
        let atag = self
            .audio
            .current()
            .map(|a| audio_tag(a.stream))
            .unwrap_or_else(|| audio_tag(99));

        while let Some((tag, len)) = self.cursor.read_chunk_header()? {
            let body_start = self.cursor.pos()?;
            if tag.prefix_matches(vtag.as_bytes()) {
                let mut data = vec![0u8; len as usize];
                self.cursor.read_exact(&mut data)?;
                self.cursor.seek_to(body_start + pad_even(len) as u64)?;
                return Ok(Some(DataChunk::Video(data)));
            }
            if tag.eq_ignore_case(atag.as_bytes()) {
                let mut data = vec![0u8; len as usize];
                self.cursor.read_exact(&mut data)?;
                self.cursor.seek_to(body_start + pad_even(len) as u64)?;
                return Ok(Some(DataChunk::Audio(data)));
            }
            if tag.eq_ignore_case(b"LIST") {
                // descend: skip only the 4-byte list type
                self.cursor.skip(4)?;
                continue;
            }
            self.cursor.seek_to(body_start + pad_even(len) as u64)?;
        }
        Ok(None)
    }

    /// Position the underlying cursor at the start of the movi payload,
    /// for a fresh [`read_data`](Self::read_data) pass
    pub fn seek_movi(&mut self) -> Result<()> {
        self.cursor.seek_to(self.movi_start)
    }
}

/// Stream parameters extracted from the hdrl list
pub(crate) struct ParsedHeader {
    pub video: VideoTrack,
    pub audio: AudioTracks,
    pub audio_bytes: u64,
    /// Recording start time from the avih header, whole seconds
    pub start_time: u32,
}

/// Walk the buffered hdrl payload. The walk is flat with LIST descent;
/// `lasttag` couples each strf to the stream type of the preceding strh.
pub(crate) fn parse_hdrl(hdrl: &[u8]) -> Result<ParsedHeader> {
    #[derive(PartialEq)]
    enum LastTag {
        None,
        Vids,
        Auds,
    }

    let mut video: Option<VideoTrack> = None;
    let mut vids_strf_seen = false;
    let mut audio = AudioTracks::new();
    let mut audio_bytes: u64 = 0;
    let mut start_time: u32 = 0;
    // declared sample count of the pending auds strh; converted to bytes
    // once the strf supplies the sample size
    let mut pending_audio_len: u32 = 0;
    let mut lasttag = LastTag::None;
    let mut num_stream: u32 = 0;

    let mut i = 0usize;
    while i + 8 <= hdrl.len() {
        let tag = FourCC::new([hdrl[i], hdrl[i + 1], hdrl[i + 2], hdrl[i + 3]]);
        if tag.eq_ignore_case(b"LIST") {
            i += 12;
            continue;
        }
        let len = LittleEndian::read_u32(&hdrl[i + 4..i + 8]) as usize;
        let body_end = i + 8 + len;
        if body_end > hdrl.len() {
            break;
        }
        let body = &hdrl[i + 8..body_end];

        if tag.eq_ignore_case(b"avih") && body.len() >= 52 {
            start_time = LittleEndian::read_u32(&body[48..52]);
            lasttag = LastTag::None;
        } else if tag.eq_ignore_case(b"strh") && body.len() >= 36 {
            let stream_type = &body[0..4];
            // only the first vids strh counts; later ones are ignored
            if stream_type.eq_ignore_ascii_case(b"vids") && video.is_none() {
                let mut compressor = [0u8; 4];
                compressor.copy_from_slice(&body[4..8]);
                let scale = LittleEndian::read_u32(&body[20..24]);
                let rate = LittleEndian::read_u32(&body[24..28]);
                let frames = LittleEndian::read_u32(&body[32..36]);
                let fps = if scale != 0 {
                    rate as f64 / scale as f64
                } else {
                    0.0
                };
                let mut v = VideoTrack::new(0, 0, 0, compressor);
                v.fps = fps;
                v.frames = frames;
                v.stream = num_stream;
                video = Some(v);
                lasttag = LastTag::Vids;
            } else if stream_type.eq_ignore_ascii_case(b"auds") {
                let mut track = AudioTrack::new(0, 0, 0, 0);
                track.stream = num_stream;
                audio.push(track)?;
                pending_audio_len = LittleEndian::read_u32(&body[32..36]);
                lasttag = LastTag::Auds;
            } else {
                lasttag = LastTag::None;
            }
            num_stream += 1;
        } else if tag.eq_ignore_case(b"strf") {
            match lasttag {
                LastTag::Vids => {
                    vids_strf_seen = true;
                    if let Some(v) = video.as_mut() {
                        if body.len() >= 12 {
                            v.width = LittleEndian::read_u32(&body[4..8]);
                            v.height = LittleEndian::read_u32(&body[8..12]);
                        }
                    }
                }
                LastTag::Auds => {
                    if let Some(a) = audio.current_mut() {
                        if body.len() >= 16 {
                            a.format = LittleEndian::read_u16(&body[0..2]);
                            a.channels = LittleEndian::read_u16(&body[2..4]);
                            a.rate = LittleEndian::read_u32(&body[4..8]);
                            a.bits = LittleEndian::read_u16(&body[14..16]);
                        }
                        a.bytes = pending_audio_len as u64 * a.sample_size() as u64;
                        audio_bytes += a.bytes;
                    }
                }
                LastTag::None => {}
            }
            lasttag = LastTag::None;
        } else {
            lasttag = LastTag::None;
        }

        i += 8 + pad_even(len as u32) as usize;
    }

    let video = video.ok_or(AviError::NoVideoStream)?;
    if !vids_strf_seen || video.frames == 0 {
        return Err(AviError::NoVideoStream);
    }
    Ok(ParsedHeader {
        video,
        audio,
        audio_bytes,
        start_time,
    })
}

/// Decide how the stored index addresses chunk data, or rebuild the index
/// by scanning the movi list when the stored one is absent or does not
/// match the file.
fn resolve_index<R: Read + Seek>(
    cursor: &mut ChunkCursor<R>,
    raw: Vec<IndexEntry>,
    vtag: &FourCC,
    movi_start: u64,
) -> Result<(Vec<IndexEntry>, OffsetBase)> {
    if let Some(first) = raw.iter().find(|e| e.tag.prefix_matches(vtag.as_bytes())) {
        if probe_entry(cursor, first, first.offset as u64)? {
            return Ok((raw, OffsetBase::Absolute));
        }
        let relative = first.offset as u64 + movi_start - 4;
        if probe_entry(cursor, first, relative)? {
            return Ok((raw, OffsetBase::MoviRelative));
        }
        log::warn!("stored index does not match chunk data, rebuilding");
    }
    let rebuilt = rebuild_index(cursor, movi_start)?;
    Ok((rebuilt, OffsetBase::Absolute))
}

/// Check whether a chunk header at `at` agrees with the index entry
fn probe_entry<R: Read + Seek>(
    cursor: &mut ChunkCursor<R>,
    entry: &IndexEntry,
    at: u64,
) -> Result<bool> {
    if cursor.seek_to(at).is_err() {
        return Ok(false);
    }
    match cursor.read_chunk_header() {
        Ok(Some((tag, len))) => Ok(tag.eq_ignore_case(entry.tag.as_bytes()) && len == entry.size),
        _ => Ok(false),
    }
}

/// Linear scan of the movi list collecting every stream chunk, with
/// offsets recorded absolute from the file start
fn rebuild_index<R: Read + Seek>(
    cursor: &mut ChunkCursor<R>,
    movi_start: u64,
) -> Result<Vec<IndexEntry>> {
    let mut entries = Vec::new();
    cursor.seek_to(movi_start)?;
    while let Some((tag, len)) = cursor.read_chunk_header()? {
        let body_start = cursor.pos()?;
        if is_stream_chunk(&tag) {
            entries.push(IndexEntry {
                tag,
                flags: 0,
                offset: (body_start - 8) as u32,
                size: len,
            });
            cursor.seek_to(body_start + pad_even(len) as u64)?;
        } else if tag.eq_ignore_case(b"LIST") {
            cursor.skip(4)?;
        } else {
            cursor.seek_to(body_start + pad_even(len) as u64)?;
        }
    }
    log::debug!("rebuilt index with {} entries", entries.len());
    Ok(entries)
}
