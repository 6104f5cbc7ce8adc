//! AVI container writer
//!
//! The writer reserves a fixed [`HEADER_BYTES`] region at the start of the
//! sink, appends movi chunks behind it while logging index entries, and on
//! finalize emits the trailing idx1 chunk and backpatches the whole header
//! region in one block. The header region is fixed-size and seekable, so
//! list lengths are handled as reserve-now-patch-later instead of a second
//! pass.

use crate::chunks::{audio_tag, chunk_ids, pad_even, video_tag, FourCC, IndexEntry, HEADER_BYTES, SIGNATURE};
use crate::error::{AviError, Result};
use crate::index::IndexLog;
use crate::sink::ChunkSink;
use crate::tracks::{wave_format, AudioTrack, VideoTrack};
use std::fs::OpenOptions;
use std::path::Path;

/// Default sink capacity for file-backed recordings: 512 MiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 512 * 1024 * 1024;

/// Writer configuration
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Video frame width in pixels
    pub width: u32,
    /// Video frame height in pixels
    pub height: u32,
    /// Nominal frames per second; replaced by the effective rate at
    /// finalize when timestamps span more than zero seconds
    pub fps: u32,
    /// Video compressor FourCC
    pub compressor: [u8; 4],
    /// Declared recording duration in seconds; sizes the index storage
    pub duration_secs: u32,
    /// Maximum sink size in bytes
    pub max_size: u64,
    /// Record the first frame's timestamp in the avih start-time field
    pub include_start_time: bool,
}

impl WriterConfig {
    pub fn new(width: u32, height: u32, fps: u32, compressor: [u8; 4], duration_secs: u32) -> Self {
        WriterConfig {
            width,
            height,
            fps,
            compressor,
            duration_secs,
            max_size: DEFAULT_MAX_FILE_SIZE,
            include_start_time: false,
        }
    }

    pub fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    pub fn include_start_time(mut self, yes: bool) -> Self {
        self.include_start_time = yes;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Writing,
    Finalized,
}

/// AVI container writer over a memory buffer or file sink
pub struct AviWriter {
    sink: ChunkSink,
    video: VideoTrack,
    audio: AudioTrack,
    index: IndexLog,
    us_per_frame: u32,
    suggested_buffer_size: u32,
    audio_bytes: u64,
    /// First and last frame timestamps, whole seconds
    bt: u32,
    et: u32,
    include_start_time: bool,
    state: WriterState,
}

impl AviWriter {
    /// Open a file for writing and reserve the header region.
    /// Frames append directly to storage from position [`HEADER_BYTES`].
    pub fn create<P: AsRef<Path>>(path: P, config: WriterConfig) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let sink = ChunkSink::file(file, config.max_size);
        Self::with_sink(sink, config)
    }

    /// Record into a bounded in-memory buffer instead of a file.
    /// Exceeding `config.max_size` is an immediate error, never a
    /// reallocation.
    pub fn in_memory(config: WriterConfig) -> Result<Self> {
        let sink = ChunkSink::buffer(config.max_size);
        Self::with_sink(sink, config)
    }

    fn with_sink(mut sink: ChunkSink, config: WriterConfig) -> Result<Self> {
        let index = IndexLog::with_duration(config.duration_secs)?;
        sink.seek_to(HEADER_BYTES)?;

        let video = VideoTrack::new(config.width, config.height, config.fps, config.compressor);
        let (us_per_frame, suggested_buffer_size) = video.header_defaults();

        Ok(AviWriter {
            sink,
            video,
            // recorder preset; override with set_audio before the first frame
            audio: AudioTrack::new(1, 8000, 16, wave_format::PCM),
            index,
            us_per_frame,
            suggested_buffer_size,
            audio_bytes: 0,
            bt: 0,
            et: 0,
            include_start_time: config.include_start_time,
            state: WriterState::Writing,
        })
    }

    /// Reassemble a writer around state recovered from an existing file, so
    /// recovery can reuse the index-append and header-finalize paths.
    pub(crate) fn from_recovered_parts(
        sink: ChunkSink,
        video: VideoTrack,
        audio: AudioTrack,
        index: IndexLog,
        audio_bytes: u64,
        bt: u32,
    ) -> Self {
        let (us_per_frame, suggested_buffer_size) = video.header_defaults();
        AviWriter {
            sink,
            video,
            audio,
            index,
            us_per_frame,
            suggested_buffer_size,
            audio_bytes,
            bt,
            et: 0,
            include_start_time: true,
            state: WriterState::Writing,
        }
    }

    /// Replace the preset audio format
    pub fn set_audio(&mut self, channels: u16, rate: u32, bits: u16, format: u16) {
        self.audio = AudioTrack::new(channels, rate, bits, format);
    }

    /// Current write position in the sink
    pub fn pos(&self) -> u64 {
        self.sink.pos()
    }

    /// Video frames written so far
    pub fn frame_count(&self) -> u32 {
        self.video.frames
    }

    /// Audio bytes written so far
    pub fn audio_bytes(&self) -> u64 {
        self.audio_bytes
    }

    fn check_writing(&self) -> Result<()> {
        match self.state {
            WriterState::Writing => Ok(()),
            WriterState::Finalized => Err(AviError::PermissionDenied(
                "write after finalize",
            )),
        }
    }

    /// Reject the chunk when the projected file size, including the
    /// trailing index this chunk will add to, would exceed the sink limit
    fn check_capacity(&self, length: u32) -> Result<()> {
        let projected = self.sink.pos()
            + 8
            + pad_even(length) as u64
            + 8
            + (self.index.len() as u64 + 1) * IndexEntry::SIZE as u64;
        if projected > self.sink.limit() {
            log::warn!(
                "chunk of {} bytes would grow file past {} byte limit",
                length,
                self.sink.limit()
            );
            return Err(AviError::CapacityExceeded("sink full"));
        }
        Ok(())
    }

    fn append_chunk(&mut self, tag: FourCC, flags: u32, data: &[u8]) -> Result<()> {
        self.check_capacity(data.len() as u32)?;
        self.index
            .push(tag, flags, self.sink.pos() as u32, data.len() as u32)?;
        self.sink.add_chunk(tag, data)
    }

    /// Append one video frame as a `00dc` chunk. `timestamp` is the
    /// capture time in whole seconds; the first call latches the recording
    /// start time, every call moves the end time.
    pub fn write_video_frame(&mut self, data: &[u8], timestamp: u32) -> Result<()> {
        self.check_writing()?;
        self.append_chunk(video_tag(0, true), IndexEntry::KEYFRAME, data)?;
        if self.video.frames == 0 {
            self.bt = timestamp;
        }
        self.et = timestamp;
        self.video.frames += 1;
        Ok(())
    }

    /// Append one audio buffer as a `01wb` chunk
    pub fn write_audio_frame(&mut self, data: &[u8], timestamp: u32) -> Result<()> {
        self.check_writing()?;
        self.append_chunk(audio_tag(1), 0, data)?;
        self.audio_bytes += data.len() as u64;
        self.audio.bytes += data.len() as u64;
        self.audio.chunks += 1;
        self.et = timestamp;
        Ok(())
    }

    /// Write the trailing idx1 chunk and backpatch the header region.
    ///
    /// An index write failure (disk full and the like) is reported but
    /// does not prevent the header attempt: a file with a header and no
    /// index is still recoverable, while the reverse is not.
    pub fn finalize(&mut self) -> Result<()> {
        self.check_writing()?;

        // effective frame rate from real timestamps
        if self.et > self.bt {
            self.video.fps = (self.video.frames / (self.et - self.bt)) as f64;
        }

        // movi list length is fixed before the index is appended
        let movi_len = (self.sink.pos() - HEADER_BYTES + 4) as u32;

        let index_result = self.sink.add_chunk(chunk_ids::IDX1, &self.index.encode());
        if let Err(ref e) = index_result {
            log::warn!("could not write idx1 chunk: {}", e);
        }

        let header = self.encode_header(movi_len);
        self.sink.write_block_at(0, &header)?;
        self.state = WriterState::Finalized;

        log::debug!(
            "finalized: {} frames, {} audio bytes, {} bytes total",
            self.video.frames,
            self.audio_bytes,
            self.sink.pos()
        );
        index_result
    }

    /// Release the handle. For a buffer sink the recorded payload is
    /// returned, truncated to the bytes actually written; a file sink has
    /// already flushed to storage. Finalize first or the file keeps a
    /// blank header and no index, usable only through recovery.
    pub fn close(self) -> Option<Vec<u8>> {
        let pos = self.sink.pos() as usize;
        self.sink.into_buffer().map(|mut buf| {
            buf.truncate(pos);
            buf
        })
    }

    /// Build the full 2048-byte header region: RIFF preamble, hdrl list,
    /// JUNK fill carrying the signature, and the movi LIST header.
    fn encode_header(&self, movi_len: u32) -> Vec<u8> {
        let mut h = HeaderBuf::new();
        let has_audio = self.audio.channels > 0 && self.audio_bytes > 0;
        let sampsize = self.audio.sample_size();
        let fps = self.video.fps as u32;

        h.tag(chunk_ids::RIFF);
        h.u32((self.sink.pos() - 8) as u32);
        h.tag(chunk_ids::AVI);

        h.tag(chunk_ids::LIST);
        let hdrl_len_at = h.reserve_u32();
        h.tag(chunk_ids::HDRL);

        h.tag(chunk_ids::AVIH);
        h.u32(56);
        h.u32(self.us_per_frame);
        h.u32(3_600_000); // MaxBytesPerSec
        h.u32(512); // PaddingGranularity
        h.u32(2064); // HASINDEX | TRUSTCKTYPE
        h.u32(self.video.frames);
        h.u32(0); // InitialFrames
        h.u32(if has_audio { 2 } else { 1 });
        h.u32(self.suggested_buffer_size);
        h.u32(self.video.width);
        h.u32(self.video.height);
        h.u32(0); // TimeScale
        h.u32(0); // DataRate
        h.u32(if self.include_start_time { self.bt } else { 0 });
        h.u32(0); // DataLength

        // video stream list
        h.tag(chunk_ids::LIST);
        let vstrl_len_at = h.reserve_u32();
        h.tag(chunk_ids::STRL);

        h.tag(chunk_ids::STRH);
        h.u32(64);
        h.tag(chunk_ids::VIDS);
        h.bytes(&self.video.compressor);
        h.u32(0); // Flags
        h.u32(0); // Priority, Language
        h.u32(0); // InitialFrames
        h.u32(1); // Scale
        h.u32(fps); // Rate
        h.u32(0); // Start
        h.u32(self.video.frames); // Length
        h.u32(u32::MAX); // SuggestedBufferSize
        h.u32(0); // Quality
        h.u32(0); // SampleSize
        h.bytes(&[0u8; 16]); // frame rect

        h.tag(chunk_ids::STRF);
        h.u32(40);
        h.u32(40); // biSize
        h.u32(self.video.width);
        h.u32(self.video.height);
        h.u16(1); // planes
        h.u16(24); // bit count
        h.bytes(&self.video.compressor);
        h.u32(144_000); // image size
        h.u32(0); // XPelsPerMeter
        h.u32(0); // YPelsPerMeter
        h.u32(0); // ClrUsed
        h.u32(0); // ClrImportant

        h.patch_len(vstrl_len_at);

        if has_audio {
            h.tag(chunk_ids::LIST);
            let astrl_len_at = h.reserve_u32();
            h.tag(chunk_ids::STRL);

            h.tag(chunk_ids::STRH);
            h.u32(64);
            h.tag(chunk_ids::AUDS);
            h.bytes(&[0u8; 4]); // handler
            h.u32(0); // Flags
            h.u32(0); // Priority, Language
            h.u32(0); // InitialFrames
            h.u32(sampsize); // Scale
            h.u32(sampsize * self.audio.rate); // Rate
            h.u32(0); // Start
            h.u32((self.audio_bytes / sampsize as u64) as u32); // Length
            h.u32(0); // SuggestedBufferSize
            h.u32(u32::MAX); // Quality
            h.u32(sampsize); // SampleSize
            h.bytes(&[0u8; 16]); // frame rect

            h.tag(chunk_ids::STRF);
            h.u32(16);
            h.u16(self.audio.format);
            h.u16(self.audio.channels);
            h.u32(self.audio.rate);
            h.u32(sampsize * self.audio.rate);
            h.u16(sampsize as u16);
            h.u16(self.audio.bits);

            h.patch_len(astrl_len_at);
        }

        h.patch_len(hdrl_len_at);

        // JUNK fills the reserved region up to the trailing LIST/movi header
        let njunk = HEADER_BYTES as usize - h.len() - 8 - 12;
        h.tag(chunk_ids::JUNK);
        h.u32(njunk as u32);
        let mut junk = vec![0u8; njunk];
        junk[..SIGNATURE.len()].copy_from_slice(SIGNATURE);
        h.bytes(&junk);

        h.tag(chunk_ids::LIST);
        h.u32(movi_len);
        h.tag(chunk_ids::MOVI);

        h.into_bytes()
    }
}

/// Fixed-size header assembly buffer with reserve/patch for list lengths
struct HeaderBuf {
    buf: Vec<u8>,
}

impl HeaderBuf {
    fn new() -> Self {
        HeaderBuf {
            buf: Vec::with_capacity(HEADER_BYTES as usize),
        }
    }

    fn len(&self) -> usize {
        self.buf.len()
    }

    fn tag(&mut self, tag: FourCC) {
        self.buf.extend_from_slice(tag.as_bytes());
    }

    fn bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    fn u32(&mut self, n: u32) {
        self.buf.extend_from_slice(&n.to_le_bytes());
    }

    fn u16(&mut self, n: u16) {
        self.buf.extend_from_slice(&n.to_le_bytes());
    }

    /// Emit a placeholder length field, returning its position for a
    /// later [`patch_len`](Self::patch_len)
    fn reserve_u32(&mut self) -> usize {
        let at = self.buf.len();
        self.u32(0);
        at
    }

    /// Patch a reserved length field with the number of bytes emitted
    /// since just after it
    fn patch_len(&mut self, at: usize) {
        let len = (self.buf.len() - at - 4) as u32;
        self.buf[at..at + 4].copy_from_slice(&len.to_le_bytes());
    }

    fn into_bytes(self) -> Vec<u8> {
        debug_assert_eq!(self.buf.len(), HEADER_BYTES as usize);
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> WriterConfig {
        WriterConfig::new(320, 240, 30, *b"MJPG", 10).max_size(1024 * 1024)
    }

    fn read_u32(buf: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(buf[at..at + 4].try_into().unwrap())
    }

    #[test]
    fn test_writer_reserves_header_region() {
        let writer = AviWriter::in_memory(small_config()).unwrap();
        assert_eq!(writer.pos(), HEADER_BYTES);
    }

    #[test]
    fn test_write_frames_advances_with_padding() {
        let mut writer = AviWriter::in_memory(small_config()).unwrap();
        writer.write_video_frame(&[1u8; 999], 0).unwrap();
        // odd length: declared 999, advance 8 + 1000
        assert_eq!(writer.pos(), HEADER_BYTES + 8 + 1000);
        writer.write_audio_frame(&[2u8; 320], 0).unwrap();
        assert_eq!(writer.pos(), HEADER_BYTES + 1008 + 8 + 320);
        assert_eq!(writer.frame_count(), 1);
        assert_eq!(writer.audio_bytes(), 320);
    }

    #[test]
    fn test_capacity_projection_counts_future_index() {
        let config = WriterConfig::new(320, 240, 30, *b"MJPG", 10).max_size(HEADER_BYTES + 1100);
        let mut writer = AviWriter::in_memory(config).unwrap();
        // chunk alone fits, but chunk + its index entry does not
        let err = writer.write_video_frame(&[0u8; 1080], 0).unwrap_err();
        assert!(matches!(err, AviError::CapacityExceeded(_)));
        assert_eq!(writer.frame_count(), 0);
        assert_eq!(writer.pos(), HEADER_BYTES);
    }

    #[test]
    fn test_no_write_after_finalize() {
        let mut writer = AviWriter::in_memory(small_config()).unwrap();
        writer.write_video_frame(&[0u8; 100], 0).unwrap();
        writer.finalize().unwrap();
        let err = writer.write_video_frame(&[0u8; 100], 1).unwrap_err();
        assert!(matches!(err, AviError::PermissionDenied(_)));
        let err = writer.finalize().unwrap_err();
        assert!(matches!(err, AviError::PermissionDenied(_)));
    }

    #[test]
    fn test_header_layout() {
        let mut writer = AviWriter::in_memory(small_config()).unwrap();
        for i in 0..30 {
            writer.write_video_frame(&[0u8; 1000], i / 30).unwrap();
        }
        writer.finalize().unwrap();
        let buf = writer.close().unwrap();

        assert_eq!(&buf[0..4], b"RIFF");
        assert_eq!(read_u32(&buf, 4) as usize, buf.len() - 8);
        assert_eq!(&buf[8..12], b"AVI ");
        assert_eq!(&buf[12..16], b"LIST");
        assert_eq!(&buf[20..24], b"hdrl");
        assert_eq!(&buf[24..28], b"avih");
        assert_eq!(read_u32(&buf, 28), 56);

        // avih fields: total frames and dimensions
        assert_eq!(read_u32(&buf, 32 + 16), 30);
        assert_eq!(read_u32(&buf, 32 + 24), 1); // streams, no audio
        assert_eq!(read_u32(&buf, 32 + 32), 320);
        assert_eq!(read_u32(&buf, 32 + 36), 240);

        // 30 frames over (et=0 .. et=0) keeps the nominal rate; strh rate
        // field sits 64+8+20 bytes into the video strl list
        let movi_hdr = HEADER_BYTES as usize - 12;
        assert_eq!(&buf[movi_hdr..movi_hdr + 4], b"LIST");
        assert_eq!(&buf[movi_hdr + 8..movi_hdr + 12], b"movi");
        let movi_len = read_u32(&buf, movi_hdr + 4) as usize;
        // movi body: 30 chunks of 8+1000, plus the 4-byte 'movi' type
        assert_eq!(movi_len, 30 * 1008 + 4);
    }

    #[test]
    fn test_effective_fps_and_idx1() {
        let mut writer = AviWriter::in_memory(small_config()).unwrap();
        // 30 frames, bt = 0, et = 1 -> effective 30 fps
        for i in 0..30 {
            writer.write_video_frame(&[7u8; 1000], i / 29).unwrap();
        }
        writer.finalize().unwrap();
        let buf = writer.close().unwrap();

        // idx1 sits after the movi payload
        let idx1_at = HEADER_BYTES as usize + 30 * 1008;
        assert_eq!(&buf[idx1_at..idx1_at + 4], b"idx1");
        assert_eq!(read_u32(&buf, idx1_at + 4), 30 * 16);

        // every entry: tag 00dc, keyframe flag, absolute offset
        for i in 0..30 {
            let at = idx1_at + 8 + i * 16;
            assert_eq!(&buf[at..at + 4], b"00dc");
            assert_eq!(read_u32(&buf, at + 4), IndexEntry::KEYFRAME);
            assert_eq!(read_u32(&buf, at + 8) as usize, HEADER_BYTES as usize + i * 1008);
            assert_eq!(read_u32(&buf, at + 12), 1000);
        }

        // effective rate landed in the video strh Rate field:
        // hdrl list content starts at 24; avih chunk is 8+56; strl LIST
        // header is 12; strh header is 8; rate is at byte 24 of strh body
        let rate_at = 24 + 64 + 12 + 8 + 24;
        assert_eq!(read_u32(&buf, rate_at), 30);
    }

    #[test]
    fn test_audio_stream_in_header() {
        let mut writer = AviWriter::in_memory(small_config()).unwrap();
        writer.write_video_frame(&[0u8; 100], 0).unwrap();
        writer.write_audio_frame(&[0u8; 640], 0).unwrap();
        writer.finalize().unwrap();
        let buf = writer.close().unwrap();

        // two streams declared
        assert_eq!(read_u32(&buf, 32 + 24), 2);

        // audio strl follows the video strl: locate auds strh
        let vstrl_end = 24 + 64 + 12 + 8 + 64 + 8 + 40;
        assert_eq!(&buf[vstrl_end..vstrl_end + 4], b"LIST");
        assert_eq!(&buf[vstrl_end + 8..vstrl_end + 12], b"strl");
        assert_eq!(&buf[vstrl_end + 20..vstrl_end + 24], b"auds");

        // PCM strf: format 1, mono, 8000 Hz, 16-bit
        let strf_body = vstrl_end + 12 + 8 + 64 + 8;
        assert_eq!(&buf[strf_body - 8..strf_body - 4], b"strf");
        assert_eq!(u16::from_le_bytes(buf[strf_body..strf_body + 2].try_into().unwrap()), 1);
        assert_eq!(u16::from_le_bytes(buf[strf_body + 2..strf_body + 4].try_into().unwrap()), 1);
        assert_eq!(read_u32(&buf, strf_body + 4), 8000);
    }

    #[test]
    fn test_junk_signature_present() {
        let mut writer = AviWriter::in_memory(small_config()).unwrap();
        writer.write_video_frame(&[0u8; 100], 0).unwrap();
        writer.finalize().unwrap();
        let buf = writer.close().unwrap();

        let junk_at = buf[..HEADER_BYTES as usize]
            .windows(4)
            .position(|w| w == b"JUNK")
            .unwrap();
        let junk_len = read_u32(&buf, junk_at + 4) as usize;
        assert_eq!(junk_at + 8 + junk_len, HEADER_BYTES as usize - 12);
        assert_eq!(&buf[junk_at + 8..junk_at + 8 + SIGNATURE.len()], SIGNATURE);
    }

    #[test]
    fn test_file_sink_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.avi");
        let mut writer = AviWriter::create(&path, small_config()).unwrap();
        writer.write_video_frame(&[3u8; 500], 0).unwrap();
        writer.finalize().unwrap();
        assert!(writer.close().is_none());

        let data = std::fs::read(&path).unwrap();
        assert_eq!(&data[0..4], b"RIFF");
        assert_eq!(&data[8..12], b"AVI ");
        assert_eq!(&data[HEADER_BYTES as usize..HEADER_BYTES as usize + 4], b"00dc");
    }
}
