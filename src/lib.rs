//! AVI (RIFF) container support for DVR-style recording and replay.
//!
//! The writer appends video and audio chunks behind a fixed reserved
//! header region, logging an index as it goes; finalizing emits the
//! trailing idx1 chunk and backpatches the header in one block, so a
//! recording interrupted at any point keeps its data intact. The reader
//! resolves both index offset conventions found in the wild and rebuilds
//! the index by scanning when the stored one is missing or wrong. The
//! recovery pass restores interrupted recordings in place.
//!
//! # Writing
//!
//! ```no_run
//! use avirec::{AviWriter, WriterConfig};
//!
//! # fn main() -> avirec::Result<()> {
//! let config = WriterConfig::new(640, 480, 30, *b"MJPG", 60);
//! let mut writer = AviWriter::create("out.avi", config)?;
//! writer.write_video_frame(&[0u8; 1024], 0)?;
//! writer.finalize()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Reading
//!
//! ```no_run
//! use avirec::AviReader;
//!
//! # fn main() -> avirec::Result<()> {
//! let mut reader = AviReader::open("out.avi")?;
//! while let Some(frame) = reader.read_frame()? {
//!     println!("{} bytes", frame.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod chunks;
pub mod cursor;
pub mod demuxer;
pub mod error;
pub mod index;
pub mod muxer;
pub mod recover;
pub mod sink;
pub mod tracks;

pub use chunks::{FourCC, IndexEntry, HEADER_BYTES};
pub use demuxer::{AviReader, DataChunk};
pub use error::{AviError, Result};
pub use muxer::{AviWriter, WriterConfig, DEFAULT_MAX_FILE_SIZE};
pub use recover::{recover_file, RecoveryOutcome, RecoveryReport};
pub use tracks::{wave_format, AudioTrack, VideoTrack, MAX_AUDIO_TRACKS};
