//! Stream descriptions: one video track plus up to 8 audio tracks

use crate::error::{AviError, Result};

/// Maximum number of audio tracks per file
pub const MAX_AUDIO_TRACKS: usize = 8;

/// Well-known WAVE format tags
pub mod wave_format {
    pub const UNKNOWN: u16 = 0x0000;
    pub const PCM: u16 = 0x0001;
    pub const ADPCM: u16 = 0x0002;
    pub const ALAW: u16 = 0x0006;
    pub const MULAW: u16 = 0x0007;
    pub const GSM610: u16 = 0x0031;
}

/// One audio stream: format descriptor plus running counters
#[derive(Debug, Clone)]
pub struct AudioTrack {
    /// WAVE format tag
    pub format: u16,
    /// Channel count, 0 for no audio
    pub channels: u16,
    /// Sample rate in Hz
    pub rate: u32,
    /// Bits per sample
    pub bits: u16,
    /// Stream number within the file
    pub stream: u32,
    /// Total bytes of audio data seen so far
    pub bytes: u64,
    /// Chunks of audio data seen so far
    pub chunks: u32,
}

impl AudioTrack {
    pub fn new(channels: u16, rate: u32, bits: u16, format: u16) -> Self {
        AudioTrack {
            format,
            channels,
            rate,
            bits,
            stream: 0,
            bytes: 0,
            chunks: 0,
        }
    }

    /// Bytes per sample across all channels. May need adjustment for
    /// exotic depths (e.g. 12-bit stereo); never zero.
    pub fn sample_size(&self) -> u32 {
        let s = ((self.bits as u32 + 7) / 8) * self.channels as u32;
        s.max(1)
    }
}

/// The audio side of the track model: an ordered set of up to
/// [`MAX_AUDIO_TRACKS`] tracks with a current working track.
#[derive(Debug, Clone, Default)]
pub struct AudioTracks {
    tracks: Vec<AudioTrack>,
    current: usize,
}

impl AudioTracks {
    pub fn new() -> Self {
        AudioTracks::default()
    }

    /// Append a track and make it current. Exceeding the track limit is a
    /// hard error, not a truncation.
    pub fn push(&mut self, track: AudioTrack) -> Result<()> {
        if self.tracks.len() >= MAX_AUDIO_TRACKS {
            return Err(AviError::TooManyAudioTracks {
                max: MAX_AUDIO_TRACKS,
            });
        }
        self.current = self.tracks.len();
        self.tracks.push(track);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn current(&self) -> Option<&AudioTrack> {
        self.tracks.get(self.current)
    }

    pub fn current_mut(&mut self) -> Option<&mut AudioTrack> {
        self.tracks.get_mut(self.current)
    }
}

/// The video stream description
#[derive(Debug, Clone)]
pub struct VideoTrack {
    pub width: u32,
    pub height: u32,
    /// Frames per second; whole frames for the writer, rate/scale for
    /// the reader
    pub fps: f64,
    /// Compressor FourCC from strh
    pub compressor: [u8; 4],
    /// Stream number within the file
    pub stream: u32,
    /// Number of video frames
    pub frames: u32,
}

impl VideoTrack {
    pub fn new(width: u32, height: u32, fps: u32, compressor: [u8; 4]) -> Self {
        VideoTrack {
            width,
            height,
            fps: fps as f64,
            compressor,
            stream: 0,
            frames: 0,
        }
    }

    /// Dimension-derived header defaults: microseconds per frame and
    /// suggested buffer size. PAL-CIF-or-larger recordings use the PAL
    /// frame interval, everything smaller the NTSC-ish one.
    pub fn header_defaults(&self) -> (u32, u32) {
        if self.height % 288 == 0 && self.width >= 352 {
            (40_000, 144_008)
        } else {
            (33_366, 120_008)
        }
    }
}
