//! Error types for AVI container operations

use thiserror::Error;

/// Result type for AVI operations
pub type Result<T> = std::result::Result<T, AviError>;

/// Errors that can occur while writing, reading or recovering an AVI file
#[derive(Error, Debug)]
pub enum AviError {
    /// Underlying read/write/seek failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad `RIFF....AVI ` preamble
    #[error("not an AVI file")]
    NotAnAviFile,

    /// No `hdrl` LIST found during the top-level scan
    #[error("AVI file has no header list")]
    MissingHeaderList,

    /// No `movi` LIST found during the top-level scan
    #[error("AVI file has no movi list")]
    MissingMoviList,

    /// The header list describes no usable video stream
    #[error("AVI file contains no video stream")]
    NoVideoStream,

    /// A random-access or audio operation needs an index, but the handle
    /// was opened without one
    #[error("operation needs an index")]
    IndexUnavailable,

    /// Operation not permitted in the handle's current state, e.g. writing
    /// a frame after the file has been finalized
    #[error("operation not permitted: {0}")]
    PermissionDenied(&'static str),

    /// The sink or the index storage is full
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(&'static str),

    /// Index storage allocation would exceed what the declared duration allows
    #[error("out of memory: index storage for {entries} entries")]
    OutOfMemory { entries: usize },

    /// Truncated or structurally inconsistent chunk data
    #[error("malformed stream at offset {offset}")]
    MalformedStream { offset: u64 },

    /// More than the supported number of audio tracks
    #[error("only {max} audio tracks supported")]
    TooManyAudioTracks { max: usize },
}
