//! Error types for the replay core
//!
//! The simulation clock never fails. Everything that touches recorded data
//! reports through `ReplayError`; the byte-level codec has its own
//! `CodecError` that converts into it.

use thiserror::Error;

use crate::ghost::GhostHandle;

/// Failures while decoding snapshot bytes or (de)compressing a replay body
#[derive(Debug, Error)]
pub enum CodecError {
    /// Byte span shorter than what the record/field needs
    #[error("buffer too short: needed {needed} bytes, got {got}")]
    TooShort { needed: usize, got: usize },

    /// Snapshot field holding NaN or an infinity
    #[error("non-finite value in snapshot field '{field}'")]
    NonFinite { field: &'static str },

    /// Value too large for its fixed-width field
    #[error("{what} is {len}, limit is {max}")]
    TooLong {
        what: &'static str,
        len: usize,
        max: usize,
    },

    /// Length-prefixed string that is not UTF-8
    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    /// zlib encoder failed
    #[error("compression failed: {0}")]
    Compress(#[source] std::io::Error),

    /// zlib stream failed to expand
    #[error("decompression failed: {0}")]
    Decompress(#[source] std::io::Error),

    /// zlib stream expanded to a different size than the header declared
    #[error("decompressed body is {got} bytes, header declared {expected}")]
    LengthMismatch { expected: usize, got: usize },
}

/// Errors raised by the replay store, playback controller and ghost manager
#[derive(Debug, Error)]
pub enum ReplayError {
    /// Malformed, truncated or version-mismatched replay stream
    #[error("invalid replay: {reason}")]
    InvalidReplay { reason: String },

    /// Snapshot appended with a tick that does not follow the previous one
    #[error("snapshot out of order: expected tick {expected}, got {got}")]
    OutOfOrder { expected: u64, got: u64 },

    /// Append after the recording was finalized
    #[error("replay is closed for writing")]
    ReplayClosed,

    /// Second finalize on the same recording
    #[error("replay already finalized")]
    AlreadyFinalized,

    /// A recording is already in progress on this store
    #[error("a recording is already active")]
    AlreadyActive,

    /// Serialization requested before finalize
    #[error("replay has not been finalized")]
    NotFinalized,

    /// Recording operation on a store that is not recording
    #[error("no recording is active")]
    NotRecording,

    /// Direct tick lookup beyond the recorded stream
    #[error("tick {tick} out of range (replay has {len} ticks)")]
    OutOfRange { tick: u64, len: u64 },

    /// Ghost recorded on a different level than the one being played
    #[error("ghost recorded on level '{found}', playing '{expected}'")]
    LevelMismatch { expected: String, found: String },

    /// Ghost handle not (or no longer) known to the manager
    #[error("unknown ghost {0}")]
    UnknownGhost(GhostHandle),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl ReplayError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        ReplayError::InvalidReplay {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReplayError>;
