//! Error types for the SMF codec.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bad chunk signature: expected {expected}, found {found:?}")]
    BadSignature {
        expected: &'static str,
        found: [u8; 4],
    },

    #[error("MThd chunk length {0}, must be 6")]
    BadHeaderLength(u32),

    #[error("Unsupported SMF format {0} (only 0 and 1 are supported)")]
    UnsupportedFormat(u16),

    #[error("Unsupported SMPTE timing division 0x{0:04X}")]
    UnsupportedTiming(u16),

    #[error("Header declares zero ticks per quarter note")]
    ZeroDivision,

    #[error("Truncated {context} at offset {offset}")]
    Truncated { context: &'static str, offset: usize },

    #[error("Variable-length quantity longer than four bytes at offset {offset}")]
    VlqTooLong { offset: usize },

    #[error("Bad status byte 0x{status:02X} at offset {offset}")]
    BadStatus { status: u8, offset: usize },

    #[error("Data byte without running status at offset {offset}")]
    MissingRunningStatus { offset: usize },

    #[error("Track {track} has no end-of-track event")]
    MissingEndOfTrack { track: usize },

    #[error("Delta time {0} exceeds the 28-bit SMF limit")]
    DeltaOverflow(u64),

    #[error("Track data of {0} bytes exceeds the 32-bit chunk length")]
    TrackTooLong(u64),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Event at tick {tick} precedes previous event at tick {previous}")]
    TickBeforePrevious { previous: u64, tick: u64 },
}

impl Error {
    /// True for every variant that describes malformed or unrepresentable
    /// SMF data rather than a filesystem failure.
    pub fn is_format(&self) -> bool {
        !matches!(self, Error::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
