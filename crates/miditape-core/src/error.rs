//! Error types for miditape-core.

use thiserror::Error;

/// Error type for miditape-core operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid beat position: {0}. Must be non-negative")]
    InvalidBeat(f64),

    #[error("Invalid loop range: start={start}, end={end}")]
    InvalidLoopRange { start: u64, end: u64 },

    #[error("Invalid time signature: {numerator}/{denominator}")]
    InvalidTimeSignature { numerator: u32, denominator: u32 },

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f64),

    #[error("Invalid MIDI message: {0}")]
    InvalidMessage(String),
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
