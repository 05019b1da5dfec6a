//! Integration test modules for miditape
//!
//! - recording: write sessions end to end
//! - playback: reads against recorded and imported files
//! - interop: byte-level compatibility with other SMF tools

pub mod interop;
pub mod playback;
pub mod recording;
