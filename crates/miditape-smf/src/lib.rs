//! Standard MIDI File codec.
//!
//! Decodes and encodes format 0 and 1 files with metrical timing, byte-exact
//! on round trip (running status is remembered per event), and provides
//! [`SmfWriter`], an append-only writer that keeps the file valid on disk
//! after every flush.
//!
//! ```ignore
//! use miditape_smf::{decode, encode};
//!
//! let smf = decode(&std::fs::read("take.mid")?)?;
//! assert_eq!(encode(&smf)?, std::fs::read("take.mid")?);
//! ```

pub mod error;
pub mod file;
pub mod header;
pub mod message;
pub mod track;
pub mod vlq;
pub mod writer;

pub use error::{Error, Result};
pub use file::{decode, encode, AlienChunk, Smf};
pub use header::{is_valid_header, Format, Header, MAX_DIVISION};
pub use message::{message_length, SmfMessage};
pub use track::{Track, TrackEvent};
pub use vlq::MAX_VLQ;
pub use writer::SmfWriter;
