//! Core types for the miditape MIDI event store.
//!
//! - [`time`]: [`Beats`] and [`Samples`], the two time domains
//! - [`tempo_map`]: tempo and meter points, seconds/beats/BBT
//! - [`convert`]: beat/sample conversion and [`LoopRange`]
//! - [`event`]: domain-tagged [`MidiEvent`]
//! - [`lockfree`]: atomics shared with the realtime thread

pub mod convert;
pub mod error;
pub mod event;
pub mod lockfree;
pub mod tempo_map;
pub mod time;

pub use convert::{to_beats, to_samples, LoopRange, TimeConverter};
pub use error::{Error, Result};
pub use event::{channel_message_length, MidiBytes, MidiEvent};
pub use lockfree::{AtomicCounter, AtomicFlag};
pub use tempo_map::{TempoMap, TimeSignature, BBT};
pub use time::{Beats, Samples, TimeDomain, TimeValue};
