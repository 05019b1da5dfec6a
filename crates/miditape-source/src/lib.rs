//! MIDI sources backed by Standard MIDI Files.
//!
//! A [`MidiSource`] records live MIDI into an SMF that stays valid on disk
//! after every flush, serves sample- or beat-domain range reads for playback
//! (with looping and stuck-note resolution), and keeps an editable
//! [`MidiModel`] in step with the file.
//!
//! Every operation that touches source state takes a [`SourceLock`]. The
//! realtime thread hands captured events over a lock-free ring
//! ([`capture_channel`]); the butler thread drains it with
//! [`MidiSource::write_unlocked`] and calls [`MidiSource::flush_midi`].

pub mod capture;
pub mod config;
#[cfg(feature = "dispatch")]
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod index;
pub mod lock;
pub mod model;
pub mod sink;
pub mod source;
pub mod tracker;
pub mod traits;

pub use capture::{capture_channel, CaptureConsumer, CapturedEvent, CaptureProducer};
pub use config::{NoteMode, SourceConfig, SourceConfigBuilder, StuckNoteOption};
#[cfg(feature = "dispatch")]
pub use dispatch::{flush_all, load_all, TaskList};
pub use error::{Error, Result};
pub use filter::{ChannelMask, EventFilter};
pub use index::{EventIndex, IndexedEvent};
pub use lock::SourceLock;
pub use model::{FileStamp, MidiModel, ModelCache, Note};
pub use sink::{EventSink, FnSink};
pub use source::{
    shared_tempo_map, FinalizeReport, Health, MidiSource, SharedTempoMap, SourceMode,
    TempoMapRef,
};
pub use tracker::{MidiStateTracker, NoteState, StuckNote};
pub use traits::{FileBacked, MidiTimeSeries, Origin};
