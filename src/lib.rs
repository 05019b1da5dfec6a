//! # miditape
//!
//! Time-indexed MIDI event store backed by Standard MIDI Files.
//!
//! ## Architecture
//!
//! miditape is an umbrella crate over:
//! - **miditape-core** - Beats/Samples time, tempo map, conversion, events
//! - **miditape-smf** - SMF codec and the crash-safe streaming writer
//! - **miditape-source** - Recording, range reads, stuck notes, model cache
//!
//! ## Quick Start
//!
//! ```ignore
//! use miditape::prelude::*;
//!
//! let tempo = shared_tempo_map(TempoMap::new(120.0));
//! let source = MidiSource::create("take.mid", Origin::Internal, SourceConfig::default(), tempo)?;
//!
//! let mut lock = source.lock();
//! source.mark_streaming_midi_write_started(&mut lock, NoteMode::Sustained)?;
//! source.append_event_beats(&mut lock, &MidiEvent::note_on(Beats(0.0), 0, 60, 100))?;
//! source.flush_midi(&mut lock)?;
//! source.mark_midi_streaming_write_completed(&mut lock, StuckNoteOption::default(), None)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - Includes `dispatch`
//! - `dispatch` - Flush and load many sources on a rayon pool

/// Re-export of miditape-core for direct access
pub use miditape_core as core;

/// Re-export of miditape-smf for direct access
pub use miditape_smf as smf;

/// Re-export of miditape-source for direct access
pub use miditape_source as source;

pub use miditape_core::{
    Beats, LoopRange, MidiEvent, Samples, TempoMap, TimeConverter, TimeDomain, TimeSignature,
    TimeValue, BBT,
};
pub use miditape_smf::{Smf, SmfMessage, SmfWriter};
pub use miditape_source::{
    capture_channel, shared_tempo_map, CaptureConsumer, CaptureProducer, ChannelMask, EventFilter,
    EventSink, FinalizeReport, Health, MidiModel, MidiSource, MidiStateTracker, MidiTimeSeries,
    NoteMode, Origin, SourceConfig, SourceLock, SourceMode, StuckNote, StuckNoteOption,
};

#[cfg(feature = "dispatch")]
pub use miditape_source::{flush_all, load_all, TaskList};

mod error;
pub use error::{Error, Result};

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::{Error, Result};

    // Time
    pub use crate::core::{Beats, LoopRange, Samples, TempoMap};

    // Events
    pub use crate::core::MidiEvent;
    pub use crate::source::{ChannelMask, EventSink, MidiStateTracker};

    // Sources
    pub use crate::source::{
        capture_channel, shared_tempo_map, MidiSource, NoteMode, Origin, SourceConfig, SourceMode,
        StuckNoteOption,
    };

    #[cfg(feature = "dispatch")]
    pub use crate::source::TaskList;
}
