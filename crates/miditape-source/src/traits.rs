//! Capabilities a source is composed of.

use crate::lock::SourceLock;
use crate::sink::EventSink;
use crate::Result;
use miditape_core::Beats;
use std::path::Path;

/// Who owns the file behind a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Created by the session; may be recorded into.
    Internal,
    /// Imported from elsewhere; read-only.
    External,
}

pub trait FileBacked {
    fn path(&self) -> &Path;

    fn origin(&self) -> Origin;

    fn is_writable(&self) -> bool {
        self.origin() == Origin::Internal
    }
}

/// Beat-indexed MIDI that can be measured and read back by range.
pub trait MidiTimeSeries {
    fn length(&self, lock: &SourceLock<'_>) -> Result<Beats>;

    /// Events in `[start, start + length)`; returns how many were written.
    fn read_range(
        &self,
        lock: &SourceLock<'_>,
        sink: &mut dyn EventSink<Beats>,
        start: Beats,
        length: Beats,
    ) -> Result<usize>;
}
