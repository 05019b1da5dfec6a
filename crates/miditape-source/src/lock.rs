//! Proof that a source's mutex is held.

use crate::source::SourceState;
use parking_lot::MutexGuard;

/// Held lock on one [`MidiSource`](crate::MidiSource).
///
/// Obtained only from [`MidiSource::lock`](crate::MidiSource::lock). Every
/// `_unlocked` and mutating operation takes one of these; passing a lock from
/// a different source is rejected with a state error.
pub struct SourceLock<'a> {
    pub(crate) source_id: u64,
    pub(crate) guard: MutexGuard<'a, SourceState>,
}

impl SourceLock<'_> {
    #[inline]
    pub fn source_id(&self) -> u64 {
        self.source_id
    }
}

impl std::fmt::Debug for SourceLock<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceLock")
            .field("source_id", &self.source_id)
            .finish_non_exhaustive()
    }
}
