//! The MIDI source orchestrator.
//!
//! A [`MidiSource`] owns one SMF file, the tick index built from it, an
//! optional write session and the lazily built [`MidiModel`]. All state sits
//! behind one mutex; operations take the [`SourceLock`] obtained from
//! [`MidiSource::lock`] so the caller decides how long the lock is held.
//!
//! ```ignore
//! let source = MidiSource::create(path, Origin::Internal, config, tempo)?;
//! let mut lock = source.lock();
//! source.mark_streaming_midi_write_started(&mut lock, NoteMode::Sustained)?;
//! source.append_event_beats(&mut lock, &MidiEvent::note_on(Beats(0.0), 0, 60, 100))?;
//! source.flush_midi(&mut lock)?;
//! source.mark_midi_streaming_write_completed(&mut lock, StuckNoteOption::default(), None)?;
//! ```

use crate::capture::{capture_channel, CaptureConsumer, CaptureProducer};
use crate::config::{NoteMode, SourceConfig, StuckNoteOption};
use crate::filter::EventFilter;
use crate::index::EventIndex;
use crate::lock::SourceLock;
use crate::model::{FileStamp, MidiModel, ModelCache};
use crate::sink::EventSink;
use crate::tracker::{MidiStateTracker, StuckNote};
use crate::traits::{FileBacked, MidiTimeSeries, Origin};
use crate::{Error, Result};
use arc_swap::ArcSwap;
use miditape_core::{
    AtomicCounter, AtomicFlag, Beats, LoopRange, MidiEvent, Samples, TempoMap, TimeConverter,
};
use miditape_smf::{Smf, SmfMessage, SmfWriter};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Session tempo map, replaced wholesale by the timeline.
pub type SharedTempoMap = Arc<ArcSwap<TempoMap>>;

pub fn shared_tempo_map(map: TempoMap) -> SharedTempoMap {
    Arc::new(ArcSwap::from_pointee(map))
}

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    Closed,
    OpenForRead,
    OpenForWrite,
}

/// Outcome of finalizing a write session.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeReport {
    /// `None` for a length-only finalize.
    pub option: Option<StuckNoteOption>,
    /// Notes sounding when the session ended.
    pub stuck: Vec<StuckNote<Beats>>,
    /// NoteOffs written by `Force`.
    pub synthesized: usize,
    /// Notes left without a NoteOff in the file.
    pub open: Vec<StuckNote<Beats>>,
    pub truncated_at: Option<Beats>,
    pub length: Beats,
}

/// Lock-free status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Health {
    /// Last flush failed.
    pub degraded: bool,
    /// Recording stopped early (disk full); flushed data is intact.
    pub incomplete: bool,
    /// Errors recorded on the realtime write path.
    pub write_errors: u64,
}

#[derive(Debug, Clone)]
pub struct TempoMapRef {
    pub map: Arc<TempoMap>,
    pub provided_by_file: bool,
}

#[derive(Debug)]
struct WriteSession {
    writer: SmfWriter,
    tracker: MidiStateTracker<Beats>,
    last_time: Beats,
    accepting: bool,
    /// Events were removed from the index; the file needs a full rewrite.
    needs_rewrite: bool,
    /// Decided on the first finalize attempt and reused on retry.
    report: Option<FinalizeReport>,
    #[cfg(test)]
    fail_next_flush: Option<ErrorKind>,
}

impl WriteSession {
    fn new(writer: SmfWriter, note_mode: NoteMode) -> Self {
        Self {
            writer,
            tracker: MidiStateTracker::with_mode(note_mode),
            last_time: Beats::ZERO,
            accepting: true,
            needs_rewrite: false,
            report: None,
            #[cfg(test)]
            fail_next_flush: None,
        }
    }

    fn flush(&mut self, end_tick: u64) -> Result<()> {
        #[cfg(test)]
        if let Some(kind) = self.fail_next_flush.take() {
            return Err(std::io::Error::from(kind).into());
        }
        self.writer.flush(end_tick).map_err(Error::from)
    }
}

#[derive(Debug)]
pub(crate) struct SourceState {
    mode: SourceMode,
    /// Closed and never written.
    fresh: bool,
    index: EventIndex,
    file_tempo: Option<Arc<TempoMap>>,
    session: Option<WriteSession>,
    cache: ModelCache,
    /// The realtime path appended events the loaded model has not seen.
    model_lags: bool,
    report: Option<FinalizeReport>,
    write_errors: VecDeque<Error>,
}

impl SourceState {
    fn new(mode: SourceMode, fresh: bool, index: EventIndex, error_capacity: usize) -> Self {
        let file_tempo = index.tempo_map();
        Self {
            mode,
            fresh,
            index,
            file_tempo,
            session: None,
            cache: ModelCache::default(),
            model_lags: false,
            report: None,
            write_errors: VecDeque::with_capacity(error_capacity),
        }
    }

    fn check_readable(&self) -> Result<()> {
        match self.cache.unreadable() {
            Some(reason) => Err(Error::state(format!(
                "source is unreadable ({reason}); reset before editing"
            ))),
            None => Ok(()),
        }
    }

    fn append(&mut self, event: &MidiEvent<Beats>, update_model: bool) -> Result<()> {
        if self.mode != SourceMode::OpenForWrite {
            return Err(Error::state("append requires an open write session"));
        }
        let ppqn = self.index.ppqn();
        let Some(session) = self.session.as_mut() else {
            return Err(Error::state("append requires an open write session"));
        };
        if !session.accepting {
            return Err(Error::state("write session halted; take is incomplete"));
        }
        if event.time < session.last_time {
            return Err(Error::Order {
                previous: session.last_time,
                attempted: event.time,
            });
        }

        let message = SmfMessage::from_wire(event.bytes())?;
        let tick = event.time.to_ticks(ppqn);
        session.writer.append(tick, &message)?;
        session.tracker.observe(event);
        session.last_time = event.time;

        if self.cache.is_loaded() {
            match self.cache.model_mut() {
                Some(model) if update_model && !self.model_lags => model.append(tick, &message),
                _ => self.model_lags = true,
            }
        }
        self.index.push(tick, message);
        Ok(())
    }
}

pub struct MidiSource {
    id: u64,
    path: PathBuf,
    origin: Origin,
    config: SourceConfig,
    session_tempo: SharedTempoMap,
    state: Mutex<SourceState>,
    degraded: AtomicFlag,
    incomplete: AtomicFlag,
    write_error_count: AtomicCounter,
}

impl MidiSource {
    fn with_state(
        path: PathBuf,
        origin: Origin,
        config: SourceConfig,
        session_tempo: SharedTempoMap,
        state: SourceState,
    ) -> Self {
        Self {
            id: NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed),
            path,
            origin,
            config,
            session_tempo,
            state: Mutex::new(state),
            degraded: AtomicFlag::new(false),
            incomplete: AtomicFlag::new(false),
            write_error_count: AtomicCounter::default(),
        }
    }

    /// A fresh, closed source for recording into `path`. The file is created
    /// when the write session starts.
    pub fn create(
        path: impl AsRef<Path>,
        origin: Origin,
        config: SourceConfig,
        session_tempo: SharedTempoMap,
    ) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            return Err(Error::state(format!("{} already exists", path.display())));
        }
        let state = SourceState::new(
            SourceMode::Closed,
            true,
            EventIndex::new(config.ppqn),
            config.error_log_capacity,
        );
        Ok(Self::with_state(path, origin, config, session_tempo, state))
    }

    /// Open an existing file for reading.
    pub fn open(
        path: impl AsRef<Path>,
        origin: Origin,
        config: SourceConfig,
        session_tempo: SharedTempoMap,
    ) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();
        let smf = Smf::load(&path)?;
        let index = EventIndex::from_smf(&smf);
        debug!(
            "Opened MIDI source {:?}: {} events, {} ticks at {} ppqn",
            path,
            index.len(),
            index.end_tick(),
            index.ppqn()
        );
        let state = SourceState::new(
            SourceMode::OpenForRead,
            false,
            index,
            config.error_log_capacity,
        );
        Ok(Self::with_state(path, origin, config, session_tempo, state))
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    #[inline]
    pub fn session_tempo(&self) -> &SharedTempoMap {
        &self.session_tempo
    }

    pub fn lock(&self) -> SourceLock<'_> {
        SourceLock {
            source_id: self.id,
            guard: self.state.lock(),
        }
    }

    pub fn try_lock(&self) -> Option<SourceLock<'_>> {
        self.state.try_lock().map(|guard| SourceLock {
            source_id: self.id,
            guard,
        })
    }

    fn state<'l>(&self, lock: &'l SourceLock<'_>) -> Result<&'l SourceState> {
        if lock.source_id != self.id {
            return Err(Error::state("lock belongs to another source"));
        }
        Ok(&*lock.guard)
    }

    fn state_mut<'l>(&self, lock: &'l mut SourceLock<'_>) -> Result<&'l mut SourceState> {
        if lock.source_id != self.id {
            return Err(Error::state("lock belongs to another source"));
        }
        Ok(&mut *lock.guard)
    }

    fn effective_tempo(&self, state: &SourceState) -> Arc<TempoMap> {
        match &state.file_tempo {
            Some(map) => Arc::clone(map),
            None => self.session_tempo.load_full(),
        }
    }

    pub fn health(&self) -> Health {
        Health {
            degraded: self.degraded.get(),
            incomplete: self.incomplete.get(),
            write_errors: self.write_error_count.get(),
        }
    }

    pub fn mode(&self, lock: &SourceLock<'_>) -> Result<SourceMode> {
        Ok(self.state(lock)?.mode)
    }

    pub fn finalize_report(&self, lock: &SourceLock<'_>) -> Result<Option<FinalizeReport>> {
        Ok(self.state(lock)?.report.clone())
    }

    pub fn ppqn(&self, lock: &SourceLock<'_>) -> Result<u16> {
        Ok(self.state(lock)?.index.ppqn())
    }

    /// Number of indexed events.
    pub fn event_count(&self, lock: &SourceLock<'_>) -> Result<usize> {
        Ok(self.state(lock)?.index.len())
    }

    // =========================================================================
    // Write session
    // =========================================================================

    pub fn mark_streaming_midi_write_started(
        &self,
        lock: &mut SourceLock<'_>,
        note_mode: NoteMode,
    ) -> Result<()> {
        if !self.is_writable() {
            return Err(Error::state("external sources are read-only"));
        }
        let state = self.state_mut(lock)?;
        if state.mode != SourceMode::Closed || !state.fresh {
            return Err(Error::state(
                "a write session can only start on a fresh, closed source",
            ));
        }
        let writer = SmfWriter::create(&self.path, self.config.ppqn)?;
        state.session = Some(WriteSession::new(writer, note_mode));
        state.index = EventIndex::new(self.config.ppqn);
        state.file_tempo = None;
        state.report = None;
        state.mode = SourceMode::OpenForWrite;
        state.fresh = false;
        self.degraded.set(false);
        self.incomplete.set(false);
        debug!("Write session started on {:?} ({:?})", self.path, note_mode);
        Ok(())
    }

    /// Append an event at source-relative beats.
    pub fn append_event_beats(
        &self,
        lock: &mut SourceLock<'_>,
        event: &MidiEvent<Beats>,
    ) -> Result<()> {
        if event.time.is_negative() || !event.time.0.is_finite() {
            return Err(miditape_core::Error::InvalidBeat(event.time.0).into());
        }
        self.state_mut(lock)?.append(event, true)
    }

    /// Append an event stamped in timeline samples, for a source that starts
    /// at `source_start` on the timeline.
    pub fn append_event_samples(
        &self,
        lock: &mut SourceLock<'_>,
        event: &MidiEvent<Samples>,
        source_start: Samples,
    ) -> Result<()> {
        let tempo = self.session_tempo.load();
        let conv = TimeConverter::new(&tempo, self.config.sample_rate, source_start)?;
        if event.time < source_start {
            return Err(Error::Order {
                previous: Beats::ZERO,
                attempted: conv.to_beats(event.time),
            });
        }
        let beats = conv.to_beats(event.time).max(Beats::ZERO);
        self.append_event_beats(lock, &event.with_time(beats))
    }

    fn record_write_error(&self, log: &mut VecDeque<Error>, err: Error) {
        self.write_error_count.increment();
        if log.len() >= self.config.error_log_capacity {
            log.pop_front();
        }
        log.push_back(err);
    }

    /// Drain captured events earlier than `position + count` into the write
    /// session. `position` is the source start on the timeline.
    ///
    /// Touches only the writer and the index. Errors are recorded for
    /// [`take_write_errors`](Self::take_write_errors) instead of returned.
    /// Returns the number of events written.
    pub fn write_unlocked(
        &self,
        lock: &mut SourceLock<'_>,
        capture: &mut CaptureConsumer,
        position: Samples,
        count: Samples,
    ) -> usize {
        let Ok(state) = self.state_mut(lock) else {
            self.write_error_count.increment();
            return 0;
        };
        if state.mode != SourceMode::OpenForWrite {
            self.record_write_error(
                &mut state.write_errors,
                Error::state("realtime write without an open write session"),
            );
            return 0;
        }
        let tempo = self.session_tempo.load();
        let conv = match TimeConverter::new(&tempo, self.config.sample_rate, position) {
            Ok(conv) => conv,
            Err(e) => {
                self.record_write_error(&mut state.write_errors, e.into());
                return 0;
            }
        };

        let end = position + count;
        let mut written = 0;
        while let Some(captured) = capture.pop_before(end) {
            let result = if captured.time < position {
                Err(Error::Order {
                    previous: Beats::ZERO,
                    attempted: conv.to_beats(captured.time),
                })
            } else {
                let beats = conv.to_beats(captured.time).max(Beats::ZERO);
                MidiEvent::from_bytes(beats, captured.bytes())
                    .map_err(Error::from)
                    .and_then(|event| state.append(&event, false))
            };
            match result {
                Ok(()) => written += 1,
                Err(e) => self.record_write_error(&mut state.write_errors, e),
            }
        }
        written
    }

    /// A capture ring sized by `capture_capacity` in the config, for feeding
    /// [`write_unlocked`](Self::write_unlocked).
    pub fn capture_channel(&self) -> (CaptureProducer, CaptureConsumer) {
        capture_channel(self.config.capture_capacity)
    }

    /// Errors recorded by [`write_unlocked`](Self::write_unlocked) since the
    /// last call, oldest first.
    pub fn take_write_errors(&self, lock: &mut SourceLock<'_>) -> Result<Vec<Error>> {
        Ok(self.state_mut(lock)?.write_errors.drain(..).collect())
    }

    fn observe_flush(&self, session: &mut WriteSession, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                if self.degraded.swap(false) {
                    debug!("Flush of {:?} recovered", self.path);
                }
                Ok(())
            }
            Err(e) => {
                if let Error::Io(io) = &e {
                    if io.kind() == ErrorKind::StorageFull && session.accepting {
                        session.accepting = false;
                        self.incomplete.set(true);
                        warn!(
                            "Disk full while recording {:?}; take marked incomplete",
                            self.path
                        );
                    }
                }
                self.degraded.set(true);
                warn!("Flush of {:?} failed: {}", self.path, e);
                Err(e)
            }
        }
    }

    /// Write buffered events and patch the track length, leaving a valid
    /// file on disk.
    pub fn flush_midi(&self, lock: &mut SourceLock<'_>) -> Result<()> {
        let state = self.state_mut(lock)?;
        if state.mode != SourceMode::OpenForWrite {
            return Err(Error::state("flush requires an open write session"));
        }
        let end_tick = state.index.end_tick();
        let Some(session) = state.session.as_mut() else {
            return Err(Error::state("flush requires an open write session"));
        };
        let result = session.flush(end_tick);
        self.observe_flush(session, result)
    }

    /// Finalize, resolving sounding notes with `option`. With `end`, events at
    /// or after that point are discarded and the source ends there.
    pub fn mark_midi_streaming_write_completed(
        &self,
        lock: &mut SourceLock<'_>,
        option: StuckNoteOption,
        end: Option<Beats>,
    ) -> Result<FinalizeReport> {
        self.finalize(lock, Some(option), end)
    }

    /// Finalize with the stuck-note policy from [`SourceConfig`].
    pub fn mark_midi_streaming_write_completed_default(
        &self,
        lock: &mut SourceLock<'_>,
        end: Option<Beats>,
    ) -> Result<FinalizeReport> {
        self.finalize(lock, Some(self.config.stuck_note_option), end)
    }

    /// Finalize the header and length only.
    pub fn mark_streaming_write_completed(
        &self,
        lock: &mut SourceLock<'_>,
    ) -> Result<FinalizeReport> {
        self.finalize(lock, None, None)
    }

    fn finalize(
        &self,
        lock: &mut SourceLock<'_>,
        option: Option<StuckNoteOption>,
        end: Option<Beats>,
    ) -> Result<FinalizeReport> {
        if let Some(b) = end {
            if b.is_negative() || !b.0.is_finite() {
                return Err(miditape_core::Error::InvalidBeat(b.0).into());
            }
        }
        let state = self.state_mut(lock)?;
        if state.mode != SourceMode::OpenForWrite {
            return Err(Error::state("no write session to finalize"));
        }
        let ppqn = state.index.ppqn();
        let Some(session) = state.session.as_mut() else {
            return Err(Error::state("no write session to finalize"));
        };

        if session.report.is_none() {
            let mut truncated_at = None;
            if let Some(cut) = end.map(|b| b.to_ticks(ppqn)) {
                if state.index.truncate_from(cut) > 0 {
                    session.needs_rewrite = true;
                    session.tracker.reset();
                    for event in state.index.events() {
                        if let SmfMessage::Midi(bytes) = &event.message {
                            session
                                .tracker
                                .observe_bytes(Beats::from_ticks(event.tick, ppqn), bytes);
                        }
                    }
                }
                truncated_at = Some(Beats::from_ticks(cut, ppqn));
            }

            let end_tick = state.index.end_tick();
            let at = Beats::from_ticks(end_tick, ppqn);
            let stuck = session.tracker.stuck_notes();
            let synthesized = match option {
                Some(option) => session.tracker.resolve(option, at),
                None => Vec::new(),
            };
            for off in &synthesized {
                let message = SmfMessage::from_wire(off.bytes())?;
                if !session.needs_rewrite {
                    session.writer.append(end_tick, &message)?;
                }
                state.index.push(end_tick, message);
            }
            let open = match option {
                Some(StuckNoteOption::Force { .. }) => session.tracker.stuck_notes(),
                _ => stuck.clone(),
            };
            session.report = Some(FinalizeReport {
                option,
                stuck,
                synthesized: synthesized.len(),
                open,
                truncated_at,
                length: at,
            });
        }

        let end_tick = state.index.end_tick();
        let result = if session.needs_rewrite {
            session
                .writer
                .rewrite(
                    state.index.events().iter().map(|e| (e.tick, &e.message)),
                    end_tick,
                )
                .map_err(Error::from)
        } else {
            session.flush(end_tick)
        };
        self.observe_flush(session, result)?;

        session.needs_rewrite = false;
        let Some(report) = session.report.take() else {
            return Err(Error::state("finalize report missing"));
        };
        state.session = None;
        state.mode = SourceMode::Closed;

        if state.cache.is_loaded() {
            if state.cache.model().is_some_and(|m| m.is_dirty()) {
                warn!(
                    "Discarding model edits made while recording {:?}",
                    self.path
                );
            }
            let stamp = FileStamp::of(&self.path).ok();
            state.cache.set(MidiModel::from_index(&state.index), stamp);
        }
        state.model_lags = false;
        state.report = Some(report.clone());

        debug!(
            "Finalized {:?}: {} events, length {}, {} synthesized note-offs",
            self.path,
            state.index.len(),
            report.length,
            report.synthesized
        );
        Ok(report)
    }

    /// Reopen a finalized source for reading, re-decoding the file.
    pub fn open_for_read(&self, lock: &mut SourceLock<'_>) -> Result<()> {
        let state = self.state_mut(lock)?;
        match state.mode {
            SourceMode::OpenForRead => return Ok(()),
            SourceMode::OpenForWrite => {
                return Err(Error::state("finalize the write session first"));
            }
            SourceMode::Closed if state.fresh => {
                return Err(Error::state("nothing has been recorded"));
            }
            SourceMode::Closed => {}
        }
        let smf = match Smf::load(&self.path) {
            Ok(smf) => smf,
            Err(e) => {
                let e = Error::from(e);
                if e.is_format() {
                    state.cache.mark_unreadable(e.to_string());
                }
                return Err(e);
            }
        };
        state.index = EventIndex::from_smf(&smf);
        state.file_tempo = state.index.tempo_map();
        state.mode = SourceMode::OpenForRead;
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Stream events whose timeline time falls in `[start, start + length)`
    /// into `sink`, for a source placed at `position`.
    ///
    /// With `loop_range` the window is unwrapped time: content after the loop
    /// end repeats from the loop start, shifted by whole loop lengths. With
    /// `tracker`, sounding notes get a NoteOff one sample before each wrap.
    /// Meta events are never emitted. Returns the length read.
    #[allow(clippy::too_many_arguments)]
    pub fn read_unlocked(
        &self,
        lock: &SourceLock<'_>,
        sink: &mut dyn EventSink<Samples>,
        position: Samples,
        start: Samples,
        length: Samples,
        loop_range: Option<LoopRange>,
        mut tracker: Option<&mut MidiStateTracker<Samples>>,
        filter: Option<&dyn EventFilter>,
    ) -> Result<Samples> {
        let state = self.state(lock)?;
        if state.mode == SourceMode::Closed {
            return Err(Error::state("read requires an open source"));
        }
        let tempo = self.effective_tempo(state);
        let conv = TimeConverter::new(&tempo, self.config.sample_rate, position)?;

        let end = start + length;
        let mut cursor = start;
        while cursor < end {
            let (segment_end, shift, wraps) = match loop_range {
                None => (end, 0, false),
                Some(lp) if cursor < lp.end() => (lp.end().min(end), 0, lp.end() <= end),
                Some(lp) => {
                    let n = lp.iteration(cursor).unwrap_or(0);
                    let next = lp.iteration_start(n + 1);
                    (next.min(end), n * lp.length().0, next <= end)
                }
            };
            read_segment(
                state,
                &conv,
                sink,
                Samples(cursor.0 - shift),
                Samples(segment_end.0 - shift),
                shift,
                tracker.as_deref_mut(),
                filter,
            );
            if wraps {
                if let Some(tracker) = tracker.as_deref_mut() {
                    let at = Samples(segment_end.0 - 1);
                    for off in tracker.resolve(StuckNoteOption::Force { velocity: 0 }, at) {
                        sink.write(off);
                    }
                }
            }
            cursor = segment_end;
        }
        Ok(length)
    }

    /// Events in `[start, start + length)` beats. Returns how many were written.
    pub fn read_beats(
        &self,
        lock: &SourceLock<'_>,
        sink: &mut dyn EventSink<Beats>,
        start: Beats,
        length: Beats,
    ) -> Result<usize> {
        let state = self.state(lock)?;
        if state.mode == SourceMode::Closed {
            return Err(Error::state("read requires an open source"));
        }
        let ppqn = state.index.ppqn();
        let end = start + length;
        let (lo, hi) = tick_window(start, end, ppqn);
        let mut written = 0;
        for event in state.index.range(lo, hi) {
            let time = Beats::from_ticks(event.tick, ppqn);
            if time < start {
                continue;
            }
            if time >= end {
                break;
            }
            let Some(bytes) = event.message.wire_bytes() else {
                continue;
            };
            if let Ok(out) = MidiEvent::from_bytes(time, &bytes) {
                sink.write(out);
                written += 1;
            }
        }
        Ok(written)
    }

    pub fn length(&self, lock: &SourceLock<'_>) -> Result<Beats> {
        Ok(self.state(lock)?.index.length())
    }

    /// Length in samples for a source placed at `position`.
    pub fn duration(&self, lock: &SourceLock<'_>, position: Samples) -> Result<Samples> {
        let state = self.state(lock)?;
        let tempo = self.effective_tempo(state);
        let conv = TimeConverter::new(&tempo, self.config.sample_rate, position)?;
        Ok(conv.to_samples(state.index.length()).saturating_sub(position))
    }

    /// The file's own tempo map if it has one, otherwise the session map.
    pub fn tempo_map(&self, lock: &SourceLock<'_>) -> Result<TempoMapRef> {
        let state = self.state(lock)?;
        Ok(TempoMapRef {
            map: self.effective_tempo(state),
            provided_by_file: state.file_tempo.is_some(),
        })
    }

    /// Sounding notes of the active session, or the notes left open by the
    /// last finalize.
    pub fn stuck_notes(&self, lock: &SourceLock<'_>) -> Result<Vec<StuckNote<Beats>>> {
        let state = self.state(lock)?;
        Ok(match (&state.session, &state.report) {
            (Some(session), _) => session.tracker.stuck_notes(),
            (None, Some(report)) => report.open.clone(),
            (None, None) => Vec::new(),
        })
    }

    // =========================================================================
    // Model cache
    // =========================================================================

    /// Build the model if absent, stale, or when `force` is set.
    pub fn load(&self, lock: &mut SourceLock<'_>, force: bool) -> Result<()> {
        let state = self.state_mut(lock)?;
        state.check_readable()?;

        if state.mode == SourceMode::OpenForWrite {
            if let Some(model) = state.cache.model() {
                if !force && !state.model_lags {
                    return Ok(());
                }
                if !force && model.is_dirty() {
                    return Err(Error::state(
                        "model has unsaved edits and lags the recording",
                    ));
                }
            }
            state.cache.set(MidiModel::from_index(&state.index), None);
            state.model_lags = false;
            return Ok(());
        }

        if state.fresh {
            return Err(Error::state("source has no file yet"));
        }
        let stamp = FileStamp::of(&self.path)?;
        if !force {
            if let Some(model) = state.cache.model() {
                if state.cache.stamp() == Some(stamp) {
                    return Ok(());
                }
                if model.is_dirty() {
                    return Err(Error::state(
                        "file changed on disk while the model has unsaved edits",
                    ));
                }
            }
        }

        let smf = match Smf::load(&self.path) {
            Ok(smf) => smf,
            Err(e) => {
                let e = Error::from(e);
                if e.is_format() {
                    warn!("Marking {:?} unreadable: {}", self.path, e);
                    state.cache.mark_unreadable(e.to_string());
                }
                return Err(e);
            }
        };
        let index = EventIndex::from_smf(&smf);
        state.cache.set(MidiModel::from_index(&index), Some(stamp));
        state.file_tempo = index.tempo_map();
        state.index = index;
        debug!("Loaded model for {:?}", self.path);
        Ok(())
    }

    pub fn unload(&self, lock: &mut SourceLock<'_>) -> Result<()> {
        let state = self.state_mut(lock)?;
        if state.cache.unload() {
            warn!("Discarding unsaved model edits for {:?}", self.path);
        }
        state.model_lags = false;
        Ok(())
    }

    pub fn model<'l>(&self, lock: &'l SourceLock<'_>) -> Result<&'l MidiModel> {
        let state = self.state(lock)?;
        state.check_readable()?;
        state
            .cache
            .model()
            .ok_or_else(|| Error::state("model not loaded"))
    }

    pub fn model_mut<'l>(&self, lock: &'l mut SourceLock<'_>) -> Result<&'l mut MidiModel> {
        let state = self.state_mut(lock)?;
        state.check_readable()?;
        state
            .cache
            .model_mut()
            .ok_or_else(|| Error::state("model not loaded"))
    }

    /// Write the model back to the file and rebuild the index from it.
    pub fn save_model(&self, lock: &mut SourceLock<'_>) -> Result<()> {
        if !self.is_writable() {
            return Err(Error::state("external sources are read-only"));
        }
        let state = self.state_mut(lock)?;
        state.check_readable()?;
        if state.mode == SourceMode::OpenForWrite {
            return Err(Error::state("cannot save the model while recording"));
        }
        let Some(model) = state.cache.model() else {
            return Err(Error::state("model not loaded"));
        };

        let index = EventIndex::from_events(model.ppqn(), model.to_events(), state.index.end_tick());
        let bytes = miditape_smf::encode(&index.to_smf()?)?;
        write_replacing(&self.path, &bytes)?;

        state.file_tempo = index.tempo_map();
        state.index = index;
        if let Some(model) = state.cache.model_mut() {
            model.mark_clean();
        }
        state.cache.set_stamp(Some(FileStamp::of(&self.path)?));
        debug!("Saved model to {:?} ({} bytes)", self.path, bytes.len());
        Ok(())
    }

    /// Forget the model and clear an unreadable mark.
    pub fn reset(&self, lock: &mut SourceLock<'_>) -> Result<()> {
        let state = self.state_mut(lock)?;
        state.cache.reset();
        state.model_lags = false;
        Ok(())
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Release the file. An open write session is finalized with `Silence`.
    pub fn close(&self) {
        let mut lock = self.lock();
        if lock.guard.mode == SourceMode::OpenForWrite {
            warn!(
                "Closing {:?} with an open write session; finalizing with Silence",
                self.path
            );
            if let Err(e) =
                self.mark_midi_streaming_write_completed(&mut lock, StuckNoteOption::Silence, None)
            {
                warn!("Implicit finalize of {:?} failed: {}", self.path, e);
                lock.guard.session = None;
                lock.guard.mode = SourceMode::Closed;
            }
        }
        let state = &mut *lock.guard;
        if state.cache.unload() {
            warn!("Discarding unsaved model edits for {:?}", self.path);
        }
        state.model_lags = false;
        state.mode = SourceMode::Closed;
    }
}

impl Drop for MidiSource {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for MidiSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidiSource")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl FileBacked for MidiSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn origin(&self) -> Origin {
        self.origin
    }
}

impl MidiTimeSeries for MidiSource {
    fn length(&self, lock: &SourceLock<'_>) -> Result<Beats> {
        MidiSource::length(self, lock)
    }

    fn read_range(
        &self,
        lock: &SourceLock<'_>,
        sink: &mut dyn EventSink<Beats>,
        start: Beats,
        length: Beats,
    ) -> Result<usize> {
        self.read_beats(lock, sink, start, length)
    }
}

/// Tick bounds wide enough to hold every event in `[start, end)` beats.
fn tick_window(start: Beats, end: Beats, ppqn: u16) -> (u64, u64) {
    let lo = (start.0 * ppqn as f64).floor().max(0.0) as u64;
    let hi = (end.0 * ppqn as f64).ceil().max(0.0) as u64 + 1;
    (lo, hi)
}

/// Emit events whose content time is in `[from, to)`, shifted by `shift`.
#[allow(clippy::too_many_arguments)]
fn read_segment(
    state: &SourceState,
    conv: &TimeConverter<'_>,
    sink: &mut dyn EventSink<Samples>,
    from: Samples,
    to: Samples,
    shift: u64,
    mut tracker: Option<&mut MidiStateTracker<Samples>>,
    filter: Option<&dyn EventFilter>,
) {
    let ppqn = state.index.ppqn();
    let (lo, hi) = tick_window(conv.to_beats(from), conv.to_beats(to), ppqn);
    for event in state.index.range(lo, hi) {
        let time = conv.to_samples(Beats::from_ticks(event.tick, ppqn));
        if time < from {
            continue;
        }
        if time >= to {
            break;
        }
        let Some(bytes) = event.message.wire_bytes() else {
            continue;
        };
        if filter.is_some_and(|f| !f.accept(&bytes)) {
            continue;
        }
        let Ok(out) = MidiEvent::from_bytes(Samples(time.0 + shift), &bytes) else {
            continue;
        };
        if let Some(tracker) = tracker.as_deref_mut() {
            tracker.observe(&out);
        }
        sink.write(out);
    }
}

/// Replace `path` with `bytes` through a synced temporary file.
fn write_replacing(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("mid.tmp");
    let mut file = std::fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_data()?;
    drop(file);
    std::fs::rename(&tmp, path)
}
