//! Recording workflows: write sessions, flushing and finalization.

use miditape_core::{Beats, MidiEvent, Samples, TempoMap};
use miditape_smf::Smf;
use miditape_source::{
    capture_channel, shared_tempo_map, MidiSource, NoteMode, Origin, SourceConfig, SourceMode,
    StuckNoteOption,
};
use std::path::Path;

/// Route `debug!`/`warn!` output to the test harness.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn config() -> SourceConfig {
    SourceConfig::builder()
        .sample_rate(48000.0)
        .ppqn(480)
        .build()
        .unwrap()
}

fn recording_source(path: &Path) -> MidiSource {
    let source = MidiSource::create(
        path,
        Origin::Internal,
        config(),
        shared_tempo_map(TempoMap::new(120.0)),
    )
    .unwrap();
    {
        let mut lock = source.lock();
        source
            .mark_streaming_midi_write_started(&mut lock, NoteMode::Sustained)
            .unwrap();
    }
    source
}

fn on(beat: f64, note: u8) -> MidiEvent<Beats> {
    MidiEvent::note_on(Beats(beat), 0, note, 100)
}

fn off(beat: f64, note: u8) -> MidiEvent<Beats> {
    MidiEvent::note_off(Beats(beat), 0, note, 0)
}

fn file_events(path: &Path) -> Vec<(u32, Vec<u8>)> {
    let smf = Smf::load(path).unwrap();
    smf.tracks[0]
        .iter()
        .map(|e| {
            let bytes = e
                .message
                .wire_bytes()
                .map(|b| b.to_vec())
                .unwrap_or_default();
            (e.delta, bytes)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Streaming writes
// ---------------------------------------------------------------------------

#[test]
fn test_file_valid_after_each_flush() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("take.mid");
    let source = recording_source(&path);
    let mut lock = source.lock();

    source.append_event_beats(&mut lock, &on(0.0, 60)).unwrap();
    source.flush_midi(&mut lock).unwrap();
    assert_eq!(file_events(&path).len(), 2);

    source.append_event_beats(&mut lock, &off(1.0, 60)).unwrap();
    source.append_event_beats(&mut lock, &on(1.5, 62)).unwrap();
    source.flush_midi(&mut lock).unwrap();
    let events = file_events(&path);
    assert_eq!(events.len(), 4);
    assert_eq!(events[1], (480, vec![0x80, 60, 0]));
    assert_eq!(events[2], (240, vec![0x90, 62, 100]));
}

#[test]
fn test_flush_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("idem.mid");
    let source = recording_source(&path);
    let mut lock = source.lock();

    source.append_event_beats(&mut lock, &on(0.25, 64)).unwrap();
    source.flush_midi(&mut lock).unwrap();
    let first = std::fs::read(&path).unwrap();
    source.flush_midi(&mut lock).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), first);
    assert!(!source.health().degraded);
}

#[test]
fn test_equal_times_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let source = recording_source(&dir.path().join("chord.mid"));
    let mut lock = source.lock();
    for note in [60, 64, 67] {
        source.append_event_beats(&mut lock, &on(2.0, note)).unwrap();
    }
    assert_eq!(source.event_count(&lock).unwrap(), 3);
    assert_eq!(source.length(&lock).unwrap(), Beats(2.0));
}

#[test]
fn test_samples_append_converts_to_beats() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("samples.mid");
    let source = recording_source(&path);
    let mut lock = source.lock();
    let start = Samples(48000);

    // 120 bpm at 48 kHz: one beat is 24000 samples
    source
        .append_event_samples(&mut lock, &MidiEvent::note_on(Samples(48000), 0, 60, 100), start)
        .unwrap();
    source
        .append_event_samples(&mut lock, &MidiEvent::note_off(Samples(72000), 0, 60, 0), start)
        .unwrap();
    let err = source
        .append_event_samples(&mut lock, &MidiEvent::note_on(Samples(47999), 0, 61, 100), start)
        .unwrap_err();
    assert!(err.is_order());

    source.flush_midi(&mut lock).unwrap();
    let events = file_events(&path);
    assert_eq!(events[0].0, 0);
    assert_eq!(events[1].0, 480);
}

#[test]
fn test_realtime_capture_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rt.mid");
    let source = recording_source(&path);
    let (mut producer, mut consumer) = capture_channel(64);

    for i in 0..8u64 {
        producer.push_event(&MidiEvent::note_on(Samples(i * 6000), 9, 36, 120));
    }
    let mut lock = source.lock();
    let written = source.write_unlocked(&mut lock, &mut consumer, Samples(0), Samples(24000));
    assert_eq!(written, 4);
    let written = source.write_unlocked(&mut lock, &mut consumer, Samples(0), Samples(48000));
    assert_eq!(written, 4);
    assert!(source.take_write_errors(&mut lock).unwrap().is_empty());

    source.flush_midi(&mut lock).unwrap();
    let events = file_events(&path);
    // 6000 samples = a quarter beat = 120 ticks
    assert_eq!(events.len(), 9);
    assert!(events[1..8].iter().all(|(delta, _)| *delta == 120));
}

// ---------------------------------------------------------------------------
// Finalization and stuck notes
// ---------------------------------------------------------------------------

#[test]
fn test_force_synthesizes_one_note_off_per_note() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("force.mid");
    let source = recording_source(&path);
    let mut lock = source.lock();

    source.append_event_beats(&mut lock, &on(0.0, 60)).unwrap();
    source.append_event_beats(&mut lock, &on(0.5, 64)).unwrap();
    source.append_event_beats(&mut lock, &off(1.0, 64)).unwrap();
    source.append_event_beats(&mut lock, &on(1.0, 67)).unwrap();
    assert_eq!(source.stuck_notes(&lock).unwrap().len(), 2);

    let report = source
        .mark_midi_streaming_write_completed(&mut lock, StuckNoteOption::Force { velocity: 0 }, None)
        .unwrap();
    assert_eq!(report.synthesized, 2);
    assert_eq!(report.stuck.len(), 2);
    assert!(report.open.is_empty());
    assert_eq!(source.mode(&lock).unwrap(), SourceMode::Closed);
    assert!(source.stuck_notes(&lock).unwrap().is_empty());

    let events = file_events(&path);
    let note_offs: Vec<_> = events
        .iter()
        .filter(|(_, b)| b.first().is_some_and(|s| s & 0xF0 == 0x80))
        .collect();
    assert_eq!(note_offs.len(), 3);
    assert_eq!(events.last().unwrap().1, Vec::<u8>::new());
}

#[test]
fn test_silence_leaves_notes_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("silence.mid");
    let source = recording_source(&path);
    let mut lock = source.lock();

    source.append_event_beats(&mut lock, &on(0.0, 60)).unwrap();
    let stuck = source.stuck_notes(&lock).unwrap();
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0].note, 60);

    let report = source
        .mark_midi_streaming_write_completed(&mut lock, StuckNoteOption::Silence, None)
        .unwrap();
    assert_eq!(report.synthesized, 0);
    assert_eq!(report.stuck.len(), 1);
    assert_eq!(file_events(&path).len(), 2);
}

#[test]
fn test_extend_reports_open_notes() {
    let dir = tempfile::tempdir().unwrap();
    let source = recording_source(&dir.path().join("extend.mid"));
    let mut lock = source.lock();

    source.append_event_beats(&mut lock, &on(0.0, 48)).unwrap();
    let report = source
        .mark_midi_streaming_write_completed(&mut lock, StuckNoteOption::Extend, None)
        .unwrap();
    assert_eq!(report.synthesized, 0);
    assert_eq!(report.open.len(), 1);
    assert_eq!(source.stuck_notes(&lock).unwrap()[0].note, 48);
}

#[test]
fn test_truncating_finalize() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cut.mid");
    let source = recording_source(&path);
    let mut lock = source.lock();

    source.append_event_beats(&mut lock, &on(0.0, 60)).unwrap();
    source.append_event_beats(&mut lock, &on(1.0, 62)).unwrap();
    source.append_event_beats(&mut lock, &off(3.0, 60)).unwrap();
    source.append_event_beats(&mut lock, &off(3.0, 62)).unwrap();
    source.flush_midi(&mut lock).unwrap();

    let report = source
        .mark_midi_streaming_write_completed(
            &mut lock,
            StuckNoteOption::Force { velocity: 0 },
            Some(Beats(2.0)),
        )
        .unwrap();
    assert_eq!(report.truncated_at, Some(Beats(2.0)));
    assert_eq!(report.synthesized, 2);
    assert_eq!(report.length, Beats(2.0));
    assert_eq!(source.length(&lock).unwrap(), Beats(2.0));

    let events = file_events(&path);
    assert_eq!(
        events,
        vec![
            (0, vec![0x90, 60, 100]),
            (480, vec![0x90, 62, 100]),
            (480, vec![0x80, 60, 0]),
            (0, vec![0x80, 62, 0]),
            (0, vec![]),
        ]
    );
}

#[test]
fn test_length_only_finalize() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain.mid");
    let source = recording_source(&path);
    let mut lock = source.lock();

    source.append_event_beats(&mut lock, &on(0.0, 60)).unwrap();
    let report = source.mark_streaming_write_completed(&mut lock).unwrap();
    assert_eq!(report.option, None);
    assert_eq!(report.open.len(), 1);
    assert!(source
        .append_event_beats(&mut lock, &on(1.0, 61))
        .unwrap_err()
        .is_state());

    source.open_for_read(&mut lock).unwrap();
    assert_eq!(source.mode(&lock).unwrap(), SourceMode::OpenForRead);
    assert_eq!(source.event_count(&lock).unwrap(), 1);
}

#[test]
fn test_percussive_mode_has_no_stuck_notes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("drums.mid");
    let source = MidiSource::create(
        &path,
        Origin::Internal,
        config(),
        shared_tempo_map(TempoMap::default()),
    )
    .unwrap();
    let mut lock = source.lock();
    source
        .mark_streaming_midi_write_started(&mut lock, NoteMode::Percussive)
        .unwrap();
    source
        .append_event_beats(&mut lock, &MidiEvent::note_on(Beats(0.0), 9, 36, 127))
        .unwrap();
    let report = source
        .mark_midi_streaming_write_completed(&mut lock, StuckNoteOption::Force { velocity: 0 }, None)
        .unwrap();
    assert_eq!(report.synthesized, 0);
}

#[test]
fn test_external_source_cannot_record() {
    let dir = tempfile::tempdir().unwrap();
    let source = MidiSource::create(
        dir.path().join("ext.mid"),
        Origin::External,
        config(),
        shared_tempo_map(TempoMap::default()),
    )
    .unwrap();
    let mut lock = source.lock();
    assert!(source
        .mark_streaming_midi_write_started(&mut lock, NoteMode::Sustained)
        .unwrap_err()
        .is_state());
}

// ---------------------------------------------------------------------------
// Model during recording
// ---------------------------------------------------------------------------

#[test]
fn test_model_follows_locked_appends() {
    let dir = tempfile::tempdir().unwrap();
    let source = recording_source(&dir.path().join("model.mid"));
    let mut lock = source.lock();

    source.load(&mut lock, false).unwrap();
    source.append_event_beats(&mut lock, &on(0.0, 60)).unwrap();
    source.append_event_beats(&mut lock, &off(0.5, 60)).unwrap();
    assert_eq!(source.model(&lock).unwrap().notes().len(), 1);
}

#[test]
fn test_model_catches_up_after_realtime_writes() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let source = recording_source(&dir.path().join("lag.mid"));
    let (mut producer, mut consumer) = capture_channel(8);
    let mut lock = source.lock();
    source.load(&mut lock, false).unwrap();

    producer.push_event(&MidiEvent::note_on(Samples(0), 0, 60, 100));
    producer.push_event(&MidiEvent::note_off(Samples(12000), 0, 60, 0));
    assert_eq!(
        source.write_unlocked(&mut lock, &mut consumer, Samples(0), Samples(48000)),
        2
    );
    assert!(source.model(&lock).unwrap().notes().is_empty());

    source.load(&mut lock, false).unwrap();
    let model = source.model(&lock).unwrap();
    assert_eq!(model.notes().len(), 1);
    assert_eq!(model.notes()[0].length, Beats(0.5));
}
