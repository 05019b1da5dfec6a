//! Recording integration tests
//!
//! Write sessions from first append to a finalized, reopened take.

use crate::helpers::*;
use miditape::prelude::*;
use miditape::smf::Smf;

/// NoteOn at beat 0 and NoteOff at beat 1 read back over [0, 2) beats.
#[test]
fn test_two_event_take() {
    let dir = tempfile::tempdir().unwrap();
    let source = recording_source(&dir.path().join("two.mid"));
    {
        let mut lock = source.lock();
        source
            .append_event_beats(&mut lock, &MidiEvent::note_on(Beats(0.0), 0, 60, 100))
            .unwrap();
        source
            .append_event_beats(&mut lock, &MidiEvent::note_off(Beats(1.0), 0, 60, 0))
            .unwrap();
    }
    let report = finish(&source, StuckNoteOption::default());
    assert_eq!(report.synthesized, 0);

    let events = read_beats(&source, 0.0, 2.0);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].bytes(), &[0x90, 60, 100]);
    assert_eq!(events[1].bytes(), &[0x80, 60, 0]);
    assert_eq!(events[1].time - events[0].time, Beats(1.0));
}

/// Two flushes without an append in between leave identical bytes.
#[test]
fn test_flush_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flush.mid");
    let source = recording_source(&path);
    let mut lock = source.lock();
    for i in 0..10 {
        source
            .append_event_beats(
                &mut lock,
                &MidiEvent::control_change(Beats(i as f64 * 0.1), 0, 74, i * 10),
            )
            .unwrap();
    }
    source.flush_midi(&mut lock).unwrap();
    let first = std::fs::read(&path).unwrap();
    source.flush_midi(&mut lock).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), first);
}

/// `Force` adds one NoteOff per sounding (channel, pitch); `Silence` adds none.
#[test]
fn test_stuck_note_policies() {
    let dir = tempfile::tempdir().unwrap();
    for (name, option, expected) in [
        ("force.mid", StuckNoteOption::Force { velocity: 0 }, 3),
        ("silence.mid", StuckNoteOption::Silence, 0),
    ] {
        let path = dir.path().join(name);
        let source = recording_source(&path);
        {
            let mut lock = source.lock();
            for (channel, note) in [(0, 60), (0, 64), (1, 60)] {
                source
                    .append_event_beats(&mut lock, &MidiEvent::note_on(Beats(0.5), channel, note, 90))
                    .unwrap();
            }
            // a retrigger on the same key is still one sounding note
            source
                .append_event_beats(&mut lock, &MidiEvent::note_on(Beats(0.75), 0, 60, 90))
                .unwrap();
            assert_eq!(source.stuck_notes(&lock).unwrap().len(), 3);
        }
        let report = finish(&source, option);
        assert_eq!(report.synthesized, expected);

        let smf = Smf::load(&path).unwrap();
        assert_eq!(smf.tracks[0].len(), 4 + expected + 1);
    }
}

/// Samples-domain appends land on the same ticks as the equivalent beats.
#[test]
fn test_samples_and_beats_agree() {
    let dir = tempfile::tempdir().unwrap();
    let by_beats = recording_source(&dir.path().join("beats.mid"));
    let by_samples = recording_source(&dir.path().join("samples.mid"));
    let start = Samples(SAMPLES_PER_BEAT * 4);
    {
        let mut a = by_beats.lock();
        let mut b = by_samples.lock();
        for k in 0..8u64 {
            by_beats
                .append_event_beats(&mut a, &MidiEvent::note_on(Beats(k as f64 * 0.5), 0, 60, 100))
                .unwrap();
            let at = Samples(start.0 + k * SAMPLES_PER_BEAT / 2);
            by_samples
                .append_event_samples(&mut b, &MidiEvent::note_on(at, 0, 60, 100), start)
                .unwrap();
        }
    }
    finish(&by_beats, StuckNoteOption::Silence);
    finish(&by_samples, StuckNoteOption::Silence);
    assert_eq!(
        std::fs::read(dir.path().join("beats.mid")).unwrap(),
        std::fs::read(dir.path().join("samples.mid")).unwrap()
    );
}

/// Interleaved appends and reads from two threads only ever see whole events.
#[test]
fn test_concurrent_reads_see_whole_events() {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    const EVENTS: u8 = 120;
    let dir = tempfile::tempdir().unwrap();
    let source = recording_source(&dir.path().join("race.mid"));
    let appended: HashSet<Vec<u8>> = (0..EVENTS)
        .map(|i| vec![0x90, i, 1 + i])
        .collect();
    let done = AtomicBool::new(false);

    std::thread::scope(|s| {
        s.spawn(|| {
            for i in 0..EVENTS {
                let mut lock = source.lock();
                let event = MidiEvent::note_on(Beats(i as f64 / 4.0), 0, i, 1 + i);
                source.append_event_beats(&mut lock, &event).unwrap();
            }
            done.store(true, Ordering::Release);
        });
        s.spawn(|| loop {
            let finished = done.load(Ordering::Acquire);
            for event in read_beats(&source, 0.0, 64.0) {
                assert!(appended.contains(event.bytes()));
            }
            if finished {
                break;
            }
        });
    });

    assert_eq!(read_beats(&source, 0.0, 64.0).len(), EVENTS as usize);
}
