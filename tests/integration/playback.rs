//! Playback integration tests
//!
//! Full-range and looped reads over recorded takes.

use crate::helpers::tolerances::{SAMPLE_TOLERANCE, TICK_EPSILON};
use crate::helpers::*;
use approx::assert_abs_diff_eq;
use miditape::prelude::*;

/// Increasing appends read back in order at their (quantized) times.
#[test]
fn test_full_range_read_is_monotonic() {
    let dir = tempfile::tempdir().unwrap();
    let source = recording_source(&dir.path().join("mono.mid"));
    let mut times = Vec::new();
    {
        let mut lock = source.lock();
        let mut t = 0.0;
        for i in 0..200u32 {
            // irregular gaps, some smaller than a tick
            t += ((i * 7919) % 13) as f64 * 0.013;
            times.push(t);
            let event = MidiEvent::control_change(Beats(t), (i % 16) as u8, 1, (i % 128) as u8);
            source.append_event_beats(&mut lock, &event).unwrap();
        }
    }
    finish(&source, StuckNoteOption::Silence);

    let events = read_beats(&source, 0.0, times[times.len() - 1] + 1.0);
    assert_eq!(events.len(), times.len());
    for (event, expected) in events.iter().zip(&times) {
        assert_abs_diff_eq!(event.time.0, *expected, epsilon = TICK_EPSILON);
    }
    assert!(events.windows(2).all(|w| w[0].time <= w[1].time));

    let samples = read_samples(&source, 0, SAMPLES_PER_BEAT * 64, None);
    assert_eq!(samples.len(), times.len());
    for (event, beats) in samples.iter().zip(&events) {
        let expected = (beats.time.0 * SAMPLES_PER_BEAT as f64).round() as u64;
        assert!(event.time.0.abs_diff(expected) <= SAMPLE_TOLERANCE);
    }
}

/// An event at t0 inside a loop of length L reappears at t0 + n*L.
#[test]
fn test_loop_iterations() {
    let dir = tempfile::tempdir().unwrap();
    let source = recording_source(&dir.path().join("loop.mid"));
    {
        let mut lock = source.lock();
        source
            .append_event_beats(&mut lock, &MidiEvent::program_change(Beats(0.25), 3, 12))
            .unwrap();
        // outside the loop body, never played while looping
        source
            .append_event_beats(&mut lock, &MidiEvent::program_change(Beats(3.0), 3, 13))
            .unwrap();
    }
    finish(&source, StuckNoteOption::Silence);

    let t0 = SAMPLES_PER_BEAT / 4;
    let l = SAMPLES_PER_BEAT * 2;
    let lp = LoopRange::new(Samples(0), Samples(l)).unwrap();
    let iterations = 5;

    let events = read_samples(&source, 0, l * iterations, Some(lp));
    let times: Vec<u64> = events.iter().map(|e| e.time.0).collect();
    let expected: Vec<u64> = (0..iterations).map(|n| t0 + n * l).collect();
    assert_eq!(times, expected);
    assert!(events.iter().all(|e| e.bytes() == [0xC3, 12]));
}

/// Reading a loop in blocks gives the same events as one large read.
#[test]
fn test_block_reads_match_single_read() {
    let dir = tempfile::tempdir().unwrap();
    let source = recording_source(&dir.path().join("blocks.mid"));
    {
        let mut lock = source.lock();
        for k in 0..8 {
            let beat = k as f64 * 0.5;
            source
                .append_event_beats(&mut lock, &MidiEvent::note_on(Beats(beat), 0, 60 + k, 100))
                .unwrap();
            source
                .append_event_beats(&mut lock, &MidiEvent::note_off(Beats(beat + 0.25), 0, 60 + k, 0))
                .unwrap();
        }
    }
    finish(&source, StuckNoteOption::Silence);

    let lp = LoopRange::new(Samples(SAMPLES_PER_BEAT), Samples(SAMPLES_PER_BEAT * 3)).unwrap();
    let total = SAMPLES_PER_BEAT * 9;
    let whole = read_samples(&source, 0, total, Some(lp));

    let block = 512;
    let mut pieces = Vec::new();
    let mut at = 0;
    while at < total {
        let n = block.min(total - at);
        pieces.extend(read_samples(&source, at, n, Some(lp)));
        at += n;
    }
    assert_eq!(whole, pieces);
    assert!(!whole.is_empty());
}

/// A NoteOn sounding at the loop end is closed just before the wrap.
#[test]
fn test_tracker_closes_notes_at_wrap() {
    let dir = tempfile::tempdir().unwrap();
    let source = recording_source(&dir.path().join("wrap.mid"));
    {
        let mut lock = source.lock();
        source
            .append_event_beats(&mut lock, &MidiEvent::note_on(Beats(0.5), 2, 72, 100))
            .unwrap();
    }
    let report = finish(&source, StuckNoteOption::Extend);
    assert_eq!(report.open.len(), 1);

    let lp = LoopRange::new(Samples(0), Samples(SAMPLES_PER_BEAT)).unwrap();
    let mut tracker = MidiStateTracker::<Samples>::new();
    let lock = source.lock();
    let mut out: Vec<MidiEvent<Samples>> = Vec::new();
    source
        .read_unlocked(
            &lock,
            &mut out,
            Samples(0),
            Samples(0),
            Samples(SAMPLES_PER_BEAT * 2),
            Some(lp),
            Some(&mut tracker),
            None,
        )
        .unwrap();
    let offs: Vec<u64> = out
        .iter()
        .filter(|e| e.is_note_off())
        .map(|e| e.time.0)
        .collect();
    assert_eq!(offs, vec![SAMPLES_PER_BEAT - 1, SAMPLES_PER_BEAT * 2 - 1]);
}
