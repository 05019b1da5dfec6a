//! Test helpers and fixtures for miditape integration tests
//!
//! ## Tolerance Levels
//!
//! Use the appropriate tolerance from [`tolerances`] module:
//! - `TICK_EPSILON`: beats lost to tick quantization at `TEST_PPQN`
//! - `SAMPLE_TOLERANCE`: samples lost to rounding in beat/sample conversion

#![allow(dead_code)]

pub mod tolerances;

use miditape::prelude::*;
use std::path::Path;

/// Default test sample rate (matches common hardware)
pub const TEST_SAMPLE_RATE: f64 = 48000.0;

/// File resolution for recorded fixtures
pub const TEST_PPQN: u16 = 480;

/// Tempo of the session map; one beat is 24000 samples at `TEST_SAMPLE_RATE`
pub const TEST_BPM: f64 = 120.0;

pub const SAMPLES_PER_BEAT: u64 = 24000;

pub fn test_config() -> SourceConfig {
    SourceConfig::builder()
        .sample_rate(TEST_SAMPLE_RATE)
        .ppqn(TEST_PPQN)
        .build()
        .expect("Failed to build test config")
}

/// A fresh source with an open write session.
pub fn recording_source(path: &Path) -> MidiSource {
    let source = MidiSource::create(
        path,
        Origin::Internal,
        test_config(),
        shared_tempo_map(TempoMap::new(TEST_BPM)),
    )
    .expect("Failed to create source");
    {
        let mut lock = source.lock();
        source
            .mark_streaming_midi_write_started(&mut lock, NoteMode::Sustained)
            .expect("Failed to start write session");
    }
    source
}

/// Open an existing file against the test session map.
pub fn open_source(path: &Path) -> MidiSource {
    MidiSource::open(
        path,
        Origin::Internal,
        test_config(),
        shared_tempo_map(TempoMap::new(TEST_BPM)),
    )
    .expect("Failed to open source")
}

/// Every event in `[start, start + length)` beats.
pub fn read_beats(source: &MidiSource, start: f64, length: f64) -> Vec<MidiEvent<Beats>> {
    let lock = source.lock();
    let mut out: Vec<MidiEvent<Beats>> = Vec::new();
    source
        .read_beats(&lock, &mut out, Beats(start), Beats(length))
        .expect("beats read failed");
    out
}

/// Every event in `[start, start + length)` samples for a source at sample 0.
pub fn read_samples(
    source: &MidiSource,
    start: u64,
    length: u64,
    loop_range: Option<LoopRange>,
) -> Vec<MidiEvent<Samples>> {
    let lock = source.lock();
    let mut out: Vec<MidiEvent<Samples>> = Vec::new();
    source
        .read_unlocked(
            &lock,
            &mut out,
            Samples(0),
            Samples(start),
            Samples(length),
            loop_range,
            None,
            None,
        )
        .expect("sample read failed");
    out
}

/// Finalize with `option`, then reopen the take for reading.
pub fn finish(source: &MidiSource, option: StuckNoteOption) -> miditape::FinalizeReport {
    let mut lock = source.lock();
    let report = source
        .mark_midi_streaming_write_completed(&mut lock, option, None)
        .expect("finalize failed");
    source.open_for_read(&mut lock).expect("reopen failed");
    report
}
