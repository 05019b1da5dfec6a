//! Interop integration tests
//!
//! Byte-level compatibility with files from other SMF tools, using midly as
//! the independent implementation.

use crate::helpers::*;
use midly::num::{u15, u28, u4, u7};
use midly::{Format, Header, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use miditape::prelude::*;

/// A hand-built `format=0, ntrks=1, division=480` file.
fn division_480_file() -> Vec<u8> {
    let mut bytes = b"MThd".to_vec();
    bytes.extend_from_slice(&[0, 0, 0, 6, 0, 0, 0, 1, 0x01, 0xE0]);
    bytes.extend_from_slice(b"MTrk");
    let track = [0x00, 0x90, 60, 100, 0x83, 0x60, 0x80, 60, 0, 0x00, 0xFF, 0x2F, 0x00];
    bytes.extend_from_slice(&(track.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&track);
    bytes
}

/// The division field is decoded verbatim.
#[test]
fn test_division_decoded_verbatim() {
    let bytes = division_480_file();
    let smf = miditape::smf::decode(&bytes).unwrap();
    assert_eq!(smf.header.division, 480);
    assert_eq!(smf.header.ntrks, 1);
    assert_eq!(miditape::smf::encode(&smf).unwrap(), bytes);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("480.mid");
    std::fs::write(&path, &bytes).unwrap();
    let source = open_source(&path);
    let lock = source.lock();
    assert_eq!(source.ppqn(&lock).unwrap(), 480);
    assert_eq!(source.length(&lock).unwrap(), Beats(1.0));
}

/// A midly-written file, running status included, plays back at the right times.
#[test]
fn test_reads_midly_file() {
    let mut smf = Smf::new(Header::new(Format::SingleTrack, Timing::Metrical(u15::new(96))));
    let on = |delta: u32, key: u8| TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi {
            channel: u4::new(5),
            message: MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(64),
            },
        },
    };
    smf.tracks.push(vec![
        on(0, 60),
        on(48, 62),
        on(48, 64),
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(midly::MetaMessage::EndOfTrack),
        },
    ]);
    let mut bytes = Vec::new();
    smf.write_std(&mut bytes).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("midly.mid");
    std::fs::write(&path, &bytes).unwrap();
    let source = open_source(&path);

    let events = read_samples(&source, 0, SAMPLES_PER_BEAT * 2, None);
    let summary: Vec<(u64, Option<u8>, Option<u8>)> = events
        .iter()
        .map(|e| (e.time.0, e.channel(), e.note()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (0, Some(5), Some(60)),
            (SAMPLES_PER_BEAT / 2, Some(5), Some(62)),
            (SAMPLES_PER_BEAT, Some(5), Some(64)),
        ]
    );
}

/// A recorded take parses with midly and keeps its resolution.
#[test]
fn test_midly_reads_recorded_take() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("take.mid");
    let source = recording_source(&path);
    {
        let mut lock = source.lock();
        source
            .append_event_beats(&mut lock, &MidiEvent::note_on(Beats(0.0), 0, 60, 100))
            .unwrap();
        source
            .append_event_beats(&mut lock, &MidiEvent::pitch_bend(Beats(0.5), 0, 9000))
            .unwrap();
    }
    finish(&source, StuckNoteOption::Force { velocity: 0 });

    let bytes = std::fs::read(&path).unwrap();
    let smf = Smf::parse(&bytes).unwrap();
    assert!(matches!(smf.header.timing, Timing::Metrical(t) if t.as_int() == TEST_PPQN));
    assert_eq!(smf.tracks.len(), 1);
    // NoteOn, bend, forced NoteOff, end of track
    assert_eq!(smf.tracks[0].len(), 4);
    assert!(matches!(
        smf.tracks[0][2].kind,
        TrackEventKind::Midi {
            message: MidiMessage::NoteOff { .. },
            ..
        }
    ));
}
