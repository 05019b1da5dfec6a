//! Per (channel, note) sounding state for boundary resolution.

use crate::config::{NoteMode, StuckNoteOption};
use miditape_core::event::{CC_ALL_NOTES_OFF, CC_ALL_SOUND_OFF, CONTROL_CHANGE, NOTE_OFF, NOTE_ON};
use miditape_core::{MidiEvent, TimeValue};

const CHANNELS: usize = 16;
const NOTES: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteState<T> {
    Off,
    On { onset: T, velocity: u8 },
}

/// A note that is on with no matching NoteOff yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StuckNote<T> {
    pub channel: u8,
    pub note: u8,
    pub onset: T,
    pub velocity: u8,
}

#[derive(Debug, Clone)]
pub struct MidiStateTracker<T: TimeValue> {
    states: Box<[NoteState<T>]>,
    active: usize,
    mode: NoteMode,
}

impl<T: TimeValue> MidiStateTracker<T> {
    pub fn new() -> Self {
        Self::with_mode(NoteMode::Sustained)
    }

    pub fn with_mode(mode: NoteMode) -> Self {
        Self {
            states: vec![NoteState::Off; CHANNELS * NOTES].into_boxed_slice(),
            active: 0,
            mode,
        }
    }

    #[inline]
    pub fn mode(&self) -> NoteMode {
        self.mode
    }

    #[inline]
    fn slot(channel: u8, note: u8) -> usize {
        (channel as usize & 0x0F) * NOTES + (note as usize & 0x7F)
    }

    pub fn observe(&mut self, event: &MidiEvent<T>) {
        self.observe_bytes(event.time, event.bytes());
    }

    /// Same as [`observe`](Self::observe) for raw wire bytes.
    pub fn observe_bytes(&mut self, time: T, bytes: &[u8]) {
        if bytes.len() < 3 {
            return;
        }
        let channel = bytes[0] & 0x0F;
        match bytes[0] & 0xF0 {
            NOTE_ON if bytes[2] > 0 => {
                if self.mode == NoteMode::Percussive {
                    return;
                }
                let slot = &mut self.states[Self::slot(channel, bytes[1])];
                // retrigger keeps the original onset
                if *slot == NoteState::Off {
                    *slot = NoteState::On {
                        onset: time,
                        velocity: bytes[2],
                    };
                    self.active += 1;
                }
            }
            NOTE_ON | NOTE_OFF => {
                let slot = &mut self.states[Self::slot(channel, bytes[1])];
                if *slot != NoteState::Off {
                    *slot = NoteState::Off;
                    self.active -= 1;
                }
            }
            CONTROL_CHANGE if matches!(bytes[1], CC_ALL_NOTES_OFF | CC_ALL_SOUND_OFF) => {
                self.clear_channel(channel);
            }
            _ => {}
        }
    }

    fn clear_channel(&mut self, channel: u8) {
        let base = Self::slot(channel, 0);
        for slot in &mut self.states[base..base + NOTES] {
            if *slot != NoteState::Off {
                *slot = NoteState::Off;
                self.active -= 1;
            }
        }
    }

    #[inline]
    pub fn state(&self, channel: u8, note: u8) -> NoteState<T> {
        self.states[Self::slot(channel, note)]
    }

    #[inline]
    pub fn is_on(&self, channel: u8, note: u8) -> bool {
        self.state(channel, note) != NoteState::Off
    }

    #[inline]
    pub fn active_count(&self) -> usize {
        self.active
    }

    /// Sounding notes ordered by channel, then note.
    pub fn stuck_notes(&self) -> Vec<StuckNote<T>> {
        if self.active == 0 {
            return Vec::new();
        }
        self.states
            .iter()
            .enumerate()
            .filter_map(|(i, state)| match *state {
                NoteState::On { onset, velocity } => Some(StuckNote {
                    channel: (i / NOTES) as u8,
                    note: (i % NOTES) as u8,
                    onset,
                    velocity,
                }),
                NoteState::Off => None,
            })
            .collect()
    }

    /// Apply `option` at time `at`, returning events to emit.
    ///
    /// `Force` yields one NoteOff per sounding note and clears them, `Silence`
    /// only clears, `Extend` leaves the state untouched.
    pub fn resolve(&mut self, option: StuckNoteOption, at: T) -> Vec<MidiEvent<T>> {
        match option {
            StuckNoteOption::Extend => Vec::new(),
            StuckNoteOption::Silence => {
                self.reset();
                Vec::new()
            }
            StuckNoteOption::Force { velocity } => {
                let events = self
                    .stuck_notes()
                    .into_iter()
                    .map(|n| MidiEvent::note_off(at, n.channel, n.note, velocity))
                    .collect();
                self.reset();
                events
            }
        }
    }

    pub fn reset(&mut self) {
        if self.active > 0 {
            self.states.fill(NoteState::Off);
            self.active = 0;
        }
    }
}

impl<T: TimeValue> Default for MidiStateTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}
