//! Time-stamped MIDI events.

use crate::error::{Error, Result};
use crate::time::TimeValue;
use smallvec::SmallVec;

pub const NOTE_OFF: u8 = 0x80;
pub const NOTE_ON: u8 = 0x90;
pub const POLY_PRESSURE: u8 = 0xA0;
pub const CONTROL_CHANGE: u8 = 0xB0;
pub const PROGRAM_CHANGE: u8 = 0xC0;
pub const CHANNEL_PRESSURE: u8 = 0xD0;
pub const PITCH_BEND: u8 = 0xE0;
pub const SYSEX_START: u8 = 0xF0;
pub const SYSEX_END: u8 = 0xF7;

pub const CC_ALL_SOUND_OFF: u8 = 120;
pub const CC_ALL_NOTES_OFF: u8 = 123;

/// Wire bytes of one MIDI message; 3 bytes inline.
pub type MidiBytes = SmallVec<[u8; 3]>;

/// Length in bytes (status included) of a channel message, `None` for
/// anything that is not a channel status byte.
#[inline]
pub fn channel_message_length(status: u8) -> Option<usize> {
    match status & 0xF0 {
        NOTE_OFF | NOTE_ON | POLY_PRESSURE | CONTROL_CHANGE | PITCH_BEND => Some(3),
        PROGRAM_CHANGE | CHANNEL_PRESSURE => Some(2),
        _ => None,
    }
}

/// A MIDI message stamped with a time in exactly one domain.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiEvent<T: TimeValue> {
    pub time: T,
    bytes: MidiBytes,
}

impl<T: TimeValue> MidiEvent<T> {
    /// Build from raw wire bytes, validating the status byte and length.
    ///
    /// Accepts channel messages and complete SysEx (`F0 .. F7`).
    pub fn from_bytes(time: T, bytes: &[u8]) -> Result<Self> {
        let Some(&status) = bytes.first() else {
            return Err(Error::InvalidMessage("empty message".into()));
        };
        if status < 0x80 {
            return Err(Error::InvalidMessage(format!(
                "missing status byte (first byte 0x{status:02X})"
            )));
        }
        if status == SYSEX_START {
            if bytes.len() < 2 || bytes[bytes.len() - 1] != SYSEX_END {
                return Err(Error::InvalidMessage("unterminated SysEx".into()));
            }
        } else {
            let Some(expected) = channel_message_length(status) else {
                return Err(Error::InvalidMessage(format!(
                    "unsupported status byte 0x{status:02X}"
                )));
            };
            if bytes.len() != expected {
                return Err(Error::InvalidMessage(format!(
                    "status 0x{status:02X} needs {expected} bytes, got {}",
                    bytes.len()
                )));
            }
        }
        let data_end = if status == SYSEX_START {
            bytes.len() - 1
        } else {
            bytes.len()
        };
        if bytes[1..data_end].iter().any(|b| *b >= 0x80) {
            return Err(Error::InvalidMessage("data byte with high bit set".into()));
        }
        Ok(Self {
            time,
            bytes: MidiBytes::from_slice(bytes),
        })
    }

    #[inline]
    fn channel_message(time: T, status: u8, channel: u8, data: &[u8]) -> Self {
        let mut bytes = MidiBytes::new();
        bytes.push(status | (channel & 0x0F));
        bytes.extend(data.iter().map(|b| b & 0x7F));
        Self { time, bytes }
    }

    #[inline]
    pub fn note_on(time: T, channel: u8, note: u8, velocity: u8) -> Self {
        Self::channel_message(time, NOTE_ON, channel, &[note, velocity])
    }

    #[inline]
    pub fn note_off(time: T, channel: u8, note: u8, velocity: u8) -> Self {
        Self::channel_message(time, NOTE_OFF, channel, &[note, velocity])
    }

    #[inline]
    pub fn control_change(time: T, channel: u8, controller: u8, value: u8) -> Self {
        Self::channel_message(time, CONTROL_CHANGE, channel, &[controller, value])
    }

    #[inline]
    pub fn program_change(time: T, channel: u8, program: u8) -> Self {
        Self::channel_message(time, PROGRAM_CHANGE, channel, &[program])
    }

    /// `bend` is centered on 8192.
    #[inline]
    pub fn pitch_bend(time: T, channel: u8, bend: u16) -> Self {
        Self::channel_message(
            time,
            PITCH_BEND,
            channel,
            &[(bend & 0x7F) as u8, ((bend >> 7) & 0x7F) as u8],
        )
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn status(&self) -> u8 {
        self.bytes[0]
    }

    /// Status nibble for channel messages (`0x80`..`0xE0`).
    #[inline]
    pub fn kind(&self) -> u8 {
        self.status() & 0xF0
    }

    #[inline]
    pub fn is_channel_message(&self) -> bool {
        channel_message_length(self.status()).is_some()
    }

    #[inline]
    pub fn channel(&self) -> Option<u8> {
        self.is_channel_message().then(|| self.status() & 0x0F)
    }

    #[inline]
    pub fn is_sysex(&self) -> bool {
        self.status() == SYSEX_START
    }

    #[inline]
    pub fn is_note_on(&self) -> bool {
        self.kind() == NOTE_ON && self.bytes[2] > 0
    }

    /// NoteOff, or NoteOn with velocity 0.
    #[inline]
    pub fn is_note_off(&self) -> bool {
        self.kind() == NOTE_OFF || (self.kind() == NOTE_ON && self.bytes[2] == 0)
    }

    #[inline]
    pub fn note(&self) -> Option<u8> {
        matches!(self.kind(), NOTE_ON | NOTE_OFF | POLY_PRESSURE).then(|| self.bytes[1])
    }

    #[inline]
    pub fn velocity(&self) -> Option<u8> {
        matches!(self.kind(), NOTE_ON | NOTE_OFF).then(|| self.bytes[2])
    }

    /// `(controller, value)` for control changes.
    #[inline]
    pub fn controller(&self) -> Option<(u8, u8)> {
        (self.kind() == CONTROL_CHANGE).then(|| (self.bytes[1], self.bytes[2]))
    }

    /// Same message at a different time, possibly in another domain.
    #[inline]
    pub fn with_time<U: TimeValue>(&self, time: U) -> MidiEvent<U> {
        MidiEvent {
            time,
            bytes: self.bytes.clone(),
        }
    }
}
