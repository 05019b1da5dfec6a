//! Track event payloads.

use crate::error::{Error, Result};
use smallvec::SmallVec;

pub const META: u8 = 0xFF;
pub const SYSEX: u8 = 0xF0;
pub const ESCAPE: u8 = 0xF7;

pub const META_END_OF_TRACK: u8 = 0x2F;
pub const META_TEMPO: u8 = 0x51;
pub const META_TIME_SIGNATURE: u8 = 0x58;

/// Largest tempo a `FF 51` event can carry.
pub const MAX_TEMPO_US: u32 = 0xFF_FFFF;

/// Wire length (status included) of a channel or system message.
///
/// SysEx and meta events are length-prefixed in files and return `None`, as do
/// undefined statuses (`F4`, `F5`, `FD`) and data bytes.
pub fn message_length(status: u8) -> Option<usize> {
    match status {
        0x80..=0xBF | 0xE0..=0xEF => Some(3),
        0xC0..=0xDF => Some(2),
        0xF1 | 0xF3 => Some(2),
        0xF2 => Some(3),
        0xF6 | 0xF8 | 0xF9 | 0xFA | 0xFB | 0xFC | 0xFE => Some(1),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmfMessage {
    /// Channel, system-common or realtime message with its status byte.
    Midi(SmallVec<[u8; 3]>),
    /// `F0` event. Holds the length-prefixed payload, normally ending in `F7`.
    SysEx(Vec<u8>),
    /// `F7` escape. Holds arbitrary bytes sent as-is.
    Escape(Vec<u8>),
    Meta { kind: u8, data: Vec<u8> },
}

impl SmfMessage {
    /// Validate live wire bytes: a channel/system message or a complete SysEx.
    pub fn from_wire(bytes: &[u8]) -> Result<Self> {
        let Some(&status) = bytes.first() else {
            return Err(Error::InvalidMessage("empty message".into()));
        };
        if status == SYSEX {
            return Ok(SmfMessage::SysEx(bytes[1..].to_vec()));
        }
        match message_length(status) {
            Some(len) if len == bytes.len() => {
                if bytes[1..].iter().any(|b| *b & 0x80 != 0) {
                    return Err(Error::InvalidMessage(format!(
                        "data byte with high bit set after status 0x{status:02X}"
                    )));
                }
                Ok(SmfMessage::Midi(SmallVec::from_slice(bytes)))
            }
            Some(len) => Err(Error::InvalidMessage(format!(
                "status 0x{status:02X} needs {len} bytes, got {}",
                bytes.len()
            ))),
            None => Err(Error::InvalidMessage(format!(
                "status 0x{status:02X} cannot be sent on the wire"
            ))),
        }
    }

    pub fn end_of_track() -> Self {
        SmfMessage::Meta {
            kind: META_END_OF_TRACK,
            data: Vec::new(),
        }
    }

    /// `FF 51 03 tttttt`, microseconds per quarter note. The value must fit
    /// in 24 bits and be non-zero.
    pub fn tempo(us_per_quarter: u32) -> Result<Self> {
        if us_per_quarter == 0 || us_per_quarter > MAX_TEMPO_US {
            return Err(Error::InvalidMessage(format!(
                "tempo {us_per_quarter} us per quarter out of range (1-{MAX_TEMPO_US})"
            )));
        }
        let b = us_per_quarter.to_be_bytes();
        Ok(SmfMessage::Meta {
            kind: META_TEMPO,
            data: vec![b[1], b[2], b[3]],
        })
    }

    /// `FF 58 04 nn dd cc bb`, denominator as a power of two.
    pub fn time_signature(numerator: u8, denominator_pow2: u8) -> Self {
        SmfMessage::Meta {
            kind: META_TIME_SIGNATURE,
            data: vec![numerator, denominator_pow2, 24, 8],
        }
    }

    #[inline]
    pub fn is_meta(&self) -> bool {
        matches!(self, SmfMessage::Meta { .. })
    }

    #[inline]
    pub fn is_end_of_track(&self) -> bool {
        matches!(self, SmfMessage::Meta { kind: META_END_OF_TRACK, .. })
    }

    pub fn tempo_us(&self) -> Option<u32> {
        match self {
            SmfMessage::Meta {
                kind: META_TEMPO,
                data,
            } if data.len() >= 3 => {
                Some(u32::from_be_bytes([0, data[0], data[1], data[2]]))
            }
            _ => None,
        }
    }

    /// `(numerator, denominator)` with the denominator expanded.
    pub fn time_signature_value(&self) -> Option<(u8, u8)> {
        match self {
            SmfMessage::Meta {
                kind: META_TIME_SIGNATURE,
                data,
            } if data.len() >= 2 && data[1] < 8 => Some((data[0], 1u8 << data[1])),
            _ => None,
        }
    }

    /// Bytes as they would be sent to a MIDI port. `None` for meta events.
    pub fn wire_bytes(&self) -> Option<SmallVec<[u8; 3]>> {
        match self {
            SmfMessage::Midi(bytes) => Some(bytes.clone()),
            SmfMessage::SysEx(payload) => {
                let mut out = SmallVec::with_capacity(payload.len() + 1);
                out.push(SYSEX);
                out.extend_from_slice(payload);
                Some(out)
            }
            SmfMessage::Escape(payload) => Some(SmallVec::from_slice(payload)),
            SmfMessage::Meta { .. } => None,
        }
    }

    /// Status byte of a [`SmfMessage::Midi`] message.
    #[inline]
    pub fn status(&self) -> Option<u8> {
        match self {
            SmfMessage::Midi(bytes) => bytes.first().copied(),
            _ => None,
        }
    }
}
