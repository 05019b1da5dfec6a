//! `MTrk` bodies: delta-time framed events with running status.

use crate::error::{Error, Result};
use crate::message::{message_length, SmfMessage, ESCAPE, META, SYSEX};
use crate::vlq::{read_vlq, write_vlq};
use smallvec::SmallVec;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackEvent {
    /// Ticks since the previous event of the track.
    pub delta: u32,
    pub message: SmfMessage,
    /// Status byte was implied by the previous event.
    pub running_status: bool,
}

impl TrackEvent {
    pub fn new(delta: u32, message: SmfMessage) -> Self {
        Self {
            delta,
            message,
            running_status: false,
        }
    }
}

pub type Track = Vec<TrackEvent>;

fn take<'a>(data: &'a [u8], pos: usize, len: usize, context: &'static str) -> Result<&'a [u8]> {
    data.get(pos..pos + len).ok_or(Error::Truncated {
        context,
        offset: data.len(),
    })
}

/// Decode one track body. `track` only labels errors.
pub fn decode_track(data: &[u8], track: usize) -> Result<Track> {
    let mut events = Vec::new();
    let mut pos = 0usize;
    let mut running: Option<u8> = None;

    loop {
        if pos >= data.len() {
            return Err(Error::MissingEndOfTrack { track });
        }
        let (delta, n) = read_vlq(data, pos)?;
        pos += n;

        let Some(&first) = data.get(pos) else {
            return Err(Error::Truncated {
                context: "event",
                offset: pos,
            });
        };

        let event = match first {
            META => {
                let kind = take(data, pos + 1, 1, "meta event")?[0];
                let (len, n) = read_vlq(data, pos + 2)?;
                let body = take(data, pos + 2 + n, len as usize, "meta event")?;
                pos += 2 + n + len as usize;
                running = None;
                TrackEvent::new(
                    delta,
                    SmfMessage::Meta {
                        kind,
                        data: body.to_vec(),
                    },
                )
            }
            SYSEX | ESCAPE => {
                let (len, n) = read_vlq(data, pos + 1)?;
                let body = take(data, pos + 1 + n, len as usize, "sysex event")?.to_vec();
                pos += 1 + n + len as usize;
                running = None;
                let message = if first == SYSEX {
                    SmfMessage::SysEx(body)
                } else {
                    SmfMessage::Escape(body)
                };
                TrackEvent::new(delta, message)
            }
            status if status & 0x80 != 0 => {
                let len = message_length(status).ok_or(Error::BadStatus {
                    status,
                    offset: pos,
                })?;
                let bytes = take(data, pos, len, "midi event")?;
                check_data_bytes(&bytes[1..], pos + 1)?;
                pos += len;
                // realtime and system-common messages cancel running status
                running = (status < 0xF0).then_some(status);
                TrackEvent::new(delta, SmfMessage::Midi(SmallVec::from_slice(bytes)))
            }
            _ => {
                let status = running.ok_or(Error::MissingRunningStatus { offset: pos })?;
                let len = message_length(status).unwrap_or(1);
                let data_bytes = take(data, pos, len - 1, "midi event")?;
                check_data_bytes(data_bytes, pos)?;
                pos += len - 1;
                let mut bytes = SmallVec::with_capacity(len);
                bytes.push(status);
                bytes.extend_from_slice(data_bytes);
                TrackEvent {
                    delta,
                    message: SmfMessage::Midi(bytes),
                    running_status: true,
                }
            }
        };

        let done = event.message.is_end_of_track();
        events.push(event);
        if done {
            if pos < data.len() {
                warn!(
                    "Track {}: ignoring {} bytes after end-of-track",
                    track,
                    data.len() - pos
                );
            }
            return Ok(events);
        }
    }
}

fn check_data_bytes(bytes: &[u8], offset: usize) -> Result<()> {
    match bytes.iter().position(|b| *b & 0x80 != 0) {
        Some(i) => Err(Error::BadStatus {
            status: bytes[i],
            offset: offset + i,
        }),
        None => Ok(()),
    }
}

/// Encode one event, updating the running status register.
pub(crate) fn encode_event(
    out: &mut Vec<u8>,
    event: &TrackEvent,
    running: &mut Option<u8>,
) -> Result<()> {
    write_vlq(out, event.delta)?;
    match &event.message {
        SmfMessage::Midi(bytes) => {
            let Some(&status) = bytes.first() else {
                return Err(Error::InvalidMessage("empty midi message".into()));
            };
            if event.running_status && *running == Some(status) {
                out.extend_from_slice(&bytes[1..]);
            } else {
                out.extend_from_slice(bytes);
            }
            *running = (status < 0xF0).then_some(status);
        }
        SmfMessage::SysEx(payload) | SmfMessage::Escape(payload) => {
            out.push(if matches!(event.message, SmfMessage::SysEx(_)) {
                SYSEX
            } else {
                ESCAPE
            });
            write_vlq(out, payload_len(payload.len())?)?;
            out.extend_from_slice(payload);
            *running = None;
        }
        SmfMessage::Meta { kind, data } => {
            out.push(META);
            out.push(*kind);
            write_vlq(out, payload_len(data.len())?)?;
            out.extend_from_slice(data);
            *running = None;
        }
    }
    Ok(())
}

fn payload_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::TrackTooLong(len as u64))
}

/// Encode one track body, appending end-of-track if the track lacks one.
pub fn encode_track(out: &mut Vec<u8>, track: &[TrackEvent]) -> Result<()> {
    let mut running = None;
    for event in track {
        encode_event(out, event, &mut running)?;
    }
    if !track.last().is_some_and(|e| e.message.is_end_of_track()) {
        encode_event(
            out,
            &TrackEvent::new(0, SmfMessage::end_of_track()),
            &mut running,
        )?;
    }
    Ok(())
}
