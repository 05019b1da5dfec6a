//! Editable in-memory view of a source.

use crate::index::{EventIndex, IndexedEvent};
use crate::{Error, Result};
use miditape_core::event::{NOTE_OFF, NOTE_ON};
use miditape_core::Beats;
use miditape_smf::SmfMessage;
use smallvec::smallvec;
use std::path::Path;
use std::time::SystemTime;

/// A paired NoteOn/NoteOff.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
    pub off_velocity: u8,
    pub start: Beats,
    pub length: Beats,
}

impl Note {
    pub fn new(channel: u8, note: u8, velocity: u8, start: Beats, length: Beats) -> Self {
        Self {
            channel,
            note,
            velocity,
            off_velocity: 0,
            start,
            length,
        }
    }

    #[inline]
    pub fn end(&self) -> Beats {
        self.start + self.length
    }

    fn validate(&self) -> Result<()> {
        if self.channel > 15 || self.note > 127 || self.velocity == 0 || self.velocity > 127 {
            return Err(Error::Core(miditape_core::Error::InvalidMessage(format!(
                "note ch={} key={} vel={}",
                self.channel, self.note, self.velocity
            ))));
        }
        for t in [self.start, self.length] {
            if t.is_negative() || !t.0.is_finite() {
                return Err(Error::Core(miditape_core::Error::InvalidBeat(t.0)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenNote {
    tick: u64,
    velocity: u8,
    seq: u64,
}

/// Arrival order of a note's two halves, used to break ties within a tick.
#[derive(Debug, Clone, Copy)]
struct NoteOrder {
    on: u64,
    off: u64,
}

#[derive(Debug, Clone)]
pub struct MidiModel {
    ppqn: u16,
    /// Sorted by start.
    notes: Vec<Note>,
    /// Parallel to `notes`.
    order: Vec<NoteOrder>,
    /// Everything that is not part of a complete note, by tick.
    others: Vec<IndexedEvent>,
    others_seq: Vec<u64>,
    open: Box<[Option<OpenNote>]>,
    next_seq: u64,
    dirty: bool,
}

impl MidiModel {
    pub fn new(ppqn: u16) -> Self {
        Self {
            ppqn,
            notes: Vec::new(),
            order: Vec::new(),
            others: Vec::new(),
            others_seq: Vec::new(),
            open: vec![None; 16 * 128].into_boxed_slice(),
            next_seq: 0,
            dirty: false,
        }
    }

    pub fn from_index(index: &EventIndex) -> Self {
        let mut model = Self::new(index.ppqn());
        for event in index.events() {
            model.append(event.tick, &event.message);
        }
        model.dirty = false;
        model
    }

    #[inline]
    pub fn ppqn(&self) -> u16 {
        self.ppqn
    }

    #[inline]
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Events that are not part of a note, meta events included. NoteOns
    /// still waiting for their NoteOff are not listed.
    pub fn other_events(&self) -> impl Iterator<Item = &IndexedEvent> {
        self.others.iter()
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Feed one more recorded event.
    pub fn append(&mut self, tick: u64, message: &SmfMessage) {
        if let Some(&[status, key, velocity]) = message_bytes(message) {
            let slot = (status as usize & 0x0F) * 128 + key as usize;
            match status & 0xF0 {
                NOTE_ON if velocity > 0 => {
                    if let Some(prev) = self.open[slot].take() {
                        self.close(slot, prev, tick, 0);
                    }
                    let seq = self.next_seq();
                    self.open[slot] = Some(OpenNote {
                        tick,
                        velocity,
                        seq,
                    });
                    return;
                }
                NOTE_ON | NOTE_OFF => {
                    if let Some(prev) = self.open[slot].take() {
                        self.close(slot, prev, tick, velocity);
                        return;
                    }
                }
                _ => {}
            }
        }
        let seq = self.next_seq();
        self.others.push(IndexedEvent {
            tick,
            message: message.clone(),
        });
        self.others_seq.push(seq);
    }

    fn close(&mut self, slot: usize, open: OpenNote, tick: u64, off_velocity: u8) {
        let note = Note {
            channel: (slot / 128) as u8,
            note: (slot % 128) as u8,
            velocity: open.velocity,
            off_velocity,
            start: Beats::from_ticks(open.tick, self.ppqn),
            length: Beats::from_ticks(tick - open.tick, self.ppqn),
        };
        let order = NoteOrder {
            on: open.seq,
            off: self.next_seq(),
        };
        self.insert_sorted(note, order);
    }

    fn insert_sorted(&mut self, note: Note, order: NoteOrder) {
        let at = self.notes.partition_point(|n| n.start <= note.start);
        self.notes.insert(at, note);
        self.order.insert(at, order);
    }

    /// Insert an edited note. It sorts after existing events on its ticks.
    pub fn add_note(&mut self, note: Note) -> Result<()> {
        note.validate()?;
        let order = NoteOrder {
            on: self.next_seq(),
            off: self.next_seq(),
        };
        self.insert_sorted(note, order);
        self.dirty = true;
        Ok(())
    }

    /// Remove every note matching `pred`. Returns how many were removed.
    pub fn remove_notes(&mut self, mut pred: impl FnMut(&Note) -> bool) -> usize {
        let before = self.notes.len();
        (self.notes, self.order) = std::mem::take(&mut self.notes)
            .into_iter()
            .zip(std::mem::take(&mut self.order))
            .filter(|(note, _)| !pred(note))
            .unzip();
        let removed = before - self.notes.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    /// Notes sounding anywhere in `[start, end)`.
    pub fn notes_in_range(&self, start: Beats, end: Beats) -> impl Iterator<Item = &Note> {
        let hi = self.notes.partition_point(|n| n.start < end);
        self.notes[..hi]
            .iter()
            .filter(move |n| n.end() > start || n.start >= start)
    }

    /// Flatten back to tick-ordered events.
    ///
    /// Within a tick, NoteOffs of notes that started earlier come first, then
    /// everything else in arrival order. A zero-length note's NoteOff always
    /// follows its own NoteOn.
    pub fn to_events(&self) -> Vec<IndexedEvent> {
        let mut keyed: Vec<(u64, u8, u64, IndexedEvent)> =
            Vec::with_capacity(self.notes.len() * 2 + self.others.len());
        for (note, order) in self.notes.iter().zip(&self.order) {
            let on = note.start.to_ticks(self.ppqn);
            let off = note.end().to_ticks(self.ppqn).max(on);
            keyed.push((
                on,
                1,
                order.on,
                IndexedEvent {
                    tick: on,
                    message: SmfMessage::Midi(smallvec![
                        NOTE_ON | note.channel,
                        note.note,
                        note.velocity
                    ]),
                },
            ));
            keyed.push((
                off,
                if off > on { 0 } else { 1 },
                order.off,
                IndexedEvent {
                    tick: off,
                    message: SmfMessage::Midi(smallvec![
                        NOTE_OFF | note.channel,
                        note.note,
                        note.off_velocity
                    ]),
                },
            ));
        }
        for (event, seq) in self.others.iter().zip(&self.others_seq) {
            keyed.push((event.tick, 1, *seq, event.clone()));
        }
        for (slot, open) in self.open.iter().enumerate() {
            if let Some(open) = open {
                keyed.push((
                    open.tick,
                    1,
                    open.seq,
                    IndexedEvent {
                        tick: open.tick,
                        message: SmfMessage::Midi(smallvec![
                            NOTE_ON | (slot / 128) as u8,
                            (slot % 128) as u8,
                            open.velocity
                        ]),
                    },
                ));
            }
        }
        keyed.sort_by_key(|(tick, rank, seq, _)| (*tick, *rank, *seq));
        keyed.into_iter().map(|(_, _, _, e)| e).collect()
    }
}

fn message_bytes(message: &SmfMessage) -> Option<&[u8]> {
    match message {
        SmfMessage::Midi(bytes) => Some(bytes.as_slice()),
        _ => None,
    }
}

/// Length and modification time of a file, used to notice external changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

impl FileStamp {
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

/// Lazily built model plus the bookkeeping to keep it in step with the file.
#[derive(Debug, Default)]
pub struct ModelCache {
    model: Option<MidiModel>,
    stamp: Option<FileStamp>,
    unreadable: Option<String>,
}

impl ModelCache {
    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    #[inline]
    pub fn model(&self) -> Option<&MidiModel> {
        self.model.as_ref()
    }

    #[inline]
    pub fn model_mut(&mut self) -> Option<&mut MidiModel> {
        self.model.as_mut()
    }

    #[inline]
    pub fn stamp(&self) -> Option<FileStamp> {
        self.stamp
    }

    pub fn set(&mut self, model: MidiModel, stamp: Option<FileStamp>) {
        self.model = Some(model);
        self.stamp = stamp;
    }

    pub fn set_stamp(&mut self, stamp: Option<FileStamp>) {
        self.stamp = stamp;
    }

    /// Drop the model. Returns true if it had unsaved edits.
    pub fn unload(&mut self) -> bool {
        self.stamp = None;
        self.model.take().is_some_and(|m| m.is_dirty())
    }

    pub fn mark_unreadable(&mut self, reason: String) {
        self.model = None;
        self.stamp = None;
        self.unreadable = Some(reason);
    }

    pub fn unreadable(&self) -> Option<&str> {
        self.unreadable.as_deref()
    }

    pub fn reset(&mut self) {
        self.model = None;
        self.stamp = None;
        self.unreadable = None;
    }
}
