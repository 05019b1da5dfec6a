//! Incremental format 0 writer.
//!
//! The file on disk is a complete, playable SMF after [`SmfWriter::create`] and
//! after every successful [`SmfWriter::flush`]: committed event bytes are
//! followed by an end-of-track event and the `MTrk` length always matches.
//! Appends are buffered in memory until the next flush.

use crate::error::{Error, Result};
use crate::header::{Format, Header, HEADER_CHUNK_SIZE, MTRK};
use crate::message::SmfMessage;
use crate::track::{encode_event, TrackEvent};
use crate::vlq::{write_vlq, MAX_VLQ};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const TRACK_LENGTH_OFFSET: u64 = HEADER_CHUNK_SIZE as u64 + 4;
const DATA_START: u64 = TRACK_LENGTH_OFFSET + 4;
const END_OF_TRACK: [u8; 3] = [0xFF, 0x2F, 0x00];

#[derive(Debug)]
pub struct SmfWriter {
    file: File,
    path: PathBuf,
    division: u16,
    /// Event bytes already on disk, end-of-track excluded.
    committed: u64,
    pending: Vec<u8>,
    pending_events: usize,
    /// Absolute tick of the last appended event.
    last_tick: u64,
}

impl SmfWriter {
    /// Create a new file, failing if `path` already exists.
    pub fn create(path: impl AsRef<Path>, division: u16) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let header = Header::new(Format::SingleTrack, 1, division)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;

        let mut prelude = Vec::with_capacity(DATA_START as usize);
        header.write(&mut prelude);
        prelude.extend_from_slice(&MTRK);
        prelude.extend_from_slice(&0u32.to_be_bytes());

        let mut writer = Self {
            file,
            path,
            division,
            committed: 0,
            pending: Vec::new(),
            pending_events: 0,
            last_tick: 0,
        };
        writer.file.write_all(&prelude)?;
        writer.flush(0)?;
        debug!("Created SMF {:?} at {} ticks per quarter", writer.path, division);
        Ok(writer)
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn division(&self) -> u16 {
        self.division
    }

    #[inline]
    pub fn last_tick(&self) -> u64 {
        self.last_tick
    }

    /// Events appended since the last successful flush.
    #[inline]
    pub fn pending_events(&self) -> usize {
        self.pending_events
    }

    /// Buffer `message` at absolute `tick`. Status bytes are always explicit.
    pub fn append(&mut self, tick: u64, message: &SmfMessage) -> Result<()> {
        if tick < self.last_tick {
            return Err(Error::TickBeforePrevious {
                previous: self.last_tick,
                tick,
            });
        }
        if message.is_end_of_track() {
            return Err(Error::InvalidMessage(
                "end-of-track is written by the writer".into(),
            ));
        }
        let delta = tick - self.last_tick;
        if delta > MAX_VLQ as u64 {
            return Err(Error::DeltaOverflow(delta));
        }

        let mut running = None;
        encode_event(
            &mut self.pending,
            &TrackEvent::new(delta as u32, message.clone()),
            &mut running,
        )?;
        self.pending_events += 1;
        self.last_tick = tick;
        Ok(())
    }

    /// Write pending events and an end-of-track at `end_tick`, sync, then patch
    /// the track length and sync again. The length field only changes once the
    /// bytes it covers are on disk. On error nothing is marked committed, so the
    /// call can be repeated; a repeat with no appends in between rewrites
    /// identical bytes.
    pub fn flush(&mut self, end_tick: u64) -> Result<()> {
        let eot_delta = end_tick.saturating_sub(self.last_tick);
        if eot_delta > MAX_VLQ as u64 {
            return Err(Error::DeltaOverflow(eot_delta));
        }

        let mut tail = Vec::with_capacity(self.pending.len() + 7);
        tail.extend_from_slice(&self.pending);
        write_vlq(&mut tail, eot_delta as u32)?;
        tail.extend_from_slice(&END_OF_TRACK);

        let track_len = self.committed + tail.len() as u64;
        let track_len_field =
            u32::try_from(track_len).map_err(|_| Error::TrackTooLong(track_len))?;

        self.file.seek(SeekFrom::Start(DATA_START + self.committed))?;
        self.file.write_all(&tail)?;
        self.file.set_len(DATA_START + track_len)?;
        self.file.sync_data()?;
        self.write_track_length(track_len_field)?;

        if self.pending_events > 0 {
            debug!(
                "Flushed {} events to {:?} ({} track bytes)",
                self.pending_events, self.path, track_len
            );
        }
        self.committed += self.pending.len() as u64;
        self.pending.clear();
        self.pending_events = 0;
        Ok(())
    }

    fn write_track_length(&mut self, length: u32) -> Result<()> {
        self.file.seek(SeekFrom::Start(TRACK_LENGTH_OFFSET))?;
        self.file.write_all(&length.to_be_bytes())?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Replace every event in the file with `events` (absolute ticks, sorted)
    /// and flush with end-of-track at `end_tick`.
    pub fn rewrite<'a, I>(&mut self, events: I, end_tick: u64) -> Result<()>
    where
        I: IntoIterator<Item = (u64, &'a SmfMessage)>,
    {
        let mut body = Vec::new();
        let mut count = 0;
        let mut last = 0u64;
        let mut running = None;
        for (tick, message) in events {
            if tick < last {
                return Err(Error::TickBeforePrevious {
                    previous: last,
                    tick,
                });
            }
            let delta = tick - last;
            if delta > MAX_VLQ as u64 {
                return Err(Error::DeltaOverflow(delta));
            }
            encode_event(
                &mut body,
                &TrackEvent::new(delta as u32, message.clone()),
                &mut running,
            )?;
            last = tick;
            count += 1;
        }

        let (committed, pending, pending_events, last_tick) = (
            self.committed,
            std::mem::replace(&mut self.pending, body),
            self.pending_events,
            self.last_tick,
        );
        self.committed = 0;
        self.pending_events = count;
        self.last_tick = last;
        if let Err(e) = self.flush(end_tick) {
            // keep the previous view so a later flush still matches the file
            self.committed = committed;
            self.pending = pending;
            self.pending_events = pending_events;
            self.last_tick = last_tick;
            return Err(e);
        }
        Ok(())
    }
}
