//! Tick-ordered event index shared by reads, the writer and the model.

use miditape_core::{Beats, TempoMap};
use miditape_smf::{Format, Header, Smf, SmfMessage, TrackEvent};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedEvent {
    /// Absolute tick from the start of the source.
    pub tick: u64,
    pub message: SmfMessage,
}

#[derive(Debug, Clone)]
pub struct EventIndex {
    events: Vec<IndexedEvent>,
    ppqn: u16,
    end_tick: u64,
}

impl EventIndex {
    pub fn new(ppqn: u16) -> Self {
        Self {
            events: Vec::new(),
            ppqn,
            end_tick: 0,
        }
    }

    /// Merge every track by absolute tick. Ties keep track order.
    pub fn from_smf(smf: &Smf) -> Self {
        let mut events = Vec::new();
        let mut end_tick = 0u64;
        for track in &smf.tracks {
            let mut tick = 0u64;
            for event in track {
                tick += event.delta as u64;
                if event.message.is_end_of_track() {
                    break;
                }
                events.push(IndexedEvent {
                    tick,
                    message: event.message.clone(),
                });
            }
            end_tick = end_tick.max(tick);
        }
        events.sort_by_key(|e| e.tick);
        Self {
            events,
            ppqn: smf.header.division,
            end_tick,
        }
    }

    /// Build from already sorted events.
    pub fn from_events(ppqn: u16, events: Vec<IndexedEvent>, end_tick: u64) -> Self {
        debug_assert!(events.windows(2).all(|w| w[0].tick <= w[1].tick));
        let last = events.last().map_or(0, |e| e.tick);
        Self {
            events,
            ppqn,
            end_tick: end_tick.max(last),
        }
    }

    #[inline]
    pub fn ppqn(&self) -> u16 {
        self.ppqn
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[inline]
    pub fn events(&self) -> &[IndexedEvent] {
        &self.events
    }

    #[inline]
    pub fn end_tick(&self) -> u64 {
        self.end_tick
    }

    pub fn set_end_tick(&mut self, tick: u64) {
        let last = self.events.last().map_or(0, |e| e.tick);
        self.end_tick = tick.max(last);
    }

    #[inline]
    pub fn length(&self) -> Beats {
        Beats::from_ticks(self.end_tick, self.ppqn)
    }

    /// Append at `tick`, which must not precede the last event.
    pub fn push(&mut self, tick: u64, message: SmfMessage) {
        debug_assert!(self.events.last().is_none_or(|e| e.tick <= tick));
        self.end_tick = self.end_tick.max(tick);
        self.events.push(IndexedEvent { tick, message });
    }

    /// Events with `start <= tick < end`.
    pub fn range(&self, start: u64, end: u64) -> &[IndexedEvent] {
        let lo = self.events.partition_point(|e| e.tick < start);
        let hi = self.events.partition_point(|e| e.tick < end);
        &self.events[lo..hi.max(lo)]
    }

    /// Drop every event at or after `tick`. Returns how many were removed.
    pub fn truncate_from(&mut self, tick: u64) -> usize {
        let keep = self.events.partition_point(|e| e.tick < tick);
        let removed = self.events.len() - keep;
        self.events.truncate(keep);
        self.end_tick = tick;
        removed
    }

    /// Tempo and meter changes carried by the file, if any.
    pub fn tempo_map(&self) -> Option<Arc<TempoMap>> {
        let mut map = TempoMap::default();
        let mut found = false;
        for event in &self.events {
            let beat = Beats::from_ticks(event.tick, self.ppqn).0;
            if let Some(us) = event.message.tempo_us() {
                if us == 0 {
                    warn!("Ignoring zero tempo at tick {}", event.tick);
                    continue;
                }
                map.add_tempo_point(beat, 60_000_000.0 / us as f64);
                found = true;
            } else if let Some((numerator, denominator)) = event.message.time_signature_value() {
                match map.add_meter_point(beat, numerator as u32, denominator as u32) {
                    Ok(()) => found = true,
                    Err(e) => warn!("Ignoring time signature at tick {}: {}", event.tick, e),
                }
            }
        }
        found.then(|| Arc::new(map))
    }

    /// Single-track file holding every indexed event.
    pub fn to_smf(&self) -> miditape_smf::Result<Smf> {
        let mut track = Vec::with_capacity(self.events.len() + 1);
        let mut last = 0u64;
        for event in &self.events {
            track.push(TrackEvent::new(
                delta(event.tick - last)?,
                event.message.clone(),
            ));
            last = event.tick;
        }
        track.push(TrackEvent::new(
            delta(self.end_tick.saturating_sub(last))?,
            SmfMessage::end_of_track(),
        ));
        Ok(Smf::new(
            Header::new(Format::SingleTrack, 1, self.ppqn)?,
            vec![track],
        ))
    }
}

fn delta(ticks: u64) -> miditape_smf::Result<u32> {
    if ticks > miditape_smf::MAX_VLQ as u64 {
        return Err(miditape_smf::Error::DeltaOverflow(ticks));
    }
    Ok(ticks as u32)
}
