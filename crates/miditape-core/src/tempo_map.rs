//! Tempo map with tempo and meter points (seconds/beats/BBT).
//!
//! The map is sample-rate independent; [`crate::convert`] applies a sample
//! rate on top of the seconds domain.

use crate::error::{Error, Result};

pub const MIN_BPM: f64 = 1.0;
pub const MAX_BPM: f64 = 999.0;

const POINT_EPSILON: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TempoPoint {
    pub(crate) beat: f64,
    pub(crate) bpm: f64,
    /// Seconds from beat 0 to `beat`, filled by `rebuild`.
    seconds: f64,
}

impl TempoPoint {
    pub(crate) fn new(beat: f64, bpm: f64) -> Self {
        Self {
            beat,
            bpm,
            seconds: 0.0,
        }
    }

    #[inline]
    fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeSignature {
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Quarter-note beats in one bar.
    #[inline]
    pub fn beats_per_bar(&self) -> f64 {
        self.numerator as f64 * 4.0 / self.denominator as f64
    }

    fn validate(&self) -> Result<()> {
        if self.numerator == 0 || self.denominator == 0 || !self.denominator.is_power_of_two() {
            return Err(Error::InvalidTimeSignature {
                numerator: self.numerator,
                denominator: self.denominator,
            });
        }
        Ok(())
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct MeterPoint {
    beat: f64,
    signature: TimeSignature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BBT {
    pub bar: u32,
    pub beat: u32,
    pub ticks: u32,
}

impl BBT {
    pub const TICKS_PER_BEAT: u32 = 1920;

    pub fn new(bar: u32, beat: u32, ticks: u32) -> Self {
        Self { bar, beat, ticks }
    }
}

/// Piecewise-constant tempo map. Always holds at least one tempo and one
/// meter point at beat 0.
#[derive(Debug, Clone, PartialEq)]
pub struct TempoMap {
    points: Vec<TempoPoint>,
    meters: Vec<MeterPoint>,
}

impl TempoMap {
    pub fn new(initial_bpm: f64) -> Self {
        let mut map = Self {
            points: vec![TempoPoint::new(0.0, initial_bpm.clamp(MIN_BPM, MAX_BPM))],
            meters: vec![MeterPoint {
                beat: 0.0,
                signature: TimeSignature::default(),
            }],
        };
        map.rebuild();
        map
    }

    pub fn set_tempo(&mut self, bpm: f64) {
        let bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        self.points.clear();
        self.points.push(TempoPoint::new(0.0, bpm));
        self.rebuild();
    }

    /// Tempo at beat 0.
    pub fn tempo(&self) -> f64 {
        self.points[0].bpm
    }

    pub fn tempo_at(&self, beat: f64) -> f64 {
        self.points[self.segment_for_beat(beat)].bpm
    }

    pub fn tempo_point_count(&self) -> usize {
        self.points.len()
    }

    pub fn add_tempo_point(&mut self, beat: f64, bpm: f64) {
        let bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        let beat = beat.max(0.0);

        self.points.retain(|p| (p.beat - beat).abs() > POINT_EPSILON);
        self.points.push(TempoPoint::new(beat, bpm));
        self.points.sort_by(|a, b| a.beat.total_cmp(&b.beat));

        if self.points[0].beat > 0.0 {
            self.points
                .insert(0, TempoPoint::new(0.0, self.points[0].bpm));
        }

        self.rebuild();
    }

    pub fn remove_tempo_point(&mut self, beat: f64) {
        if beat <= POINT_EPSILON {
            return;
        }
        self.points.retain(|p| (p.beat - beat).abs() > POINT_EPSILON);
        self.rebuild();
    }

    pub fn clear_tempo_automation(&mut self) {
        let initial_bpm = self.points[0].bpm;
        self.points.clear();
        self.points.push(TempoPoint::new(0.0, initial_bpm));
        self.rebuild();
    }

    /// Replace the meter at beat 0.
    pub fn set_time_signature(&mut self, numerator: u32, denominator: u32) -> Result<()> {
        self.add_meter_point(0.0, numerator, denominator)
    }

    /// Add a meter change. Meter points are expected on bar boundaries.
    pub fn add_meter_point(&mut self, beat: f64, numerator: u32, denominator: u32) -> Result<()> {
        let signature = TimeSignature::new(numerator, denominator);
        signature.validate()?;
        let beat = beat.max(0.0);

        self.meters.retain(|m| (m.beat - beat).abs() > POINT_EPSILON);
        self.meters.push(MeterPoint { beat, signature });
        self.meters.sort_by(|a, b| a.beat.total_cmp(&b.beat));

        if self.meters[0].beat > 0.0 {
            self.meters.insert(
                0,
                MeterPoint {
                    beat: 0.0,
                    signature: TimeSignature::default(),
                },
            );
        }
        Ok(())
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.meters[0].signature
    }

    pub fn time_signature_at(&self, beat: f64) -> TimeSignature {
        let idx = self
            .meters
            .partition_point(|m| m.beat <= beat)
            .saturating_sub(1);
        self.meters[idx].signature
    }

    fn rebuild(&mut self) {
        let mut seconds = 0.0;
        for i in 0..self.points.len() {
            self.points[i].seconds = seconds;
            if i + 1 < self.points.len() {
                let beat_delta = self.points[i + 1].beat - self.points[i].beat;
                seconds += beat_delta * self.points[i].seconds_per_beat();
            }
        }
    }

    #[inline]
    fn segment_for_beat(&self, beat: f64) -> usize {
        self.points
            .partition_point(|p| p.beat <= beat)
            .saturating_sub(1)
    }

    #[inline]
    fn segment_for_seconds(&self, seconds: f64) -> usize {
        self.points
            .partition_point(|p| p.seconds <= seconds)
            .saturating_sub(1)
    }

    /// Seconds from beat 0. Strictly increasing in `beats`.
    #[inline]
    pub fn beats_to_seconds(&self, beats: f64) -> f64 {
        let point = &self.points[self.segment_for_beat(beats)];
        point.seconds + (beats - point.beat) * point.seconds_per_beat()
    }

    /// Inverse of [`TempoMap::beats_to_seconds`].
    #[inline]
    pub fn seconds_to_beats(&self, seconds: f64) -> f64 {
        let point = &self.points[self.segment_for_seconds(seconds)];
        point.beat + (seconds - point.seconds) / point.seconds_per_beat()
    }

    pub fn beats_to_bbt(&self, beats: f64) -> BBT {
        let beats = beats.max(0.0);
        let mut bars_before = 0u32;

        for (i, meter) in self.meters.iter().enumerate() {
            let next = self.meters.get(i + 1).map(|m| m.beat).unwrap_or(f64::INFINITY);
            let beats_per_bar = meter.signature.beats_per_bar();

            if beats < next {
                let local = beats - meter.beat;
                let bars = (local / beats_per_bar).floor();
                let beat_in_bar = local - bars * beats_per_bar;
                let beat_whole = beat_in_bar.floor();
                let ticks = ((beat_in_bar - beat_whole) * BBT::TICKS_PER_BEAT as f64) as u32;

                return BBT {
                    bar: bars_before + bars as u32 + 1,
                    beat: beat_whole as u32 + 1,
                    ticks,
                };
            }

            // a partial bar before a meter change still counts as a bar
            bars_before += ((next - meter.beat) / beats_per_bar).ceil() as u32;
        }

        BBT::new(bars_before + 1, 1, 0)
    }

    pub fn bbt_to_beats(&self, bbt: BBT) -> f64 {
        let target_bar = bbt.bar.saturating_sub(1);
        let mut bars_before = 0u32;
        let mut segment_start = 0.0;
        let mut beats_per_bar = TimeSignature::default().beats_per_bar();

        for (i, meter) in self.meters.iter().enumerate() {
            segment_start = meter.beat;
            beats_per_bar = meter.signature.beats_per_bar();
            let Some(next) = self.meters.get(i + 1) else {
                break;
            };
            let bars_in_segment = ((next.beat - meter.beat) / beats_per_bar).ceil() as u32;
            if target_bar < bars_before + bars_in_segment {
                break;
            }
            bars_before += bars_in_segment;
        }

        let bar_beats = (target_bar - bars_before) as f64 * beats_per_bar;
        let beat_beats = bbt.beat.saturating_sub(1) as f64;
        let tick_beats = bbt.ticks as f64 / BBT::TICKS_PER_BEAT as f64;

        segment_start + bar_beats + beat_beats + tick_beats
    }
}

impl Default for TempoMap {
    fn default() -> Self {
        Self::new(120.0)
    }
}
