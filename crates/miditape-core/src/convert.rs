//! Beat/sample conversion through a tempo map.

use crate::error::{Error, Result};
use crate::tempo_map::TempoMap;
use crate::time::{Beats, Samples};

/// Absolute beats (from timeline zero) to absolute samples.
///
/// Rounds to the nearest sample; times before zero clamp to sample 0.
#[inline]
pub fn to_samples(beats: Beats, tempo_map: &TempoMap, sample_rate: f64) -> Samples {
    let samples = (tempo_map.beats_to_seconds(beats.0) * sample_rate).round();
    if samples <= 0.0 {
        Samples::ZERO
    } else {
        Samples(samples as u64)
    }
}

/// Absolute samples to absolute beats (from timeline zero).
#[inline]
pub fn to_beats(samples: Samples, tempo_map: &TempoMap, sample_rate: f64) -> Beats {
    Beats(tempo_map.seconds_to_beats(samples.0 as f64 / sample_rate))
}

/// Converts between source-relative beats and timeline samples for a source
/// placed at `origin` on the timeline.
#[derive(Debug, Clone, Copy)]
pub struct TimeConverter<'a> {
    tempo_map: &'a TempoMap,
    sample_rate: f64,
    origin: Samples,
    origin_beats: Beats,
}

impl<'a> TimeConverter<'a> {
    pub fn new(tempo_map: &'a TempoMap, sample_rate: f64, origin: Samples) -> Result<Self> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(Error::InvalidSampleRate(sample_rate));
        }
        Ok(Self {
            tempo_map,
            sample_rate,
            origin,
            origin_beats: to_beats(origin, tempo_map, sample_rate),
        })
    }

    #[inline]
    pub fn origin(&self) -> Samples {
        self.origin
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Source-relative beats to timeline samples.
    #[inline]
    pub fn to_samples(&self, beats: Beats) -> Samples {
        to_samples(self.origin_beats + beats, self.tempo_map, self.sample_rate)
    }

    /// Timeline samples to source-relative beats. Negative before the origin.
    #[inline]
    pub fn to_beats(&self, samples: Samples) -> Beats {
        to_beats(samples, self.tempo_map, self.sample_rate) - self.origin_beats
    }
}

/// A half-open loop `[start, end)` on the sample timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopRange {
    start: Samples,
    end: Samples,
}

impl LoopRange {
    pub fn new(start: Samples, end: Samples) -> Result<Self> {
        if end <= start {
            return Err(Error::InvalidLoopRange {
                start: start.0,
                end: end.0,
            });
        }
        Ok(Self { start, end })
    }

    #[inline]
    pub fn start(&self) -> Samples {
        self.start
    }

    #[inline]
    pub fn end(&self) -> Samples {
        self.end
    }

    #[inline]
    pub fn length(&self) -> Samples {
        self.end - self.start
    }

    /// Iteration index containing unwrapped time `t`, `None` before the loop start.
    #[inline]
    pub fn iteration(&self, t: Samples) -> Option<u64> {
        let offset = t.checked_sub(self.start)?;
        Some(offset.0 / self.length().0)
    }

    /// Start of iteration `n` in unwrapped time.
    #[inline]
    pub fn iteration_start(&self, n: u64) -> Samples {
        Samples(self.start.0 + n * self.length().0)
    }

    /// Map unwrapped time into the loop body.
    #[inline]
    pub fn wrap(&self, t: Samples) -> Samples {
        match self.iteration(t) {
            Some(n) => t - Samples(n * self.length().0),
            None => t,
        }
    }
}
