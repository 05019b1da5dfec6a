//! Musical and absolute time types.
//!
//! [`Beats`] is the canonical storage domain (quarter notes from the origin of
//! a source). [`Samples`] is absolute audio-engine time. A tempo map is needed
//! to move between the two; see [`crate::convert`].

use core::fmt;
use core::ops::{Add, AddAssign, Sub};
use serde::{Deserialize, Serialize};

/// Which time domain a value is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeDomain {
    Beats,
    Samples,
}

/// A time value tagged with its domain at the type level.
pub trait TimeValue: Copy + PartialOrd + fmt::Debug + Send + Sync + 'static {
    const DOMAIN: TimeDomain;

    /// The origin of the domain.
    fn zero() -> Self;
}

/// Musical time in quarter-note beats.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Beats(pub f64);

impl Beats {
    pub const ZERO: Beats = Beats(0.0);

    #[inline]
    pub const fn new(beats: f64) -> Self {
        Self(beats)
    }

    #[inline]
    pub fn as_f64(self) -> f64 {
        self.0
    }

    /// Beats for an absolute tick count at the given resolution.
    #[inline]
    pub fn from_ticks(ticks: u64, ppqn: u16) -> Self {
        Self(ticks as f64 / ppqn as f64)
    }

    /// Nearest tick at the given resolution. Negative beats clamp to tick 0.
    #[inline]
    pub fn to_ticks(self, ppqn: u16) -> u64 {
        let ticks = (self.0 * ppqn as f64).round();
        if ticks <= 0.0 {
            0
        } else {
            ticks as u64
        }
    }

    #[inline]
    pub fn is_negative(self) -> bool {
        self.0 < 0.0
    }

    #[inline]
    pub fn max(self, other: Beats) -> Beats {
        if other.0 > self.0 {
            other
        } else {
            self
        }
    }
}

impl Add for Beats {
    type Output = Beats;

    #[inline]
    fn add(self, rhs: Beats) -> Beats {
        Beats(self.0 + rhs.0)
    }
}

impl AddAssign for Beats {
    #[inline]
    fn add_assign(&mut self, rhs: Beats) {
        self.0 += rhs.0;
    }
}

impl Sub for Beats {
    type Output = Beats;

    #[inline]
    fn sub(self, rhs: Beats) -> Beats {
        Beats(self.0 - rhs.0)
    }
}

impl fmt::Display for Beats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4} beats", self.0)
    }
}

impl TimeValue for Beats {
    const DOMAIN: TimeDomain = TimeDomain::Beats;

    #[inline]
    fn zero() -> Self {
        Beats::ZERO
    }
}

/// Absolute time in audio samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Samples(pub u64);

impl Samples {
    pub const ZERO: Samples = Samples(0);

    #[inline]
    pub const fn new(samples: u64) -> Self {
        Self(samples)
    }

    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn saturating_sub(self, rhs: Samples) -> Samples {
        Samples(self.0.saturating_sub(rhs.0))
    }

    #[inline]
    pub fn checked_sub(self, rhs: Samples) -> Option<Samples> {
        self.0.checked_sub(rhs.0).map(Samples)
    }
}

impl Add for Samples {
    type Output = Samples;

    #[inline]
    fn add(self, rhs: Samples) -> Samples {
        Samples(self.0 + rhs.0)
    }
}

impl AddAssign for Samples {
    #[inline]
    fn add_assign(&mut self, rhs: Samples) {
        self.0 += rhs.0;
    }
}

impl Sub for Samples {
    type Output = Samples;

    #[inline]
    fn sub(self, rhs: Samples) -> Samples {
        Samples(self.0 - rhs.0)
    }
}

impl fmt::Display for Samples {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} samples", self.0)
    }
}

impl TimeValue for Samples {
    const DOMAIN: TimeDomain = TimeDomain::Samples;

    #[inline]
    fn zero() -> Self {
        Samples::ZERO
    }
}
