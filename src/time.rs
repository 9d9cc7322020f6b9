//! Definitions of time coordinates in a chart.
//!
//! A chart position can be described in four domains:
//!
//! - [`Tick`]: integer position relative to the chart resolution.
//! - [`Beat`]: quarter notes from the start, the hub every other domain converts through.
//! - [`Measure`]: bars from the start, derived from time signatures (or a beat track).
//! - [`Second`]: real time from the start, derived from the tempo.
//!
//! Conversions between the real-valued domains need a tempo map, see [`crate::tempo`].
//! Only the conversion between ticks and beats is local, as it only needs the resolution.

use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use num::Zero;

/// An integer position in a chart, in units of `1 / resolution` beats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tick(pub i64);

impl Tick {
    /// Converts this tick position into beats with the given resolution.
    ///
    /// The resolution must be positive, which is checked when a chart or tempo map is built.
    #[must_use]
    pub fn to_beat(self, resolution: i64) -> Beat {
        Beat(self.0 as f64 / resolution as f64)
    }
}

impl Add for Tick {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Tick {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl std::fmt::Display for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ticks", self.0)
    }
}

macro_rules! real_time_unit {
    ($(#[$meta:meta])* $name:ident, $suffix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(pub f64);

        impl $name {
            /// Gets the raw value.
            #[must_use]
            pub const fn value(self) -> f64 {
                self.0
            }

            /// Returns the smaller of two positions.
            #[must_use]
            pub fn min(self, other: Self) -> Self {
                Self(self.0.min(other.0))
            }

            /// Returns the larger of two positions.
            #[must_use]
            pub fn max(self, other: Self) -> Self {
                Self(self.0.max(other.0))
            }

            /// Returns the midpoint of two positions.
            #[must_use]
            pub fn midpoint(self, other: Self) -> Self {
                Self((self.0 + other.0) * 0.5)
            }
        }

        impl Add for $name {
            type Output = Self;

            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl AddAssign for $name {
            fn add_assign(&mut self, rhs: Self) {
                self.0 += rhs.0;
            }
        }

        impl Sub for $name {
            type Output = Self;

            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl SubAssign for $name {
            fn sub_assign(&mut self, rhs: Self) {
                self.0 -= rhs.0;
            }
        }

        impl Mul<f64> for $name {
            type Output = Self;

            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Neg for $name {
            type Output = Self;

            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Zero for $name {
            fn zero() -> Self {
                Self(0.0)
            }

            fn is_zero(&self) -> bool {
                self.0 == 0.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}{}", self.0, $suffix)
            }
        }
    };
}

real_time_unit!(
    /// A position in quarter notes from the start of the chart.
    Beat,
    "b"
);

real_time_unit!(
    /// A position in measures (bars) from the start of the chart.
    Measure,
    "m"
);

real_time_unit!(
    /// A position in real seconds from the start of the chart.
    Second,
    "s"
);

impl Beat {
    /// Negative infinity, used as "no position yet".
    pub const NEG_INFINITY: Self = Self(f64::NEG_INFINITY);
    /// Positive infinity, used as "past the end of the chart".
    pub const INFINITY: Self = Self(f64::INFINITY);

    /// Converts to seconds at a constant `bpm`.
    #[must_use]
    pub fn to_second(self, bpm: f64) -> Second {
        Second(self.0 * SECONDS_PER_MINUTE / bpm)
    }

    /// Converts to measures at a constant `beat_rate` (beats per measure).
    #[must_use]
    pub fn to_measure(self, beat_rate: f64) -> Measure {
        Measure(self.0 / beat_rate)
    }
}

impl Measure {
    /// Negative infinity, used as "no position yet".
    pub const NEG_INFINITY: Self = Self(f64::NEG_INFINITY);
    /// Positive infinity, used as "past the end of the chart".
    pub const INFINITY: Self = Self(f64::INFINITY);

    /// Converts to beats at a constant `beat_rate` (beats per measure).
    #[must_use]
    pub fn to_beat(self, beat_rate: f64) -> Beat {
        Beat(self.0 * beat_rate)
    }
}

impl Second {
    /// Converts to beats at a constant `bpm`.
    #[must_use]
    pub fn to_beat(self, bpm: f64) -> Beat {
        Beat(self.0 * bpm / SECONDS_PER_MINUTE)
    }
}

const SECONDS_PER_MINUTE: f64 = 60.0;

/// A chart position with both its beat and measure coordinates precomputed.
///
/// Measures are needed for SP drain and beats for everything else, so points keep both
/// to avoid converting again on the hot path.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    /// The position in beats.
    pub beat: Beat,
    /// The position in measures.
    pub measure: Measure,
}

impl Position {
    /// The position before everything.
    pub const NEG_INFINITY: Self = Self {
        beat: Beat::NEG_INFINITY,
        measure: Measure::NEG_INFINITY,
    };
    /// The position after everything.
    pub const INFINITY: Self = Self {
        beat: Beat::INFINITY,
        measure: Measure::INFINITY,
    };

    /// Creates a new position.
    #[must_use]
    pub const fn new(beat: Beat, measure: Measure) -> Self {
        Self { beat, measure }
    }
}
