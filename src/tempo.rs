//! Tempo and time signature events, and conversions between time domains.
//!
//! [`TempoMap`] holds the canonical BPM and time signature sequences of a song. Both
//! sequences are sorted by position, never have two events at the same tick, and always
//! begin with an event at tick 0 (120 BPM and 4/4 are synthesized if missing).
//!
//! [`converter::TimeConverter`] adds the beat track strategy for measures that some
//! engines use instead of time signatures.

pub mod converter;

use strict_num_extended::PositiveF64;
use thiserror::Error;

use crate::time::{Beat, Measure, Second, Tick};

pub(crate) const DEFAULT_BPM: PositiveF64 = PositiveF64::new_const(120.0);
pub(crate) const DEFAULT_BEAT_RATE: PositiveF64 = PositiveF64::new_const(4.0);
const DEFAULT_SPEED: u32 = 100;

/// An error occurred when building a [`TempoMap`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TempoError {
    /// The resolution (ticks per quarter note) was zero or negative.
    #[error("resolution must be positive, got {0}")]
    NonPositiveResolution(i64),
    /// A BPM event had a zero, negative or non-finite tempo.
    #[error("BPM at {position} must be positive, got {bpm}")]
    NonPositiveBpm {
        /// Where the event was placed.
        position: Tick,
        /// The rejected tempo.
        bpm: f64,
    },
    /// A playback speed of zero percent was requested.
    #[error("speed must be positive")]
    NonPositiveSpeed,
    /// A time signature had a zero or negative component.
    #[error("time signature at {position} must be positive/positive, got {numerator}/{denominator}")]
    NonPositiveTimeSignature {
        /// Where the event was placed.
        position: Tick,
        /// The rejected numerator.
        numerator: i32,
        /// The rejected denominator.
        denominator: i32,
    },
}

/// A time signature change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeSignature {
    /// Where the time signature starts.
    pub position: Tick,
    /// Beats in the measure.
    pub numerator: i32,
    /// Note value of one beat.
    pub denominator: i32,
}

impl TimeSignature {
    /// Quarter notes per measure under this time signature.
    #[must_use]
    pub fn beat_rate(&self) -> f64 {
        f64::from(self.numerator) * DEFAULT_BEAT_RATE.as_f64() / f64::from(self.denominator)
    }
}

/// A tempo change event.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bpm {
    /// Where the tempo starts.
    pub position: Tick,
    /// Quarter notes per minute.
    pub bpm: PositiveF64,
}

impl Bpm {
    /// Creates a tempo change event.
    ///
    /// # Errors
    ///
    /// Returns [`TempoError::NonPositiveBpm`] if `bpm` is zero, negative or not finite.
    pub fn new(position: Tick, bpm: f64) -> Result<Self, TempoError> {
        let bpm =
            PositiveF64::new(bpm).map_err(|_| TempoError::NonPositiveBpm { position, bpm })?;
        Ok(Self { position, bpm })
    }
}

/// Canonical tempo and time signature data of a song, with precomputed segment tables.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TempoMap {
    time_sigs: Vec<TimeSignature>,
    bpms: Vec<Bpm>,
    resolution: i64,
    seconds: Segments,
    measures: Segments,
}

impl Default for TempoMap {
    fn default() -> Self {
        const DEFAULT_RESOLUTION: i64 = 192;
        Self::from_canonical(
            vec![default_time_sig()],
            vec![default_bpm()],
            DEFAULT_RESOLUTION,
        )
    }
}

impl TempoMap {
    /// Builds a tempo map from events in any order.
    ///
    /// Events are stably sorted by position. When several events share a position the
    /// last one wins. An event at tick 0 is synthesized when none is given.
    ///
    /// # Errors
    ///
    /// Returns [`TempoError`] if the resolution or a time signature is not positive.
    pub fn new(
        mut time_sigs: Vec<TimeSignature>,
        mut bpms: Vec<Bpm>,
        resolution: i64,
    ) -> Result<Self, TempoError> {
        if resolution <= 0 {
            return Err(TempoError::NonPositiveResolution(resolution));
        }
        if let Some(bad) = time_sigs
            .iter()
            .find(|ts| ts.numerator <= 0 || ts.denominator <= 0)
        {
            return Err(TempoError::NonPositiveTimeSignature {
                position: bad.position,
                numerator: bad.numerator,
                denominator: bad.denominator,
            });
        }

        bpms.sort_by_key(|bpm| bpm.position);
        time_sigs.sort_by_key(|ts| ts.position);
        let bpms = dedup_last_wins(default_bpm(), bpms, |bpm| bpm.position);
        let time_sigs = dedup_last_wins(default_time_sig(), time_sigs, |ts| ts.position);

        Ok(Self::from_canonical(time_sigs, bpms, resolution))
    }

    fn from_canonical(time_sigs: Vec<TimeSignature>, bpms: Vec<Bpm>, resolution: i64) -> Self {
        let seconds = Segments::beat_seconds(&bpms, resolution);
        let measures = Segments::beat_measures(&time_sigs, resolution);
        Self {
            time_sigs,
            bpms,
            resolution,
            seconds,
            measures,
        }
    }

    /// The time signatures, sorted and deduplicated.
    #[must_use]
    pub fn time_sigs(&self) -> &[TimeSignature] {
        &self.time_sigs
    }

    /// The tempo changes, sorted and deduplicated.
    #[must_use]
    pub fn bpms(&self) -> &[Bpm] {
        &self.bpms
    }

    /// Ticks per quarter note.
    #[must_use]
    pub const fn resolution(&self) -> i64 {
        self.resolution
    }

    /// Returns the tempo map for a playback speed of `speed` percent (100 is normal speed).
    ///
    /// # Errors
    ///
    /// Returns [`TempoError::NonPositiveSpeed`] if `speed` is zero, or
    /// [`TempoError::NonPositiveBpm`] if a sped up tempo overflows.
    pub fn speedup(&self, speed: u32) -> Result<Self, TempoError> {
        if speed == 0 {
            return Err(TempoError::NonPositiveSpeed);
        }
        let factor = f64::from(speed) / f64::from(DEFAULT_SPEED);
        let bpms = self
            .bpms
            .iter()
            .map(|bpm| Bpm::new(bpm.position, bpm.bpm.as_f64() * factor))
            .collect::<Result<_, _>>()?;
        Ok(Self::from_canonical(
            self.time_sigs.clone(),
            bpms,
            self.resolution,
        ))
    }

    /// Converts ticks into beats.
    #[must_use]
    pub fn ticks_to_beats(&self, ticks: Tick) -> Beat {
        ticks.to_beat(self.resolution)
    }

    /// Converts beats into ticks, truncating toward zero.
    #[must_use]
    pub fn beats_to_ticks(&self, beats: Beat) -> Tick {
        Tick((beats.value() * self.resolution as f64) as i64)
    }

    /// Converts beats into seconds.
    #[must_use]
    pub fn beats_to_seconds(&self, beats: Beat) -> Second {
        Second(self.seconds.forward(beats.value()))
    }

    /// Converts seconds into beats.
    #[must_use]
    pub fn seconds_to_beats(&self, seconds: Second) -> Beat {
        Beat(self.seconds.inverse(seconds.value()))
    }

    /// Converts beats into measures, using time signatures.
    #[must_use]
    pub fn beats_to_measures(&self, beats: Beat) -> Measure {
        Measure(self.measures.forward(beats.value()))
    }

    /// Converts measures into beats, using time signatures.
    #[must_use]
    pub fn measures_to_beats(&self, measures: Measure) -> Beat {
        Beat(self.measures.inverse(measures.value()))
    }

    /// Converts measures into seconds.
    #[must_use]
    pub fn measures_to_seconds(&self, measures: Measure) -> Second {
        self.beats_to_seconds(self.measures_to_beats(measures))
    }

    /// Converts seconds into measures.
    #[must_use]
    pub fn seconds_to_measures(&self, seconds: Second) -> Measure {
        self.beats_to_measures(self.seconds_to_beats(seconds))
    }

    pub(crate) const fn second_segments(&self) -> &Segments {
        &self.seconds
    }

    pub(crate) const fn measure_segments(&self) -> &Segments {
        &self.measures
    }
}

fn default_bpm() -> Bpm {
    Bpm {
        position: Tick(0),
        bpm: DEFAULT_BPM,
    }
}

fn default_time_sig() -> TimeSignature {
    TimeSignature {
        position: Tick(0),
        numerator: 4,
        denominator: 4,
    }
}

/// Collapses sorted events so each position keeps only its last event, seeding with
/// `initial` at tick 0 which any real event at tick 0 replaces.
fn dedup_last_wins<T: Copy>(initial: T, sorted: Vec<T>, position: impl Fn(&T) -> Tick) -> Vec<T> {
    let mut canonical = Vec::with_capacity(sorted.len() + 1);
    let mut prev = initial;
    for event in sorted {
        if position(&event) != position(&prev) {
            canonical.push(prev);
        }
        prev = event;
    }
    canonical.push(prev);
    canonical
}

/// A piecewise linear, strictly increasing map between two time domains.
///
/// Knots are `(x, y)` pairs sorted by both coordinates. Outside the knots, the map
/// extrapolates with `before_rate` and `after_rate` (change of `y` per unit of `x`).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub(crate) struct Segments {
    knots: Vec<(f64, f64)>,
    before_rate: f64,
    after_rate: f64,
}

impl Segments {
    /// Builds from knots; `knots` must be non-empty and increasing.
    pub(crate) fn new(knots: Vec<(f64, f64)>, before_rate: f64, after_rate: f64) -> Self {
        debug_assert!(!knots.is_empty());
        Self {
            knots,
            before_rate,
            after_rate,
        }
    }

    /// Beats to seconds from tempo events. Beats before 0 use the default tempo.
    fn beat_seconds(bpms: &[Bpm], resolution: i64) -> Self {
        let mut knots = Vec::with_capacity(bpms.len());
        let mut last_beat = 0.0;
        let mut last_bpm = DEFAULT_BPM.as_f64();
        let mut last_time = 0.0;
        for bpm in bpms {
            let beat = bpm.position.to_beat(resolution).value();
            last_time += Beat(beat - last_beat).to_second(last_bpm).value();
            knots.push((beat, last_time));
            last_beat = beat;
            last_bpm = bpm.bpm.as_f64();
        }
        let seconds_per_beat = |bpm: f64| Beat(1.0).to_second(bpm).value();
        Self::new(
            knots,
            seconds_per_beat(DEFAULT_BPM.as_f64()),
            seconds_per_beat(last_bpm),
        )
    }

    /// Beats to measures from time signatures. Beats before 0 use 4/4.
    fn beat_measures(time_sigs: &[TimeSignature], resolution: i64) -> Self {
        let mut knots = Vec::with_capacity(time_sigs.len());
        let mut last_beat = 0.0;
        let mut last_beat_rate = DEFAULT_BEAT_RATE.as_f64();
        let mut last_measure = 0.0;
        for ts in time_sigs {
            let beat = ts.position.to_beat(resolution).value();
            last_measure += (beat - last_beat) / last_beat_rate;
            knots.push((beat, last_measure));
            last_beat = beat;
            last_beat_rate = ts.beat_rate();
        }
        Self::new(
            knots,
            1.0 / DEFAULT_BEAT_RATE.as_f64(),
            1.0 / last_beat_rate,
        )
    }

    /// Maps `x` to `y`.
    pub(crate) fn forward(&self, x: f64) -> f64 {
        let index = self.knots.partition_point(|&(kx, _)| kx < x);
        self.interpolate(index, std::convert::identity, x, self.before_rate, self.after_rate)
    }

    /// Maps `y` back to `x`.
    pub(crate) fn inverse(&self, y: f64) -> f64 {
        let index = self.knots.partition_point(|&(_, ky)| ky < y);
        self.interpolate(
            index,
            |(kx, ky)| (ky, kx),
            y,
            self.before_rate.recip(),
            self.after_rate.recip(),
        )
    }

    /// Interpolates between the knots around `index`, where `orient` picks which knot
    /// coordinate is the input.
    fn interpolate(
        &self,
        index: usize,
        orient: impl Fn((f64, f64)) -> (f64, f64),
        input: f64,
        before_rate: f64,
        after_rate: f64,
    ) -> f64 {
        let prev = index.checked_sub(1).and_then(|prev| self.knots.get(prev));
        match (prev, self.knots.get(index)) {
            (Some(&prev), Some(&next)) => {
                let (prev_in, prev_out) = orient(prev);
                let (next_in, next_out) = orient(next);
                prev_out + (next_out - prev_out) * ((input - prev_in) / (next_in - prev_in))
            }
            (None, Some(&first)) => {
                let (first_in, first_out) = orient(first);
                first_out - (first_in - input) * before_rate
            }
            (_, None) => {
                let (last_in, last_out) = self.knots.last().copied().map_or((0.0, 0.0), &orient);
                last_out + (input - last_in) * after_rate
            }
        }
    }
}
