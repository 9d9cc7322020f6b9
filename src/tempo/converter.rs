//! Conversions that respect the measure strategy of an engine.
//!
//! Most engines derive measures from time signatures. Engines that use a beat track
//! instead place measure `i / 4` at the `i`-th beat marker, ignoring time signatures.

use super::{DEFAULT_BEAT_RATE, Segments, TempoMap};
use crate::{
    engine::Engine,
    time::{Beat, Measure, Position, Second, Tick},
};

/// Converts positions between beats, measures and seconds for one song and engine.
///
/// The measure strategy is chosen once on construction and never mixed.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeConverter {
    resolution: i64,
    seconds: Segments,
    measures: Segments,
}

impl TimeConverter {
    /// Creates a new converter.
    ///
    /// `od_beats` are the beat marker ticks, only consulted when `engine` uses a beat track.
    #[must_use]
    pub fn new(tempo_map: &TempoMap, engine: Engine, od_beats: &[Tick]) -> Self {
        let measures = if engine.uses_beat_track() {
            beat_track_segments(od_beats, tempo_map.resolution())
        } else {
            tempo_map.measure_segments().clone()
        };
        Self {
            resolution: tempo_map.resolution(),
            seconds: tempo_map.second_segments().clone(),
            measures,
        }
    }

    /// Ticks per quarter note.
    #[must_use]
    pub const fn resolution(&self) -> i64 {
        self.resolution
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

    /// Converts beats into measures.
    #[must_use]
    pub fn beats_to_measures(&self, beats: Beat) -> Measure {
        Measure(self.measures.forward(beats.value()))
    }

    /// Converts measures into beats.
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

    /// Pairs a beat with its measure.
    #[must_use]
    pub fn position(&self, beat: Beat) -> Position {
        Position::new(beat, self.beats_to_measures(beat))
    }

    /// Pairs a tick with its beat and measure.
    #[must_use]
    pub fn tick_position(&self, tick: Tick) -> Position {
        self.position(tick.to_beat(self.resolution))
    }
}

fn beat_track_segments(od_beats: &[Tick], resolution: i64) -> Segments {
    let measures_per_beat = 1.0 / DEFAULT_BEAT_RATE.as_f64();
    let knots = if od_beats.is_empty() {
        vec![(0.0, 0.0)]
    } else {
        od_beats
            .iter()
            .enumerate()
            .map(|(index, tick)| {
                (
                    tick.to_beat(resolution).value(),
                    index as f64 * measures_per_beat,
                )
            })
            .collect()
    };
    Segments::new(knots, measures_per_beat, measures_per_beat)
}
