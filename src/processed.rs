//! A song prepared for Star Power optimisation.
//!
//! [`ProcessedSong`] bundles the points, SP data and time conversions of one track and
//! answers the two questions the optimiser keeps asking: how much SP can be collected
//! before an activation, and whether an activation over a range of points is possible.

pub mod summary;

use crate::{
    chart::NoteTrack,
    points::{Point, PointSet},
    settings::Settings,
    sp::{MINIMUM_SP_AMOUNT, SP_PHRASE_AMOUNT, SpBar, SpData},
    tempo::{TempoError, TempoMap, converter::TimeConverter},
    time::{Beat, Measure, Position, Second, Tick},
};

const BRE_BASE_BONUS: f64 = 750.0;
const BRE_BONUS_PER_SECOND: f64 = 500.0;

/// An activation to be checked.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActivationCandidate {
    /// Index of the first point in the activation.
    pub act_start: usize,
    /// Index of the last point in the activation.
    pub act_end: usize,
    /// The earliest position the activation can begin.
    pub earliest_activation_point: Position,
    /// SP available when the activation begins.
    pub sp_bar: SpBar,
}

/// The point range of an activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProtoActivation {
    /// Index of the first point in the activation.
    pub act_start: usize,
    /// Index of the last point in the activation.
    pub act_end: usize,
}

/// An activation of an optimal path.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Activation {
    /// Index of the first point in the activation.
    pub act_start: usize,
    /// Index of the last point in the activation.
    pub act_end: usize,
    /// Whammy must continue until here for the activation to work.
    pub whammy_end: Beat,
    /// The latest the activation can be started.
    pub sp_start: Beat,
    /// Where the activation ends when started at `sp_start`.
    pub sp_end: Beat,
}

/// Whether an activation works, and if not, why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ActValidity {
    /// The activation works.
    Success,
    /// SP runs out before the last point.
    InsufficientSp,
    /// SP necessarily lasts into the point after the last one.
    SurplusSp,
}

/// Result of an activation check.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActResult {
    /// The earliest position the activation can end, meaningful on success only.
    pub ending_position: Position,
    /// Whether the activation works.
    pub validity: ActValidity,
}

impl ActResult {
    const fn failure(validity: ActValidity) -> Self {
        Self {
            ending_position: Position::new(Beat(0.0), Measure(0.0)),
            validity,
        }
    }
}

/// A set of activations and the score they gain.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Path {
    /// The activations, in order.
    pub activations: Vec<Activation>,
    /// Score gained over playing without SP.
    pub score_boost: u32,
}

/// A track with everything needed to optimise it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProcessedSong {
    converter: TimeConverter,
    points: PointSet,
    sp_data: SpData,
    total_solo_boost: u32,
    total_bre_boost: u32,
    whammy_delay: Second,
}

impl ProcessedSong {
    /// Prepares `track` for optimisation.
    ///
    /// `od_beats` are the beat marker ticks used by engines with a beat track.
    ///
    /// # Errors
    ///
    /// Returns [`TempoError`] if the tempo map cannot be sped up to `settings.speed`.
    pub fn new(
        track: &NoteTrack,
        tempo_map: &TempoMap,
        settings: &Settings,
        od_beats: &[Tick],
    ) -> Result<Self, TempoError> {
        let engine = settings.engine;
        let squeeze_settings = &settings.squeeze_settings;
        let tempo_map = tempo_map.speedup(settings.speed)?;
        let converter = TimeConverter::new(&tempo_map, engine, od_beats);
        let points = PointSet::new(track, &converter, engine, squeeze_settings.squeeze);
        let sp_data = SpData::new(
            track,
            &tempo_map,
            od_beats,
            &converter,
            squeeze_settings,
            engine,
        );
        let total_solo_boost = track.solos().iter().map(|solo| solo.value).sum();
        let total_bre_boost = match track.bre() {
            Some(bre) if engine.has_bres() => {
                let seconds =
                    |tick: Tick| converter.beats_to_seconds(tick.to_beat(track.resolution()));
                let length = seconds(bre.end) - seconds(bre.start);
                (BRE_BASE_BONUS + BRE_BONUS_PER_SECOND * length.value()) as u32
            }
            _ => 0,
        };
        Ok(Self {
            converter,
            points,
            sp_data,
            total_solo_boost,
            total_bre_boost,
            whammy_delay: squeeze_settings.whammy_delay,
        })
    }

    /// The points of the track.
    #[must_use]
    pub const fn points(&self) -> &PointSet {
        &self.points
    }

    /// The SP data of the track.
    #[must_use]
    pub const fn sp_data(&self) -> &SpData {
        &self.sp_data
    }

    /// The time conversions of the track, with speed applied.
    #[must_use]
    pub const fn converter(&self) -> &TimeConverter {
        &self.converter
    }

    /// Sum of all solo bonuses.
    #[must_use]
    pub const fn total_solo_boost(&self) -> u32 {
        self.total_solo_boost
    }

    /// The Big Rock Ending bonus, zero if there is none or the engine ignores it.
    #[must_use]
    pub const fn total_bre_boost(&self) -> u32 {
        self.total_bre_boost
    }

    /// Delay before whammy resumes after an activation.
    #[must_use]
    pub const fn whammy_delay(&self) -> Second {
        self.whammy_delay
    }

    fn phrases_before(&self, first_point: usize, act_start: usize) -> SpBar {
        let mut sp_bar = SpBar::EMPTY;
        for _ in self.points.sp_granting_notes(first_point, act_start) {
            sp_bar.add_phrase();
        }
        sp_bar
    }

    fn point_beat(&self, index: usize) -> Beat {
        self.points
            .get(index)
            .map_or(Beat::INFINITY, |point| point.position.beat)
    }

    /// The least and most SP collectable from `start` up to the point `act_start`.
    ///
    /// Phrases are counted from `first_point` on, excluding `act_start` itself. Whammy
    /// before `required_whammy_end` is mandatory, so it counts towards the minimum too.
    #[must_use]
    pub fn total_available_sp(
        &self,
        start: Beat,
        first_point: usize,
        act_start: usize,
        required_whammy_end: Beat,
    ) -> SpBar {
        let mut sp_bar = self.phrases_before(first_point, act_start);
        let act_start_beat = self.point_beat(act_start);

        if start >= required_whammy_end {
            sp_bar.max = (sp_bar.max + self.sp_data.available_whammy(start, act_start_beat)).min(1.0);
        } else if required_whammy_end >= act_start_beat {
            sp_bar.min = (sp_bar.min + self.sp_data.available_whammy(start, act_start_beat)).min(1.0);
            sp_bar.max = sp_bar.min;
        } else {
            sp_bar.min = (sp_bar.min + self.sp_data.available_whammy(start, required_whammy_end)).min(1.0);
            sp_bar.max = (sp_bar.min
                + self
                    .sp_data
                    .available_whammy(required_whammy_end, act_start_beat))
            .min(1.0);
        }

        sp_bar
    }

    /// Like [`Self::total_available_sp`] without mandatory whammy, also finding the
    /// earliest position at or after `earliest_potential_pos` where half a bar is reached.
    ///
    /// If half a bar is never reached, `earliest_potential_pos` is returned unchanged.
    #[must_use]
    pub fn total_available_sp_with_earliest_pos(
        &self,
        start: Beat,
        first_point: usize,
        act_start: usize,
        earliest_potential_pos: Position,
    ) -> (SpBar, Position) {
        const BEAT_EPSILON: f64 = 0.0001;

        let mut sp_bar = self.phrases_before(first_point, act_start);
        sp_bar.max = (sp_bar.max
            + self
                .sp_data
                .available_whammy(start, earliest_potential_pos.beat))
        .min(1.0);

        if sp_bar.full_enough_to_activate() {
            return (sp_bar, earliest_potential_pos);
        }

        let extra_sp_required = MINIMUM_SP_AMOUNT - sp_bar.max;
        let mut first_beat = earliest_potential_pos.beat;
        let mut last_beat = self.point_beat(act_start);
        if self.sp_data.available_whammy(first_beat, last_beat) < extra_sp_required {
            return (sp_bar, earliest_potential_pos);
        }

        while (last_beat - first_beat).value() > BEAT_EPSILON {
            let mid_beat = first_beat.midpoint(last_beat);
            if self
                .sp_data
                .available_whammy(earliest_potential_pos.beat, mid_beat)
                < extra_sp_required
            {
                first_beat = mid_beat;
            } else {
                last_beat = mid_beat;
            }
        }

        sp_bar.max = (sp_bar.max
            + self
                .sp_data
                .available_whammy(earliest_potential_pos.beat, last_beat))
        .min(1.0);

        (sp_bar, self.converter.position(last_beat))
    }

    /// The start of `point`'s hit window, with only `squeeze` of the early window used.
    #[must_use]
    pub fn adjusted_hit_window_start(&self, point: &Point, squeeze: f64) -> Position {
        if squeeze >= 1.0 {
            return point.hit_window_start;
        }
        let start = self.converter.beats_to_seconds(point.hit_window_start.beat);
        let mid = self.converter.beats_to_seconds(point.position.beat);
        let adjusted = start + (mid - start) * (1.0 - squeeze);
        self.converter
            .position(self.converter.seconds_to_beats(adjusted))
    }

    /// The end of `point`'s hit window, with only `squeeze` of the late window used.
    #[must_use]
    pub fn adjusted_hit_window_end(&self, point: &Point, squeeze: f64) -> Position {
        if squeeze >= 1.0 {
            return point.hit_window_end;
        }
        let mid = self.converter.beats_to_seconds(point.position.beat);
        let end = self.converter.beats_to_seconds(point.hit_window_end.beat);
        let adjusted = mid + (end - mid) * squeeze;
        self.converter
            .position(self.converter.seconds_to_beats(adjusted))
    }

    /// Checks an activation with full use of the hit windows and no mandatory whammy.
    #[must_use]
    pub fn is_candidate_valid(&self, activation: &ActivationCandidate) -> ActResult {
        self.is_restricted_candidate_valid(activation, 1.0, Position::NEG_INFINITY)
    }

    /// Checks an activation using only `squeeze` of the hit windows, with whammy
    /// mandatory up to `required_whammy_end`.
    ///
    /// The latest case assumes every whammy opportunity is taken, and must not run dry
    /// before the last point. The earliest case assumes the minimum SP, and must not
    /// reach the point after the last one.
    #[must_use]
    pub fn is_restricted_candidate_valid(
        &self,
        activation: &ActivationCandidate,
        squeeze: f64,
        required_whammy_end: Position,
    ) -> ActResult {
        let insufficient = ActResult::failure(ActValidity::InsufficientSp);
        let (Some(act_start), Some(act_end)) = (
            self.points.get(activation.act_start),
            self.points.get(activation.act_end),
        ) else {
            return insufficient;
        };
        if !activation.sp_bar.full_enough_to_activate() {
            return insufficient;
        }
        let measures_per_bar = self.sp_data.measures_per_bar();

        let mut early_pos = activation.earliest_activation_point;
        let mut late_pos = self.adjusted_hit_window_end(act_start, squeeze);
        let mut sp_early = activation.sp_bar.min.max(MINIMUM_SP_AMOUNT);
        let mut sp_late = (activation.sp_bar.max
            + self.sp_data.available_whammy_before(
                early_pos.beat,
                late_pos.beat,
                act_start.position.beat,
            ))
        .min(1.0);

        let sp_notes = self
            .points
            .sp_granting_notes(activation.act_start, activation.act_end)
            .filter_map(|index| self.points.get(index));
        for point in sp_notes {
            let hit_start = self.adjusted_hit_window_start(point, squeeze);
            let hit_end = self.adjusted_hit_window_end(point, squeeze);

            let earliest_late = if hit_start.beat < late_pos.beat {
                late_pos
            } else {
                hit_start
            };
            sp_late = self
                .sp_data
                .propagate_sp_over_whammy_max(late_pos, earliest_late, sp_late);
            if sp_late < 0.0 {
                return insufficient;
            }
            let note_end = self
                .sp_data
                .activation_end_point(earliest_late, hit_end, sp_late);
            sp_late = self
                .sp_data
                .propagate_sp_over_whammy_max(earliest_late, note_end, sp_late)
                .max(0.0);
            sp_late = (sp_late + SP_PHRASE_AMOUNT).min(1.0);
            late_pos = note_end;

            let earliest_early = if hit_start.beat < early_pos.beat {
                early_pos
            } else {
                hit_start
            };
            sp_early = self.sp_data.propagate_sp_over_whammy_min(
                early_pos,
                earliest_early,
                sp_early,
                required_whammy_end,
            );
            sp_early = (sp_early + SP_PHRASE_AMOUNT).min(1.0);
            early_pos = earliest_early;
        }

        let ending_pos = self.adjusted_hit_window_start(act_end, squeeze);
        sp_late = self
            .sp_data
            .propagate_sp_over_whammy_max(late_pos, ending_pos, sp_late);
        if sp_late < 0.0 {
            return insufficient;
        }
        sp_early = self.sp_data.propagate_sp_over_whammy_min(
            early_pos,
            ending_pos,
            sp_early,
            required_whammy_end,
        );
        if act_end.is_sp_granting_note {
            sp_early = (sp_early + SP_PHRASE_AMOUNT).min(1.0);
        }

        let end_meas = ending_pos.measure + Measure(sp_early * measures_per_bar);
        if let Some(next_point) = self.points.get(activation.act_end + 1)
            && end_meas >= self.adjusted_hit_window_end(next_point, squeeze).measure
        {
            return ActResult::failure(ActValidity::SurplusSp);
        }

        ActResult {
            ending_position: Position::new(self.converter.measures_to_beats(end_meas), end_meas),
            validity: ActValidity::Success,
        }
    }
}
