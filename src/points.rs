//! Scoring units derived from a note track.
//!
//! Each chord becomes one onset [`Point`], and sustains are split into hold points worth
//! one point each. Points are identified by their index in the [`PointSet`], which every
//! later stage uses as a stable key.

use itertools::Itertools;

use crate::{
    chart::{Note, NoteTrack, StarPower},
    engine::Engine,
    tempo::converter::TimeConverter,
    time::{Beat, Position, Tick},
};

/// One scoring unit.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point {
    /// Where the point is.
    pub position: Position,
    /// The earliest position the point can be hit.
    pub hit_window_start: Position,
    /// The latest position the point can be hit.
    pub hit_window_end: Position,
    /// Score including the combo multiplier.
    pub value: u32,
    /// Score before the combo multiplier.
    pub base_value: u32,
    /// Whether the point is a sustain subdivision rather than a note onset.
    pub is_hold_point: bool,
    /// Whether hitting the point completes an SP phrase.
    pub is_sp_granting_note: bool,
}

impl Point {
    fn hold(position: Position, value: u32) -> Self {
        Self {
            position,
            hit_window_start: position,
            hit_window_end: position,
            value,
            base_value: value,
            is_hold_point: true,
            is_sp_granting_note: false,
        }
    }
}

/// The ordered points of a track with precomputed lookups.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PointSet {
    points: Vec<Point>,
    next_non_hold_point: Vec<usize>,
    next_sp_granting_note: Vec<usize>,
    solo_boosts: Vec<(Position, u32)>,
    cumulative_score_totals: Vec<u32>,
}

impl PointSet {
    /// Builds the points of `track`.
    ///
    /// `squeeze` scales the engine's hit windows.
    #[must_use]
    pub fn new(track: &NoteTrack, converter: &TimeConverter, engine: Engine, squeeze: f64) -> Self {
        let points = points_from_track(track, converter, engine, squeeze);
        let next_non_hold_point = next_matching(&points, |point| !point.is_hold_point);
        let next_sp_granting_note = next_matching(&points, |point| point.is_sp_granting_note);
        let solo_boosts = track
            .solos()
            .iter()
            .map(|solo| (converter.tick_position(solo.end), solo.value))
            .collect();
        let cumulative_score_totals = std::iter::once(0)
            .chain(points.iter().scan(0, |sum, point| {
                *sum += point.value;
                Some(*sum)
            }))
            .collect();
        Self {
            points,
            next_non_hold_point,
            next_sp_granting_note,
            solo_boosts,
            cumulative_score_totals,
        }
    }

    /// All points, sorted by position.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether there are no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The point at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Point> {
        self.points.get(index)
    }

    /// The first non-hold point at or after `index`, or [`Self::len`] if none.
    #[must_use]
    pub fn next_non_hold_point(&self, index: usize) -> usize {
        self.next_non_hold_point
            .get(index)
            .copied()
            .unwrap_or(self.points.len())
    }

    /// The first SP granting note at or after `index`, or [`Self::len`] if none.
    #[must_use]
    pub fn next_sp_granting_note(&self, index: usize) -> usize {
        self.next_sp_granting_note
            .get(index)
            .copied()
            .unwrap_or(self.points.len())
    }

    /// Indices of the SP granting notes in `start..end`.
    pub fn sp_granting_notes(&self, start: usize, end: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(Some(self.next_sp_granting_note(start)), |&index| {
            Some(self.next_sp_granting_note(index + 1))
        })
        .take_while(move |&index| index < end)
    }

    /// Total value of the points in `start..end`.
    #[must_use]
    pub fn range_score(&self, start: usize, end: usize) -> u32 {
        let total = |index: usize| {
            self.cumulative_score_totals
                .get(index.min(self.points.len()))
                .copied()
                .unwrap_or_default()
        };
        total(end).saturating_sub(total(start))
    }

    /// End positions and bonuses of the solos.
    #[must_use]
    pub fn solo_boosts(&self) -> &[(Position, u32)] {
        &self.solo_boosts
    }
}

fn points_from_track(
    track: &NoteTrack,
    converter: &TimeConverter,
    engine: Engine,
    squeeze: f64,
) -> Vec<Point> {
    let resolution = track.resolution();
    let early_window = engine.early_timing_window() * squeeze;
    let late_window = engine.late_timing_window() * squeeze;
    let mut phrases = track.sp_phrases().iter().peekable();
    let mut points = Vec::with_capacity(track.notes().len());

    let chunks = track.notes().iter().chunk_by(|note| note.position);
    let mut chords = (&chunks).into_iter().peekable();
    while let Some((position, chord)) = chords.next() {
        let chord = chord.copied().collect::<Vec<_>>();
        let next_position = chords.peek().map(|(next, _)| *next);
        let is_sp_granting_note = phrases
            .next_if(|phrase| ends_phrase(phrase, position, next_position))
            .is_some();

        let position = converter.tick_position(position);
        let seconds = converter.beats_to_seconds(position.beat);
        let hit_window_start = converter.position(converter.seconds_to_beats(seconds - early_window));
        let hit_window_end = converter.position(converter.seconds_to_beats(seconds + late_window));
        let value = engine.base_note_value() * chord.len() as u32;
        points.push(Point {
            position,
            hit_window_start,
            hit_window_end,
            value,
            base_value: value,
            is_hold_point: false,
            is_sp_granting_note,
        });

        append_chord_sustain_points(&mut points, &chord, resolution, converter, engine);
    }

    points.sort_by(|a, b| a.position.beat.value().total_cmp(&b.position.beat.value()));

    let mut combo = 0;
    for point in &mut points {
        if !point.is_hold_point {
            combo += 1;
        }
        point.value *= engine.multiplier(combo);
    }

    points
}

fn ends_phrase(phrase: &StarPower, position: Tick, next_position: Option<Tick>) -> bool {
    phrase.contains(position) && next_position.is_none_or(|next| !phrase.contains(next))
}

fn append_chord_sustain_points(
    points: &mut Vec<Point>,
    chord: &[Note],
    resolution: i64,
    converter: &TimeConverter,
    engine: Engine,
) {
    let Some(first) = chord.first() else {
        return;
    };
    match chord.iter().minmax_by_key(|note| note.length).into_option() {
        Some((min, max)) if min.length == max.length => {
            let multiplier = if engine.chords_multiply_sustains() {
                chord.len() as u32
            } else {
                1
            };
            append_sustain_points(
                points,
                first.position,
                max.length,
                multiplier,
                resolution,
                converter,
                engine,
            );
        }
        _ => {
            for note in chord {
                append_sustain_points(
                    points,
                    note.position,
                    note.length,
                    1,
                    resolution,
                    converter,
                    engine,
                );
            }
        }
    }
}

fn append_sustain_points(
    points: &mut Vec<Point>,
    mut position: Tick,
    mut length: Tick,
    multiplier: u32,
    resolution: i64,
    converter: &TimeConverter,
    engine: Engine,
) {
    const HALF_TICK: f64 = 0.5;

    if length.to_beat(resolution) < engine.minimum_sustain_length() || length <= Tick(0) {
        return;
    }
    let tick_gap = Tick((resolution / engine.sust_points_per_beat()).max(1));
    let burst_ticks = Tick((engine.burst_size().value() * resolution as f64) as i64);
    let mut sust_ticks = num::Integer::div_ceil(&length.0, &tick_gap.0);

    while length > burst_ticks {
        position = position + tick_gap;
        length = length - tick_gap;
        sust_ticks -= 1;
        let beat = Beat((position.0 as f64 - HALF_TICK) / resolution as f64);
        points.push(Point::hold(converter.position(beat), multiplier));
    }
    if sust_ticks > 0 {
        let beat = Beat((position.0 as f64 + HALF_TICK) / resolution as f64);
        points.push(Point::hold(
            converter.position(beat),
            sust_ticks as u32 * multiplier,
        ));
    }
}

/// For each index, the first index at or after it whose point matches `predicate`.
pub(crate) fn next_matching(points: &[Point], predicate: impl Fn(&Point) -> bool) -> Vec<usize> {
    let mut next = points.len();
    let mut table = points
        .iter()
        .enumerate()
        .rev()
        .map(|(index, point)| {
            if predicate(point) {
                next = index;
            }
            next
        })
        .collect::<Vec<_>>();
    table.reverse();
    table
}
