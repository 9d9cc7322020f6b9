//! Star Power gain and drain.
//!
//! SP drains at one bar per eight measures. While a sustain inside an SP phrase is held,
//! whammy adds SP at the engine's gain rate, so the net rate over a whammy range depends
//! on how many beats a measure has.
//!
//! Propagation functions return the remaining SP, or a negative value when the bar runs
//! dry somewhere in the range. Callers treat a negative result as failure.

use crate::{
    chart::NoteTrack,
    engine::Engine,
    settings::SqueezeSettings,
    tempo::{TempoMap, converter::TimeConverter},
    time::{Beat, Measure, Position, Tick},
};

pub(crate) const SP_PHRASE_AMOUNT: f64 = 0.25;
pub(crate) const MINIMUM_SP_AMOUNT: f64 = 0.5;
const DEFAULT_BEATS_PER_BAR: f64 = 32.0;

/// The least and most SP that can be held at some moment.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpBar {
    /// SP if whammy is skipped whenever possible.
    pub min: f64,
    /// SP if every whammy opportunity is taken.
    pub max: f64,
}

impl SpBar {
    /// An empty bar.
    pub const EMPTY: Self = Self::new(0.0, 0.0);
    /// A full bar.
    pub const FULL: Self = Self::new(1.0, 1.0);

    /// Creates a new bar.
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Adds the SP of one completed phrase to both bounds.
    pub fn add_phrase(&mut self) {
        self.min = (self.min + SP_PHRASE_AMOUNT).min(1.0);
        self.max = (self.max + SP_PHRASE_AMOUNT).min(1.0);
    }

    /// Whether the bar can be at least half full.
    #[must_use]
    pub fn full_enough_to_activate(&self) -> bool {
        self.max >= MINIMUM_SP_AMOUNT
    }
}

/// Net SP change per beat of whammy from `position` on.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct BeatRate {
    position: Beat,
    net_sp_gain_rate: f64,
}

/// A range in which whammy gains SP.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WhammyRange {
    /// Where whammy can start.
    pub start: Position,
    /// Where whammy must stop.
    pub end: Position,
    /// The note whose sustain opened this range.
    pub note: Beat,
}

/// SP drain rates and whammy ranges of a song.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpData {
    converter: TimeConverter,
    beat_rates: Vec<BeatRate>,
    whammy_ranges: Vec<WhammyRange>,
    sp_gain_rate: f64,
    default_net_sp_gain_rate: f64,
    measures_per_bar: f64,
}

impl SpData {
    /// Builds the SP data of `track`.
    ///
    /// `tempo_map` supplies the time signatures and `od_beats` the beat track, whichever
    /// the engine uses for measures. `converter` must be built from the same inputs.
    #[must_use]
    pub fn new(
        track: &NoteTrack,
        tempo_map: &TempoMap,
        od_beats: &[Tick],
        converter: &TimeConverter,
        squeeze_settings: &SqueezeSettings,
        engine: Engine,
    ) -> Self {
        let beat_rates = beat_rates(tempo_map, od_beats, engine);
        let whammy_ranges = whammy_ranges(track, converter, squeeze_settings, engine);
        Self {
            converter: converter.clone(),
            beat_rates,
            whammy_ranges,
            sp_gain_rate: engine.sp_gain_rate(),
            default_net_sp_gain_rate: engine.sp_gain_rate() - 1.0 / DEFAULT_BEATS_PER_BAR,
            measures_per_bar: engine.measures_per_bar(),
        }
    }

    /// The merged whammy ranges, sorted by position.
    #[must_use]
    pub fn whammy_ranges(&self) -> &[WhammyRange] {
        &self.whammy_ranges
    }

    /// Measures a full bar lasts without whammy.
    #[must_use]
    pub const fn measures_per_bar(&self) -> f64 {
        self.measures_per_bar
    }

    /// Index of the first whammy range ending after `pos`.
    fn first_whammy_range_after(&self, pos: Beat) -> usize {
        self.whammy_ranges
            .partition_point(|range| range.end.beat <= pos)
    }

    fn drain(&self, from: Measure, to: Measure) -> f64 {
        (to - from).value() / self.measures_per_bar
    }

    /// Propagates SP from `start` to `end`, taking every whammy opportunity.
    ///
    /// Returns the SP left at `end`, or a negative value if SP runs out on the way.
    #[must_use]
    pub fn propagate_sp_over_whammy_max(
        &self,
        mut start: Position,
        end: Position,
        mut sp: f64,
    ) -> f64 {
        if end.beat <= start.beat {
            return sp;
        }
        let ranges = self.whammy_ranges.iter().skip(self.first_whammy_range_after(start.beat));
        for range in ranges.take_while(|range| range.start.beat < end.beat) {
            if range.start.beat > start.beat {
                sp -= self.drain(start.measure, range.start.measure);
                if sp < 0.0 {
                    return sp;
                }
                start = range.start;
            }
            let range_end = end.beat.min(range.end.beat);
            sp = self.propagate_over_whammy_range(start.beat, range_end, sp);
            if sp < 0.0 || range.end.beat >= end.beat {
                return sp;
            }
            start = range.end;
        }
        sp - self.drain(start.measure, end.measure)
    }

    /// Propagates SP from `start` to `end`, whammying only until `required_whammy_end`.
    ///
    /// The result is clamped to be non-negative.
    #[must_use]
    pub fn propagate_sp_over_whammy_min(
        &self,
        mut start: Position,
        end: Position,
        mut sp: f64,
        required_whammy_end: Position,
    ) -> f64 {
        if required_whammy_end.beat > start.beat {
            let whammy_end = if required_whammy_end.beat < end.beat {
                required_whammy_end
            } else {
                end
            };
            sp = self.propagate_sp_over_whammy_max(start, whammy_end, sp);
            start = required_whammy_end;
        }
        if start.beat < end.beat {
            sp -= self.drain(start.measure, end.measure);
        }
        sp.max(0.0)
    }

    /// Index of the beat rate in effect at `start`, or `None` before the first one.
    fn beat_rate_at(&self, start: Beat) -> Option<usize> {
        self.beat_rates
            .partition_point(|rate| rate.position < start)
            .checked_sub(1)
    }

    /// Walks the beat rates over `[start, end)`, all whammied.
    ///
    /// `on_segment` receives the segment start, its end, its net rate and the current SP.
    /// It returns `Some` to stop the walk early with that value.
    fn walk_whammy_range<T>(
        &self,
        mut start: Beat,
        end: Beat,
        mut sp: f64,
        mut on_segment: impl FnMut(Beat, Beat, f64, f64) -> Option<T>,
    ) -> Result<f64, T> {
        let mut index = match self.beat_rate_at(start) {
            Some(index) => index,
            None => {
                let first = self.beat_rates.first().map_or(end, |rate| rate.position);
                let subrange_end = end.min(first);
                sp += (subrange_end - start).value() * self.default_net_sp_gain_rate;
                sp = sp.min(1.0);
                start = subrange_end;
                0
            }
        };
        while start < end {
            let Some(rate) = self.beat_rates.get(index) else {
                break;
            };
            let subrange_end = self
                .beat_rates
                .get(index + 1)
                .map_or(end, |next| end.min(next.position));
            if let Some(stop) = on_segment(start, subrange_end, rate.net_sp_gain_rate, sp) {
                return Err(stop);
            }
            sp += (subrange_end - start).value() * rate.net_sp_gain_rate;
            sp = sp.min(1.0);
            start = subrange_end;
            index += 1;
        }
        Ok(sp)
    }

    fn propagate_over_whammy_range(&self, start: Beat, end: Beat, sp: f64) -> f64 {
        let walk = self.walk_whammy_range(start, end, sp, |from, to, rate, sp| {
            (sp + (to - from).value() * rate < 0.0).then_some(())
        });
        walk.unwrap_or(-1.0)
    }

    /// Where SP runs out if all of `[start, end)` is whammied, or `end` if it never does.
    fn whammy_propagation_endpoint(&self, start: Beat, end: Beat, sp: f64) -> Beat {
        let walk = self.walk_whammy_range(start, end, sp, |from, to, rate, sp| {
            (sp + (to - from).value() * rate < 0.0).then(|| from + Beat(-sp / rate))
        });
        match walk {
            Ok(_) => end,
            Err(endpoint) => endpoint,
        }
    }

    /// Whether `beat` can be whammied.
    #[must_use]
    pub fn is_in_whammy_ranges(&self, beat: Beat) -> bool {
        self.whammy_ranges
            .get(self.first_whammy_range_after(beat))
            .is_some_and(|range| range.start.beat <= beat)
    }

    /// Total SP obtainable by whammy over `[start, end)`.
    #[must_use]
    pub fn available_whammy(&self, start: Beat, end: Beat) -> f64 {
        self.available_whammy_before(start, end, Beat::INFINITY)
    }

    /// Total SP obtainable by whammy over `[start, end)` from notes before `note_pos`.
    #[must_use]
    pub fn available_whammy_before(&self, start: Beat, end: Beat, note_pos: Beat) -> f64 {
        self.whammy_ranges
            .iter()
            .skip(self.first_whammy_range_after(start))
            .take_while(|range| range.start.beat < end && range.note < note_pos)
            .map(|range| {
                let whammy_start = range.start.beat.max(start);
                let whammy_end = range.end.beat.min(end);
                (whammy_end - whammy_start).value() * self.sp_gain_rate
            })
            .sum()
    }

    /// How far an activation with `sp` from `start` can last, whammying throughout.
    ///
    /// Returns `end` if the activation reaches it.
    #[must_use]
    pub fn activation_end_point(&self, mut start: Position, end: Position, mut sp: f64) -> Position {
        let ranges = self.whammy_ranges.iter().skip(self.first_whammy_range_after(start.beat));
        for range in ranges.take_while(|range| range.start.beat < end.beat) {
            if range.start.beat > start.beat {
                let deduction = self.drain(start.measure, range.start.measure);
                if sp < deduction {
                    return self.drain_end_point(start, sp);
                }
                sp -= deduction;
                start = range.start;
            }
            let range_end = end.beat.min(range.end.beat);
            let new_sp = self.propagate_over_whammy_range(start.beat, range_end, sp);
            if new_sp < 0.0 {
                let end_beat = self.whammy_propagation_endpoint(start.beat, end.beat, sp);
                return self.converter.position(end_beat);
            }
            sp = new_sp;
            if range.end.beat >= end.beat {
                return end;
            }
            start = range.end;
        }
        if sp < self.drain(start.measure, end.measure) {
            return self.drain_end_point(start, sp);
        }
        end
    }

    /// Where `sp` runs out without whammy.
    fn drain_end_point(&self, start: Position, sp: f64) -> Position {
        let measure = start.measure + Measure(sp * self.measures_per_bar);
        Position::new(self.converter.measures_to_beats(measure), measure)
    }
}

fn beat_rates(tempo_map: &TempoMap, od_beats: &[Tick], engine: Engine) -> Vec<BeatRate> {
    let resolution = tempo_map.resolution();
    let gain = engine.sp_gain_rate();
    if !engine.uses_beat_track() {
        return tempo_map
            .time_sigs()
            .iter()
            .map(|ts| BeatRate {
                position: ts.position.to_beat(resolution),
                net_sp_gain_rate: gain - 1.0 / (engine.measures_per_bar() * ts.beat_rate()),
            })
            .collect();
    }
    let rates = od_beats
        .windows(2)
        .filter_map(|pair| match pair {
            [marker, next] => {
                let position = marker.to_beat(resolution);
                let gap = (next.to_beat(resolution) - position).value();
                Some(BeatRate {
                    position,
                    net_sp_gain_rate: gain - 1.0 / (DEFAULT_BEATS_PER_BAR * gap),
                })
            }
            _ => None,
        })
        .collect::<Vec<_>>();
    if rates.is_empty() {
        vec![BeatRate {
            position: Beat(0.0),
            net_sp_gain_rate: gain - 1.0 / DEFAULT_BEATS_PER_BAR,
        }]
    } else {
        rates
    }
}

fn whammy_ranges(
    track: &NoteTrack,
    converter: &TimeConverter,
    squeeze_settings: &SqueezeSettings,
    engine: Engine,
) -> Vec<WhammyRange> {
    let early_window = engine.early_timing_window() * squeeze_settings.early_whammy;
    let resolution = track.resolution();
    let phrases = track.sp_phrases();

    let mut ranges = track
        .notes()
        .iter()
        .filter(|note| note.length > Tick(0))
        .filter(|note| phrases.iter().any(|phrase| phrase.contains(note.position)))
        .filter_map(|note| {
            let note_beat = note.position.to_beat(resolution);
            let start_second = converter.beats_to_seconds(note_beat) - early_window
                + squeeze_settings.lazy_whammy
                + squeeze_settings.video_lag;
            let start = converter.seconds_to_beats(start_second);
            let end = (note.position + note.length).to_beat(resolution);
            (start < end).then_some((start, end, note_beat))
        })
        .collect::<Vec<_>>();
    ranges.sort_by(|a, b| {
        a.0.value()
            .total_cmp(&b.0.value())
            .then_with(|| a.1.value().total_cmp(&b.1.value()))
            .then_with(|| a.2.value().total_cmp(&b.2.value()))
    });

    let mut merged: Vec<(Beat, Beat, Beat)> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.0 <= last.1 => last.1 = last.1.max(range.1),
            _ => merged.push(range),
        }
    }

    merged
        .into_iter()
        .map(|(start, end, note)| WhammyRange {
            start: converter.position(start),
            end: converter.position(end),
            note,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        chart::{Note, StarPower},
        tempo::TimeSignature,
    };

    #[track_caller]
    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    fn sp_data(notes: Vec<Note>, phrases: Vec<StarPower>, tempo_map: &TempoMap) -> SpData {
        let track = NoteTrack::new(notes, phrases, vec![], 192).expect("valid track");
        let converter = TimeConverter::new(tempo_map, Engine::CloneHero, &[]);
        SpData::new(
            &track,
            tempo_map,
            &[],
            &converter,
            &SqueezeSettings::default(),
            Engine::CloneHero,
        )
    }

    fn whammy_song() -> SpData {
        sp_data(
            vec![
                Note::new(0).with_length(1920),
                Note::new(2112),
                Note::new(2304).with_length(384),
                Note::new(3072).with_length(192),
            ],
            vec![StarPower::new(0, 3000), StarPower::new(3072, 100)],
            &TempoMap::default(),
        )
    }

    fn position(beat: f64) -> Position {
        Position::new(Beat(beat), Measure(beat / 4.0))
    }

    #[test]
    fn sp_bar_phrases_and_activation() {
        let mut bar = SpBar::new(0.8, 0.9);
        bar.add_phrase();
        assert_eq!(bar, SpBar::FULL);

        let mut bar = SpBar::new(0.25, 0.5);
        bar.add_phrase();
        assert_eq!(bar, SpBar::new(0.5, 0.75));

        assert!(!SpBar::new(0.49, 0.49).full_enough_to_activate());
        assert!(SpBar::new(0.0, 0.5).full_enough_to_activate());
    }

    #[test]
    fn whammy_ranges_merge_and_start_early() {
        let data = whammy_song();
        let ranges = data.whammy_ranges();

        assert_eq!(ranges.len(), 3);
        assert_close(ranges[0].start.beat.value(), -0.14);
        assert_close(ranges[0].end.beat.value(), 10.0);
        assert_close(ranges[1].start.beat.value(), 11.86);
        assert_close(ranges[2].end.beat.value(), 17.0);
        assert!(data.is_in_whammy_ranges(Beat(5.0)));
        assert!(!data.is_in_whammy_ranges(Beat(11.0)));
    }

    #[test]
    fn available_whammy_is_additive() {
        let data = whammy_song();
        let whole = data.available_whammy(Beat(0.0), Beat(16.5));
        let split = data.available_whammy(Beat(0.0), Beat(11.0))
            + data.available_whammy(Beat(11.0), Beat(16.5));

        assert_close(whole, split);
        assert_close(data.available_whammy(Beat(0.0), Beat(4.0)), 4.0 / 30.0);
        assert_close(
            data.available_whammy_before(Beat(0.0), Beat(16.5), Beat(12.0)),
            10.0 / 30.0,
        );
    }

    #[test]
    fn max_propagation_gains_over_whammy() {
        let data = whammy_song();

        let sp = data.propagate_sp_over_whammy_max(position(0.0), position(4.0), 0.5);
        assert_close(sp, 0.5 + 4.0 * (1.0 / 30.0 - 1.0 / 32.0));

        let sp = data.propagate_sp_over_whammy_max(position(10.0), position(11.0), 0.5);
        assert_close(sp, 0.5 - 1.0 / 32.0);

        let sp = data.propagate_sp_over_whammy_max(position(20.0), position(60.0), 0.25);
        assert!(sp < 0.0);
    }

    #[test]
    fn whammy_never_overfills_the_bar() {
        let data = whammy_song();
        for sp in [0.5, 0.9, 1.0] {
            for end in (1..=20).map(f64::from).map(position) {
                let max = data.propagate_sp_over_whammy_max(position(0.0), end, sp);
                let min = data.propagate_sp_over_whammy_min(position(0.0), end, sp, end);
                assert!(max <= 1.0, "max {max} from {sp} to {}", end.beat);
                assert!(min <= max.max(0.0) + 1e-9, "min {min} above max {max}");
            }
        }
        assert_close(
            data.propagate_sp_over_whammy_max(position(0.0), position(8.0), 1.0),
            1.0,
        );
    }

    #[test]
    fn min_propagation_stops_whammy_early() {
        let data = whammy_song();

        let sp = data.propagate_sp_over_whammy_min(
            position(0.0),
            position(4.0),
            0.5,
            Position::NEG_INFINITY,
        );
        assert_close(sp, 0.5 - 4.0 / 32.0);

        let sp = data.propagate_sp_over_whammy_min(position(0.0), position(4.0), 0.5, position(2.0));
        assert_close(sp, 0.5 + 2.0 * (1.0 / 30.0 - 1.0 / 32.0) - 2.0 / 32.0);

        let sp = data.propagate_sp_over_whammy_min(
            position(0.0),
            position(40.0),
            0.1,
            Position::NEG_INFINITY,
        );
        assert_close(sp, 0.0);
    }

    #[test]
    fn activation_end_point_without_whammy() {
        let data = sp_data(vec![Note::new(0)], vec![], &TempoMap::default());

        let end = data.activation_end_point(position(0.0), position(100.0), 0.5);
        assert_close(end.beat.value(), 16.0);
        assert_close(end.measure.value(), 4.0);

        let end = data.activation_end_point(position(0.0), position(8.0), 0.5);
        assert_eq!(end, position(8.0));
    }

    #[test]
    fn drain_follows_time_signatures() {
        let tempo_map = TempoMap::new(
            vec![TimeSignature {
                position: Tick(0),
                numerator: 3,
                denominator: 4,
            }],
            vec![],
            192,
        )
        .expect("valid tempo map");
        let data = sp_data(
            vec![Note::new(0).with_length(1920)],
            vec![StarPower::new(0, 100)],
            &tempo_map,
        );

        let start = Position::new(Beat(0.0), Measure(0.0));
        let end = Position::new(Beat(3.0), Measure(1.0));
        let sp = data.propagate_sp_over_whammy_max(start, end, 0.5);
        assert_close(sp, 0.5 + 3.0 * (1.0 / 30.0 - 1.0 / 24.0));
    }
}
