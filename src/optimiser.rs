//! The Star Power path search.
//!
//! [`Optimiser::optimal_path`] runs a memoised top-down search. A subproblem is keyed by
//! the first point an activation may start on and the position SP can be gathered from,
//! and is solved by trying every valid activation from there and solving the rest of
//! the song after it. Subproblems are driven by an explicit stack of frames, so long
//! charts do not exhaust the call stack.

pub mod cache;

use std::sync::atomic::{AtomicBool, Ordering};

use itertools::Itertools;
use log::{debug, trace, warn};
use thiserror::Error;

use self::cache::{Cache, CacheKey, CacheValue, PointRangeSet};
use crate::{
    points::next_matching,
    processed::{
        ActValidity, Activation, ActivationCandidate, Path, ProcessedSong, ProtoActivation,
    },
    sp::{MINIMUM_SP_AMOUNT, SpBar},
    time::{Beat, Measure, Position, Second},
};

/// An error occurred during a search.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SearchError {
    /// The termination flag was raised before the search finished.
    #[error("search was cancelled")]
    Cancelled,
}

/// Finds optimal paths of one [`ProcessedSong`].
#[derive(Debug, Clone)]
pub struct Optimiser<'a> {
    song: &'a ProcessedSong,
    next_candidate_points: Vec<usize>,
    whammy_delay: Second,
    reuse_previous_subpaths: bool,
}

impl<'a> Optimiser<'a> {
    /// Creates an optimiser for `song`.
    #[must_use]
    pub fn new(song: &'a ProcessedSong) -> Self {
        let sp_data = song.sp_data();
        let next_candidate_points = next_matching(song.points().points(), |point| {
            point.is_sp_granting_note
                || (point.is_hold_point && sp_data.is_in_whammy_ranges(point.position.beat))
        });
        let point_count = song.points().len();
        trace!(
            "{} of {point_count} points can precede an activation",
            next_candidate_points
                .iter()
                .dedup()
                .filter(|&&point| point < point_count)
                .count()
        );
        Self {
            song,
            next_candidate_points,
            whammy_delay: song.whammy_delay(),
            reuse_previous_subpaths: true,
        }
    }

    /// Whether a hold point may reuse the subpaths of the hold point before it.
    ///
    /// Reused subpaths are revalidated, so this only affects speed. Enabled by default.
    #[must_use]
    pub fn with_previous_subpath_reuse(mut self, reuse_previous_subpaths: bool) -> Self {
        self.reuse_previous_subpaths = reuse_previous_subpaths;
        self
    }

    /// Finds the path with the highest score.
    ///
    /// Among activations reaching the same score, the one needing the least squeeze is
    /// chosen.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Cancelled`] if `terminate` is raised during the search.
    pub fn optimal_path(&self, terminate: &AtomicBool) -> Result<Path, SearchError> {
        debug!("searching {} points", self.song.points().len());
        let start_key = self.advance_cache_key(CacheKey {
            point: 0,
            position: Position::NEG_INFINITY,
        });
        let mut cache = Cache::default();
        self.solve(start_key, &mut cache, terminate)?;

        let score_boost = cache
            .paths
            .get(&start_key)
            .map_or(0, |value| value.score_boost);
        let activations = self.reconstruct(start_key, &cache);
        debug!(
            "found {} activations gaining {score_boost} with {} subpaths and {} full SP subpaths cached",
            activations.len(),
            cache.paths.len(),
            cache.full_sp_paths.len()
        );
        Ok(Path {
            activations,
            score_boost,
        })
    }

    fn next_candidate_point(&self, point: usize) -> usize {
        self.next_candidate_points
            .get(point)
            .copied()
            .unwrap_or(self.song.points().len())
    }

    /// Moves the key to the next point an activation may start on. SP cannot be gathered
    /// before the hit window of the point preceding it.
    fn advance_cache_key(&self, mut key: CacheKey) -> CacheKey {
        let points = self.song.points();
        key.point = self.next_candidate_point(key.point);
        if key.point >= points.len() {
            return key;
        }
        if let Some(previous) = points.get(key.point.saturating_sub(1))
            && previous.hit_window_start.beat >= key.position.beat
        {
            key.position = previous.hit_window_start;
        }
        key
    }

    /// The key the rest of a path starts from after an activation ending at `position`.
    fn key_after_activation(&self, point: usize, mut position: Position) -> CacheKey {
        if self.whammy_delay > Second(0.0) {
            let converter = self.song.converter();
            let seconds = converter.beats_to_seconds(position.beat) + self.whammy_delay;
            position = converter.position(converter.seconds_to_beats(seconds));
        }
        self.advance_cache_key(CacheKey { point, position })
    }

    /// The start of the hit window of the point before `point`, squeezed.
    fn window_start_before(&self, point: usize, squeeze: f64) -> Position {
        point
            .checked_sub(1)
            .and_then(|previous| self.song.points().get(previous))
            .map_or(Position::NEG_INFINITY, |previous| {
                self.song.adjusted_hit_window_start(previous, squeeze)
            })
    }

    /// A point every activation from `point` at `pos` with `sp_bar_amount` SP must reach.
    fn act_end_lower_bound(&self, point: usize, pos: Measure, sp_bar_amount: f64) -> usize {
        let end_pos = pos + Measure(self.song.sp_data().measures_per_bar() * sp_bar_amount);
        let points = self.song.points().points();
        let first_beyond = points
            .iter()
            .enumerate()
            .skip(point)
            .find(|(_, candidate)| candidate.hit_window_end.measure > end_pos)
            .map_or(points.len(), |(index, _)| index);
        first_beyond.saturating_sub(1).max(point)
    }

    fn solve(
        &self,
        key: CacheKey,
        cache: &mut Cache,
        terminate: &AtomicBool,
    ) -> Result<(), SearchError> {
        if key.point >= self.song.points().len() || cache.paths.contains_key(&key) {
            return Ok(());
        }
        let mut stack = Vec::new();
        let point_count = self.song.points().len();
        let mut pending = Some(Frame::new(Goal::Path(key), key, false, point_count));
        loop {
            if let Some(frame) = pending.take() {
                if terminate.load(Ordering::Relaxed) {
                    warn!("search cancelled with {} subpaths pending", stack.len() + 1);
                    return Err(SearchError::Cancelled);
                }
                stack.push(frame);
            }
            let Some(frame) = stack.last_mut() else {
                return Ok(());
            };
            match self.step(cache, frame) {
                Step::Continue => {}
                Step::Descend(child) => pending = Some(child),
                Step::Done(value) => {
                    let Some(frame) = stack.pop() else {
                        return Ok(());
                    };
                    match frame.goal {
                        Goal::Path(path_key) => cache.paths.insert(path_key, value),
                        Goal::FullSp(point) => cache.full_sp_paths.insert(point, value),
                    };
                }
            }
        }
    }

    fn step(&self, cache: &Cache, frame: &mut Frame) -> Step {
        match frame.stage {
            Stage::Begin => {
                if let Goal::Path(key) = frame.goal
                    && !frame.has_full_sp
                    && let Some(value) = self.try_previous_best_subpaths(key, cache)
                {
                    trace!("point {} reuses the subpaths of its predecessor", key.point);
                    return Step::Done(value);
                }
                frame.stage = Stage::NextStart {
                    point: frame.key.point,
                };
                Step::Continue
            }
            Stage::NextStart { point } => self.next_act_start(cache, frame, point),
            Stage::NextEnd { start, act_end } => self.next_act_end(cache, frame, start, act_end),
            Stage::AwaitRest {
                start,
                act_end,
                next_key,
                act_score,
            } => {
                let rest = cache
                    .paths
                    .get(&next_key)
                    .map_or(0, |value| value.score_boost);
                frame.record(start.point, act_end, next_key, act_score + rest);
                frame.stage = Stage::NextEnd {
                    start,
                    act_end: act_end + 1,
                };
                Step::Continue
            }
            Stage::AwaitFullSp { point } => match cache.full_sp_paths.get(&point) {
                Some(value) => frame.merge_full_sp(value),
                None => frame.finish(),
            },
        }
    }

    /// Adjacent hold points often share their best subpaths, and a hold point's subpaths
    /// can score no more than its predecessor's. So the predecessor's are tried first.
    fn try_previous_best_subpaths(&self, key: CacheKey, cache: &Cache) -> Option<CacheValue> {
        if !self.reuse_previous_subpaths {
            return None;
        }
        let points = self.song.points();
        let point = points.get(key.point)?;
        let previous = points.get(key.point.checked_sub(1)?)?;
        if !point.is_hold_point || !previous.is_hold_point {
            return None;
        }
        let (prev_key, prev_value) = cache.paths.range(..key).next_back()?;
        if key.point - prev_key.point > 1 {
            return None;
        }

        let next_acts = prev_value
            .possible_next_acts
            .iter()
            .filter(|(act, next_key)| {
                if act.act_start < key.point {
                    return false;
                }
                let (sp_bar, starting_pos) = self.song.total_available_sp_with_earliest_pos(
                    key.position.beat,
                    key.point,
                    act.act_start,
                    self.window_start_before(act.act_start, 1.0),
                );
                let candidate = ActivationCandidate {
                    act_start: act.act_start,
                    act_end: act.act_end,
                    earliest_activation_point: starting_pos,
                    sp_bar,
                };
                let result = self.song.is_candidate_valid(&candidate);
                result.validity == ActValidity::Success
                    && result.ending_position.beat <= next_key.position.beat
            })
            .copied()
            .collect::<Vec<_>>();
        if next_acts.is_empty() {
            return None;
        }
        Some(CacheValue {
            possible_next_acts: next_acts,
            score_boost: prev_value.score_boost,
        })
    }

    fn next_act_start(&self, cache: &Cache, frame: &mut Frame, point: usize) -> Step {
        let points = self.song.points();
        if point >= points.len() {
            return frame.finish();
        }
        let key = frame.key;
        let mut sp_bar = SpBar::FULL;
        let mut starting_pos = self.window_start_before(point, 1.0);
        if !frame.has_full_sp {
            (sp_bar, starting_pos) = self.song.total_available_sp_with_earliest_pos(
                key.position.beat,
                key.point,
                point,
                starting_pos,
            );
        }
        if !sp_bar.full_enough_to_activate() {
            frame.stage = Stage::NextStart { point: point + 1 };
            return Step::Continue;
        }

        let after_phrase = point
            .checked_sub(1)
            .and_then(|previous| points.get(previous))
            .is_some_and(|previous| previous.is_sp_granting_note);
        if point != key.point && sp_bar.max >= 1.0 && after_phrase {
            if let Some(value) = cache.full_sp_paths.get(&point) {
                return frame.merge_full_sp(value);
            }
            frame.stage = Stage::AwaitFullSp { point };
            let full_key = CacheKey {
                point,
                position: self.window_start_before(point, 1.0),
            };
            return Step::Descend(Frame::new(
                Goal::FullSp(point),
                full_key,
                true,
                points.len(),
            ));
        }

        let act_end_min = self.act_end_lower_bound(
            point,
            starting_pos.measure,
            sp_bar.min.max(MINIMUM_SP_AMOUNT),
        );
        frame.stage = Stage::NextEnd {
            start: ActStart {
                point,
                starting_pos,
                sp_bar,
            },
            act_end: act_end_min.max(frame.attained_act_ends.lowest_absent_element()),
        };
        Step::Continue
    }

    fn next_act_end(
        &self,
        cache: &Cache,
        frame: &mut Frame,
        start: ActStart,
        mut act_end: usize,
    ) -> Step {
        let points = self.song.points();
        while let Some(end_point) = points.get(act_end) {
            if frame.attained_act_ends.contains(act_end) {
                act_end += 1;
                continue;
            }
            let candidate = ActivationCandidate {
                act_start: start.point,
                act_end,
                earliest_activation_point: start.starting_pos,
                sp_bar: start.sp_bar,
            };
            let result = self.song.is_candidate_valid(&candidate);
            match result.validity {
                // Later hold points cannot be reached either, but the next note might.
                ActValidity::InsufficientSp if end_point.is_hold_point => {
                    act_end = points.next_non_hold_point(act_end);
                }
                ActValidity::InsufficientSp => break,
                ActValidity::SurplusSp => {
                    frame.attained_act_ends.add(act_end);
                    act_end += 1;
                }
                ActValidity::Success => {
                    frame.attained_act_ends.add(act_end);
                    let act_score = points.range_score(start.point, act_end + 1);
                    let next_key = self.key_after_activation(act_end + 1, result.ending_position);
                    let rest = if next_key.point >= points.len() {
                        Some(0)
                    } else {
                        cache.paths.get(&next_key).map(|value| value.score_boost)
                    };
                    let Some(rest) = rest else {
                        frame.stage = Stage::AwaitRest {
                            start,
                            act_end,
                            next_key,
                            act_score,
                        };
                        return Step::Descend(Frame::new(
                            Goal::Path(next_key),
                            next_key,
                            false,
                            points.len(),
                        ));
                    };
                    frame.record(start.point, act_end, next_key, act_score + rest);
                    act_end += 1;
                }
            }
        }
        frame.stage = Stage::NextStart {
            point: start.point + 1,
        };
        Step::Continue
    }

    fn reconstruct(&self, start_key: CacheKey, cache: &Cache) -> Vec<Activation> {
        let mut activations = Vec::new();
        let mut key = start_key;
        while key.point < self.song.points().len() {
            let Some(value) = cache.paths.get(&key) else {
                break;
            };
            // Empty when the song ends with unused SP.
            let easiest = value
                .possible_next_acts
                .iter()
                .map(|&(act, next_key)| (act, next_key, self.act_squeeze_level(act, key)))
                .reduce(|best, other| if other.2 < best.2 { other } else { best });
            let Some((act, next_key, squeeze)) = easiest else {
                break;
            };
            let whammy_end = self.forced_whammy_end(act, key, squeeze);
            let (sp_start, sp_end) = self.act_duration(act, key, squeeze, whammy_end);
            activations.push(Activation {
                act_start: act.act_start,
                act_end: act.act_end,
                whammy_end: whammy_end.beat,
                sp_start,
                sp_end,
            });
            key = next_key;
        }
        activations
    }

    /// The least squeeze for which the activation is still valid, to within 0.01.
    fn act_squeeze_level(&self, act: ProtoActivation, key: CacheKey) -> f64 {
        const THRESHOLD: f64 = 0.01;

        let mut min_squeeze = 0.0;
        let mut max_squeeze = 1.0;
        while max_squeeze - min_squeeze > THRESHOLD {
            let trial_squeeze = f64::midpoint(min_squeeze, max_squeeze);
            let mut start_pos = self.window_start_before(act.act_start, trial_squeeze);
            if start_pos.beat < key.position.beat {
                start_pos = key.position;
            }
            let (sp_bar, start_pos) = self.song.total_available_sp_with_earliest_pos(
                key.position.beat,
                key.point,
                act.act_start,
                start_pos,
            );
            let candidate = ActivationCandidate {
                act_start: act.act_start,
                act_end: act.act_end,
                earliest_activation_point: start_pos,
                sp_bar,
            };
            let result = self.song.is_restricted_candidate_valid(
                &candidate,
                trial_squeeze,
                Position::NEG_INFINITY,
            );
            if result.validity == ActValidity::Success {
                max_squeeze = trial_squeeze;
            } else {
                min_squeeze = trial_squeeze;
            }
        }
        max_squeeze
    }

    /// How long whammy must be held before the activation for it to work, to within
    /// 0.01 beats. Unbounded if the activation covers the last point.
    fn forced_whammy_end(&self, act: ProtoActivation, key: CacheKey, squeeze: f64) -> Position {
        const THRESHOLD: f64 = 0.01;

        let Some(next_point) = self.song.points().get(act.act_end + 1) else {
            return Position::INFINITY;
        };
        let converter = self.song.converter();
        let start_pos = self.window_start_before(act.act_start, squeeze);
        let mut min_whammy_force = key.position;
        let mut max_whammy_force = next_point.hit_window_end;
        while (max_whammy_force.beat - min_whammy_force.beat).value() > THRESHOLD {
            let mid_beat = min_whammy_force.beat.midpoint(max_whammy_force.beat);
            let mid_pos = converter.position(mid_beat);
            let sp_bar = self.song.total_available_sp(
                key.position.beat,
                key.point,
                act.act_start,
                mid_beat,
            );
            let candidate = ActivationCandidate {
                act_start: act.act_start,
                act_end: act.act_end,
                earliest_activation_point: start_pos,
                sp_bar,
            };
            let result = self
                .song
                .is_restricted_candidate_valid(&candidate, squeeze, mid_pos);
            if result.validity == ActValidity::Success {
                min_whammy_force = mid_pos;
            } else {
                max_whammy_force = mid_pos;
            }
        }
        min_whammy_force
    }

    /// The latest start of the activation, to within 0.01 beats, and where it then ends.
    fn act_duration(
        &self,
        act: ProtoActivation,
        key: CacheKey,
        squeeze: f64,
        whammy_end: Position,
    ) -> (Beat, Beat) {
        const THRESHOLD: f64 = 0.01;

        let converter = self.song.converter();
        let mut min_pos = self.window_start_before(act.act_start, squeeze);
        let mut max_pos = self
            .song
            .points()
            .get(act.act_start)
            .map_or(min_pos, |point| self.song.adjusted_hit_window_end(point, squeeze));
        let sp_bar = self.song.total_available_sp(
            key.position.beat,
            key.point,
            act.act_start,
            whammy_end.beat,
        );
        let candidate_from = |earliest_activation_point| ActivationCandidate {
            act_start: act.act_start,
            act_end: act.act_end,
            earliest_activation_point,
            sp_bar,
        };
        while (max_pos.beat - min_pos.beat).value() > THRESHOLD {
            let trial_pos = converter.position(min_pos.beat.midpoint(max_pos.beat));
            let result = self.song.is_restricted_candidate_valid(
                &candidate_from(trial_pos),
                squeeze,
                whammy_end,
            );
            if result.validity == ActValidity::Success {
                min_pos = trial_pos;
            } else {
                max_pos = trial_pos;
            }
        }

        let result = self.song.is_restricted_candidate_valid(
            &candidate_from(min_pos),
            squeeze,
            whammy_end,
        );
        (min_pos.beat, result.ending_position.beat)
    }
}

/// What a frame computes.
#[derive(Debug, Clone, Copy)]
enum Goal {
    Path(CacheKey),
    FullSp(usize),
}

/// An activation start being extended to every possible end.
#[derive(Debug, Clone, Copy)]
struct ActStart {
    point: usize,
    starting_pos: Position,
    sp_bar: SpBar,
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Begin,
    NextStart {
        point: usize,
    },
    NextEnd {
        start: ActStart,
        act_end: usize,
    },
    /// Waiting for the rest of the path after `act_end`.
    AwaitRest {
        start: ActStart,
        act_end: usize,
        next_key: CacheKey,
        act_score: u32,
    },
    AwaitFullSp {
        point: usize,
    },
}

enum Step {
    Continue,
    Descend(Frame),
    Done(CacheValue),
}

/// One subpath search in progress.
#[derive(Debug)]
struct Frame {
    goal: Goal,
    key: CacheKey,
    has_full_sp: bool,
    acts: Vec<(ProtoActivation, CacheKey)>,
    best_score_boost: u32,
    attained_act_ends: PointRangeSet,
    stage: Stage,
}

impl Frame {
    const fn new(goal: Goal, key: CacheKey, has_full_sp: bool, point_count: usize) -> Self {
        Self {
            goal,
            key,
            has_full_sp,
            acts: Vec::new(),
            best_score_boost: 0,
            attained_act_ends: PointRangeSet::new(key.point, point_count),
            stage: Stage::Begin,
        }
    }

    fn record(&mut self, act_start: usize, act_end: usize, next_key: CacheKey, score: u32) {
        let act = ProtoActivation { act_start, act_end };
        if score > self.best_score_boost {
            self.best_score_boost = score;
            self.acts.clear();
            self.acts.push((act, next_key));
        } else if score == self.best_score_boost {
            self.acts.push((act, next_key));
        }
    }

    /// Ends the search with the best subpaths given full SP at a later point, which
    /// cover every later activation start.
    fn merge_full_sp(&mut self, value: &CacheValue) -> Step {
        if value.score_boost > self.best_score_boost {
            return Step::Done(value.clone());
        }
        if value.score_boost == self.best_score_boost {
            self.acts.extend_from_slice(&value.possible_next_acts);
        }
        self.finish()
    }

    fn finish(&mut self) -> Step {
        Step::Done(CacheValue {
            possible_next_acts: std::mem::take(&mut self.acts),
            score_boost: self.best_score_boost,
        })
    }
}
