use std::sync::atomic::AtomicBool;

use pretty_assertions::assert_eq;
use rand::{RngExt, SeedableRng, rngs::StdRng};
use starpath::{optimiser::cache::CacheKey, prelude::*};

fn song(notes: Vec<Note>, phrases: Vec<StarPower>) -> ProcessedSong {
    let track = NoteTrack::new(notes, phrases, vec![], 192).expect("valid track");
    ProcessedSong::new(&track, &TempoMap::default(), &Settings::default(), &[])
        .expect("valid song")
}

fn chord(position: i64) -> [Note; 3] {
    [
        Note::new(position),
        Note::new(position).with_colour(NoteColour::Red),
        Note::new(position).with_colour(NoteColour::Yellow),
    ]
}

fn optimal_path(song: &ProcessedSong) -> Path {
    Optimiser::new(song)
        .optimal_path(&AtomicBool::new(false))
        .expect("search is not cancelled")
}

/// Compares point ranges exactly and beats to within the search precision.
#[track_caller]
fn assert_acts(actual: &[Activation], expected: &[(usize, usize, f64, f64)]) {
    let ranges = actual
        .iter()
        .map(|act| (act.act_start, act.act_end))
        .collect::<Vec<_>>();
    let expected_ranges = expected
        .iter()
        .map(|&(start, end, _, _)| (start, end))
        .collect::<Vec<_>>();
    assert_eq!(ranges, expected_ranges);
    for (act, &(_, _, sp_start, sp_end)) in actual.iter().zip(expected) {
        assert!(
            (act.sp_start.value() - sp_start).abs() < 0.02,
            "expected SP start near {sp_start}, got {}",
            act.sp_start
        );
        assert!(
            (act.sp_end.value() - sp_end).abs() < 0.02,
            "expected SP end near {sp_end}, got {}",
            act.sp_end
        );
    }
}

#[test]
fn simplest_song_with_a_path() {
    let song = song(
        vec![Note::new(0), Note::new(192), Note::new(384)],
        vec![StarPower::new(0, 50), StarPower::new(192, 50)],
    );
    let path = optimal_path(&song);

    assert_eq!(path.score_boost, 50);
    assert_acts(&path.activations, &[(2, 2, 2.0, 18.0)]);
}

#[test]
fn multiple_activations() {
    let mut notes = vec![Note::new(0), Note::new(192)];
    notes.extend(chord(384));
    notes.extend([Note::new(3840), Note::new(4032)]);
    notes.extend(chord(10368));
    let song = song(
        notes,
        vec![
            StarPower::new(0, 50),
            StarPower::new(192, 50),
            StarPower::new(3840, 50),
            StarPower::new(4032, 50),
        ],
    );
    let path = optimal_path(&song);

    assert_eq!(path.score_boost, 300);
    assert_acts(&path.activations, &[(2, 2, 2.0, 18.0), (5, 5, 54.0, 70.0)]);
}

#[test]
fn activation_over_several_notes() {
    let song = song(
        vec![Note::new(0), Note::new(192), Note::new(384), Note::new(576)],
        vec![StarPower::new(0, 50), StarPower::new(192, 50)],
    );
    let path = optimal_path(&song);

    assert_eq!(path.score_boost, 100);
    assert_acts(&path.activations, &[(2, 3, 2.0, 18.0)]);
}

#[test]
fn activation_lasting_as_long_as_possible() {
    let song = song(
        vec![Note::new(0), Note::new(192), Note::new(384), Note::new(3360)],
        vec![StarPower::new(0, 50), StarPower::new(192, 50)],
    );
    let path = optimal_path(&song);

    assert_eq!(path.score_boost, 100);
    assert_acts(&path.activations, &[(2, 3, 2.0, 18.0)]);
}

#[test]
fn waiting_beats_activating_greedily() {
    let song = song(
        vec![
            Note::new(0),
            Note::new(192),
            Note::new(384),
            Note::new(3840),
            Note::new(3840).with_colour(NoteColour::Red),
        ],
        vec![StarPower::new(0, 50), StarPower::new(192, 50)],
    );
    let path = optimal_path(&song);

    assert_eq!(path.score_boost, 100);
    assert_acts(&path.activations, &[(3, 3, 20.0, 36.0)]);
}

#[test]
fn phrase_hit_early() {
    let song = song(
        vec![
            Note::new(0),
            Note::new(192),
            Note::new(384),
            Note::new(3224),
            Note::new(9378),
            Note::new(15714),
            Note::new(15715),
        ],
        vec![
            StarPower::new(0, 50),
            StarPower::new(192, 50),
            StarPower::new(3224, 50),
            StarPower::new(9378, 50),
        ],
    );
    let path = optimal_path(&song);

    assert_eq!(path.score_boost, 150);
    assert_acts(
        &path.activations,
        &[(2, 2, 0.8958, 16.8958), (5, 6, 81.84375, 97.84375)],
    );
}

// Taking 2 then 1 needs the third phrase squeezed early, which makes the 1 impossible.
#[test]
fn late_activation_ends_matter() {
    let mut notes = vec![
        Note::new(0),
        Note::new(192),
        Note::new(384),
        Note::new(3234).with_length(1440),
    ];
    notes.extend((10944..=10953).map(Note::new));
    let song = song(
        notes,
        vec![
            StarPower::new(0, 50),
            StarPower::new(192, 50),
            StarPower::new(3234, 50),
        ],
    );
    let path = optimal_path(&song);

    assert_eq!(path.score_boost, 750);
    assert_eq!(path.activations.len(), 1);
}

#[test]
fn whammy_before_activation_is_counted_once() {
    let song = song(
        vec![
            Note::new(192).with_length(1440),
            Note::new(1632),
            Note::new(6336),
        ],
        vec![StarPower::new(192, 1), StarPower::new(1632, 1)],
    );

    assert!(optimal_path(&song).score_boost < 100);
}

#[test]
fn activation_after_sp_sustain_starts_on_its_note() {
    let song = song(
        vec![
            Note::new(0).with_length(1488),
            Note::new(2880).with_length(3264),
        ],
        vec![StarPower::new(0, 1)],
    );
    let path = optimal_path(&song);

    let act = path.activations.first().expect("one activation");
    assert!(act.sp_start >= Beat(15.0), "SP starts at {}", act.sp_start);
}

#[test]
fn compressed_whammy_ends_before_next_point() {
    let mut notes = vec![Note::new(192).with_length(192), Note::new(672)];
    notes.extend(chord(1000));
    notes.extend([Note::new(3840), Note::new(9984)]);
    notes.extend(chord(10176));
    let song = song(
        notes,
        vec![
            StarPower::new(192, 50),
            StarPower::new(672, 50),
            StarPower::new(3840, 50),
            StarPower::new(9984, 50),
        ],
    );
    let path = optimal_path(&song);

    assert_eq!(path.score_boost, 300);
    assert_eq!(path.activations.len(), 2);
    let act = path.activations.first().expect("two activations");
    assert!(act.whammy_end > Beat(1.06), "whammy ends at {}", act.whammy_end);
    assert!(act.whammy_end < Beat(1.74), "whammy ends at {}", act.whammy_end);
    assert!(act.sp_start < Beat(3.6), "SP starts at {}", act.sp_start);
}

#[test]
fn compressed_whammy_uses_next_point() {
    let mut notes = vec![Note::new(0), Note::new(192)];
    notes.extend(chord(384));
    notes.extend([Note::new(3350), Note::new(3360), Note::new(9504)]);
    notes.extend(chord(9696));
    let song = song(
        notes,
        vec![
            StarPower::new(0, 50),
            StarPower::new(192, 50),
            StarPower::new(3350, 50),
            StarPower::new(9504, 50),
        ],
    );
    let path = optimal_path(&song);

    let act = path.activations.first().expect("an activation");
    assert!(act.whammy_end > Beat(17.45), "whammy ends at {}", act.whammy_end);
}

#[test]
fn forbidden_squeeze_grants_no_extra_whammy() {
    let song = song(
        vec![
            Note::new(0),
            Note::new(192),
            Note::new(768),
            Note::new(3840).with_length(192),
            Note::new(4224),
            Note::new(19200).with_length(192),
            Note::new(38400),
            Note::new(41990),
        ],
        vec![
            StarPower::new(0, 1),
            StarPower::new(192, 1),
            StarPower::new(3840, 576),
            StarPower::new(19200, 1),
        ],
    );

    assert_eq!(optimal_path(&song).score_boost, 200);
}

#[test]
fn easier_activations_win_ties() {
    let song = song(
        vec![
            Note::new(0),
            Note::new(192),
            Note::new(384),
            Note::new(3504),
            Note::new(9600),
            Note::new(12672),
        ],
        vec![StarPower::new(0, 1), StarPower::new(192, 1)],
    );
    let path = optimal_path(&song);

    let act = path.activations.first().expect("one activation");
    assert!(act.sp_start > Beat(20.0), "SP starts at {}", act.sp_start);
}

#[test]
fn song_ending_with_unused_phrase() {
    let song = song(
        vec![
            Note::new(0),
            Note::new(192),
            Note::new(384),
            Note::new(576),
            Note::new(768),
            Note::new(4032),
            Note::new(4224),
        ],
        vec![
            StarPower::new(0, 50),
            StarPower::new(192, 50),
            StarPower::new(4032, 50),
        ],
    );
    let path = optimal_path(&song);

    assert_eq!(path.score_boost, 150);
    assert_eq!(path.activations.len(), 1);
    assert!(song.path_summary(&path).starts_with("Path: 2-ES1\n"));
}

#[test]
fn early_whammy_of_first_sustain_counts() {
    let song = song(
        vec![
            Note::new(0).with_length(1420),
            Note::new(1500),
            Note::new(1600),
        ],
        vec![StarPower::new(0, 1550)],
    );
    let path = optimal_path(&song);

    assert_eq!(path.score_boost, 50);
    assert_eq!(path.activations.len(), 1);
}

#[test]
fn activation_covering_last_note_needs_no_forced_whammy() {
    let song = song(
        vec![Note::new(0).with_length(1536), Note::new(1728)],
        vec![StarPower::new(0, 50)],
    );
    let path = optimal_path(&song);

    let act = path.activations.first().expect("one activation");
    assert!(act.whammy_end > Beat(16.0));
}

#[test]
fn song_without_phrases_has_empty_path() {
    let song = song(vec![Note::new(0), Note::new(768), Note::new(1536)], vec![]);

    assert_eq!(optimal_path(&song), Path::default());
}

#[test]
fn search_is_repeatable() {
    let song = song(
        vec![
            Note::new(0).with_length(1420),
            Note::new(1500),
            Note::new(1600),
            Note::new(2400).with_length(768),
            Note::new(3600),
            Note::new(4000),
        ],
        vec![StarPower::new(0, 1550), StarPower::new(2400, 100)],
    );
    let optimiser = Optimiser::new(&song);
    let terminate = AtomicBool::new(false);

    assert_eq!(
        optimiser.optimal_path(&terminate),
        optimiser.optimal_path(&terminate)
    );
}

#[test]
fn subpath_reuse_matches_exhaustive_search() {
    let songs = [
        song(
            vec![
                Note::new(0).with_length(1420),
                Note::new(1500),
                Note::new(1600),
            ],
            vec![StarPower::new(0, 1550)],
        ),
        song(
            vec![Note::new(0).with_length(1536), Note::new(1728)],
            vec![StarPower::new(0, 50)],
        ),
    ];
    let terminate = AtomicBool::new(false);

    for song in &songs {
        let reused = Optimiser::new(song)
            .optimal_path(&terminate)
            .expect("search is not cancelled");
        let exhaustive = Optimiser::new(song)
            .with_previous_subpath_reuse(false)
            .optimal_path(&terminate)
            .expect("search is not cancelled");

        assert_eq!(reused.score_boost, exhaustive.score_boost);
    }
}

/// A chart of single notes, chords and sustains, with phrases on about a third of them.
fn random_track(rng: &mut StdRng) -> NoteTrack {
    let mut notes = Vec::new();
    let mut phrases = Vec::new();
    let mut position = 0;
    for _ in 0..30 {
        position += rng.random_range(1..=8_i64) * 96;
        let length = if rng.random_bool(0.25) {
            rng.random_range(1..=8_i64) * 96
        } else {
            0
        };
        notes.push(Note::new(position).with_length(length));
        if rng.random_bool(0.2) {
            notes.push(
                Note::new(position)
                    .with_length(length)
                    .with_colour(NoteColour::Red),
            );
        }
        if rng.random_bool(0.3) {
            phrases.push(StarPower::new(position, length + 1));
        }
        position += length;
    }
    NoteTrack::new(notes, phrases, vec![], 192).expect("valid track")
}

#[test]
fn subpath_reuse_matches_exhaustive_search_on_random_charts() {
    let mut rng = StdRng::seed_from_u64(42);
    let terminate = AtomicBool::new(false);

    for engine in [Engine::CloneHero, Engine::RockBand] {
        let settings = Settings {
            engine,
            ..Settings::default()
        };
        for _ in 0..40 {
            let track = random_track(&mut rng);
            let song = ProcessedSong::new(&track, &TempoMap::default(), &settings, &[])
                .expect("valid song");
            let reused = Optimiser::new(&song)
                .optimal_path(&terminate)
                .expect("search is not cancelled");
            let exhaustive = Optimiser::new(&song)
                .with_previous_subpath_reuse(false)
                .optimal_path(&terminate)
                .expect("search is not cancelled");

            assert_eq!(
                reused.score_boost, exhaustive.score_boost,
                "{engine:?} chart {track:?}"
            );
        }
    }
}

#[test]
fn cache_keys_order_by_point_first() {
    let key = |point, beat| CacheKey {
        point,
        position: Position::new(Beat(beat), Measure(beat / 4.0)),
    };

    assert!(key(1, 8.0) < key(2, 0.0));
    assert!(key(2, f64::NEG_INFINITY) < key(2, 0.0));
}

#[test]
fn cancelled_search_reports_cancellation() {
    let song = song(
        vec![Note::new(0), Note::new(192), Note::new(384)],
        vec![StarPower::new(0, 50), StarPower::new(192, 50)],
    );

    assert_eq!(
        Optimiser::new(&song).optimal_path(&AtomicBool::new(true)),
        Err(SearchError::Cancelled)
    );
}
