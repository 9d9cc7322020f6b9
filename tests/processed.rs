use pretty_assertions::assert_eq;
use starpath::prelude::*;

#[track_caller]
fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

fn track(notes: Vec<Note>, phrases: Vec<StarPower>, solos: Vec<Solo>) -> NoteTrack {
    NoteTrack::new(notes, phrases, solos, 192).expect("valid track")
}

fn processed(track: &NoteTrack, settings: &Settings) -> ProcessedSong {
    ProcessedSong::new(track, &TempoMap::default(), settings, &[]).expect("valid song")
}

fn summary_song(phrases: Vec<StarPower>) -> ProcessedSong {
    let track = track(
        vec![
            Note::new(0),
            Note::new(192),
            Note::new(384),
            Note::new(576),
            Note::new(6144),
        ],
        phrases,
        vec![Solo {
            start: Tick(0),
            end: Tick(50),
            value: 100,
        }],
    );
    processed(&track, &Settings::default())
}

fn summary_phrases() -> Vec<StarPower> {
    vec![
        StarPower::new(0, 50),
        StarPower::new(192, 50),
        StarPower::new(384, 50),
        StarPower::new(6144, 50),
    ]
}

fn activation(act_start: usize, act_end: usize) -> Activation {
    Activation {
        act_start,
        act_end,
        whammy_end: Beat(0.0),
        sp_start: Beat(0.0),
        sp_end: Beat(0.0),
    }
}

#[test]
fn available_sp_counts_phrases_and_whammy() {
    let track = track(
        vec![
            Note::new(0),
            Note::new(192),
            Note::new(384),
            Note::new(576),
            Note::new(768).with_length(192),
            Note::new(1152),
            Note::new(1344),
            Note::new(1536),
        ],
        vec![
            StarPower::new(0, 50),
            StarPower::new(384, 50),
            StarPower::new(768, 400),
            StarPower::new(1344, 50),
        ],
        vec![],
    );
    let song = processed(&track, &Settings::default());

    assert_eq!(
        song.total_available_sp(Beat(0.0), 0, 1, Beat::NEG_INFINITY),
        SpBar::new(0.25, 0.25)
    );
    let whammy = song.total_available_sp(Beat(4.0), 4, 5, Beat::NEG_INFINITY);
    assert_close(whammy.min, 0.0);
    assert_close(whammy.max, 0.001_128_47);
}

#[test]
fn candidate_validity_outcomes() {
    let track = track(
        vec![
            Note::new(0),
            Note::new(1536),
            Note::new(3072),
            Note::new(6144),
        ],
        vec![],
        vec![],
    );
    let song = processed(&track, &Settings::default());
    let first = song.points().points()[0].position;
    let candidate = |act_end, sp_bar| ActivationCandidate {
        act_start: 0,
        act_end,
        earliest_activation_point: first,
        sp_bar,
    };

    assert_eq!(
        song.is_candidate_valid(&candidate(2, SpBar::FULL)).validity,
        ActValidity::Success
    );
    assert_eq!(
        song.is_candidate_valid(&candidate(1, SpBar::new(0.25, 0.25)))
            .validity,
        ActValidity::InsufficientSp
    );
    assert_eq!(
        song.is_candidate_valid(&candidate(1, SpBar::new(0.6, 0.6)))
            .validity,
        ActValidity::SurplusSp
    );
}

#[test]
fn summary_marks_overlap_and_spare_phrases() {
    let song = summary_song(summary_phrases());
    let path = Path {
        activations: vec![activation(2, 3)],
        score_boost: 100,
    };

    assert_eq!(
        song.path_summary(&path),
        "Path: 2(+1)-ES1\nNo SP score: 350\nTotal score: 450\nActivation 1: Measure 1.5 to Measure 1.75"
    );
}

#[test]
fn summary_without_overlap() {
    let song = summary_song(summary_phrases());
    let path = Path {
        activations: vec![activation(3, 3)],
        score_boost: 50,
    };

    assert_eq!(
        song.path_summary(&path),
        "Path: 3-ES1\nNo SP score: 350\nTotal score: 400\nActivation 1: Measure 1.75 to Measure 1.75"
    );
}

#[test]
fn summary_without_spare_phrases() {
    let song = summary_song(summary_phrases());
    let path = Path {
        activations: vec![activation(4, 4)],
        score_boost: 50,
    };

    assert_eq!(
        song.path_summary(&path),
        "Path: 3(+1)\nNo SP score: 350\nTotal score: 400\nActivation 1: Measure 9 to Measure 9"
    );
}

#[test]
fn summary_without_phrases() {
    let song = summary_song(vec![]);

    assert_eq!(
        song.path_summary(&Path::default()),
        "Path: None\nNo SP score: 350\nTotal score: 350"
    );
}

#[test]
fn speed_matches_faster_tempo() {
    let track = track(
        vec![Note::new(0), Note::new(192).with_length(384), Note::new(768)],
        vec![StarPower::new(192, 50)],
        vec![],
    );
    let double_speed = Settings {
        speed: 200,
        ..Settings::default()
    };
    let sped_up = processed(&track, &double_speed);
    let faster_tempo = TempoMap::new(
        vec![],
        vec![Bpm::new(Tick(0), 240.0).expect("positive tempo")],
        192,
    )
    .expect("valid tempo map");
    let fast = ProcessedSong::new(&track, &faster_tempo, &Settings::default(), &[])
        .expect("valid song");

    assert_eq!(sped_up.points(), fast.points());
    assert_close(
        sped_up.points().points()[1].hit_window_start.beat.value(),
        1.0 - 0.28,
    );
}

#[test]
fn multiplier_grows_with_combo() {
    let notes = (0..12).map(|i| Note::new(i * 192)).collect();
    let track = track(notes, vec![], vec![]);
    let rock_band = Settings {
        engine: Engine::RockBand,
        ..Settings::default()
    };
    let song = processed(&track, &rock_band);
    let values = song
        .points()
        .points()
        .iter()
        .map(|point| point.value)
        .collect::<Vec<_>>();

    assert_eq!(values, [vec![25; 9], vec![50; 3]].concat());
    assert_eq!(song.points().range_score(0, 12), 25 * 9 + 50 * 3);
}

#[test]
fn time_signatures_set_measures() {
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
    let track = track(vec![Note::new(0), Note::new(576)], vec![], vec![]);
    let song =
        ProcessedSong::new(&track, &tempo_map, &Settings::default(), &[]).expect("valid song");

    assert_close(song.points().points()[1].position.measure.value(), 1.0);
    assert_close(
        song.converter().measures_to_beats(Measure(2.0)).value(),
        6.0,
    );
}

#[cfg(feature = "serde")]
fn squeeze_json(squeeze: f64, early_whammy: f64, lazy_whammy: f64) -> String {
    format!(
        r#"{{
            "squeeze": {squeeze},
            "early_whammy": {early_whammy},
            "lazy_whammy": {lazy_whammy},
            "video_lag": 0.0,
            "whammy_delay": 0.0
        }}"#
    )
}

#[cfg(feature = "serde")]
#[test]
fn settings_load_from_json() {
    let json = format!(
        r#"{{ "squeeze_settings": {}, "engine": "RockBand", "speed": 150 }}"#,
        squeeze_json(0.5, 0.25, 0.1)
    );
    let settings: Settings = serde_json::from_str(&json).expect("valid settings");

    assert_eq!(settings.engine, Engine::RockBand);
    assert_eq!(settings.speed, 150);
    assert_eq!(
        settings.squeeze_settings,
        SqueezeSettings::new(0.5, 0.25)
            .and_then(|squeeze| squeeze.with_lazy_whammy(Second(0.1)))
            .expect("valid squeeze settings")
    );
}

#[cfg(feature = "serde")]
#[test]
fn invalid_settings_are_rejected_on_load() {
    let early_whammy_above_squeeze = squeeze_json(0.5, 1.0, 0.0);
    assert!(serde_json::from_str::<SqueezeSettings>(&early_whammy_above_squeeze).is_err());

    let negative_lazy_whammy = squeeze_json(1.0, 1.0, -3.0);
    assert!(serde_json::from_str::<SqueezeSettings>(&negative_lazy_whammy).is_err());

    let zero_speed = format!(
        r#"{{ "squeeze_settings": {}, "engine": "CloneHero", "speed": 0 }}"#,
        squeeze_json(1.0, 1.0, 0.0)
    );
    assert!(serde_json::from_str::<Settings>(&zero_speed).is_err());
}

#[cfg(feature = "serde")]
#[test]
fn tempo_events_are_checked_on_load() {
    let bpm: Bpm =
        serde_json::from_str(r#"{ "position": 0, "bpm": 150.0 }"#).expect("valid tempo");
    assert_eq!(bpm, Bpm::new(Tick(0), 150.0).expect("positive tempo"));

    assert!(serde_json::from_str::<Bpm>(r#"{ "position": 0, "bpm": 0.0 }"#).is_err());
}
