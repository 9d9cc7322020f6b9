//! Scoring and Star Power rules of the supported games.

use crate::time::{Beat, Second};

/// A game whose scoring and Star Power rules are used for optimisation.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Engine {
    /// Clone Hero.
    #[default]
    CloneHero,
    /// Rock Band guitar, keys and drums.
    RockBand,
    /// Rock Band bass, which has a higher multiplier cap.
    RockBandBass,
    /// Guitar Hero 1.
    GuitarHeroOne,
}

impl Engine {
    /// Score of one note (per note of a chord) before the multiplier.
    #[must_use]
    pub const fn base_note_value(self) -> u32 {
        match self {
            Self::CloneHero | Self::GuitarHeroOne => 50,
            Self::RockBand | Self::RockBandBass => 25,
        }
    }

    /// The largest combo multiplier.
    #[must_use]
    pub const fn max_multiplier(self) -> u32 {
        match self {
            Self::RockBandBass => 6,
            Self::CloneHero | Self::RockBand | Self::GuitarHeroOne => 4,
        }
    }

    /// SP gained per beat of whammy.
    #[must_use]
    pub const fn sp_gain_rate(self) -> f64 {
        match self {
            Self::CloneHero => 1.0 / 30.0,
            Self::RockBand | Self::RockBandBass | Self::GuitarHeroOne => 0.034,
        }
    }

    /// How early a note can be hit.
    #[must_use]
    pub const fn early_timing_window(self) -> Second {
        match self {
            Self::CloneHero => Second(0.07),
            Self::RockBand | Self::RockBandBass | Self::GuitarHeroOne => Second(0.1),
        }
    }

    /// How late a note can be hit.
    #[must_use]
    pub const fn late_timing_window(self) -> Second {
        match self {
            Self::CloneHero => Second(0.07),
            Self::RockBand | Self::RockBandBass | Self::GuitarHeroOne => Second(0.1),
        }
    }

    /// Sustain points awarded per beat of sustain.
    #[must_use]
    pub const fn sust_points_per_beat(self) -> i64 {
        match self {
            Self::CloneHero | Self::GuitarHeroOne => 25,
            Self::RockBand | Self::RockBandBass => 12,
        }
    }

    /// Length in beats of the tail of a sustain whose points are awarded together.
    #[must_use]
    pub const fn burst_size(self) -> Beat {
        match self {
            Self::CloneHero => Beat(0.25),
            Self::RockBand | Self::RockBandBass | Self::GuitarHeroOne => Beat(0.0),
        }
    }

    /// Sustains shorter than this are scored as plain notes.
    #[must_use]
    pub const fn minimum_sustain_length(self) -> Beat {
        match self {
            Self::CloneHero => Beat(0.25),
            Self::RockBand | Self::RockBandBass | Self::GuitarHeroOne => Beat(1.0 / 3.0),
        }
    }

    /// Whether a chord of sustains scores sustain points once per note.
    #[must_use]
    pub const fn chords_multiply_sustains(self) -> bool {
        matches!(self, Self::RockBand | Self::RockBandBass)
    }

    /// Whether measures come from the beat track instead of time signatures.
    #[must_use]
    pub const fn uses_beat_track(self) -> bool {
        matches!(
            self,
            Self::RockBand | Self::RockBandBass | Self::GuitarHeroOne
        )
    }

    /// Whether a Big Rock Ending awards a bonus.
    #[must_use]
    pub const fn has_bres(self) -> bool {
        matches!(self, Self::RockBand | Self::RockBandBass)
    }

    /// Measures a full bar of SP lasts without whammy.
    #[must_use]
    pub const fn measures_per_bar(self) -> f64 {
        8.0
    }

    /// The combo multiplier after `combo` notes.
    #[must_use]
    pub fn multiplier(self, combo: u32) -> u32 {
        const NOTES_PER_MULTIPLIER: u32 = 10;
        1 + (combo / NOTES_PER_MULTIPLIER).min(self.max_multiplier() - 1)
    }
}
