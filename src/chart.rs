//! Note tracks fed into the optimiser.
//!
//! A [`NoteTrack`] is the already parsed content of one instrument and difficulty. Its
//! constructor normalizes the data so that later stages can rely on:
//!
//! - notes sorted by position then colour, with at most one note per position and colour,
//! - SP phrases sorted, each covering at least one note,
//! - solos sorted by start.

use itertools::Itertools;
use thiserror::Error;

use crate::{engine::Engine, time::Tick};

/// An error occurred when building a [`NoteTrack`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChartError {
    /// The resolution (ticks per quarter note) was zero or negative.
    #[error("resolution must be positive, got {0}")]
    NonPositiveResolution(i64),
    /// A note or SP phrase had a negative length.
    #[error("length at {position} must not be negative, got {length}")]
    NegativeLength {
        /// Where the object starts.
        position: Tick,
        /// The rejected length.
        length: Tick,
    },
    /// A solo or Big Rock Ending ended before it started.
    #[error("section from {start} to {end} ends before it starts")]
    InvalidSolo {
        /// The start of the section.
        start: Tick,
        /// The end of the section.
        end: Tick,
    },
}

/// Colour of a five fret guitar note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NoteColour {
    /// Green fret.
    Green,
    /// Red fret.
    Red,
    /// Yellow fret.
    Yellow,
    /// Blue fret.
    Blue,
    /// Orange fret.
    Orange,
    /// Strum with no fret held.
    Open,
}

/// A note, which may be a sustain when `length` is positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Note {
    /// Where the note is hit.
    pub position: Tick,
    /// Sustain length, zero for a plain note.
    pub length: Tick,
    /// Which fret.
    pub colour: NoteColour,
}

impl Note {
    /// Creates a plain green note.
    #[must_use]
    pub const fn new(position: i64) -> Self {
        Self {
            position: Tick(position),
            length: Tick(0),
            colour: NoteColour::Green,
        }
    }

    /// Sets the sustain length.
    #[must_use]
    pub const fn with_length(self, length: i64) -> Self {
        Self {
            length: Tick(length),
            ..self
        }
    }

    /// Sets the colour.
    #[must_use]
    pub const fn with_colour(self, colour: NoteColour) -> Self {
        Self { colour, ..self }
    }
}

/// A Star Power phrase, the range `[position, position + length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StarPower {
    /// Where the phrase starts.
    pub position: Tick,
    /// How long the phrase is.
    pub length: Tick,
}

impl StarPower {
    /// Creates a new phrase.
    #[must_use]
    pub const fn new(position: i64, length: i64) -> Self {
        Self {
            position: Tick(position),
            length: Tick(length),
        }
    }

    /// Whether `position` lies in this phrase.
    #[must_use]
    pub fn contains(&self, position: Tick) -> bool {
        self.position <= position && position < self.position + self.length
    }
}

/// A solo section, whose bonus is awarded independent of SP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Solo {
    /// Where the solo starts.
    pub start: Tick,
    /// Where the solo ends.
    pub end: Tick,
    /// The bonus for the solo.
    pub value: u32,
}

/// A Big Rock Ending, the freestyle section at the end of some songs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BigRockEnding {
    /// Where the section starts.
    pub start: Tick,
    /// Where the section ends.
    pub end: Tick,
}

/// The notes, phrases and solos of one track.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NoteTrack {
    notes: Vec<Note>,
    sp_phrases: Vec<StarPower>,
    solos: Vec<Solo>,
    bre: Option<BigRockEnding>,
    resolution: i64,
}

impl NoteTrack {
    /// Creates a new track, normalizing the input.
    ///
    /// Notes are sorted and, for duplicated position and colour, the last given note
    /// wins. Phrases covering no note are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ChartError`] if the resolution is not positive, a note or phrase has a
    /// negative length, or a solo ends before it starts.
    pub fn new(
        mut notes: Vec<Note>,
        mut sp_phrases: Vec<StarPower>,
        mut solos: Vec<Solo>,
        resolution: i64,
    ) -> Result<Self, ChartError> {
        if resolution <= 0 {
            return Err(ChartError::NonPositiveResolution(resolution));
        }
        let lengths = notes
            .iter()
            .map(|note| (note.position, note.length))
            .chain(sp_phrases.iter().map(|phrase| (phrase.position, phrase.length)));
        for (position, length) in lengths {
            if length < Tick(0) {
                return Err(ChartError::NegativeLength { position, length });
            }
        }
        if let Some(solo) = solos.iter().find(|solo| solo.end < solo.start) {
            return Err(ChartError::InvalidSolo {
                start: solo.start,
                end: solo.end,
            });
        }

        notes.sort_by_key(|note| (note.position, note.colour));
        let notes = notes
            .into_iter()
            .rev()
            .unique_by(|note| (note.position, note.colour))
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>();

        sp_phrases.sort_by_key(|phrase| phrase.position);
        sp_phrases.retain(|phrase| {
            let first = notes.partition_point(|note| note.position < phrase.position);
            notes
                .get(first)
                .is_some_and(|note| phrase.contains(note.position))
        });

        solos.sort_by_key(|solo| solo.start);

        Ok(Self {
            notes,
            sp_phrases,
            solos,
            bre: None,
            resolution,
        })
    }

    /// Attaches a Big Rock Ending.
    ///
    /// # Errors
    ///
    /// Returns [`ChartError::InvalidSolo`] if the section ends before it starts.
    pub fn with_bre(self, bre: BigRockEnding) -> Result<Self, ChartError> {
        if bre.end < bre.start {
            return Err(ChartError::InvalidSolo {
                start: bre.start,
                end: bre.end,
            });
        }
        Ok(Self {
            bre: Some(bre),
            ..self
        })
    }

    /// The notes, sorted by position then colour.
    #[must_use]
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// The SP phrases, sorted by position.
    #[must_use]
    pub fn sp_phrases(&self) -> &[StarPower] {
        &self.sp_phrases
    }

    /// The solos, sorted by start.
    #[must_use]
    pub fn solos(&self) -> &[Solo] {
        &self.solos
    }

    /// The Big Rock Ending, if any.
    #[must_use]
    pub const fn bre(&self) -> Option<BigRockEnding> {
        self.bre
    }

    /// Ticks per quarter note.
    #[must_use]
    pub const fn resolution(&self) -> i64 {
        self.resolution
    }

    /// The score without multipliers, SP, solos or a Big Rock Ending.
    ///
    /// Every note scores the engine's base value. Sustains score
    /// `ceil(length * sust_points_per_beat / resolution)` per distinct sustain length in
    /// a chord, or per note when the engine multiplies chord sustains.
    #[must_use]
    pub fn base_score(&self, engine: Engine) -> u32 {
        let chords = self.notes.iter().chunk_by(|note| note.position);
        let mut score = 0;
        for (_, chord) in &chords {
            let chord = chord.collect::<Vec<_>>();
            score += engine.base_note_value() * chord.len() as u32;
            let sustain_ticks = |length: Tick| {
                let points = length.0 * engine.sust_points_per_beat();
                num::Integer::div_ceil(&points, &self.resolution) as u32
            };
            let all_equal = chord.iter().map(|note| note.length).all_equal();
            score += match (all_equal, chord.first()) {
                (true, Some(note)) if engine.chords_multiply_sustains() => {
                    sustain_ticks(note.length) * chord.len() as u32
                }
                (true, Some(note)) => sustain_ticks(note.length),
                _ => chord.iter().map(|note| sustain_ticks(note.length)).sum(),
            };
        }
        score
    }
}
