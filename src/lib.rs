//! Star Power path optimiser for five fret guitar charts.
//!
//! A chart is optimised in three phases:
//!
//! - [`chart::NoteTrack`] and [`tempo::TempoMap`] hold the already parsed notes, SP
//!   phrases, solos and tempo changes of one track.
//! - [`processed::ProcessedSong`] turns them into scoring [`points::Point`]s and SP data
//!   for some [`settings::Settings`], and answers how much SP is available and whether
//!   an activation works.
//! - [`optimiser::Optimiser`] searches for the [`processed::Path`] gaining the most score.
//!
//! ```
//! use std::sync::atomic::AtomicBool;
//!
//! use starpath::prelude::*;
//!
//! let track = NoteTrack::new(
//!     vec![Note::new(0), Note::new(192), Note::new(384)],
//!     vec![StarPower::new(0, 50), StarPower::new(192, 50)],
//!     vec![],
//!     192,
//! )?;
//! let song = ProcessedSong::new(&track, &TempoMap::default(), &Settings::default(), &[])?;
//! let path = Optimiser::new(&song).optimal_path(&AtomicBool::new(false))?;
//!
//! assert_eq!(path.score_boost, 50);
//! println!("{}", song.path_summary(&path));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! In detail, our policies are:
//!
//! - Points are referred to by their index in the [`points::PointSet`].
//! - Infeasible activations are ordinary results, not errors.
//! - Validation happens once, in the constructors of the input types.

pub mod chart;
pub mod engine;
pub mod optimiser;
pub mod points;
pub mod prelude;
pub mod processed;
pub mod settings;
pub mod sp;
pub mod tempo;
pub mod time;
