//! Prelude module for the crate.
//!
//! You can use `use starpath::prelude::*;` to import the commonly used types at once.

pub use crate::{
    chart::{BigRockEnding, ChartError, Note, NoteColour, NoteTrack, Solo, StarPower},
    engine::Engine,
    optimiser::{Optimiser, SearchError},
    points::{Point, PointSet},
    processed::{
        ActResult, ActValidity, Activation, ActivationCandidate, Path, ProcessedSong,
        ProtoActivation,
    },
    settings::{Settings, SettingsError, SqueezeSettings},
    sp::{SpBar, SpData, WhammyRange},
    tempo::{Bpm, TempoError, TempoMap, TimeSignature, converter::TimeConverter},
    time::{Beat, Measure, Position, Second, Tick},
};
