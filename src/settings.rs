//! Player-dependent options of an optimisation run.

use strict_num_extended::{NonNegativeF64, NormalizedF64};
use thiserror::Error;

use crate::{engine::Engine, time::Second};

/// An error occurred when validating [`SqueezeSettings`] or [`Settings`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SettingsError {
    /// Squeeze was outside `0.0..=1.0`.
    #[error("squeeze must be between 0 and 1, got {0}")]
    SqueezeOutOfRange(f64),
    /// Early whammy was outside `0.0..=1.0`.
    #[error("early whammy must be between 0 and 1, got {0}")]
    EarlyWhammyOutOfRange(f64),
    /// Early whammy was larger than squeeze.
    #[error("early whammy ({early_whammy}) must not exceed squeeze ({squeeze})")]
    EarlyWhammyAboveSqueeze {
        /// The squeeze in use.
        squeeze: f64,
        /// The rejected early whammy.
        early_whammy: f64,
    },
    /// A lag or delay was negative or not finite.
    #[error("{name} must be a non-negative number of seconds, got {value}")]
    NegativeDelay {
        /// Which delay was rejected.
        name: String,
        /// The rejected value.
        value: f64,
    },
    /// Speed was zero.
    #[error("speed must be positive")]
    NonPositiveSpeed,
}

/// How aggressively the player is assumed to exploit timing windows.
///
/// Deserializing goes through the same checks as the `with_*` setters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "UncheckedSqueezeSettings")
)]
pub struct SqueezeSettings {
    /// Fraction of the hit window usable for squeezing activations.
    pub squeeze: f64,
    /// Fraction of the early hit window in which whammy can already begin.
    pub early_whammy: f64,
    /// Delay before whammy starts after a sustain is hit.
    pub lazy_whammy: Second,
    /// Audio/video offset, shifts whammy starts later.
    pub video_lag: Second,
    /// Delay before whammy resumes after an activation ends.
    pub whammy_delay: Second,
}

impl Default for SqueezeSettings {
    fn default() -> Self {
        Self {
            squeeze: 1.0,
            early_whammy: 1.0,
            lazy_whammy: Second(0.0),
            video_lag: Second(0.0),
            whammy_delay: Second(0.0),
        }
    }
}

impl SqueezeSettings {
    /// Creates new settings with no lag or delay.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if either fraction is outside `0.0..=1.0` or early whammy
    /// exceeds squeeze.
    pub fn new(squeeze: f64, early_whammy: f64) -> Result<Self, SettingsError> {
        Self::default()
            .with_squeeze(squeeze)?
            .with_early_whammy(early_whammy)
    }

    /// Sets the squeeze fraction.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if `squeeze` is outside `0.0..=1.0` or below early whammy.
    pub fn with_squeeze(self, squeeze: f64) -> Result<Self, SettingsError> {
        NormalizedF64::new(squeeze).map_err(|_| SettingsError::SqueezeOutOfRange(squeeze))?;
        let early_whammy = self.early_whammy.min(squeeze);
        Ok(Self {
            squeeze,
            early_whammy,
            ..self
        })
    }

    /// Sets the early whammy fraction.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if `early_whammy` is outside `0.0..=1.0` or above squeeze.
    pub fn with_early_whammy(self, early_whammy: f64) -> Result<Self, SettingsError> {
        NormalizedF64::new(early_whammy)
            .map_err(|_| SettingsError::EarlyWhammyOutOfRange(early_whammy))?;
        if early_whammy > self.squeeze {
            return Err(SettingsError::EarlyWhammyAboveSqueeze {
                squeeze: self.squeeze,
                early_whammy,
            });
        }
        Ok(Self {
            early_whammy,
            ..self
        })
    }

    /// Sets the lazy whammy delay.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if the delay is negative.
    pub fn with_lazy_whammy(self, lazy_whammy: Second) -> Result<Self, SettingsError> {
        check_delay("lazy whammy", lazy_whammy)?;
        Ok(Self {
            lazy_whammy,
            ..self
        })
    }

    /// Sets the video lag.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if the lag is negative.
    pub fn with_video_lag(self, video_lag: Second) -> Result<Self, SettingsError> {
        check_delay("video lag", video_lag)?;
        Ok(Self { video_lag, ..self })
    }

    /// Sets the whammy delay.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if the delay is negative.
    pub fn with_whammy_delay(self, whammy_delay: Second) -> Result<Self, SettingsError> {
        check_delay("whammy delay", whammy_delay)?;
        Ok(Self {
            whammy_delay,
            ..self
        })
    }
}

fn check_delay(name: &str, delay: Second) -> Result<(), SettingsError> {
    NonNegativeF64::new(delay.value()).map_err(|_| SettingsError::NegativeDelay {
        name: name.to_owned(),
        value: delay.value(),
    })?;
    Ok(())
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct UncheckedSqueezeSettings {
    squeeze: f64,
    early_whammy: f64,
    lazy_whammy: Second,
    video_lag: Second,
    whammy_delay: Second,
}

#[cfg(feature = "serde")]
impl TryFrom<UncheckedSqueezeSettings> for SqueezeSettings {
    type Error = SettingsError;

    fn try_from(unchecked: UncheckedSqueezeSettings) -> Result<Self, Self::Error> {
        Self::new(unchecked.squeeze, unchecked.early_whammy)?
            .with_lazy_whammy(unchecked.lazy_whammy)?
            .with_video_lag(unchecked.video_lag)?
            .with_whammy_delay(unchecked.whammy_delay)
    }
}

/// All options of one optimisation run.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "UncheckedSettings")
)]
pub struct Settings {
    /// Timing exploitation.
    pub squeeze_settings: SqueezeSettings,
    /// Scoring rules.
    pub engine: Engine,
    /// Playback speed in percent, 100 is normal speed.
    pub speed: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            squeeze_settings: SqueezeSettings::default(),
            engine: Engine::default(),
            speed: 100,
        }
    }
}

impl Settings {
    /// Creates new settings.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::NonPositiveSpeed`] if `speed` is zero.
    pub fn new(
        squeeze_settings: SqueezeSettings,
        engine: Engine,
        speed: u32,
    ) -> Result<Self, SettingsError> {
        if speed == 0 {
            return Err(SettingsError::NonPositiveSpeed);
        }
        Ok(Self {
            squeeze_settings,
            engine,
            speed,
        })
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct UncheckedSettings {
    squeeze_settings: SqueezeSettings,
    engine: Engine,
    speed: u32,
}

#[cfg(feature = "serde")]
impl TryFrom<UncheckedSettings> for Settings {
    type Error = SettingsError;

    fn try_from(unchecked: UncheckedSettings) -> Result<Self, Self::Error> {
        Self::new(unchecked.squeeze_settings, unchecked.engine, unchecked.speed)
    }
}
