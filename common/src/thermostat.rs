use serde::{Deserialize, Serialize};

use crate::{config::ConfigError, types::RelayCommand};

/// Hysteresis band in °F. `low_f < high_f` always holds for pairs built
/// through [`ThresholdPair::new`] or a validated config.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPair {
    pub low_f: f32,
    pub high_f: f32,
}

impl ThresholdPair {
    pub fn new(low_f: f32, high_f: f32) -> Result<Self, ConfigError> {
        let pair = Self { low_f, high_f };
        pair.validate("thresholds")?;
        Ok(pair)
    }

    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if !self.low_f.is_finite() || !self.high_f.is_finite() || self.low_f >= self.high_f {
            return Err(ConfigError::InvertedThresholds {
                name: name.to_string(),
                low: self.low_f,
                high: self.high_f,
            });
        }
        Ok(())
    }

    /// True when `temp_f` sits inside the inclusive dead-band.
    pub fn contains(&self, temp_f: f32) -> bool {
        self.low_f <= temp_f && temp_f <= self.high_f
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    TurnOn,
    TurnOff,
    Hold,
}

impl PolicyDecision {
    pub fn command(self) -> Option<RelayCommand> {
        match self {
            Self::TurnOn => Some(RelayCommand::On),
            Self::TurnOff => Some(RelayCommand::Off),
            Self::Hold => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TurnOn => "TURN_ON",
            Self::TurnOff => "TURN_OFF",
            Self::Hold => "HOLD",
        }
    }
}

/// Stateless hysteresis rule. The same inputs always give the same decision,
/// so a reading that stays outside the band re-issues its command each cycle.
pub fn decide(temp_f: f32, thresholds: &ThresholdPair) -> PolicyDecision {
    if temp_f < thresholds.low_f {
        PolicyDecision::TurnOn
    } else if temp_f > thresholds.high_f {
        PolicyDecision::TurnOff
    } else {
        PolicyDecision::Hold
    }
}
