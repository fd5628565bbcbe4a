use thiserror::Error;

use crate::config::ConfigError;

/// Failure kinds surfaced by the control loop and its collaborators.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("sensor unavailable: {0}")]
    SensorUnavailable(String),
    #[error("actuator unavailable: {0}")]
    ActuatorUnavailable(String),
    #[error("telemetry write failed: {0}")]
    TelemetryWriteFailed(String),
    #[error("invalid configuration: {0}")]
    ConfigInvalid(#[from] ConfigError),
}

impl ControlError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SensorUnavailable(_) => "sensor_unavailable",
            Self::ActuatorUnavailable(_) => "actuator_unavailable",
            Self::TelemetryWriteFailed(_) => "telemetry_write_failed",
            Self::ConfigInvalid(_) => "config_invalid",
        }
    }
}
