pub mod config;
pub mod error;
pub mod presence;
pub mod schedule;
pub mod thermostat;
pub mod topics;
pub mod types;

pub use config::{
    ActuatorConfig, ConfigError, ControllerConfig, InfluxConfig, MqttConfig, PresenceConfig,
    SensorConfig, TelemetryConfig,
};
pub use error::ControlError;
pub use presence::{PresenceEdge, PresenceTracker, PresenceUpdate};
pub use schedule::{is_night_now, DayNightSchedule, ScheduleWindow};
pub use thermostat::{decide, PolicyDecision, ThresholdPair};
pub use topics::*;
pub use types::{
    celsius_to_fahrenheit, AmbientReading, CycleRecord, PresenceStatus, RelayCommand,
    SchedulePeriod,
};
