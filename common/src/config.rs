use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{schedule::DayNightSchedule, topics::TOPIC_CYCLE};

pub const DEFAULT_SWITCHBOT_URL: &str = "https://api.switch-bot.com";
pub const DEFAULT_PLUG_PORT: u16 = 9999;
pub const DEFAULT_MQTT_PORT: u16 = 1883;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_PRESENCE_CHECK_SECS: u64 = 30;
pub const DEFAULT_PRESENCE_TIMEOUT_SECS: u64 = 1_800;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("missing required setting {key}")]
    Missing { key: String },
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
    #[error("{name} thresholds must satisfy low < high (low={low}, high={high})")]
    InvertedThresholds { name: String, low: f32, high: f32 },
    #[error("{key} must be greater than zero")]
    NonPositive { key: String },
    #[error("presence check interval ({check_secs}s) exceeds poll interval ({poll_secs}s)")]
    PresenceIntervalTooLong { check_secs: u64, poll_secs: u64 },
    #[error("presence detection needs at least one motion sensor id")]
    NoMotionSensors,
    #[error("malformed configuration: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    #[serde(default = "default_switchbot_url")]
    pub base_url: String,
    pub token: String,
    pub secret: String,
    pub device_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorConfig {
    pub host: String,
    #[serde(default = "default_plug_port")]
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfluxConfig {
    pub url: String,
    pub org: String,
    pub bucket: String,
    pub token: String,
    pub measurement: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub pass: Option<String>,
    #[serde(default = "default_mqtt_topic")]
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TelemetryConfig {
    Influx(InfluxConfig),
    Mqtt(MqttConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceConfig {
    #[serde(default = "default_presence_check_secs")]
    pub check_interval_secs: u64,
    #[serde(default = "default_presence_timeout_secs")]
    pub timeout_secs: u64,
    pub motion_sensor_ids: Vec<String>,
}

impl PresenceConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// `ceil(poll / check)`: inner samples needed to cover one outer cycle.
    pub fn checks_per_cycle(&self, poll_interval_secs: u64) -> u64 {
        if self.check_interval_secs == 0 {
            return 0;
        }
        poll_interval_secs.div_ceil(self.check_interval_secs)
    }
}

/// Immutable controller configuration, built and validated once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub schedule: DayNightSchedule,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub presence: Option<PresenceConfig>,
    pub sensor: SensorConfig,
    pub actuator: ActuatorConfig,
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub debug: bool,
}

impl ControllerConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|err| ConfigError::Malformed(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.schedule.day.validate("day")?;
        self.schedule.night.validate("night")?;

        require_positive("poll_interval_secs", self.poll_interval_secs)?;
        require_positive("request_timeout_secs", self.request_timeout_secs)?;

        if let Some(presence) = &self.presence {
            require_positive("presence.check_interval_secs", presence.check_interval_secs)?;
            require_positive("presence.timeout_secs", presence.timeout_secs)?;
            if presence.check_interval_secs > self.poll_interval_secs {
                return Err(ConfigError::PresenceIntervalTooLong {
                    check_secs: presence.check_interval_secs,
                    poll_secs: self.poll_interval_secs,
                });
            }
            if presence.motion_sensor_ids.is_empty() {
                return Err(ConfigError::NoMotionSensors);
            }
            for id in &presence.motion_sensor_ids {
                require_non_empty("presence.motion_sensor_ids", id)?;
            }
        }

        require_non_empty("sensor.base_url", &self.sensor.base_url)?;
        require_non_empty("sensor.token", &self.sensor.token)?;
        require_non_empty("sensor.secret", &self.sensor.secret)?;
        require_non_empty("sensor.device_id", &self.sensor.device_id)?;

        require_non_empty("actuator.host", &self.actuator.host)?;
        require_positive("actuator.port", u64::from(self.actuator.port))?;

        match &self.telemetry {
            TelemetryConfig::Influx(influx) => {
                require_non_empty("telemetry.url", &influx.url)?;
                require_non_empty("telemetry.org", &influx.org)?;
                require_non_empty("telemetry.bucket", &influx.bucket)?;
                require_non_empty("telemetry.token", &influx.token)?;
                require_non_empty("telemetry.measurement", &influx.measurement)?;
            }
            TelemetryConfig::Mqtt(mqtt) => {
                require_non_empty("telemetry.host", &mqtt.host)?;
                require_positive("telemetry.port", u64::from(mqtt.port))?;
                require_non_empty("telemetry.topic", &mqtt.topic)?;
            }
        }

        Ok(())
    }
}

fn require_positive(key: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::NonPositive {
            key: key.to_string(),
        });
    }
    Ok(())
}

fn require_non_empty(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing {
            key: key.to_string(),
        });
    }
    Ok(())
}

fn default_switchbot_url() -> String {
    DEFAULT_SWITCHBOT_URL.to_string()
}

fn default_plug_port() -> u16 {
    DEFAULT_PLUG_PORT
}

fn default_mqtt_port() -> u16 {
    DEFAULT_MQTT_PORT
}

fn default_mqtt_topic() -> String {
    TOPIC_CYCLE.to_string()
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_presence_check_secs() -> u64 {
    DEFAULT_PRESENCE_CHECK_SECS
}

fn default_presence_timeout_secs() -> u64 {
    DEFAULT_PRESENCE_TIMEOUT_SECS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"{
        "schedule": {
            "day": { "low_f": 65.0, "high_f": 69.0 },
            "night": { "low_f": 62.0, "high_f": 66.0 },
            "night_window": { "begin": "22:00", "end": "06:00" }
        },
        "presence": { "motion_sensor_ids": ["hall", "stairs"] },
        "sensor": { "token": "tok", "secret": "sec", "device_id": "meter" },
        "actuator": { "host": "192.168.1.50" },
        "telemetry": {
            "kind": "influx",
            "url": "http://influx:8086",
            "org": "home",
            "bucket": "climate",
            "token": "itok",
            "measurement": "office"
        }
    }"#;

    fn sample() -> ControllerConfig {
        ControllerConfig::from_json(SAMPLE).unwrap()
    }

    #[test]
    fn json_fills_defaults() {
        let config = sample();

        assert_eq!(config.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS);
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert_eq!(config.sensor.base_url, DEFAULT_SWITCHBOT_URL);
        assert_eq!(config.actuator.port, DEFAULT_PLUG_PORT);
        assert_eq!(
            config.presence,
            Some(PresenceConfig {
                check_interval_secs: DEFAULT_PRESENCE_CHECK_SECS,
                timeout_secs: DEFAULT_PRESENCE_TIMEOUT_SECS,
                motion_sensor_ids: vec!["hall".to_string(), "stairs".to_string()],
            })
        );
        assert!(!config.debug);
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let mut config = sample();
        config.schedule.night.low_f = 66.0;

        assert_eq!(
            config.validate(),
            Err(ConfigError::InvertedThresholds {
                name: "night".to_string(),
                low: 66.0,
                high: 66.0,
            })
        );
    }

    #[test]
    fn rejects_presence_interval_longer_than_poll() {
        let mut config = sample();
        config.poll_interval_secs = 60;
        if let Some(presence) = config.presence.as_mut() {
            presence.check_interval_secs = 90;
        }

        assert_eq!(
            config.validate(),
            Err(ConfigError::PresenceIntervalTooLong {
                check_secs: 90,
                poll_secs: 60,
            })
        );
    }

    #[test]
    fn rejects_zero_intervals() {
        let mut config = sample();
        config.poll_interval_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive { .. })
        ));

        let mut config = sample();
        if let Some(presence) = config.presence.as_mut() {
            presence.timeout_secs = 0;
        }
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive { .. })
        ));
    }

    #[test]
    fn rejects_presence_without_sensors() {
        let mut config = sample();
        if let Some(presence) = config.presence.as_mut() {
            presence.motion_sensor_ids.clear();
        }

        assert_eq!(config.validate(), Err(ConfigError::NoMotionSensors));
    }

    #[test]
    fn rejects_blank_credentials() {
        let mut config = sample();
        config.sensor.secret = "  ".to_string();

        assert_eq!(
            config.validate(),
            Err(ConfigError::Missing {
                key: "sensor.secret".to_string()
            })
        );
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(
            ControllerConfig::from_json("{ not json"),
            Err(ConfigError::Malformed(_))
        ));
    }

    #[test]
    fn checks_per_cycle_rounds_up() {
        let presence = PresenceConfig {
            check_interval_secs: 45,
            timeout_secs: 1_800,
            motion_sensor_ids: vec!["a".to_string()],
        };

        assert_eq!(presence.checks_per_cycle(300), 7);
        assert_eq!(presence.checks_per_cycle(270), 6);
        assert_eq!(presence.checks_per_cycle(45), 1);
    }
}
