use std::{path::Path, str::FromStr};

use anyhow::Context;
use chrono_tz::Tz;

use heatloop_common::{
    config::{
        DEFAULT_MQTT_PORT, DEFAULT_PLUG_PORT, DEFAULT_POLL_INTERVAL_SECS,
        DEFAULT_PRESENCE_CHECK_SECS, DEFAULT_PRESENCE_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS,
        DEFAULT_SWITCHBOT_URL,
    },
    schedule::parse_time_of_day,
    ActuatorConfig, ConfigError, ControllerConfig, DayNightSchedule, InfluxConfig, MqttConfig,
    PresenceConfig, ScheduleWindow, SensorConfig, TelemetryConfig, ThresholdPair, TOPIC_CYCLE,
};

pub const CONFIG_FILE_VAR: &str = "HEATLOOP_CONFIG";

/// Loads the JSON file named by `HEATLOOP_CONFIG` when set, otherwise the
/// process environment. The result is always validated.
pub fn load() -> anyhow::Result<ControllerConfig> {
    let config = match std::env::var(CONFIG_FILE_VAR) {
        Ok(path) => load_file(Path::new(&path))?,
        Err(_) => from_lookup(|key| std::env::var(key).ok())
            .context("invalid environment configuration")?,
    };
    timezone(&config)?;
    Ok(config)
}

fn load_file(path: &Path) -> anyhow::Result<ControllerConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    ControllerConfig::from_json(&raw)
        .with_context(|| format!("invalid config file {}", path.display()))
}

pub fn timezone(config: &ControllerConfig) -> Result<Option<Tz>, ConfigError> {
    config
        .timezone
        .as_deref()
        .map(|name| {
            name.parse::<Tz>().map_err(|_| ConfigError::InvalidValue {
                key: "TIMEZONE".to_string(),
                value: name.to_string(),
            })
        })
        .transpose()
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key).ok_or_else(|| ConfigError::Missing {
            key: key.to_string(),
        })
    }

    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.optional(key) {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &str) -> Result<bool, ConfigError> {
        let Some(raw) = self.optional(key) else {
            return Ok(false);
        };
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
        }
    }

    fn thresholds(
        &self,
        low_key: &str,
        high_key: &str,
        defaults: (i32, i32),
        name: &str,
    ) -> Result<ThresholdPair, ConfigError> {
        let low: i32 = self.parse_or(low_key, defaults.0)?;
        let high: i32 = self.parse_or(high_key, defaults.1)?;
        let pair = ThresholdPair {
            low_f: low as f32,
            high_f: high as f32,
        };
        pair.validate(name)?;
        Ok(pair)
    }
}

pub fn from_lookup<F>(lookup: F) -> Result<ControllerConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env = Env { lookup };

    let schedule = DayNightSchedule {
        day: env.thresholds("DAY_LOW", "DAY_HIGH", (65, 69), "day")?,
        night: env.thresholds("NIGHT_LOW", "NIGHT_HIGH", (62, 66), "night")?,
        night_window: ScheduleWindow::new(
            parse_time_of_day("NIGHT_BEGIN", &env.required("NIGHT_BEGIN")?)?,
            parse_time_of_day("NIGHT_END", &env.required("NIGHT_END")?)?,
        ),
    };

    let motion_sensor_ids: Vec<String> = env
        .optional("MOTION_DEVIDS")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let presence = if motion_sensor_ids.is_empty() {
        None
    } else {
        Some(PresenceConfig {
            check_interval_secs: env
                .parse_or("PRESENCE_CHECK_INTERVAL", DEFAULT_PRESENCE_CHECK_SECS)?,
            timeout_secs: env.parse_or("PRESENCE_TIMEOUT", DEFAULT_PRESENCE_TIMEOUT_SECS)?,
            motion_sensor_ids,
        })
    };

    let sensor = SensorConfig {
        base_url: env
            .optional("SWITCHBOT_API_URL")
            .unwrap_or_else(|| DEFAULT_SWITCHBOT_URL.to_string()),
        token: env.required("TOKEN")?,
        secret: env.required("SECRET")?,
        device_id: env.required("DEVID")?,
    };

    let actuator = ActuatorConfig {
        host: env.required("PLUG_IP")?,
        port: env.parse_or("PLUG_PORT", DEFAULT_PLUG_PORT)?,
    };

    let config = ControllerConfig {
        schedule,
        poll_interval_secs: env.parse_or("SLEEP_TIME", DEFAULT_POLL_INTERVAL_SECS)?,
        presence,
        sensor,
        actuator,
        telemetry: telemetry(&env)?,
        timezone: env.optional("TIMEZONE"),
        request_timeout_secs: env.parse_or("REQUEST_TIMEOUT", DEFAULT_REQUEST_TIMEOUT_SECS)?,
        debug: env.flag("DEBUG")?,
    };

    config.validate()?;
    Ok(config)
}

fn telemetry<F>(env: &Env<F>) -> Result<TelemetryConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = env.optional("INFLUX_URL") {
        return Ok(TelemetryConfig::Influx(InfluxConfig {
            url,
            org: env.required("INFLUX_ORG")?,
            bucket: env.required("INFLUX_BUCKET")?,
            token: env.required("INFLUX_TOKEN")?,
            measurement: env.required("INFLUX_MEASUREMENT")?,
        }));
    }

    if let Some(host) = env.optional("MQTT_HOST") {
        return Ok(TelemetryConfig::Mqtt(MqttConfig {
            host,
            port: env.parse_or("MQTT_PORT", DEFAULT_MQTT_PORT)?,
            user: env.optional("MQTT_USER"),
            pass: env.optional("MQTT_PASS"),
            topic: env
                .optional("MQTT_TOPIC")
                .unwrap_or_else(|| TOPIC_CYCLE.to_string()),
        }));
    }

    Err(ConfigError::Missing {
        key: "INFLUX_URL".to_string(),
    })
}
