use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelayCommand {
    On,
    Off,
}

impl RelayCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PresenceStatus {
    Home,
    Away,
}

impl PresenceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Home => "HOME",
            Self::Away => "AWAY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchedulePeriod {
    Day,
    Night,
}

impl SchedulePeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "DAY",
            Self::Night => "NIGHT",
        }
    }
}

/// Raw ambient reading as reported by the sensor, before unit conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientReading {
    pub temperature_c: f32,
    pub humidity: u8,
}

/// One telemetry snapshot per outer cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CycleRecord {
    #[serde(rename = "degF")]
    pub temperature_f: f32,
    #[serde(rename = "rH")]
    pub relative_humidity: u8,
    #[serde(rename = "power")]
    pub power_watts: f32,
}

impl CycleRecord {
    pub fn new(reading: AmbientReading, power_watts: f32) -> Self {
        Self {
            temperature_f: celsius_to_fahrenheit(reading.temperature_c),
            relative_humidity: reading.humidity,
            power_watts,
        }
    }
}

/// Converts to Fahrenheit rounded to one decimal place.
///
/// The policy compares against this rounded value, so a reading of 64.96 °F
/// is treated as 65.0 °F.
pub fn celsius_to_fahrenheit(celsius: f32) -> f32 {
    let fahrenheit = celsius * 9.0 / 5.0 + 32.0;
    (fahrenheit * 10.0).round() / 10.0
}
