use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::{config::ConfigError, thermostat::ThresholdPair, types::SchedulePeriod};

const TIME_OF_DAY_FORMAT: &str = "%H:%M";

/// Night window. `end < begin` means the window wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    #[serde(with = "hh_mm")]
    pub begin: NaiveTime,
    #[serde(with = "hh_mm")]
    pub end: NaiveTime,
}

impl ScheduleWindow {
    pub fn new(begin: NaiveTime, end: NaiveTime) -> Self {
        Self { begin, end }
    }

    pub fn wraps_midnight(&self) -> bool {
        self.end < self.begin
    }
}

/// Both boundaries are inclusive, for wrapping and non-wrapping windows.
pub fn is_night_now(now: NaiveTime, window: &ScheduleWindow) -> bool {
    if window.wraps_midnight() {
        now >= window.begin || now <= window.end
    } else {
        window.begin <= now && now <= window.end
    }
}

/// Drops seconds so comparisons happen at minute resolution.
pub fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
}

pub fn parse_time_of_day(key: &str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), TIME_OF_DAY_FORMAT).map_err(|_| {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DayNightSchedule {
    pub day: ThresholdPair,
    pub night: ThresholdPair,
    pub night_window: ScheduleWindow,
}

impl DayNightSchedule {
    pub fn period_at(&self, now: NaiveTime) -> SchedulePeriod {
        if is_night_now(now, &self.night_window) {
            SchedulePeriod::Night
        } else {
            SchedulePeriod::Day
        }
    }

    pub fn select(&self, now: NaiveTime) -> (SchedulePeriod, ThresholdPair) {
        match self.period_at(now) {
            SchedulePeriod::Night => (SchedulePeriod::Night, self.night),
            SchedulePeriod::Day => (SchedulePeriod::Day, self.day),
        }
    }
}

mod hh_mm {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    use super::TIME_OF_DAY_FORMAT;

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format(TIME_OF_DAY_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(raw.trim(), TIME_OF_DAY_FORMAT).map_err(de::Error::custom)
    }
}
