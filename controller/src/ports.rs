use async_trait::async_trait;
use chrono::{Local, NaiveTime, Utc};
use chrono_tz::Tz;

use heatloop_common::{
    schedule::truncate_to_minute, AmbientReading, ControlError, CycleRecord, RelayCommand,
};

#[async_trait]
pub trait SensorClient: Send + Sync {
    async fn read_ambient(&self) -> Result<AmbientReading, ControlError>;
    async fn read_motion(&self, sensor_id: &str) -> Result<bool, ControlError>;
}

/// Switched load. Commands are idempotent; the relay state is never read back.
#[async_trait]
pub trait ActuatorClient: Send + Sync {
    async fn turn_on(&self) -> Result<(), ControlError>;
    async fn turn_off(&self) -> Result<(), ControlError>;
    async fn read_power_watts(&self) -> Result<f32, ControlError>;

    async fn apply(&self, command: RelayCommand) -> Result<(), ControlError> {
        match command {
            RelayCommand::On => self.turn_on().await,
            RelayCommand::Off => self.turn_off().await,
        }
    }
}

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn write(&self, record: &CycleRecord) -> Result<(), ControlError>;
}

pub trait Clock: Send + Sync {
    /// Local wall-clock time truncated to the minute.
    fn time_of_day(&self) -> NaiveTime;
}

/// Wall clock in the configured IANA zone, or the host zone when unset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    timezone: Option<Tz>,
}

impl SystemClock {
    pub fn new(timezone: Option<Tz>) -> Self {
        Self { timezone }
    }
}

impl Clock for SystemClock {
    fn time_of_day(&self) -> NaiveTime {
        let now = match self.timezone {
            Some(tz) => Utc::now().with_timezone(&tz).time(),
            None => Local::now().time(),
        };
        truncate_to_minute(now)
    }
}
