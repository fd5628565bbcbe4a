pub mod influx;
pub mod kasa;
pub mod mqtt;
pub mod switchbot;

use async_trait::async_trait;

use heatloop_common::{ControlError, ControllerConfig, CycleRecord, TelemetryConfig};

pub use influx::InfluxSink;
pub use kasa::KasaPlug;
pub use mqtt::MqttSink;
pub use switchbot::SwitchBotClient;

use crate::ports::TelemetrySink;

/// Telemetry backend chosen by configuration.
pub enum Telemetry {
    Influx(InfluxSink),
    Mqtt(MqttSink),
}

impl Telemetry {
    pub async fn from_config(config: &ControllerConfig) -> Result<Self, ControlError> {
        match &config.telemetry {
            TelemetryConfig::Influx(influx) => Ok(Self::Influx(InfluxSink::new(
                influx,
                config.request_timeout(),
            )?)),
            TelemetryConfig::Mqtt(mqtt) => Ok(Self::Mqtt(MqttSink::connect(mqtt).await?)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Influx(_) => "influx",
            Self::Mqtt(_) => "mqtt",
        }
    }
}

#[async_trait]
impl TelemetrySink for Telemetry {
    async fn write(&self, record: &CycleRecord) -> Result<(), ControlError> {
        match self {
            Self::Influx(sink) => sink.write(record).await,
            Self::Mqtt(sink) => sink.write(record).await,
        }
    }
}
