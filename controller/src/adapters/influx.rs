//! InfluxDB v2 write path using line protocol.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use heatloop_common::{ControlError, CycleRecord, InfluxConfig};

use crate::ports::TelemetrySink;

#[derive(Debug, Clone)]
pub struct InfluxSink {
    client: Client,
    write_url: String,
    org: String,
    bucket: String,
    token: String,
    measurement: String,
}

impl InfluxSink {
    pub fn new(config: &InfluxConfig, timeout: Duration) -> Result<Self, ControlError> {
        let client = Client::builder().timeout(timeout).build().map_err(|err| {
            ControlError::TelemetryWriteFailed(format!("http client setup: {err}"))
        })?;

        Ok(Self {
            client,
            write_url: format!("{}/api/v2/write", config.url.trim_end_matches('/')),
            org: config.org.clone(),
            bucket: config.bucket.clone(),
            token: config.token.clone(),
            measurement: config.measurement.clone(),
        })
    }
}

/// `<measurement> degF=<f>,rH=<i>i,power=<f>` with server-side timestamps.
pub fn line_protocol(measurement: &str, record: &CycleRecord) -> String {
    format!(
        "{} degF={},rH={}i,power={}",
        escape_measurement(measurement),
        record.temperature_f,
        record.relative_humidity,
        record.power_watts
    )
}

fn escape_measurement(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch == ',' || ch == ' ' {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[async_trait]
impl TelemetrySink for InfluxSink {
    async fn write(&self, record: &CycleRecord) -> Result<(), ControlError> {
        let response = self
            .client
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "s"),
            ])
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(line_protocol(&self.measurement, record))
            .send()
            .await
            .map_err(|err| ControlError::TelemetryWriteFailed(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        Err(ControlError::TelemetryWriteFailed(format!(
            "HTTP {status}: {}",
            detail.trim()
        )))
    }
}
