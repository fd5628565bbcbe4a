//! SwitchBot cloud API v1.1 client for the meter and motion sensors.
//!
//! Every request is signed with `HMAC-SHA256(secret, token + t + nonce)`,
//! base64 encoded, where `t` is the epoch time in milliseconds.

use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use chrono::Utc;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use heatloop_common::{AmbientReading, ControlError, SensorConfig};

use crate::ports::SensorClient;

const STATUS_SUCCESS: i64 = 100;
const USER_AGENT: &str = concat!("heatloop/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "statusCode")]
    status_code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    body: Value,
}

#[derive(Debug, Deserialize)]
struct MeterStatus {
    temperature: f32,
    humidity: u8,
}

#[derive(Debug, Deserialize)]
struct MotionStatus {
    #[serde(rename = "moveDetected")]
    move_detected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSignature {
    pub t: i64,
    pub nonce: String,
    pub sign: String,
}

impl RequestSignature {
    pub fn new(token: &str, secret: &str, t: i64, nonce: String) -> Self {
        let payload = format!("{token}{t}{nonce}");
        let sign = BASE64_STANDARD.encode(hmac_sha256::HMAC::mac(payload, secret));
        Self { t, nonce, sign }
    }
}

#[derive(Debug, Clone)]
pub struct SwitchBotClient {
    client: Client,
    base_url: String,
    token: String,
    secret: String,
    meter_id: String,
}

impl SwitchBotClient {
    pub fn new(config: &SensorConfig, timeout: Duration) -> Result<Self, ControlError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| ControlError::SensorUnavailable(format!("http client setup: {err}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            secret: config.secret.clone(),
            meter_id: config.device_id.clone(),
        })
    }

    async fn device_status<B: DeserializeOwned>(&self, device_id: &str) -> Result<B, ControlError> {
        let url = format!("{}/v1.1/devices/{device_id}/status", self.base_url);
        let signature = RequestSignature::new(
            &self.token,
            &self.secret,
            Utc::now().timestamp_millis(),
            Uuid::new_v4().to_string(),
        );

        let response = self
            .client
            .get(&url)
            .header("Authorization", &self.token)
            .header("t", signature.t.to_string())
            .header("nonce", &signature.nonce)
            .header("sign", &signature.sign)
            .send()
            .await
            .map_err(|err| unavailable(device_id, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ControlError::SensorUnavailable(format!(
                "device {device_id}: HTTP {status}"
            )));
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|err| unavailable(device_id, err))?;
        debug!(device_id, status_code = envelope.status_code, "switchbot status");

        if envelope.status_code != STATUS_SUCCESS {
            return Err(ControlError::SensorUnavailable(format!(
                "device {device_id}: status {} ({})",
                envelope.status_code, envelope.message
            )));
        }

        serde_json::from_value(envelope.body).map_err(|err| unavailable(device_id, err))
    }
}

#[async_trait]
impl SensorClient for SwitchBotClient {
    async fn read_ambient(&self) -> Result<AmbientReading, ControlError> {
        let status: MeterStatus = self.device_status(&self.meter_id).await?;
        Ok(AmbientReading {
            temperature_c: status.temperature,
            humidity: status.humidity,
        })
    }

    async fn read_motion(&self, sensor_id: &str) -> Result<bool, ControlError> {
        let status: MotionStatus = self.device_status(sensor_id).await?;
        Ok(status.move_detected)
    }
}

fn unavailable(device_id: &str, err: impl std::fmt::Display) -> ControlError {
    ControlError::SensorUnavailable(format!("device {device_id}: {err}"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_for(server: &MockServer) -> SwitchBotClient {
        let config = SensorConfig {
            base_url: format!("{}/", server.uri()),
            token: "tok".to_string(),
            secret: "sec".to_string(),
            device_id: "meter01".to_string(),
        };
        SwitchBotClient::new(&config, Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn signature_is_stable_for_same_inputs() {
        let first = RequestSignature::new("tok", "sec", 1_700_000_000_000, "n1".to_string());
        let second = RequestSignature::new("tok", "sec", 1_700_000_000_000, "n1".to_string());
        let other_nonce = RequestSignature::new("tok", "sec", 1_700_000_000_000, "n2".to_string());

        assert_eq!(first, second);
        assert_ne!(first.sign, other_nonce.sign);
        // 32-byte MAC in padded base64.
        assert_eq!(first.sign.len(), 44);
        assert_eq!(BASE64_STANDARD.decode(&first.sign).unwrap().len(), 32);
    }

    #[test]
    fn signature_covers_token_and_timestamp() {
        let base = RequestSignature::new("tok", "sec", 1, String::new());

        assert_ne!(base.sign, RequestSignature::new("tok2", "sec", 1, String::new()).sign);
        assert_ne!(base.sign, RequestSignature::new("tok", "sec", 2, String::new()).sign);
        assert_ne!(base.sign, RequestSignature::new("tok", "sec2", 1, String::new()).sign);
    }

    #[tokio::test]
    async fn reads_meter_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1.1/devices/meter01/status"))
            .and(header("Authorization", "tok"))
            .and(header_exists("sign"))
            .and(header_exists("t"))
            .and(header_exists("nonce"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "statusCode": 100,
                "message": "success",
                "body": {
                    "deviceId": "meter01",
                    "deviceType": "Meter",
                    "temperature": 18.5,
                    "humidity": 47
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reading = client_for(&server).read_ambient().await.unwrap();

        assert_eq!(
            reading,
            AmbientReading {
                temperature_c: 18.5,
                humidity: 47,
            }
        );
    }

    #[tokio::test]
    async fn reads_motion_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1.1/devices/hall/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "statusCode": 100,
                "message": "success",
                "body": { "deviceId": "hall", "moveDetected": true, "brightness": "dim" }
            })))
            .mount(&server)
            .await;

        assert!(client_for(&server).read_motion("hall").await.unwrap());
    }

    #[tokio::test]
    async fn api_error_status_is_sensor_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "statusCode": 190,
                "message": "device internal error",
                "body": {}
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).read_ambient().await.unwrap_err();

        assert!(matches!(err, ControlError::SensorUnavailable(ref msg) if msg.contains("190")));
    }

    #[tokio::test]
    async fn http_error_is_sensor_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client_for(&server).read_motion("hall").await.unwrap_err();

        assert!(matches!(err, ControlError::SensorUnavailable(_)));
    }

    #[tokio::test]
    async fn malformed_body_is_sensor_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "statusCode": 100,
                "body": { "temperature": "warm" }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).read_ambient().await.unwrap_err();

        assert!(matches!(err, ControlError::SensorUnavailable(_)));
    }

    #[tokio::test]
    async fn slow_api_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "statusCode": 100, "body": {} }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).read_ambient().await.unwrap_err();

        assert!(matches!(err, ControlError::SensorUnavailable(_)));
    }
}
