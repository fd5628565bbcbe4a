//! TP-Link Kasa smart plug, local protocol on TCP 9999.
//!
//! Frames are a 4-byte big-endian length followed by JSON obfuscated with the
//! Kasa XOR autokey cipher (initial key 171). Every call opens a fresh
//! connection and is bounded by the configured timeout.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tracing::debug;

use heatloop_common::{ActuatorConfig, ControlError};

use crate::ports::ActuatorClient;

const INITIAL_KEY: u8 = 171;
const MAX_RESPONSE_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum KasaError {
    #[error("plug i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("plug json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("plug did not answer within {0:?}")]
    Timeout(Duration),
    #[error("plug response too large ({0} bytes)")]
    Oversized(usize),
    #[error("plug response missing {0}")]
    MissingField(&'static str),
    #[error("plug {module}.{method} returned err_code {code}")]
    Device {
        module: &'static str,
        method: &'static str,
        code: i64,
    },
}

impl From<KasaError> for ControlError {
    fn from(err: KasaError) -> Self {
        ControlError::ActuatorUnavailable(err.to_string())
    }
}

pub fn encrypt(plain: &[u8]) -> Vec<u8> {
    let mut key = INITIAL_KEY;
    let mut frame = Vec::with_capacity(plain.len() + 4);
    frame.extend_from_slice(&(plain.len() as u32).to_be_bytes());
    for &byte in plain {
        key ^= byte;
        frame.push(key);
    }
    frame
}

pub fn decrypt(cipher: &[u8]) -> Vec<u8> {
    let mut key = INITIAL_KEY;
    cipher
        .iter()
        .map(|&byte| {
            let plain = key ^ byte;
            key = byte;
            plain
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct KasaPlug {
    host: String,
    port: u16,
    timeout: Duration,
}

impl KasaPlug {
    pub fn new(config: &ActuatorConfig, timeout: Duration) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            timeout,
        }
    }

    async fn send(&self, request: &Value) -> Result<Value, KasaError> {
        let payload = serde_json::to_vec(request)?;

        let exchange = async {
            let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
            stream.write_all(&encrypt(&payload)).await?;

            let mut header = [0u8; 4];
            stream.read_exact(&mut header).await?;
            let len = u32::from_be_bytes(header) as usize;
            if len > MAX_RESPONSE_BYTES {
                return Err(KasaError::Oversized(len));
            }

            let mut body = vec![0u8; len];
            stream.read_exact(&mut body).await?;
            Ok::<Value, KasaError>(serde_json::from_slice(&decrypt(&body))?)
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| KasaError::Timeout(self.timeout))?
    }

    async fn set_relay(&self, on: bool) -> Result<(), KasaError> {
        let request = json!({ "system": { "set_relay_state": { "state": u8::from(on) } } });
        let response = self.send(&request).await?;
        section(&response, "system", "set_relay_state")?;
        debug!(host = %self.host, on, "relay state set");
        Ok(())
    }

    async fn realtime_power(&self) -> Result<f32, KasaError> {
        let response = self
            .send(&json!({ "emeter": { "get_realtime": {} } }))
            .await?;
        let realtime = section(&response, "emeter", "get_realtime")?;

        // Newer firmware reports milliwatts, older firmware watts.
        if let Some(milliwatts) = realtime.get("power_mw").and_then(Value::as_f64) {
            return Ok((milliwatts / 1_000.0) as f32);
        }
        realtime
            .get("power")
            .and_then(Value::as_f64)
            .map(|watts| watts as f32)
            .ok_or(KasaError::MissingField("emeter.get_realtime.power"))
    }
}

fn section<'a>(
    response: &'a Value,
    module: &'static str,
    method: &'static str,
) -> Result<&'a Value, KasaError> {
    let section = response
        .get(module)
        .and_then(|value| value.get(method))
        .ok_or(KasaError::MissingField(method))?;

    let code = section.get("err_code").and_then(Value::as_i64).unwrap_or(0);
    if code != 0 {
        return Err(KasaError::Device {
            module,
            method,
            code,
        });
    }
    Ok(section)
}

#[async_trait]
impl ActuatorClient for KasaPlug {
    async fn turn_on(&self) -> Result<(), ControlError> {
        Ok(self.set_relay(true).await?)
    }

    async fn turn_off(&self) -> Result<(), ControlError> {
        Ok(self.set_relay(false).await?)
    }

    async fn read_power_watts(&self) -> Result<f32, ControlError> {
        Ok(self.realtime_power().await?)
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use tokio::{net::TcpListener, task::JoinHandle};

    use super::*;

    /// One-shot fake plug: decodes one request, answers with `reply(request)`.
    async fn fake_plug(reply: fn(&Value) -> Value) -> (SocketAddr, JoinHandle<Value>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut header = [0u8; 4];
            socket.read_exact(&mut header).await.unwrap();
            let mut body = vec![0u8; u32::from_be_bytes(header) as usize];
            socket.read_exact(&mut body).await.unwrap();

            let request: Value = serde_json::from_slice(&decrypt(&body)).unwrap();
            let response = serde_json::to_vec(&reply(&request)).unwrap();
            socket.write_all(&encrypt(&response)).await.unwrap();
            request
        });

        (addr, handle)
    }

    fn plug(addr: SocketAddr) -> KasaPlug {
        KasaPlug::new(
            &ActuatorConfig {
                host: addr.ip().to_string(),
                port: addr.port(),
            },
            Duration::from_secs(2),
        )
    }

    #[test]
    fn cipher_matches_known_frame() {
        assert_eq!(encrypt(b"{"), vec![0, 0, 0, 1, 208]);
        assert_eq!(decrypt(&[208]), b"{".to_vec());
    }

    #[test]
    fn cipher_round_trips_payload() {
        let plain = br#"{"system":{"get_sysinfo":{}}}"#;
        let frame = encrypt(plain);

        assert_eq!(&frame[..4], &(plain.len() as u32).to_be_bytes());
        assert_eq!(decrypt(&frame[4..]), plain.to_vec());
    }

    #[tokio::test]
    async fn turn_on_sets_relay_state() {
        let (addr, handle) =
            fake_plug(|_| json!({ "system": { "set_relay_state": { "err_code": 0 } } })).await;

        plug(addr).turn_on().await.unwrap();

        let request = handle.await.unwrap();
        assert_eq!(
            request,
            json!({ "system": { "set_relay_state": { "state": 1 } } })
        );
    }

    #[tokio::test]
    async fn turn_off_clears_relay_state() {
        let (addr, handle) =
            fake_plug(|_| json!({ "system": { "set_relay_state": { "err_code": 0 } } })).await;

        plug(addr).turn_off().await.unwrap();

        let request = handle.await.unwrap();
        assert_eq!(request["system"]["set_relay_state"]["state"], json!(0));
    }

    #[tokio::test]
    async fn reads_power_in_milliwatts() {
        let (addr, _) = fake_plug(|_| {
            json!({ "emeter": { "get_realtime": {
                "voltage_mv": 121_000, "current_ma": 12, "power_mw": 1_500, "err_code": 0
            } } })
        })
        .await;

        let watts = plug(addr).read_power_watts().await.unwrap();

        assert_eq!(watts, 1.5);
    }

    #[tokio::test]
    async fn reads_power_in_watts_on_old_firmware() {
        let (addr, _) = fake_plug(|_| {
            json!({ "emeter": { "get_realtime": { "power": 1200.25, "err_code": 0 } } })
        })
        .await;

        let watts = plug(addr).read_power_watts().await.unwrap();

        assert_eq!(watts, 1200.25);
    }

    #[tokio::test]
    async fn device_error_code_is_actuator_unavailable() {
        let (addr, _) = fake_plug(|_| {
            json!({ "emeter": { "get_realtime": {
                "err_code": -1, "err_msg": "module not support"
            } } })
        })
        .await;

        let err = plug(addr).read_power_watts().await.unwrap_err();

        assert!(matches!(
            err,
            ControlError::ActuatorUnavailable(ref msg) if msg.contains("err_code -1")
        ));
    }

    #[tokio::test]
    async fn unreachable_plug_is_actuator_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = plug(addr).turn_off().await.unwrap_err();

        assert!(matches!(err, ControlError::ActuatorUnavailable(_)));
    }

    #[tokio::test]
    async fn silent_plug_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(socket);
        });

        let silent = KasaPlug::new(
            &ActuatorConfig {
                host: addr.ip().to_string(),
                port: addr.port(),
            },
            Duration::from_millis(200),
        );
        let err = silent.turn_on().await.unwrap_err();

        assert!(matches!(
            err,
            ControlError::ActuatorUnavailable(ref msg) if msg.contains("did not answer")
        ));
    }
}
