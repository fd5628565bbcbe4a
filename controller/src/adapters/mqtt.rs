use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, ClientError, EventLoop, LastWill, MqttOptions, QoS};
use tracing::{info, warn};

use heatloop_common::{ControlError, CycleRecord, MqttConfig, TOPIC_STATUS};

use crate::ports::TelemetrySink;

const CLIENT_ID: &str = "heatloop-controller";
const REQUEST_CAPACITY: usize = 32;

/// Publishes each cycle record as retained JSON. The rumqttc event loop runs
/// on its own task and reconnects on its own. `write` never waits: when the
/// request queue is full (broker down) the record is dropped with an error.
pub struct MqttSink {
    client: AsyncClient,
    topic: String,
}

impl MqttSink {
    pub async fn connect(config: &MqttConfig) -> Result<Self, ControlError> {
        let mut options = MqttOptions::new(CLIENT_ID, config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(30));
        options.set_last_will(LastWill::new(
            TOPIC_STATUS,
            "offline",
            QoS::AtLeastOnce,
            true,
        ));
        if let Some(user) = &config.user {
            options.set_credentials(user.clone(), config.pass.clone().unwrap_or_default());
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        spawn_event_loop(eventloop);

        client
            .try_publish(TOPIC_STATUS, QoS::AtLeastOnce, true, "online")
            .map_err(publish_failed)?;

        Ok(Self {
            client,
            topic: config.topic.clone(),
        })
    }
}

fn spawn_event_loop(mut eventloop: EventLoop) {
    tokio::spawn(async move {
        let mut connected = false;
        loop {
            match eventloop.poll().await {
                Ok(rumqttc::Event::Incoming(rumqttc::Incoming::ConnAck(_))) => {
                    connected = true;
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    if connected {
                        warn!("mqtt connection lost: {err}");
                    } else {
                        warn!("mqtt poll error: {err}");
                    }
                    connected = false;
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

pub fn payload(record: &CycleRecord) -> Result<Vec<u8>, ControlError> {
    serde_json::to_vec(record).map_err(|err| ControlError::TelemetryWriteFailed(err.to_string()))
}

#[async_trait]
impl TelemetrySink for MqttSink {
    async fn write(&self, record: &CycleRecord) -> Result<(), ControlError> {
        let body = payload(record)?;
        self.client
            .try_publish(self.topic.as_str(), QoS::AtLeastOnce, true, body)
            .map_err(publish_failed)
    }
}

fn publish_failed(err: ClientError) -> ControlError {
    ControlError::TelemetryWriteFailed(format!("mqtt publish: {err}"))
}
