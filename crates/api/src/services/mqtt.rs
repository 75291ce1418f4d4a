//! MQTT pub/sub adapter.
//!
//! Inbound: `{prefix}/home_alarm/{device_id}/{status|heartbeat|trigger|sensor_data}`.
//! Every payload carries `device_secret`, which is checked before anything
//! else. Outbound commands go to `{prefix}/home_alarm/{device_id}/command`.
//!
//! Delivery is QoS 1 and best-effort; the command outbox stays the durable path.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::models::{
    AuthenticatedDevice, DeviceStatusReport, DeviceTriggerPayload, OutboundCommand,
    SensorDataPayload,
};
use domain::services::{CommandPublisher, DeviceAuthGate, PublishError, TransportBridge};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::MqttConfig;

const TOPIC_NAMESPACE: &str = "home_alarm";
const REQUEST_CAPACITY: usize = 64;

/// Device-originated message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundKind {
    Status,
    Heartbeat,
    Trigger,
    SensorData,
}

impl InboundKind {
    const ALL: [InboundKind; 4] = [
        InboundKind::Status,
        InboundKind::Heartbeat,
        InboundKind::Trigger,
        InboundKind::SensorData,
    ];

    pub fn topic_suffix(&self) -> &'static str {
        match self {
            InboundKind::Status => "status",
            InboundKind::Heartbeat => "heartbeat",
            InboundKind::Trigger => "trigger",
            InboundKind::SensorData => "sensor_data",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.topic_suffix() == suffix)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InboundError {
    #[error("Unexpected topic: {0}")]
    UnexpectedTopic(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

/// A device message split into routing and credentials.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub device_id: String,
    pub kind: InboundKind,
    pub device_secret: Option<String>,
    pub payload: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct SecretEnvelope {
    device_secret: Option<String>,
}

impl InboundMessage {
    fn decode<T: DeserializeOwned>(&self) -> Result<T, InboundError> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| InboundError::MalformedPayload(e.to_string()))
    }
}

/// Wildcard subscriptions for every inbound kind.
pub fn subscription_topics(prefix: &str) -> Vec<String> {
    InboundKind::ALL
        .iter()
        .map(|k| format!("{}/{}/+/{}", prefix, TOPIC_NAMESPACE, k.topic_suffix()))
        .collect()
}

pub fn command_topic(prefix: &str, device_id: &str) -> String {
    format!("{}/{}/{}/command", prefix, TOPIC_NAMESPACE, device_id)
}

/// Splits a publish into device id, kind and secret.
pub fn parse_inbound(
    prefix: &str,
    topic: &str,
    payload: &[u8],
) -> Result<InboundMessage, InboundError> {
    let unexpected = || InboundError::UnexpectedTopic(topic.to_string());

    let rest = topic
        .strip_prefix(prefix)
        .and_then(|r| r.strip_prefix('/'))
        .and_then(|r| r.strip_prefix(TOPIC_NAMESPACE))
        .and_then(|r| r.strip_prefix('/'))
        .ok_or_else(unexpected)?;

    let (device_id, suffix) = rest.split_once('/').ok_or_else(unexpected)?;
    if device_id.is_empty() || suffix.contains('/') {
        return Err(unexpected());
    }
    let kind = InboundKind::from_suffix(suffix).ok_or_else(unexpected)?;

    let envelope: SecretEnvelope = serde_json::from_slice(payload)
        .map_err(|e| InboundError::MalformedPayload(e.to_string()))?;

    Ok(InboundMessage {
        device_id: device_id.to_string(),
        kind,
        device_secret: envelope.device_secret,
        payload: payload.to_vec(),
    })
}

/// Doubles the delay up to `max`.
pub fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

fn client_id(prefix: &str) -> String {
    format!("{}-{:08x}", prefix, rand::random::<u32>())
}

/// Publishes commands to devices over MQTT.
#[derive(Clone)]
pub struct MqttCommandPublisher {
    client: AsyncClient,
    topic_prefix: String,
    timeout: Duration,
}

#[async_trait]
impl CommandPublisher for MqttCommandPublisher {
    async fn publish(
        &self,
        device_id: &str,
        command: &OutboundCommand,
    ) -> Result<(), PublishError> {
        let payload =
            serde_json::to_vec(command).map_err(|e| PublishError::Channel(e.to_string()))?;
        let topic = command_topic(&self.topic_prefix, device_id);

        let publish = self.client.publish(topic, QoS::AtLeastOnce, false, payload);
        match tokio::time::timeout(self.timeout, publish).await {
            Ok(Ok(())) => {
                metrics::counter!("mqtt_commands_published_total").increment(1);
                Ok(())
            }
            Ok(Err(e)) => Err(PublishError::Channel(e.to_string())),
            Err(_) => Err(PublishError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}

/// Receiving half of the MQTT connection, started once the bridge exists.
pub struct MqttListener {
    client: AsyncClient,
    eventloop: EventLoop,
    config: MqttConfig,
}

/// Creates the client. Nothing touches the network until the listener runs.
pub fn connect(config: &MqttConfig) -> (MqttCommandPublisher, MqttListener) {
    let mut options = MqttOptions::new(
        client_id(&config.client_id_prefix),
        &config.host,
        config.port,
    );
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
    options.set_clean_session(true);
    if !config.username.is_empty() {
        options.set_credentials(&config.username, &config.password);
    }

    let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
    let publisher = MqttCommandPublisher {
        client: client.clone(),
        topic_prefix: config.topic_prefix.clone(),
        timeout: Duration::from_millis(config.publish_timeout_ms),
    };
    let listener = MqttListener {
        client,
        eventloop,
        config: config.clone(),
    };
    (publisher, listener)
}

impl MqttListener {
    /// Drives the event loop until shutdown, reconnecting with backoff.
    pub fn spawn(
        self,
        bridge: Arc<TransportBridge>,
        gate: Arc<DeviceAuthGate>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let MqttListener {
            client,
            mut eventloop,
            config,
        } = self;

        tokio::spawn(async move {
            let min_delay = Duration::from_millis(config.reconnect_min_ms);
            let max_delay =
                Duration::from_millis(config.reconnect_max_ms.max(config.reconnect_min_ms));
            let mut delay = min_delay;
            let topics = subscription_topics(&config.topic_prefix);

            info!(host = %config.host, port = config.port, "MQTT listener starting");

            loop {
                let event = tokio::select! {
                    event = eventloop.poll() => event,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                };

                match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        delay = min_delay;
                        info!("MQTT connected");
                        for topic in &topics {
                            if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtLeastOnce)
                            {
                                error!(topic = %topic, error = %e, "MQTT subscribe failed");
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let parsed =
                            parse_inbound(&config.topic_prefix, &publish.topic, &publish.payload);
                        match parsed {
                            Ok(message) => {
                                let bridge = bridge.clone();
                                let gate = gate.clone();
                                tokio::spawn(async move {
                                    handle_inbound(&bridge, &gate, message).await;
                                });
                            }
                            Err(e) => warn!(error = %e, "Dropping MQTT message"),
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        metrics::counter!("mqtt_connection_errors_total").increment(1);
                        warn!(
                            error = %e,
                            retry_ms = delay.as_millis() as u64,
                            "MQTT connection lost"
                        );
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            changed = shutdown.changed() => {
                                if changed.is_err() || *shutdown.borrow() {
                                    break;
                                }
                            }
                        }
                        delay = next_backoff(delay, max_delay);
                    }
                }
            }

            if let Err(e) = client.try_disconnect() {
                debug!(error = %e, "MQTT disconnect request failed");
            }
            info!("MQTT listener stopped");
        })
    }
}

/// Authenticates one inbound message and hands it to the bridge.
pub async fn handle_inbound(
    bridge: &TransportBridge,
    gate: &DeviceAuthGate,
    message: InboundMessage,
) {
    let secret = message.device_secret.as_deref();
    let device = match gate.authenticate(Some(&message.device_id), secret) {
        Ok(device) => device,
        Err(e) => {
            warn!(
                device_id = %message.device_id,
                kind = message.kind.topic_suffix(),
                reason = %e,
                "Rejected MQTT message"
            );
            return;
        }
    };

    if let Err(e) = dispatch(bridge, device, &message).await {
        warn!(
            device_id = %message.device_id,
            kind = message.kind.topic_suffix(),
            error = %e,
            "Failed to apply MQTT message"
        );
    }
}

async fn dispatch(
    bridge: &TransportBridge,
    device: AuthenticatedDevice,
    message: &InboundMessage,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match message.kind {
        InboundKind::Status => {
            let report: DeviceStatusReport = message.decode()?;
            bridge.on_device_status_report(device, report).await?;
        }
        InboundKind::Heartbeat => {
            let report: DeviceStatusReport = message.decode()?;
            bridge.on_device_heartbeat(device, report).await?;
        }
        InboundKind::Trigger => {
            let payload: DeviceTriggerPayload = message.decode()?;
            bridge.on_device_trigger(device, payload).await?;
        }
        InboundKind::SensorData => {
            let payload: SensorDataPayload = message.decode()?;
            bridge.on_sensor_data(device, payload).await?;
        }
    }
    Ok(())
}
