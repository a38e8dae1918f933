use std::{future::Future, time::Duration};

use myair_common::{MqttSettings, Publication};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, LastWill, MqttOptions, QoS};
use thiserror::Error;
use tokio::{sync::mpsc::UnboundedSender, task::JoinHandle};
use tracing::{debug, info, warn};

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;
const MIN_KEEP_ALIVE_SECS: u64 = 5;
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}

/// Outbound side of the broker connection.
pub trait Transport: Send + Sync {
    fn send(&self, publication: Publication)
        -> impl Future<Output = Result<(), TransportError>> + Send;

    fn listen(&self, filter: String) -> impl Future<Output = Result<(), TransportError>> + Send;
}

impl Transport for AsyncClient {
    async fn send(&self, publication: Publication) -> Result<(), TransportError> {
        debug!(topic = %publication.topic, payload = %publication.payload, "publish");
        self.publish(
            publication.topic,
            QoS::AtLeastOnce,
            publication.retain,
            publication.payload,
        )
        .await?;
        Ok(())
    }

    async fn listen(&self, filter: String) -> Result<(), TransportError> {
        self.subscribe(filter, QoS::AtLeastOnce).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MqttEvent {
    Connected,
    Message { topic: String, payload: Vec<u8> },
}

/// Applies the `MQTT_HOST`, `MQTT_PORT`, `MQTT_USER` and `MQTT_PASS`
/// environment overrides on top of the file settings.
pub fn with_env_overrides(
    settings: &MqttSettings,
    var: impl Fn(&str) -> Option<String>,
) -> MqttSettings {
    let mut resolved = settings.clone();
    if let Some(host) = var("MQTT_HOST") {
        resolved.broker = host;
    }
    if let Some(port) = var("MQTT_PORT").and_then(|value| value.parse::<u16>().ok()) {
        resolved.port = port;
    }
    if let Some(user) = var("MQTT_USER") {
        resolved.username = user;
    }
    if let Some(pass) = var("MQTT_PASS") {
        resolved.password = pass;
    }
    resolved
}

pub fn mqtt_options(settings: &MqttSettings, will: Publication) -> MqttOptions {
    let mut options = MqttOptions::new(
        settings.client_id.clone(),
        settings.broker.clone(),
        settings.port,
    );
    options.set_keep_alive(Duration::from_secs(
        settings.keep_alive_secs.max(MIN_KEEP_ALIVE_SECS),
    ));
    options.set_last_will(LastWill::new(
        will.topic,
        will.payload,
        QoS::AtLeastOnce,
        will.retain,
    ));
    if !settings.username.is_empty() {
        options.set_credentials(settings.username.clone(), settings.password.clone());
    }
    options
}

/// Drives the rumqttc event loop and forwards what the bridge cares about.
/// Publishing from this task would stall the loop, so handling happens on
/// the receiving end of `events`.
pub fn spawn_event_loop(
    mut eventloop: EventLoop,
    events: UnboundedSender<MqttEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if message.payload.len() > MAX_MQTT_PAYLOAD_BYTES {
                        warn!(
                            "dropping oversized MQTT payload on topic {} ({} bytes)",
                            message.topic,
                            message.payload.len()
                        );
                        continue;
                    }
                    let event = MqttEvent::Message {
                        topic: message.topic,
                        payload: message.payload.to_vec(),
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                    if events.send(MqttEvent::Connected).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn settings() -> MqttSettings {
        MqttSettings {
            broker: "10.0.0.5".to_string(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            client_id: "myair-to-mqtt".to_string(),
            keep_alive_secs: 1,
        }
    }

    fn will() -> Publication {
        Publication {
            topic: "homie/5/advantageair/$state".to_string(),
            payload: "lost".to_string(),
            retain: true,
        }
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let env = HashMap::from([
            ("MQTT_HOST", "broker.lan"),
            ("MQTT_PORT", "8883"),
            ("MQTT_USER", "bridge"),
            ("MQTT_PASS", "hunter2"),
        ]);
        let resolved =
            with_env_overrides(&settings(), |key| env.get(key).map(|v| v.to_string()));
        assert_eq!(resolved.broker, "broker.lan");
        assert_eq!(resolved.port, 8883);
        assert_eq!(resolved.username, "bridge");
        assert_eq!(resolved.password, "hunter2");
        assert_eq!(resolved.client_id, "myair-to-mqtt");
    }

    #[test]
    fn unparsable_port_override_is_ignored() {
        let resolved = with_env_overrides(&settings(), |key| {
            (key == "MQTT_PORT").then(|| "not-a-port".to_string())
        });
        assert_eq!(resolved.port, 1883);
        assert_eq!(resolved.broker, "10.0.0.5");
    }

    #[test]
    fn options_set_last_will_and_keep_alive_floor() {
        let options = mqtt_options(&settings(), will());

        assert_eq!(options.keep_alive(), Duration::from_secs(MIN_KEEP_ALIVE_SECS));
        assert_eq!(options.client_id(), "myair-to-mqtt");
        assert!(options.credentials().is_none());
        assert!(options.last_will().is_some());
    }

    #[test]
    fn options_carry_credentials_when_user_is_set() {
        let mut settings = settings();
        settings.username = "hass".to_string();
        settings.password = "secret".to_string();
        let options = mqtt_options(&settings, will());
        assert!(options.credentials().is_some());
    }
}
