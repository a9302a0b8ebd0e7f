use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Deserialize;

use super::ingest::SurplusSink;

/// One subscribed topic, routed like [`super::http_get::HttpGetTarget`]:
/// `device = None` feeds `set_surplus`, `Some(name)` feeds that device's
/// consumption.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttTarget {
    #[serde(default)]
    pub device: Option<String>,
    pub topic: String,
}

/// Connection + subscription set for the `mqtt_sub` ingestion integration.
/// A missing `hostname` fails config deserialization, which callers should
/// treat as a fatal bootstrap error rather than spawning this with a bad
/// config.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttSubConfig {
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub targets: Vec<MqttTarget>,
}

fn default_port() -> u16 {
    1883
}

/// Subscribes to every configured topic and routes incoming messages into
/// `sink`. Runs forever; an eventloop error is logged and retried rather
/// than treated as fatal.
pub async fn run_mqtt_sub(sink: Arc<dyn SurplusSink>, config: MqttSubConfig) {
    let mut options = MqttOptions::new("open-surplus-manager", config.hostname.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(30));
    if let (Some(user), Some(pass)) = (&config.username, &config.password) {
        options.set_credentials(user, pass);
    }

    let (client, mut eventloop) = AsyncClient::new(options, 32);
    for target in &config.targets {
        if let Err(err) = client.subscribe(&target.topic, QoS::AtLeastOnce).await {
            tracing::warn!(topic = %target.topic, error = %err, "mqtt_sub: subscribe failed");
        }
    }

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let Ok(text) = std::str::from_utf8(&publish.payload) else {
                    tracing::warn!(topic = %publish.topic, "mqtt_sub: payload not utf-8, skipping");
                    continue;
                };
                let Ok(value) = text.trim().parse::<f64>() else {
                    tracing::warn!(topic = %publish.topic, payload = %text, "mqtt_sub: unparsable reading, skipping");
                    continue;
                };
                match config.targets.iter().find(|t| t.topic == publish.topic) {
                    Some(target) => match &target.device {
                        Some(device) => sink.set_device_consumption(device, value).await,
                        None => sink.set_surplus(value).await,
                    },
                    None => tracing::debug!(topic = %publish.topic, "mqtt_sub: no target bound, ignoring"),
                }
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error = %err, "mqtt_sub: eventloop error, retrying");
            }
        }
    }
}
