use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use open_surplus_manager::config::AppConfig;
use open_surplus_manager::controller::Core;
use open_surplus_manager::integrations::{self, ControlIntegration, HttpPostActuator, SurplusSink};
#[cfg(feature = "sim")]
use open_surplus_manager::integrations::SimulatedActuator;
use open_surplus_manager::{api, config, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = telemetry::init_tracing();

    let config_path = std::env::var("CONFIG_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.yaml"));
    let config = AppConfig::load_from(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path.display()))?;

    let (core, persist_rx, _scheduler_handle) = Core::bootstrap(config.clone());
    tokio::spawn(config::spawn_persistence(
        config_path,
        core.config_mutator(),
        persist_rx,
    ));

    bind_control_integrations(&core, &config).await?;
    spawn_ingestion(&core, &config)?;

    let addr = config.socket_addr()?;
    let app = api::router(core.clone());

    info!(%addr, "starting open-surplus-manager");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    core.shutdown().await;
    warn!("shutdown complete");
    Ok(())
}

/// Binds each device's configured actuator. A device with no
/// `control_integration` falls back to [`SimulatedActuator`] under the
/// `sim` feature (the out-of-the-box default); an unrecognized integration
/// name is logged and the device is left unbound, which the scheduler
/// treats as non-commandable rather than fatal.
async fn bind_control_integrations(core: &Core, config: &AppConfig) -> Result<()> {
    for device in &config.devices {
        let Some(binding) = &device.control_integration else {
            #[cfg(feature = "sim")]
            core.bind_control_integration(&device.name, "sim", Arc::new(SimulatedActuator))
                .await;
            #[cfg(not(feature = "sim"))]
            tracing::warn!(device = %device.name, "no control_integration configured, device will be unreachable");
            continue;
        };

        let actuator: Arc<dyn ControlIntegration> = match binding.name.as_str() {
            "http_post" => {
                let commands = serde_json::from_value(binding.settings.clone())
                    .with_context(|| format!("invalid http_post settings for device {}", device.name))?;
                let mut entities = HashMap::new();
                entities.insert(device.name.clone(), commands);
                Arc::new(HttpPostActuator::new("", entities))
            }
            other => {
                tracing::warn!(device = %device.name, integration = other, "unknown control_integration, device left unbound");
                continue;
            }
        };

        core.bind_control_integration(&device.name, binding.name.clone(), actuator)
            .await;
    }
    Ok(())
}

/// Spawns whichever ingestion poller `surplus:` names, feeding readings for
/// both the surplus signal and any device whose `consumption_integration`
/// names the same poller.
fn spawn_ingestion(core: &Core, config: &AppConfig) -> Result<()> {
    let Some(surplus_source) = &config.surplus else {
        warn!("no surplus ingestion integration configured; surplus will remain 0 until set via the API");
        return Ok(());
    };

    let sink: Arc<dyn SurplusSink> = Arc::new(core.clone());

    match surplus_source.name.as_str() {
        "http_get" => {
            let mut targets = vec![integrations::HttpGetTarget {
                device: None,
                url: surplus_source
                    .settings
                    .get("url")
                    .and_then(|v| v.as_str())
                    .context("http_get surplus source requires a `url`")?
                    .to_string(),
            }];
            for device in &config.devices {
                if let Some(ci) = &device.consumption_integration {
                    if ci.name == "http_get" {
                        if let Some(url) = ci.settings.get("url").and_then(|v| v.as_str()) {
                            targets.push(integrations::HttpGetTarget {
                                device: Some(device.name.clone()),
                                url: url.to_string(),
                            });
                        }
                    }
                }
            }
            let interval_secs = config
                .integrations
                .get("http_get")
                .and_then(|v| v.get("timeout"))
                .and_then(|v| v.as_u64())
                .unwrap_or(1);
            tokio::spawn(integrations::run_http_get(
                sink,
                targets,
                Duration::from_secs(interval_secs),
            ));
        }
        #[cfg(feature = "mqtt")]
        "mqtt_sub" => {
            let settings = config
                .integrations
                .get("mqtt_sub")
                .context("mqtt_sub selected as surplus source but not configured under `integrations`")?;
            let mut mqtt_config: integrations::MqttSubConfig =
                serde_json::from_value(settings.clone())
                    .context("invalid mqtt_sub integration settings")?;
            let surplus_topic = surplus_source
                .settings
                .get("topic")
                .and_then(|v| v.as_str())
                .context("mqtt_sub surplus source requires a `topic`")?
                .to_string();
            mqtt_config.targets.push(integrations::MqttTarget {
                device: None,
                topic: surplus_topic,
            });
            for device in &config.devices {
                if let Some(ci) = &device.consumption_integration {
                    if ci.name == "mqtt_sub" {
                        if let Some(topic) = ci.settings.get("topic").and_then(|v| v.as_str()) {
                            mqtt_config
                                .targets
                                .push(integrations::MqttTarget { device: Some(device.name.clone()), topic: topic.to_string() });
                        }
                    }
                }
            }
            tokio::spawn(integrations::run_mqtt_sub(sink, mqtt_config));
        }
        other => {
            anyhow::bail!("unknown surplus ingestion integration: {other}");
        }
    }

    Ok(())
}
