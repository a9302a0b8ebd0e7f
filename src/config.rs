use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::watch;
use validator::Validate;

use crate::domain::{ConsumptionIntegrationRef, Device, DeviceType};

/// Per-device entry in the `devices:` sequence. Order in the YAML file is
/// significant: it is the registry's priority order.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct DeviceConfig {
    #[validate(length(min = 1))]
    pub name: String,

    #[serde(rename = "type")]
    pub device_type: DeviceType,

    pub expected_consumption: f64,

    #[serde(default)]
    pub max_consumption: Option<f64>,

    #[serde(default)]
    pub cooldown: Option<u64>,

    #[serde(default)]
    pub consumption_integration: Option<ConsumptionIntegrationRef>,

    #[serde(default)]
    pub control_integration: Option<ControlIntegrationConfig>,
}

impl DeviceConfig {
    pub fn to_device(&self) -> Device {
        let mut device = Device::new(
            self.name.clone(),
            self.device_type,
            self.expected_consumption,
            self.max_consumption,
            self.cooldown,
        );
        device.consumption_integration = self.consumption_integration.clone();
        device
    }
}

/// `device["control_integration"]` binding: which named integration
/// controls this device, plus whatever per-command settings that
/// integration needs (e.g. `http_post`'s `turn_on`/`turn_off`/`regulate`
/// paths). Kept as a free-form JSON value since the shape is
/// integration-specific.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControlIntegrationConfig {
    pub name: String,
    #[serde(flatten)]
    pub settings: JsonValue,
}

/// `surplus:` selector: which ingestion integration feeds the surplus
/// reading, and its settings (e.g. `http_get: { url: ... }`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SurplusSourceConfig {
    pub name: String,
    #[serde(flatten)]
    pub settings: JsonValue,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_margin() -> f64 {
    100.0
}

fn default_config_file() -> PathBuf {
    PathBuf::from("config.yaml")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

/// Top-level configuration, loaded from YAML plus environment overrides.
/// Carries both the scheduling tunables and the registry's device list, and
/// is re-serialized wholesale on every persisted attribute change
/// (`ConfigMutator`).
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AppConfig {
    #[serde(default = "default_margin")]
    pub grid_margin: f64,

    #[serde(default = "default_margin")]
    pub surplus_margin: f64,

    #[serde(default = "default_margin")]
    pub idle_power: f64,

    #[serde(default)]
    pub integrations: HashMap<String, JsonValue>,

    #[serde(default)]
    pub surplus: Option<SurplusSourceConfig>,

    #[validate(nested)]
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            grid_margin: default_margin(),
            surplus_margin: default_margin(),
            idle_power: default_margin(),
            integrations: HashMap::new(),
            surplus: None,
            devices: Vec::new(),
            host: default_host(),
            port: default_port(),
        }
    }
}

impl AppConfig {
    /// Loads `CONFIG_FILE` (default `config.yaml`) merged with `HOST`/`PORT`
    /// environment overrides, then validates it. Malformed or missing
    /// config is a fatal bootstrap error.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let config_file = std::env::var("CONFIG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_file());
        Self::load_from(&config_file)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let config: AppConfig = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::raw().only(&["HOST", "PORT"]))
            .extract()
            .with_context(|| format!("failed to parse configuration at {}", path.display()))?;

        config
            .validate()
            .context("configuration failed validation")?;

        Ok(config)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .context("failed to parse HOST:PORT into a socket address")
    }
}

/// Writes `config` to `path` as YAML, overwriting it. Meant to be driven by
/// [`spawn_persistence`] from a single background task so writes never
/// interleave.
async fn write_config(path: &Path, config: &AppConfig) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("failed to serialize configuration")?;
    tokio::fs::write(path, yaml)
        .await
        .with_context(|| format!("failed to write configuration to {}", path.display()))?;
    Ok(())
}

/// Drains persistence notifications one at a time and writes the latest
/// config snapshot to `path`, so concurrent attribute setters coalesce into
/// a single pending write rather than racing each other to disk.
pub async fn spawn_persistence(
    path: PathBuf,
    mutator: crate::controller::ConfigMutator,
    mut rx: watch::Receiver<()>,
) {
    rx.borrow_and_update();
    while rx.changed().await.is_ok() {
        let snapshot = mutator.snapshot().await;
        if let Err(err) = write_config(&path, &snapshot).await {
            tracing::error!(error = %err, "failed to persist configuration");
        }
    }
}
