mod cooldown;
mod scheduler;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::domain::{BoundIntegration, Device, DeviceSnapshot, Registry};
use crate::integrations::{ControlIntegration, SurplusSink};

pub use cooldown::CooldownManager;

/// Mutable scheduling parameters. `Copy` so readers
/// can take a cheap snapshot under a read lock and drop it immediately.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Tunables {
    pub surplus_margin: f64,
    pub grid_margin: f64,
    pub idle_power: f64,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            surplus_margin: 100.0,
            grid_margin: 100.0,
            idle_power: 100.0,
        }
    }
}

impl From<&AppConfig> for Tunables {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            surplus_margin: cfg.surplus_margin,
            grid_margin: cfg.grid_margin,
            idle_power: cfg.idle_power,
        }
    }
}

/// Serializes config writes to a single pending write at a time; bursts of
/// attribute setters coalesce to the latest value before the backing file is
/// touched.
#[derive(Clone)]
pub struct ConfigMutator {
    live: Arc<RwLock<AppConfig>>,
    notify: watch::Sender<()>,
}

impl ConfigMutator {
    pub fn new(initial: AppConfig) -> (Self, watch::Receiver<()>) {
        let (notify, rx) = watch::channel(());
        (
            Self {
                live: Arc::new(RwLock::new(initial)),
                notify,
            },
            rx,
        )
    }

    pub async fn mutate<F: FnOnce(&mut AppConfig)>(&self, f: F) {
        {
            let mut guard = self.live.write().await;
            f(&mut guard);
        }
        let _ = self.notify.send(());
    }

    pub async fn snapshot(&self) -> AppConfig {
        self.live.read().await.clone()
    }
}

/// The scheduling core. Cheap to clone: every field is an `Arc`, so the
/// same handle can be shared with the API router, the ingestion pollers, and
/// the background scheduler task.
#[derive(Clone)]
pub struct Core {
    registry: Arc<RwLock<Registry>>,
    tunables: Arc<RwLock<Tunables>>,
    surplus: Arc<RwLock<f64>>,
    generation: Arc<AtomicU64>,
    pass_tx: watch::Sender<u64>,
    cooldown: Arc<CooldownManager>,
    config: ConfigMutator,
}

impl Core {
    /// Builds the core from a loaded config, populating the registry in
    /// declaration order, and spawns the background scheduler task that
    /// consumes surplus updates. Returns the core, a config-persistence
    /// receiver for the caller to drive, and the scheduler task handle.
    pub fn bootstrap(initial_config: AppConfig) -> (Self, watch::Receiver<()>, JoinHandle<()>) {
        let mut registry = Registry::new();
        for device_cfg in &initial_config.devices {
            registry.register(device_cfg.to_device());
        }

        let tunables = Tunables::from(&initial_config);
        let (config, persist_rx) = ConfigMutator::new(initial_config);
        let (pass_tx, pass_rx) = watch::channel(0u64);

        let core = Self {
            registry: Arc::new(RwLock::new(registry)),
            tunables: Arc::new(RwLock::new(tunables)),
            surplus: Arc::new(RwLock::new(0.0)),
            generation: Arc::new(AtomicU64::new(0)),
            pass_tx,
            cooldown: Arc::new(CooldownManager::new()),
            config,
        };

        let scheduler_handle = tokio::spawn(scheduler::scheduler_loop(core.clone(), pass_rx));
        (core, persist_rx, scheduler_handle)
    }

    pub fn config_mutator(&self) -> ConfigMutator {
        self.config.clone()
    }

    pub async fn shutdown(&self) {
        self.cooldown.cancel_all().await;
    }

    pub async fn bind_control_integration(
        &self,
        device: &str,
        name: impl Into<String>,
        handle: Arc<dyn ControlIntegration>,
    ) -> bool {
        let mut reg = self.registry.write().await;
        match reg.get_mut(device) {
            Some(d) => {
                d.control_integration = Some(BoundIntegration {
                    name: name.into(),
                    handle,
                });
                true
            }
            None => false,
        }
    }

    pub async fn tunables(&self) -> Tunables {
        *self.tunables.read().await
    }

    pub async fn surplus(&self) -> f64 {
        *self.surplus.read().await
    }

    pub async fn device(&self, name: &str) -> Option<DeviceSnapshot> {
        self.registry.read().await.get(name).map(Device::snapshot)
    }

    pub async fn devices(&self) -> Vec<DeviceSnapshot> {
        self.registry
            .read()
            .await
            .snapshot()
            .iter()
            .map(Device::snapshot)
            .collect()
    }

    pub async fn set_surplus_margin(&self, value: f64) {
        self.tunables.write().await.surplus_margin = value;
        self.config.mutate(|c| c.surplus_margin = value).await;
    }

    pub async fn set_grid_margin(&self, value: f64) {
        self.tunables.write().await.grid_margin = value;
        self.config.mutate(|c| c.grid_margin = value).await;
    }

    pub async fn set_idle_power(&self, value: f64) {
        self.tunables.write().await.idle_power = value;
        self.config.mutate(|c| c.idle_power = value).await;
    }

    pub async fn set_device_max_consumption(&self, device: &str, value: Option<f64>) -> bool {
        let found = {
            let mut reg = self.registry.write().await;
            match reg.get_mut(device) {
                Some(d) => {
                    d.max_consumption = value;
                    true
                }
                None => false,
            }
        };
        if found {
            let name = device.to_string();
            self.config
                .mutate(move |c| {
                    if let Some(dc) = c.devices.iter_mut().find(|d| d.name == name) {
                        dc.max_consumption = value;
                    }
                })
                .await;
        }
        found
    }

    pub async fn set_device_expected_consumption(&self, device: &str, value: f64) -> bool {
        let found = {
            let mut reg = self.registry.write().await;
            match reg.get_mut(device) {
                Some(d) => {
                    d.expected_consumption = value;
                    true
                }
                None => false,
            }
        };
        if found {
            let name = device.to_string();
            self.config
                .mutate(move |c| {
                    if let Some(dc) = c.devices.iter_mut().find(|d| d.name == name) {
                        dc.expected_consumption = value;
                    }
                })
                .await;
        }
        found
    }

    pub async fn set_device_cooldown(&self, device: &str, value: Option<u64>) -> bool {
        let found = {
            let mut reg = self.registry.write().await;
            match reg.get_mut(device) {
                Some(d) => {
                    d.cooldown = value;
                    true
                }
                None => false,
            }
        };
        if found {
            let name = device.to_string();
            self.config
                .mutate(move |c| {
                    if let Some(dc) = c.devices.iter_mut().find(|d| d.name == name) {
                        dc.cooldown = value;
                    }
                })
                .await;
        }
        found
    }

    pub(crate) async fn commit_powered(&self, device: &str, powered: bool) {
        let mut reg = self.registry.write().await;
        if let Some(d) = reg.get_mut(device) {
            d.powered = powered;
        }
    }

    pub(crate) async fn cooldown_start(&self, device: &str, cooldown: Option<u64>) {
        if let Some(seconds) = cooldown {
            self.cooldown.start(self.clone(), device, seconds).await;
        }
    }
}

#[async_trait]
impl SurplusSink for Core {
    async fn set_surplus(&self, value: f64) {
        *self.surplus.write().await = value;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.pass_tx.send(generation);
        tracing::debug!(surplus = value, generation, "surplus updated");
    }

    async fn set_device_consumption(&self, device: &str, value: f64) {
        let mut reg = self.registry.write().await;
        match reg.get_mut(device) {
            Some(d) => d.consumption = value,
            None => tracing::warn!(device, "set_device_consumption: unknown device, ignoring"),
        }
    }
}
