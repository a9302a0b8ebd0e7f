use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::integrations::ControlIntegration;

/// The two device categories the scheduler understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceType {
    Switch,
    Regulated,
}

/// A bound actuator plus the integration name it was registered under, kept
/// together so API snapshots can report which integration controls a device
/// without re-deriving it from the trait object.
#[derive(Clone)]
pub struct BoundIntegration {
    pub name: String,
    pub handle: Arc<dyn ControlIntegration>,
}

/// Metadata describing which ingestion integration feeds a device's
/// `consumption` reading. Ambient/config-only: the scheduler never reads
/// this, it only routes ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumptionIntegrationRef {
    pub name: String,
    #[serde(flatten)]
    pub settings: serde_json::Value,
}

/// The unit of scheduling.
///
/// Cheap to clone: every field is either `Copy`, a `String`, or an `Arc`, so
/// the scheduler can snapshot the whole registry under a short read lock and
/// release it before making any actuator call.
#[derive(Clone)]
pub struct Device {
    pub name: String,
    pub device_type: DeviceType,
    pub expected_consumption: f64,
    pub max_consumption: Option<f64>,
    pub cooldown: Option<u64>,
    pub consumption: f64,
    pub powered: bool,
    pub enabled: bool,
    pub control_integration: Option<BoundIntegration>,
    pub consumption_integration: Option<ConsumptionIntegrationRef>,
}

impl Device {
    pub fn new(
        name: impl Into<String>,
        device_type: DeviceType,
        expected_consumption: f64,
        max_consumption: Option<f64>,
        cooldown: Option<u64>,
    ) -> Self {
        Self {
            name: name.into(),
            device_type,
            expected_consumption,
            max_consumption,
            cooldown,
            consumption: 0.0,
            powered: false,
            enabled: true,
            control_integration: None,
            consumption_integration: None,
        }
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            name: self.name.clone(),
            device_type: self.device_type,
            control_integration: self.control_integration.as_ref().map(|b| b.name.clone()),
            expected_consumption: self.expected_consumption,
            max_consumption: self.max_consumption,
            consumption: self.consumption,
            powered: self.powered,
            cooldown: self.cooldown,
            enabled: self.enabled,
        }
    }
}

/// Read-only projection of a [`Device`] exposed by the management API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub name: String,
    pub device_type: DeviceType,
    pub control_integration: Option<String>,
    pub expected_consumption: f64,
    pub max_consumption: Option<f64>,
    pub consumption: f64,
    pub powered: bool,
    pub cooldown: Option<u64>,
    pub enabled: bool,
}
