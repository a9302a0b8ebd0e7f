mod device;
mod error;
mod registry;

pub use device::{BoundIntegration, ConsumptionIntegrationRef, Device, DeviceSnapshot, DeviceType};
pub use error::CoreError;
pub use registry::Registry;
