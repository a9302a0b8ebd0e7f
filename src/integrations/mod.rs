mod control;
mod http_get;
mod http_post;
mod ingest;
#[cfg(feature = "mqtt")]
mod mqtt_sub;

pub use control::{ControlIntegration, MockActuator, MockCall, SimulatedActuator};
pub use http_get::{run_http_get, HttpGetTarget};
pub use http_post::{CommandSpec, DeviceCommands, HttpPostActuator};
pub use ingest::SurplusSink;
#[cfg(feature = "mqtt")]
pub use mqtt_sub::{run_mqtt_sub, MqttSubConfig, MqttTarget};
