use async_trait::async_trait;

/// Ingestion port the `http_get` and `mqtt_sub` pollers push readings
/// through. `Core` implements this; the pollers only ever see the trait
/// object so they stay decoupled from the scheduler's internals.
#[async_trait]
pub trait SurplusSink: Send + Sync {
    async fn set_surplus(&self, value: f64);
    async fn set_device_consumption(&self, device: &str, value: f64);
}
