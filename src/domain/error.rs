use thiserror::Error;

/// Errors raised at the core scheduling boundary.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("integration initialization failed: {0}")]
    IntegrationInit(String),

    #[error("integration connection failed for device {device}: {source}")]
    IntegrationConnection {
        device: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("device {0} is not a regulated device")]
    InvalidDeviceType(String),
}
