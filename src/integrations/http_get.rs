use std::time::Duration;
use std::sync::Arc;

use serde::Deserialize;

use super::ingest::SurplusSink;

/// A single polled endpoint: either the surplus reading itself, or a named
/// device's consumption.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpGetTarget {
    /// `None` routes the parsed value to `set_surplus`; `Some(device)` routes
    /// it to `set_device_consumption(device, _)`.
    #[serde(default)]
    pub device: Option<String>,
    pub url: String,
}

/// Polls every configured target on a fixed interval and pushes the parsed
/// `f64` body into `sink`: one shared `reqwest::Client`, sequential GETs,
/// a logged skip (not a fatal error) when a body fails to parse.
pub async fn run_http_get(
    sink: Arc<dyn SurplusSink>,
    targets: Vec<HttpGetTarget>,
    interval: Duration,
) {
    let client = reqwest::Client::new();
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        for target in &targets {
            match fetch_f64(&client, &target.url).await {
                Ok(value) => match &target.device {
                    Some(device) => sink.set_device_consumption(device, value).await,
                    None => sink.set_surplus(value).await,
                },
                Err(err) => {
                    tracing::warn!(url = %target.url, error = %err, "http_get: skipping unparsable reading");
                }
            }
        }
    }
}

async fn fetch_f64(client: &reqwest::Client, url: &str) -> anyhow::Result<f64> {
    let body = client.get(url).send().await?.text().await?;
    Ok(body.trim().parse::<f64>()?)
}
