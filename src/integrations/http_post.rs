use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;

use super::control::ControlIntegration;

/// One configured HTTP call (`control_integration.turn_on`/`turn_off`/
/// `regulate` in a device's YAML entry). `body` may contain the literal
/// token `{power}`, substituted with the commanded wattage before a
/// `regulate` call.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandSpec {
    pub path: String,
    #[serde(default = "default_method", with = "method_serde")]
    pub method: Method,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

fn default_method() -> Method {
    Method::POST
}

mod method_serde {
    use reqwest::Method;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Method, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Method::from_bytes(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// Per-device command bindings. A device may configure any subset; the
/// commands it omits are skipped with a warning by the actuator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceCommands {
    pub turn_on: Option<CommandSpec>,
    pub turn_off: Option<CommandSpec>,
    pub regulate: Option<CommandSpec>,
}

/// Actuator that issues an HTTP request per command against a configured
/// `base_url`. All three commands are implemented uniformly, including
/// `regulate`.
pub struct HttpPostActuator {
    client: reqwest::Client,
    base_url: String,
    entities: HashMap<String, DeviceCommands>,
}

impl HttpPostActuator {
    pub fn new(base_url: impl Into<String>, entities: HashMap<String, DeviceCommands>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("reqwest client build");
        Self {
            client,
            base_url: base_url.into(),
            entities,
        }
    }

    async fn call(&self, spec: &CommandSpec, body: Option<String>) -> anyhow::Result<()> {
        let url = format!("{}{}", self.base_url, spec.path);
        let mut req = self.client.request(spec.method.clone(), &url);
        for (k, v) in &spec.headers {
            req = req.header(k, v);
        }
        if let Some(body) = body.or_else(|| spec.body.clone()) {
            req = req.body(body);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("http_post actuator call to {url} returned {status}");
        }
        tracing::debug!(url, %status, "http_post actuator call succeeded");
        Ok(())
    }
}

#[async_trait]
impl ControlIntegration for HttpPostActuator {
    async fn turn_on(&self, device: &str) -> anyhow::Result<()> {
        let Some(spec) = self.entities.get(device).and_then(|c| c.turn_on.as_ref()) else {
            tracing::warn!(device, "http_post: no turn_on entity configured, skipping");
            return Ok(());
        };
        self.call(spec, None).await
    }

    async fn turn_off(&self, device: &str) -> anyhow::Result<()> {
        let Some(spec) = self.entities.get(device).and_then(|c| c.turn_off.as_ref()) else {
            tracing::warn!(device, "http_post: no turn_off entity configured, skipping");
            return Ok(());
        };
        self.call(spec, None).await
    }

    async fn regulate(&self, device: &str, power: f64) -> anyhow::Result<()> {
        let Some(spec) = self.entities.get(device).and_then(|c| c.regulate.as_ref()) else {
            tracing::warn!(device, "http_post: no regulate entity configured, skipping");
            return Ok(());
        };
        let body = spec.body.as_ref().map(|b| b.replace("{power}", &power.to_string()));
        self.call(spec, body).await
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_string, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn default_method_is_post() {
        assert_eq!(default_method(), Method::POST);
    }

    fn commands(turn_on: CommandSpec, regulate: CommandSpec) -> HashMap<String, DeviceCommands> {
        let mut entities = HashMap::new();
        entities.insert(
            "heater".to_string(),
            DeviceCommands {
                turn_on: Some(turn_on),
                turn_off: None,
                regulate: Some(regulate),
            },
        );
        entities
    }

    #[tokio::test]
    async fn turn_on_issues_the_configured_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/heater/on"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let entities = commands(
            CommandSpec {
                path: "/heater/on".to_string(),
                method: Method::POST,
                headers: HashMap::new(),
                body: None,
            },
            CommandSpec {
                path: "/heater/level".to_string(),
                method: Method::POST,
                headers: HashMap::new(),
                body: Some("power={power}".to_string()),
            },
        );
        let actuator = HttpPostActuator::new(server.uri(), entities);

        assert!(actuator.turn_on("heater").await.is_ok());
    }

    #[tokio::test]
    async fn regulate_substitutes_power_into_the_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/heater/level"))
            .and(body_string("power=2000"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let entities = commands(
            CommandSpec {
                path: "/heater/on".to_string(),
                method: Method::POST,
                headers: HashMap::new(),
                body: None,
            },
            CommandSpec {
                path: "/heater/level".to_string(),
                method: Method::POST,
                headers: HashMap::new(),
                body: Some("power={power}".to_string()),
            },
        );
        let actuator = HttpPostActuator::new(server.uri(), entities);

        assert!(actuator.regulate("heater", 2000.0).await.is_ok());
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/heater/on"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let entities = commands(
            CommandSpec {
                path: "/heater/on".to_string(),
                method: Method::POST,
                headers: HashMap::new(),
                body: None,
            },
            CommandSpec {
                path: "/heater/level".to_string(),
                method: Method::POST,
                headers: HashMap::new(),
                body: None,
            },
        );
        let actuator = HttpPostActuator::new(server.uri(), entities);

        assert!(actuator.turn_on("heater").await.is_err());
    }
}
