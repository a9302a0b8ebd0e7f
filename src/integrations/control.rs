use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

/// Actuator port a device binds to in order to execute scheduler commands.
/// One async method per command, `Send + Sync` so it can live behind an
/// `Arc` and be called from the scheduler task.
#[async_trait]
pub trait ControlIntegration: Send + Sync {
    async fn turn_on(&self, device: &str) -> anyhow::Result<()>;
    async fn turn_off(&self, device: &str) -> anyhow::Result<()>;
    async fn regulate(&self, device: &str, power: f64) -> anyhow::Result<()>;
}

/// Always-succeeds actuator that just logs. Used as the `sim`-feature
/// default so the binary runs out of the box without any external
/// collaborator configured, and in integration tests that don't care about
/// failure paths.
#[derive(Debug, Default)]
pub struct SimulatedActuator;

#[async_trait]
impl ControlIntegration for SimulatedActuator {
    async fn turn_on(&self, device: &str) -> anyhow::Result<()> {
        tracing::info!(device, "simulated turn_on");
        Ok(())
    }

    async fn turn_off(&self, device: &str) -> anyhow::Result<()> {
        tracing::info!(device, "simulated turn_off");
        Ok(())
    }

    async fn regulate(&self, device: &str, power: f64) -> anyhow::Result<()> {
        tracing::info!(device, power, "simulated regulate");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum MockCall {
    TurnOn,
    TurnOff,
    Regulate(f64),
}

/// Canned-response actuator for unit tests: each call pops the next queued
/// `Result` (defaulting to success once the queue is empty), and every call
/// is recorded so tests can assert on ordering.
#[derive(Default)]
pub struct MockActuator {
    responses: Mutex<VecDeque<anyhow::Result<()>>>,
    calls: Mutex<Vec<(String, MockCall)>>,
}

impl MockActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next call (in call order, regardless of which
    /// method it is).
    pub fn push_failure(&self, err: anyhow::Error) {
        self.responses.lock().unwrap().push_back(Err(err));
    }

    pub fn calls(&self) -> Vec<(String, MockCall)> {
        self.calls.lock().unwrap().clone()
    }

    fn next_result(&self) -> anyhow::Result<()> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

#[async_trait]
impl ControlIntegration for MockActuator {
    async fn turn_on(&self, device: &str) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((device.to_string(), MockCall::TurnOn));
        self.next_result()
    }

    async fn turn_off(&self, device: &str) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((device.to_string(), MockCall::TurnOff));
        self.next_result()
    }

    async fn regulate(&self, device: &str, power: f64) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((device.to_string(), MockCall::Regulate(power)));
        self.next_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simulated_actuator_always_succeeds() {
        let a = SimulatedActuator;
        assert!(a.turn_on("heater").await.is_ok());
        assert!(a.regulate("heater", 100.0).await.is_ok());
    }

    #[tokio::test]
    async fn mock_actuator_replays_queued_failure_then_succeeds() {
        let m = MockActuator::new();
        m.push_failure(anyhow::anyhow!("boom"));
        assert!(m.turn_on("pump").await.is_err());
        assert!(m.turn_on("pump").await.is_ok());
        assert_eq!(m.calls().len(), 2);
    }
}
