use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::Core;

/// Tracks the in-flight cooldown timer for each device so shutdown can abort
/// it without firing the re-`enabled` restore.
///
/// A device is only ever commanded while `enabled`, so at most one timer per
/// device can be pending at a time — no dedup/replace logic is needed here.
#[derive(Default)]
pub struct CooldownManager {
    handles: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl CooldownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disables `device`, then after `seconds` re-enables it. Spawned as a
    /// detached task rather than blocking the calling pass.
    pub async fn start(self: &Arc<Self>, core: Core, device: &str, seconds: u64) {
        {
            let mut reg = core.registry.write().await;
            if let Some(d) = reg.get_mut(device) {
                d.enabled = false;
            }
        }

        let device = device.to_string();
        let mgr = self.clone();
        let core_for_task = core.clone();
        let device_for_task = device.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(seconds)).await;
            let mut reg = core_for_task.registry.write().await;
            if let Some(d) = reg.get_mut(&device_for_task) {
                d.enabled = true;
            }
            mgr.handles.lock().await.remove(&device_for_task);
        });

        self.handles.lock().await.insert(device, handle);
    }

    /// Aborts every pending timer without running its restore. Used at
    /// shutdown only.
    pub async fn cancel_all(&self) {
        for (_, handle) in self.handles.lock().await.drain() {
            handle.abort();
        }
    }
}
