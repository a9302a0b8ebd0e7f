use std::sync::atomic::Ordering;

use tokio::sync::watch;

use crate::domain::{CoreError, DeviceType};

use super::Core;

/// Wraps a failed actuator call in the boundary error type and logs it.
/// The scheduler always skips the device and continues the pass rather than
/// aborting it, but the failure is still surfaced through [`CoreError`]
/// instead of the bare `anyhow::Error` the actuator returned.
fn log_actuator_failure(device: &str, source: anyhow::Error) {
    let err = CoreError::IntegrationConnection {
        device: device.to_string(),
        source,
    };
    tracing::warn!(device, error = %err, "actuator call failed, skipping");
}

/// Long-lived task that drains surplus-triggered generations and runs a
/// pass for each, restarting with the latest generation whenever a new one
/// arrives mid-pass instead of letting the stale pass finish.
pub(super) async fn scheduler_loop(core: Core, mut rx: watch::Receiver<u64>) {
    rx.borrow_and_update();
    loop {
        if rx.changed().await.is_err() {
            return;
        }
        loop {
            let generation = *rx.borrow_and_update();
            tokio::select! {
                _ = run_pass(&core, generation) => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// Runs exactly one scheduler pass for `generation`. Bails out early,
/// leaving state as last committed, the moment a newer surplus reading has
/// superseded this one (the scheduler cancels an in-flight pass rather than
/// racing it).
pub(super) async fn run_pass(core: &Core, generation: u64) {
    if stale(core, generation) {
        return;
    }

    let tunables = *core.tunables.read().await;
    let surplus = *core.surplus.read().await;
    let headroom = surplus - tunables.surplus_margin;

    if headroom > 0.0 {
        run_turn_on(core, generation, headroom, tunables.idle_power).await;
    } else if surplus < -tunables.grid_margin {
        let excess = -surplus - tunables.grid_margin;
        run_turn_off(core, generation, excess, tunables.idle_power).await;
    }
}

fn stale(core: &Core, generation: u64) -> bool {
    core.generation.load(Ordering::SeqCst) != generation
}

async fn run_turn_on(core: &Core, generation: u64, headroom: f64, idle_power: f64) {
    let snapshot = core.registry.read().await.snapshot();
    let mut available = headroom;

    for device in snapshot {
        if stale(core, generation) {
            return;
        }
        if !device.enabled {
            continue;
        }
        let Some(bound) = device.control_integration.clone() else {
            tracing::warn!(device = %device.name, "turn-on pass: no bound actuator, skipping");
            continue;
        };

        match device.device_type {
            DeviceType::Switch => {
                if device.powered || device.expected_consumption >= available {
                    continue;
                }
                match bound.handle.turn_on(&device.name).await {
                    Ok(()) => {
                        available -= device.expected_consumption;
                        core.commit_powered(&device.name, true).await;
                        core.cooldown_start(&device.name, device.cooldown).await;
                    }
                    Err(err) => {
                        log_actuator_failure(&device.name, err);
                    }
                }
            }
            DeviceType::Regulated => {
                if !device.powered {
                    if device.expected_consumption >= available {
                        continue;
                    }
                    if let Err(err) = bound.handle.turn_on(&device.name).await {
                        log_actuator_failure(&device.name, err);
                        continue;
                    }
                    let device_power = clamp_max(device.max_consumption, available);
                    match bound.handle.regulate(&device.name, device_power).await {
                        Ok(()) => {
                            available -= device_power;
                            core.commit_powered(&device.name, true).await;
                            core.cooldown_start(&device.name, device.cooldown).await;
                        }
                        Err(err) => {
                            log_actuator_failure(&device.name, err);
                        }
                    }
                } else if device.consumption > idle_power {
                    let total = device.consumption + available;
                    let device_power = clamp_max(device.max_consumption, total);
                    match bound.handle.regulate(&device.name, device_power).await {
                        Ok(()) => {
                            available -= device_power - device.consumption;
                        }
                        Err(err) => {
                            log_actuator_failure(&device.name, err);
                        }
                    }
                }
            }
        }
    }
}

async fn run_turn_off(core: &Core, generation: u64, excess: f64, idle_power: f64) {
    let snapshot = core.registry.read().await.snapshot();
    let mut exceeded = excess;

    for device in snapshot.into_iter().rev() {
        if exceeded <= 0.0 {
            return;
        }
        if stale(core, generation) {
            return;
        }
        if !device.enabled || !device.powered || device.consumption <= idle_power {
            continue;
        }
        let Some(bound) = device.control_integration.clone() else {
            tracing::warn!(device = %device.name, "turn-off pass: no bound actuator, skipping");
            continue;
        };

        match device.device_type {
            DeviceType::Switch => match bound.handle.turn_off(&device.name).await {
                Ok(()) => {
                    exceeded -= device.expected_consumption;
                    core.commit_powered(&device.name, false).await;
                    core.cooldown_start(&device.name, device.cooldown).await;
                }
                Err(err) => {
                    log_actuator_failure(&device.name, err);
                }
            },
            DeviceType::Regulated => {
                let floor = device.consumption - device.expected_consumption;
                if exceeded > floor {
                    match bound.handle.turn_off(&device.name).await {
                        Ok(()) => {
                            exceeded -= device.expected_consumption;
                            core.commit_powered(&device.name, false).await;
                            core.cooldown_start(&device.name, device.cooldown).await;
                        }
                        Err(err) => {
                            log_actuator_failure(&device.name, err);
                        }
                    }
                } else {
                    match bound.handle.regulate(&device.name, device.consumption - exceeded).await {
                        Ok(()) => return,
                        Err(err) => {
                            log_actuator_failure(&device.name, err);
                        }
                    }
                }
            }
        }
    }
}

fn clamp_max(max_consumption: Option<f64>, budget: f64) -> f64 {
    match max_consumption {
        Some(max) => max.min(budget),
        None => budget,
    }
}
