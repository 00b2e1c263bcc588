use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use metrics::{counter, histogram};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use device_adapters::Component;
use types::DeviceIdentity;

#[derive(Debug, Clone)]
pub struct ActorConfig {
    pub poll_interval: Duration,
    /// Upper bound for a single component update.
    pub request_timeout: Duration,
    pub jitter_ms: u64,
    /// Cycles in a row without a reachable component before the actor gives up. 0 never gives up.
    pub max_failed_cycles: u32,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            jitter_ms: 0,
            max_failed_cycles: 5,
        }
    }
}

#[derive(Debug, Error)]
pub enum PollerError {
    #[error("device {device_id} has no components to poll")]
    NoComponents { device_id: u32 },
    #[error("device {device_id} unreachable for {cycles} consecutive cycles")]
    Unreachable { device_id: u32, cycles: u32 },
}

/// Outcome counts of one pass over all components of a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub updated: usize,
    pub failed: usize,
    /// Failures caused by transport, counter backing or timeouts.
    pub transient: usize,
}

impl CycleReport {
    pub fn unreachable(&self) -> bool {
        self.updated == 0 && self.failed > 0 && self.transient == self.failed
    }
}

/// Polling task for one device. Components are updated one after another, so updates of
/// the same device never overlap.
pub struct PollerActor {
    identity: DeviceIdentity,
    components: Vec<Component>,
    shutdown: watch::Receiver<bool>,
    config: ActorConfig,
}

impl PollerActor {
    pub fn new(
        identity: DeviceIdentity,
        components: Vec<Component>,
        shutdown: watch::Receiver<bool>,
        config: ActorConfig,
    ) -> Self {
        Self {
            identity,
            components,
            shutdown,
            config,
        }
    }

    pub async fn poll_once(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        let device = self.identity.device_id.to_string();

        for component in &mut self.components {
            let name = component.info().name.clone();
            let outcome = match timeout(self.config.request_timeout, component.update()).await {
                Ok(Ok(())) => {
                    report.updated += 1;
                    debug!(device = %device, component = %name, "component updated");
                    "ok"
                }
                Ok(Err(err)) => {
                    report.failed += 1;
                    if err.is_transient() {
                        report.transient += 1;
                    }
                    warn!(
                        device = %device,
                        host = %self.identity.host,
                        component = %name,
                        kind = err.kind(),
                        error = %err,
                        "component update failed"
                    );
                    err.kind()
                }
                Err(_) => {
                    report.failed += 1;
                    report.transient += 1;
                    warn!(
                        device = %device,
                        component = %name,
                        timeout_ms = self.config.request_timeout.as_millis(),
                        "component update timed out"
                    );
                    "timeout"
                }
            };
            counter!(
                "collector_updates_total",
                "device" => device.clone(),
                "component" => name,
                "outcome" => outcome
            )
            .increment(1);
        }

        report
    }

    pub async fn run(mut self) -> Result<(), PollerError> {
        if self.components.is_empty() {
            return Err(PollerError::NoComponents {
                device_id: self.identity.device_id,
            });
        }

        let mut iteration = 0u64;
        let mut failed_cycles = 0u32;

        loop {
            if *self.shutdown.borrow() {
                info!(device = self.identity.device_id, "poller shutdown requested");
                break;
            }

            let cycle_start = Instant::now();
            let report = self.poll_once().await;
            let elapsed = cycle_start.elapsed();
            histogram!("collector_poll_cycle_seconds").record(elapsed.as_secs_f64());

            if report.unreachable() {
                failed_cycles = failed_cycles.saturating_add(1);
            } else {
                failed_cycles = 0;
            }
            if self.config.max_failed_cycles > 0 && failed_cycles >= self.config.max_failed_cycles {
                return Err(PollerError::Unreachable {
                    device_id: self.identity.device_id,
                    cycles: failed_cycles,
                });
            }

            iteration = iteration.wrapping_add(1);
            let lag = elapsed.saturating_sub(self.config.poll_interval);
            let delay = jittered_delay(self.config.poll_interval, self.config.jitter_ms, iteration);
            info!(
                device = self.identity.device_id,
                host = %self.identity.host,
                elapsed_ms = elapsed.as_millis(),
                lag_ms = lag.as_millis(),
                updated = report.updated,
                failed = report.failed,
                delay_ms = delay.as_millis(),
                "poll cycle complete"
            );

            tokio::select! {
                _ = sleep(delay) => {},
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        info!(device = self.identity.device_id, "poller shutdown requested");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

fn jittered_delay(base: Duration, jitter_ms: u64, iteration: u64) -> Duration {
    if jitter_ms == 0 {
        return base;
    }

    let seed = unix_ms().wrapping_add(iteration.wrapping_mul(1_664_525));
    base + Duration::from_millis(seed % jitter_ms)
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
