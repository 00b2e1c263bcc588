use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use collector_app::{
    initialize_components, isolate_panics, plan_devices, Collaborators, CollectorConfig,
    DevicePlan, StateBoard, TracingFaultSink,
};
use poller_actor::{ActorConfig, PollerActor};
use simcount::{CounterBacking, MemoryCounterStore, SimCountConfig, SqliteCounterStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = parse_config_arg();
    let config = CollectorConfig::load_with_path(config_path).context("load config failed")?;
    config.validate().context("config validation failed")?;
    let plans = plan_devices(&config).context("device configuration failed")?;
    if plans.is_empty() {
        warn!("no devices configured");
    }

    if let Some(addr) = config.metrics_addr()? {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("metrics exporter init failed")?;
        info!(%addr, "prometheus exporter listening");
    }

    let counters: Arc<dyn CounterBacking> = match config.counters_path.as_deref() {
        Some(path) => Arc::new(
            SqliteCounterStore::new(path)
                .await
                .context("counter store init failed")?,
        ),
        None => {
            warn!("counters.path not set; simulated counters restart from zero");
            Arc::new(MemoryCounterStore::new())
        }
    };
    let collaborators = Collaborators {
        faults: Arc::new(TracingFaultSink),
        counters,
        sim_count: SimCountConfig {
            max_gap: config.max_gap(),
        },
        board: StateBoard::new(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let specs: HashMap<u32, DeviceSpec> = plans
        .into_iter()
        .map(|plan| {
            let spec = DeviceSpec {
                plan,
                collaborators: collaborators.clone(),
                poller_config: config.poller.clone(),
                shutdown: shutdown_rx.clone(),
            };
            (spec.plan.identity.device_id, spec)
        })
        .collect();

    let mut join_set = JoinSet::new();
    for spec in specs.values() {
        spawn_device(spec.clone(), &mut join_set, Duration::from_millis(0));
    }

    notify_ready();
    let watchdog_handle = start_watchdog(shutdown_rx.clone());

    let mut shutdown_signal = std::pin::pin!(tokio::signal::ctrl_c());
    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("shutdown signal received");
                let _ = shutdown_tx.send(true);
                break;
            }
            maybe_result = join_set.join_next() => {
                if let Some(result) = maybe_result {
                    match result {
                        Ok((id, outcome)) => {
                            if let Err(err) = outcome {
                                let detail = format!("{err:#}");
                                warn!(device = id, error = %detail, "device task exited with error");
                            } else {
                                info!(device = id, "device task exited cleanly");
                            }
                            if let Some(spec) = specs.get(&id) {
                                spawn_device(
                                    spec.clone(),
                                    &mut join_set,
                                    Duration::from_millis(config.respawn_delay_ms),
                                );
                            }
                        }
                        Err(err) => {
                            // Panics come back as Ok((id, Err)); only cancellation lands here.
                            warn!(error = %err, "device task aborted; not respawned");
                        }
                    }
                } else {
                    break;
                }
            }
        }
    }

    let drain = async {
        while let Some(result) = join_set.join_next().await {
            if let Err(err) = result {
                warn!(error = %err, "device task join failed");
            }
        }
    };
    if tokio::time::timeout(Duration::from_secs(5), drain).await.is_err() {
        warn!("device tasks did not stop in time");
    }

    if let Some(handle) = watchdog_handle {
        let _ = handle.await;
    }
    Ok(())
}

#[derive(Clone)]
struct DeviceSpec {
    plan: DevicePlan,
    collaborators: Collaborators,
    poller_config: ActorConfig,
    shutdown: watch::Receiver<bool>,
}

/// Connects, initializes the device's components and polls until shutdown or failure.
fn spawn_device(
    spec: DeviceSpec,
    join_set: &mut JoinSet<(u32, Result<()>)>,
    delay: Duration,
) {
    let device_id = spec.plan.identity.device_id;
    join_set.spawn(async move {
        let mut shutdown = spec.shutdown.clone();
        if delay > Duration::from_millis(0) {
            tokio::select! {
                _ = sleep(delay) => {},
                _ = shutdown.changed() => {},
            }
        }
        if *shutdown.borrow() {
            return (device_id, Ok(()));
        }
        (device_id, isolate_panics(run_device(spec)).await)
    });
}

async fn run_device(spec: DeviceSpec) -> Result<()> {
    let transport = spec.plan.transport.connect().await?;
    let components = initialize_components(&spec.plan, &transport, &spec.collaborators).await?;
    info!(
        device = spec.plan.identity.device_id,
        host = %spec.plan.identity.host,
        components = components.len(),
        "device ready"
    );
    PollerActor::new(
        spec.plan.identity.clone(),
        components,
        spec.shutdown,
        spec.poller_config,
    )
    .run()
    .await?;
    Ok(())
}

fn parse_config_arg() -> Option<String> {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

#[cfg(target_os = "linux")]
fn notify_ready() {
    if let Err(err) = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]) {
        warn!(error = %err, "systemd ready notify failed");
    }
}

#[cfg(not(target_os = "linux"))]
fn notify_ready() {}

#[cfg(target_os = "linux")]
fn start_watchdog(
    mut shutdown: watch::Receiver<bool>,
) -> Option<tokio::task::JoinHandle<()>> {
    let interval = watchdog_interval()?;
    Some(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sleep(interval) => {
                    if let Err(err) = sd_notify::notify(false, &[sd_notify::NotifyState::Watchdog]) {
                        warn!(error = %err, "systemd watchdog notify failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }))
}

#[cfg(not(target_os = "linux"))]
fn start_watchdog(_shutdown: watch::Receiver<bool>) -> Option<tokio::task::JoinHandle<()>> {
    None
}

#[cfg(target_os = "linux")]
fn watchdog_interval() -> Option<Duration> {
    let watchdog_usec = env::var("WATCHDOG_USEC").ok()?.parse::<u64>().ok()?;
    if let Some(pid) = env::var("WATCHDOG_PID")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
    {
        if pid != std::process::id() {
            return None;
        }
    }

    let interval = watchdog_usec.saturating_div(2).max(100_000);
    Some(Duration::from_micros(interval))
}
