use std::collections::HashSet;
use std::env;
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use device_adapters::ComponentKind;
use modbus_client::ClientConfig;
use poller_actor::ActorConfig;

const DEFAULT_RESPAWN_DELAY_MS: u64 = 5_000;
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_GAP_S: u64 = 3_600;

#[derive(Clone, Debug)]
pub struct CollectorConfig {
    pub modbus: ClientConfig,
    pub poller: ActorConfig,
    pub http_timeout_ms: u64,
    pub respawn_delay_ms: u64,
    /// SQLite database for simulated counters. Counters live in memory when unset.
    pub counters_path: Option<String>,
    pub max_gap_s: u64,
    /// Prometheus listen address, e.g. `0.0.0.0:9100`. No exporter when unset.
    pub metrics_listen: Option<String>,
    pub devices: Vec<DeviceConfig>,
}

/// Device families that can be configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFamily {
    SmaSunnyBoy,
    SmaSunnyIsland,
    SolarLog,
    KostalPikoOld,
}

impl DeviceFamily {
    pub fn uses_modbus(self) -> bool {
        matches!(self, DeviceFamily::SmaSunnyBoy | DeviceFamily::SmaSunnyIsland)
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceFamily::SmaSunnyBoy => "sma_sunny_boy",
            DeviceFamily::SmaSunnyIsland => "sma_sunny_island",
            DeviceFamily::SolarLog => "solar_log",
            DeviceFamily::KostalPikoOld => "kostal_piko_old",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct DeviceConfig {
    pub id: u32,
    pub vendor: DeviceFamily,
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ComponentConfig {
    pub id: u32,
    pub name: Option<String>,
    pub kind: ComponentKind,
    pub modbus_id: Option<u8>,
    /// Register layout of families with several generations, e.g. `core2`.
    pub version: Option<String>,
}

impl CollectorConfig {
    pub fn load() -> Result<Self> {
        Self::load_with_path(None)
    }

    pub fn load_with_path(config_path: Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(file_config) = load_file_config(config_path.as_deref())? {
            apply_file_config(&mut config, file_config);
        }

        apply_env_overrides(&mut config);
        Ok(config)
    }

    pub fn max_gap(&self) -> Duration {
        Duration::from_secs(self.max_gap_s)
    }

    pub fn metrics_addr(&self) -> Result<Option<SocketAddr>> {
        self.metrics_listen
            .as_deref()
            .map(|listen| {
                listen
                    .parse::<SocketAddr>()
                    .with_context(|| format!("metrics.listen '{listen}' is not a socket address"))
            })
            .transpose()
    }

    pub fn validate(&self) -> Result<()> {
        if self.poller.poll_interval.as_millis() == 0 {
            anyhow::bail!("poller.poll_interval_ms must be >= 1");
        }
        if self.poller.request_timeout.as_millis() == 0 {
            anyhow::bail!("poller.request_timeout_ms must be >= 1");
        }
        if self.modbus.port == 0 {
            anyhow::bail!("modbus.port must be between 1 and 65535");
        }
        if let Some(max_batch) = self.modbus.max_batch_size {
            if max_batch == 0 {
                anyhow::bail!("modbus.max_batch_size must be >= 1");
            }
        }
        if self.modbus.timeout_ms == 0 {
            anyhow::bail!("modbus.timeout_ms must be >= 1");
        }
        if self.modbus.retry_backoff_ms == 0 {
            anyhow::bail!("modbus.retry_backoff_ms must be >= 1");
        }
        if self.modbus.retry_max_backoff_ms == 0 {
            anyhow::bail!("modbus.retry_max_backoff_ms must be >= 1");
        }
        if let Some(delay) = self.modbus.inter_read_delay_ms {
            if delay == 0 {
                anyhow::bail!("modbus.inter_read_delay_ms must be >= 1 when set");
            }
        }
        if self.http_timeout_ms == 0 {
            anyhow::bail!("http.timeout_ms must be >= 1");
        }
        if self.respawn_delay_ms == 0 {
            anyhow::bail!("respawn_delay_ms must be >= 1");
        }
        if self.max_gap_s == 0 {
            anyhow::bail!("counters.max_gap_s must be >= 1");
        }
        if let Some(ref path) = self.counters_path {
            if path.trim().is_empty() {
                anyhow::bail!("counters.path must be non-empty when set");
            }
        }
        self.metrics_addr()?;
        self.validate_devices()?;
        crate::wiring::plan_devices(self)?;

        Ok(())
    }

    fn validate_devices(&self) -> Result<()> {
        let mut device_ids = HashSet::new();
        for device in &self.devices {
            if !device_ids.insert(device.id) {
                anyhow::bail!("devices: id {} is used more than once", device.id);
            }
            if device.host.trim().is_empty() {
                anyhow::bail!("device {}: host must be non-empty", device.id);
            }
            if device.port == Some(0) {
                anyhow::bail!("device {}: port must be between 1 and 65535", device.id);
            }
            if device.components.is_empty() {
                anyhow::bail!("device {}: at least one component is required", device.id);
            }
            let mut component_ids = HashSet::new();
            for component in &device.components {
                if !component_ids.insert(component.id) {
                    anyhow::bail!(
                        "device {}: component id {} is used more than once",
                        device.id,
                        component.id
                    );
                }
            }
        }
        Ok(())
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            modbus: ClientConfig::default(),
            poller: ActorConfig::default(),
            http_timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
            respawn_delay_ms: DEFAULT_RESPAWN_DELAY_MS,
            counters_path: None,
            max_gap_s: DEFAULT_MAX_GAP_S,
            metrics_listen: None,
            devices: Vec::new(),
        }
    }
}

fn apply_env_overrides(config: &mut CollectorConfig) {
    if let Some(interval_ms) = parse_env_u64("COLLECTOR_POLL_INTERVAL_MS") {
        config.poller.poll_interval = Duration::from_millis(interval_ms);
    }

    if let Some(timeout_ms) = parse_env_u64("COLLECTOR_REQUEST_TIMEOUT_MS") {
        config.poller.request_timeout = Duration::from_millis(timeout_ms);
    }

    if let Some(jitter_ms) = parse_env_u64("COLLECTOR_JITTER_MS") {
        config.poller.jitter_ms = jitter_ms;
    }

    if let Some(cycles) = parse_env_u32("COLLECTOR_MAX_FAILED_CYCLES") {
        config.poller.max_failed_cycles = cycles;
    }

    if let Some(port) = parse_env_u16("COLLECTOR_MODBUS_PORT") {
        config.modbus.port = port;
    }

    if let Some(max_batch) = parse_env_u16("COLLECTOR_MAX_BATCH_SIZE") {
        config.modbus.max_batch_size = Some(max_batch);
    }

    if let Some(timeout_ms) = parse_env_u64("COLLECTOR_MODBUS_TIMEOUT_MS") {
        config.modbus.timeout_ms = timeout_ms;
    }

    if let Ok(value) = env::var("COLLECTOR_COUNTERS_PATH") {
        config.counters_path = Some(value);
    }

    if let Ok(value) = env::var("COLLECTOR_METRICS_LISTEN") {
        config.metrics_listen = Some(value);
    }

    config.max_gap_s = parse_env_u64("COLLECTOR_MAX_GAP_S").unwrap_or(config.max_gap_s);
    config.http_timeout_ms =
        parse_env_u64("COLLECTOR_HTTP_TIMEOUT_MS").unwrap_or(config.http_timeout_ms);
    config.respawn_delay_ms =
        parse_env_u64("COLLECTOR_RESPAWN_DELAY_MS").unwrap_or(config.respawn_delay_ms);
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    poller: Option<FilePollerConfig>,
    modbus: Option<FileModbusConfig>,
    http: Option<FileHttpConfig>,
    counters: Option<FileCountersConfig>,
    metrics: Option<FileMetricsConfig>,
    respawn_delay_ms: Option<u64>,
    devices: Option<Vec<DeviceConfig>>,
}

#[derive(Debug, Deserialize)]
struct FilePollerConfig {
    poll_interval_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    jitter_ms: Option<u64>,
    max_failed_cycles: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct FileModbusConfig {
    port: Option<u16>,
    max_batch_size: Option<u16>,
    timeout_ms: Option<u64>,
    retry_count: Option<usize>,
    retry_backoff_ms: Option<u64>,
    retry_max_backoff_ms: Option<u64>,
    inter_read_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileHttpConfig {
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileCountersConfig {
    path: Option<String>,
    max_gap_s: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileMetricsConfig {
    listen: Option<String>,
}

fn load_file_config(config_path: Option<&str>) -> Result<Option<FileConfig>> {
    let path = match config_path {
        Some(path) => path.to_string(),
        None => match env::var("COLLECTOR_CONFIG") {
            Ok(value) => value,
            Err(_) => return Ok(None),
        },
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("read config file {path}"))?;
    let ext = Path::new(&path).extension().and_then(|value| value.to_str());

    let config = match ext {
        Some("json") => serde_json::from_str(&content).context("parse json config")?,
        _ => toml::from_str(&content).context("parse toml config")?,
    };

    Ok(Some(config))
}

fn apply_file_config(config: &mut CollectorConfig, file: FileConfig) {
    if let Some(poller) = file.poller {
        if let Some(interval_ms) = poller.poll_interval_ms {
            config.poller.poll_interval = Duration::from_millis(interval_ms);
        }
        if let Some(timeout_ms) = poller.request_timeout_ms {
            config.poller.request_timeout = Duration::from_millis(timeout_ms);
        }
        if let Some(jitter_ms) = poller.jitter_ms {
            config.poller.jitter_ms = jitter_ms;
        }
        if let Some(cycles) = poller.max_failed_cycles {
            config.poller.max_failed_cycles = cycles;
        }
    }

    if let Some(modbus) = file.modbus {
        if let Some(port) = modbus.port {
            config.modbus.port = port;
        }
        if let Some(max_batch) = modbus.max_batch_size {
            config.modbus.max_batch_size = Some(max_batch);
        }
        if let Some(timeout_ms) = modbus.timeout_ms {
            config.modbus.timeout_ms = timeout_ms;
        }
        if let Some(retry_count) = modbus.retry_count {
            config.modbus.retry_count = retry_count;
        }
        if let Some(backoff) = modbus.retry_backoff_ms {
            config.modbus.retry_backoff_ms = backoff;
        }
        if let Some(max_backoff) = modbus.retry_max_backoff_ms {
            config.modbus.retry_max_backoff_ms = max_backoff;
        }
        if let Some(delay) = modbus.inter_read_delay_ms {
            config.modbus.inter_read_delay_ms = Some(delay);
        }
    }

    if let Some(timeout_ms) = file.http.and_then(|http| http.timeout_ms) {
        config.http_timeout_ms = timeout_ms;
    }

    if let Some(counters) = file.counters {
        if let Some(path) = counters.path {
            config.counters_path = Some(path);
        }
        if let Some(max_gap_s) = counters.max_gap_s {
            config.max_gap_s = max_gap_s;
        }
    }

    if let Some(listen) = file.metrics.and_then(|metrics| metrics.listen) {
        config.metrics_listen = Some(listen);
    }

    if let Some(delay) = file.respawn_delay_ms {
        config.respawn_delay_ms = delay;
    }

    if let Some(devices) = file.devices {
        config.devices = devices;
    }
}

fn parse_env_u16(key: &str) -> Option<u16> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_u32(key: &str) -> Option<u32> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}
