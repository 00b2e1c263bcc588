//! Turns configured devices into ready components.

use std::future::Future;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use device_adapters::kostal_piko_old::KostalPikoOldInverterSetup;
use device_adapters::sma::{
    SmaInverterVersion, SmaSunnyBoyBatSetup, SmaSunnyBoyInverterSetup, SmaSunnyIslandBatSetup,
};
use device_adapters::solar_log::SolarLogCounterSetup;
use device_adapters::{Component, ComponentContext, ComponentKind, FaultSink};
use http_client::{HttpClient, HttpConfig, HttpSource};
use modbus_client::{ClientConfig, ModbusClient, RegisterSource};
use simcount::{CounterBacking, SimCountConfig};
use types::DeviceIdentity;

use crate::config::{CollectorConfig, ComponentConfig, DeviceConfig, DeviceFamily};
use crate::sinks::StateBoard;

/// Unit id SMA devices answer on unless configured otherwise.
const DEFAULT_SMA_UNIT_ID: u8 = 3;

#[derive(Debug, Clone)]
pub enum TransportPlan {
    Modbus(ClientConfig),
    Http(HttpConfig),
}

/// A component whose variant has been resolved from configuration.
#[derive(Debug, Clone)]
pub enum ComponentPlan {
    SmaSunnyBoyInverter(SmaSunnyBoyInverterSetup),
    SmaSunnyBoyBat(SmaSunnyBoyBatSetup),
    SmaSunnyIslandBat(SmaSunnyIslandBatSetup),
    SolarLogCounter(SolarLogCounterSetup),
    KostalPikoOldInverter(KostalPikoOldInverterSetup),
}

impl ComponentPlan {
    pub fn id(&self) -> u32 {
        match self {
            ComponentPlan::SmaSunnyBoyInverter(setup) => setup.id,
            ComponentPlan::SmaSunnyBoyBat(setup) => setup.id,
            ComponentPlan::SmaSunnyIslandBat(setup) => setup.id,
            ComponentPlan::SolarLogCounter(setup) => setup.id,
            ComponentPlan::KostalPikoOldInverter(setup) => setup.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ComponentPlan::SmaSunnyBoyInverter(setup) => &setup.name,
            ComponentPlan::SmaSunnyBoyBat(setup) => &setup.name,
            ComponentPlan::SmaSunnyIslandBat(setup) => &setup.name,
            ComponentPlan::SolarLogCounter(setup) => &setup.name,
            ComponentPlan::KostalPikoOldInverter(setup) => &setup.name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DevicePlan {
    pub identity: DeviceIdentity,
    pub transport: TransportPlan,
    pub components: Vec<ComponentPlan>,
}

pub enum Transport {
    Modbus(Arc<dyn RegisterSource>),
    Http(Arc<dyn HttpSource>),
}

impl TransportPlan {
    pub async fn connect(&self) -> Result<Transport> {
        match self {
            TransportPlan::Modbus(config) => {
                let client = ModbusClient::connect(config.clone())
                    .await
                    .with_context(|| format!("modbus connect {}:{}", config.host, config.port))?;
                Ok(Transport::Modbus(Arc::new(client)))
            }
            TransportPlan::Http(config) => {
                let client = HttpClient::new(config.clone())
                    .with_context(|| format!("http client for {}", config.base_url))?;
                Ok(Transport::Http(Arc::new(client)))
            }
        }
    }
}

/// Everything components of all devices share.
#[derive(Clone)]
pub struct Collaborators {
    pub faults: Arc<dyn FaultSink>,
    pub counters: Arc<dyn CounterBacking>,
    pub sim_count: SimCountConfig,
    pub board: Arc<StateBoard>,
}

pub fn plan_devices(config: &CollectorConfig) -> Result<Vec<DevicePlan>> {
    config
        .devices
        .iter()
        .map(|device| plan_device(config, device))
        .collect()
}

fn plan_device(config: &CollectorConfig, device: &DeviceConfig) -> Result<DevicePlan> {
    let transport = if device.vendor.uses_modbus() {
        TransportPlan::Modbus(ClientConfig {
            host: device.host.clone(),
            port: device.port.unwrap_or(config.modbus.port),
            ..config.modbus.clone()
        })
    } else {
        TransportPlan::Http(HttpConfig {
            base_url: base_url(&device.host, device.port),
            username: device.username.clone(),
            password: device.password.clone(),
            timeout_ms: config.http_timeout_ms,
        })
    };

    let components = device
        .components
        .iter()
        .map(|component| {
            plan_component(device.vendor, component)
                .with_context(|| format!("device {} component {}", device.id, component.id))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(DevicePlan {
        identity: DeviceIdentity {
            device_id: device.id,
            host: device.host.clone(),
        },
        transport,
        components,
    })
}

fn plan_component(vendor: DeviceFamily, component: &ComponentConfig) -> Result<ComponentPlan> {
    let id = component.id;
    let name = component
        .name
        .clone()
        .unwrap_or_else(|| format!("{vendor} {}", component.kind));
    let modbus_id = component.modbus_id.unwrap_or(DEFAULT_SMA_UNIT_ID);

    let plan = match (vendor, component.kind) {
        (DeviceFamily::SmaSunnyBoy, ComponentKind::Inverter) => {
            let version = match component.version.as_deref() {
                Some(version) => version.parse::<SmaInverterVersion>()?,
                None => SmaInverterVersion::Default,
            };
            ComponentPlan::SmaSunnyBoyInverter(SmaSunnyBoyInverterSetup {
                id,
                name,
                modbus_id,
                version,
            })
        }
        (DeviceFamily::SmaSunnyBoy, ComponentKind::Bat) => {
            ComponentPlan::SmaSunnyBoyBat(SmaSunnyBoyBatSetup { id, name, modbus_id })
        }
        (DeviceFamily::SmaSunnyIsland, ComponentKind::Bat) => {
            ComponentPlan::SmaSunnyIslandBat(SmaSunnyIslandBatSetup { id, name, modbus_id })
        }
        (DeviceFamily::SolarLog, ComponentKind::Counter) => {
            ComponentPlan::SolarLogCounter(SolarLogCounterSetup { id, name })
        }
        (DeviceFamily::KostalPikoOld, ComponentKind::Inverter) => {
            ComponentPlan::KostalPikoOldInverter(KostalPikoOldInverterSetup { id, name })
        }
        (vendor, kind) => anyhow::bail!("{vendor} has no {kind} component"),
    };
    Ok(plan)
}

fn base_url(host: &str, port: Option<u16>) -> String {
    let host = host.trim_end_matches('/');
    let base = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    };
    match port {
        Some(port) => format!("{base}:{port}"),
        None => base,
    }
}

/// Initializes every planned component of a device against a connected transport.
pub async fn initialize_components(
    plan: &DevicePlan,
    transport: &Transport,
    collaborators: &Collaborators,
) -> Result<Vec<Component>> {
    let device_id = plan.identity.device_id;
    let context = ComponentContext {
        device_id,
        faults: collaborators.faults.clone(),
        counters: collaborators.counters.clone(),
        sim_count: collaborators.sim_count.clone(),
    };
    let board = &collaborators.board;

    let mut components = Vec::with_capacity(plan.components.len());
    for component in &plan.components {
        let store_key = (device_id, component.id(), component.name());
        let ready: Component = match (component, transport) {
            (ComponentPlan::SmaSunnyBoyInverter(setup), Transport::Modbus(client)) => setup
                .clone()
                .initialize(client.clone(), board.store(store_key), &context)
                .await?
                .into(),
            (ComponentPlan::SmaSunnyBoyBat(setup), Transport::Modbus(client)) => setup
                .clone()
                .initialize(client.clone(), board.store(store_key), &context)
                .into(),
            (ComponentPlan::SmaSunnyIslandBat(setup), Transport::Modbus(client)) => setup
                .clone()
                .initialize(client.clone(), board.store(store_key), &context)
                .into(),
            (ComponentPlan::SolarLogCounter(setup), Transport::Http(http)) => setup
                .clone()
                .initialize(http.clone(), board.store(store_key), &context)
                .await?
                .into(),
            (ComponentPlan::KostalPikoOldInverter(setup), Transport::Http(http)) => setup
                .clone()
                .initialize(http.clone(), board.store(store_key), &context)
                .await?
                .into(),
            (component, _) => anyhow::bail!(
                "device {device_id}: component {} does not match the device transport",
                component.id()
            ),
        };
        components.push(ready);
    }
    Ok(components)
}

/// Runs a device body on its own task so a panic comes back as an error the caller can act on.
pub async fn isolate_panics<F>(body: F) -> Result<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    match tokio::spawn(body).await {
        Ok(outcome) => outcome,
        Err(err) if err.is_panic() => Err(anyhow!("device task panicked: {err}")),
        Err(err) => Err(anyhow!("device task aborted: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_adds_scheme_and_port() {
        assert_eq!(base_url("192.168.1.20", None), "http://192.168.1.20");
        assert_eq!(base_url("192.168.1.20", Some(8080)), "http://192.168.1.20:8080");
        assert_eq!(base_url("https://logger.local/", None), "https://logger.local");
    }

    #[test]
    fn unsupported_kind_is_rejected() {
        let component = ComponentConfig {
            id: 1,
            name: None,
            kind: ComponentKind::Counter,
            modbus_id: None,
            version: None,
        };
        let err = plan_component(DeviceFamily::SmaSunnyBoy, &component).expect_err("unsupported");
        assert_eq!(err.to_string(), "sma_sunny_boy has no counter component");
    }

    #[test]
    fn default_name_and_unit_id() {
        let component = ComponentConfig {
            id: 4,
            name: None,
            kind: ComponentKind::Bat,
            modbus_id: None,
            version: None,
        };
        match plan_component(DeviceFamily::SmaSunnyIsland, &component).expect("plan") {
            ComponentPlan::SmaSunnyIslandBat(setup) => {
                assert_eq!(setup.name, "sma_sunny_island bat");
                assert_eq!(setup.modbus_id, DEFAULT_SMA_UNIT_ID);
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[tokio::test]
    async fn panicking_body_becomes_error() {
        let err = isolate_panics(async {
            if true {
                panic!("register map exploded");
            }
            Ok(())
        })
            .await
            .expect_err("panic");
        assert!(err.to_string().contains("device task panicked"), "{err}");

        isolate_panics(async { Ok(()) }).await.expect("clean exit");
    }
}
