use std::str::FromStr;
use std::sync::Arc;

use modbus_client::RegisterSource;
use simcount::{CounterIdentity, SimCounter};
use tracing::debug;
use types::{DataType, InverterState, PointValue, RawReading};

use super::{read, read_block};
use crate::collaborators::report_rejection;
use crate::sentinel::{Plausibility, SentinelRejected, SMA};
use crate::{
    AdapterError, ComponentContext, ComponentInfo, ComponentKind, FaultSink, UnknownVariant,
    ValueStore,
};

/// Normalized power SMA reports while the inverter is switched off, after sign inversion.
const POWER_OFF_CODE: i64 = -0xC000;
/// Line voltage assumed when currents have to be derived from power.
const NOMINAL_VOLTAGE: f64 = 230.0;

/// Register layout generation. Chosen once from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmaInverterVersion {
    Default,
    Core2,
    Datamanager,
}

impl FromStr for SmaInverterVersion {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(SmaInverterVersion::Default),
            "core2" => Ok(SmaInverterVersion::Core2),
            "datamanager" => Ok(SmaInverterVersion::Datamanager),
            _ => Err(UnknownVariant {
                family: "sma_sunny_boy",
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmaSunnyBoyInverterSetup {
    pub id: u32,
    pub name: String,
    pub modbus_id: u8,
    pub version: SmaInverterVersion,
}

impl SmaSunnyBoyInverterSetup {
    pub async fn initialize(
        self,
        client: Arc<dyn RegisterSource>,
        store: Arc<dyn ValueStore<InverterState>>,
        context: &ComponentContext,
    ) -> Result<SmaSunnyBoyInverter, AdapterError> {
        let info = context.info(self.id, &self.name, ComponentKind::Inverter);
        let sim_counter = SimCounter::load(
            CounterIdentity::new(context.device_id, self.id, "inverter"),
            context.counters.clone(),
            context.sim_count.clone(),
        )
        .await?;

        Ok(SmaSunnyBoyInverter {
            setup: self,
            info,
            client,
            store,
            faults: context.faults.clone(),
            sim_counter,
        })
    }
}

/// Raw registers of one cycle. Absent fields are not provided by the variant.
#[derive(Debug, Clone, PartialEq)]
struct InverterReadings {
    power: RawReading,
    exported: RawReading,
    dc_power: Vec<RawReading>,
    currents: Option<[RawReading; 3]>,
}

pub struct SmaSunnyBoyInverter {
    setup: SmaSunnyBoyInverterSetup,
    info: ComponentInfo,
    client: Arc<dyn RegisterSource>,
    store: Arc<dyn ValueStore<InverterState>>,
    faults: Arc<dyn FaultSink>,
    sim_counter: SimCounter,
}

impl SmaSunnyBoyInverter {
    pub fn info(&self) -> &ComponentInfo {
        &self.info
    }

    pub async fn update(&mut self) -> Result<(), AdapterError> {
        let readings = self.read().await?;
        let mut state = normalize(self.setup.version, &readings)
            .map_err(|rejected| report_rejection(self.faults.as_ref(), &self.info, rejected))?;

        let (imported, _) = self.sim_counter.sim_count(-state.power).await?;
        state.imported = imported;

        debug!(
            component = %self.info.name,
            power = state.power,
            exported = state.exported,
            imported = state.imported,
            "inverter normalized"
        );
        self.store.set(state);
        Ok(())
    }

    async fn read(&self) -> Result<InverterReadings, AdapterError> {
        let client = self.client.as_ref();
        let unit = self.setup.modbus_id;

        let readings = match self.setup.version {
            SmaInverterVersion::Default => InverterReadings {
                power: read(client, unit, 30775, DataType::Int32).await?,
                exported: read(client, unit, 30529, DataType::UInt32).await?,
                dc_power: vec![
                    read(client, unit, 30773, DataType::Int32).await?,
                    read(client, unit, 30961, DataType::Int32).await?,
                ],
                currents: Some(read_block(client, unit, 30977, DataType::Int32).await?),
            },
            SmaInverterVersion::Core2 => InverterReadings {
                power: read(client, unit, 40084, DataType::Int16).await?,
                exported: read(client, unit, 40094, DataType::UInt32).await?,
                dc_power: vec![read(client, unit, 40101, DataType::UInt32).await?],
                currents: Some(read_block(client, unit, 30977, DataType::Int32).await?),
            },
            SmaInverterVersion::Datamanager => InverterReadings {
                power: read(client, unit, 30775, DataType::Int32).await?,
                exported: read(client, unit, 30513, DataType::UInt64).await?,
                dc_power: Vec::new(),
                currents: None,
            },
        };
        Ok(readings)
    }
}

fn normalize(
    version: SmaInverterVersion,
    readings: &InverterReadings,
) -> Result<InverterState, SentinelRejected> {
    match version {
        SmaInverterVersion::Default => normalize_default(readings),
        SmaInverterVersion::Core2 => normalize_core2(readings),
        SmaInverterVersion::Datamanager => normalize_datamanager(readings),
    }
}

fn normalize_default(readings: &InverterReadings) -> Result<InverterState, SentinelRejected> {
    let mut check = Plausibility::new(&SMA);
    let exported = check.require_counter("exported", readings.exported);
    check.finish()?;

    let state = InverterState {
        power: scaled(readings.power.value, -1),
        dc_power: Some(-dc_sum(&readings.dc_power)),
        currents: phase_currents(readings.currents.as_ref()),
        imported: 0,
        exported,
    };
    Ok(substitute_when_off(readings.power.value, state))
}

fn normalize_core2(readings: &InverterReadings) -> Result<InverterState, SentinelRejected> {
    let mut check = Plausibility::new(&SMA);
    let exported = check.require_counter("exported", readings.exported);
    check.finish()?;

    let state = InverterState {
        power: scaled(readings.power.value, -10),
        dc_power: Some(dc_sum(&readings.dc_power) * -100),
        currents: phase_currents(readings.currents.as_ref()),
        imported: 0,
        exported: exported.saturating_mul(100),
    };
    Ok(substitute_when_off(readings.power.value, state))
}

fn normalize_datamanager(readings: &InverterReadings) -> Result<InverterState, SentinelRejected> {
    let mut check = Plausibility::new(&SMA);
    let exported = check.require_counter("exported", readings.exported);
    check.finish()?;

    let power = scaled(readings.power.value, -1);
    let per_phase = power as f64 / 3.0 / NOMINAL_VOLTAGE;
    let state = substitute_when_off(
        readings.power.value,
        InverterState {
            power,
            dc_power: None,
            currents: Some([per_phase; 3]),
            imported: 0,
            exported,
        },
    );
    Ok(InverterState {
        dc_power: Some(state.power),
        ..state
    })
}

fn scaled(value: PointValue, factor: i64) -> i64 {
    match SMA.validate(value).and_then(|value| value.as_i64()) {
        Some(raw) => raw.saturating_mul(factor),
        None => 0,
    }
}

/// A DC input without data contributes nothing.
fn dc_sum(readings: &[RawReading]) -> i64 {
    readings
        .iter()
        .filter_map(|reading| SMA.validate(reading.value))
        .filter_map(|value| value.as_i64())
        .sum()
}

/// Phase currents in A from mA registers. All phases without data means the inverter does
/// not measure them; a single missing phase reads as 0.
fn phase_currents(readings: Option<&[RawReading; 3]>) -> Option<[f64; 3]> {
    let readings = readings?;
    if readings.iter().all(|reading| SMA.is_sentinel(&reading.value)) {
        return None;
    }
    Some((*readings).map(|reading| match SMA.validate(reading.value) {
        Some(value) => value.as_f64() / -1000.0,
        None => 0.0,
    }))
}

/// An inverter without AC power data is treated as switched off.
fn substitute_when_off(raw_power: PointValue, state: InverterState) -> InverterState {
    if SMA.is_sentinel(&raw_power) || state.power == POWER_OFF_CODE {
        InverterState {
            power: 0,
            currents: Some([0.0; 3]),
            ..state
        }
    } else {
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_readings(power: PointValue, exported: PointValue) -> InverterReadings {
        InverterReadings {
            power: RawReading::new(30775, power),
            exported: RawReading::new(30529, exported),
            dc_power: vec![
                RawReading::new(30773, PointValue::I32(-1_000)),
                RawReading::new(30961, PointValue::I32(-500)),
            ],
            currents: Some([
                RawReading::new(30977, PointValue::I32(-2_000)),
                RawReading::new(30979, PointValue::I32(-2_500)),
                RawReading::new(30981, PointValue::I32(i32::MIN)),
            ]),
        }
    }

    #[test]
    fn version_names_parse_case_insensitively() {
        assert_eq!("Core2".parse::<SmaInverterVersion>(), Ok(SmaInverterVersion::Core2));
        assert_eq!(
            " datamanager ".parse::<SmaInverterVersion>(),
            Ok(SmaInverterVersion::Datamanager)
        );
        let err = "tripower".parse::<SmaInverterVersion>().expect_err("unknown");
        assert_eq!(err.value, "tripower");
        assert_eq!(err.to_string(), "unknown sma_sunny_boy variant 'tripower'");
    }

    #[test]
    fn default_variant_inverts_power_and_scales_currents() {
        let state = normalize_default(&default_readings(PointValue::I32(1_400), PointValue::U32(52_000)))
            .expect("normalize");
        assert_eq!(state.power, -1_400);
        assert_eq!(state.dc_power, Some(1_500));
        assert_eq!(state.currents, Some([2.0, 2.5, 0.0]));
        assert_eq!(state.exported, 52_000);
    }

    #[test]
    fn missing_power_means_off() {
        let state = normalize_default(&default_readings(PointValue::I32(i32::MIN), PointValue::U32(52_000)))
            .expect("normalize");
        assert_eq!(state.power, 0);
        assert_eq!(state.currents, Some([0.0; 3]));
        assert_eq!(state.exported, 52_000);
    }

    #[test]
    fn off_code_after_inversion_means_off() {
        let state = normalize_default(&default_readings(PointValue::I32(0xC000), PointValue::U32(9)))
            .expect("normalize");
        assert_eq!(state.power, 0);
    }

    #[test]
    fn counter_sentinel_is_rejected() {
        let err = normalize_default(&default_readings(PointValue::I32(100), PointValue::U32(u32::MAX)))
            .expect_err("rejected");
        assert_eq!(err.readings.len(), 1);
        assert_eq!(err.readings[0].field, "exported");
        assert_eq!(err.readings[0].address, 30529);
    }

    #[test]
    fn core2_scales_compact_registers() {
        let readings = InverterReadings {
            power: RawReading::new(40084, PointValue::I16(250)),
            exported: RawReading::new(40094, PointValue::U32(1_234)),
            dc_power: vec![RawReading::new(40101, PointValue::U32(26))],
            currents: Some([RawReading::new(30977, PointValue::I32(i32::MIN)); 3]),
        };
        let state = normalize_core2(&readings).expect("normalize");
        assert_eq!(state.power, -2_500);
        assert_eq!(state.dc_power, Some(-2_600));
        assert_eq!(state.exported, 123_400);
        assert_eq!(state.currents, None);
    }

    #[test]
    fn core2_i16_sentinel_is_width_exact() {
        let readings = InverterReadings {
            power: RawReading::new(40084, PointValue::I16(i16::MIN)),
            exported: RawReading::new(40094, PointValue::U32(10)),
            dc_power: Vec::new(),
            currents: None,
        };
        assert_eq!(normalize_core2(&readings).expect("normalize").power, 0);
    }

    #[test]
    fn datamanager_derives_dc_and_currents_from_power() {
        let readings = InverterReadings {
            power: RawReading::new(30775, PointValue::I32(-6_900)),
            exported: RawReading::new(30513, PointValue::U64(u64::from(u32::MAX))),
            dc_power: Vec::new(),
            currents: None,
        };
        let state = normalize_datamanager(&readings).expect("normalize");
        assert_eq!(state.power, 6_900);
        assert_eq!(state.dc_power, Some(6_900));
        assert_eq!(state.currents, Some([10.0; 3]));
        // A 32-bit sentinel pattern inside a 64-bit counter is a real value.
        assert_eq!(state.exported, u64::from(u32::MAX));
    }

    #[test]
    fn datamanager_rejects_64_bit_sentinel() {
        let readings = InverterReadings {
            power: RawReading::new(30775, PointValue::I32(-6_900)),
            exported: RawReading::new(30513, PointValue::U64(u64::MAX)),
            dc_power: Vec::new(),
            currents: None,
        };
        assert!(normalize_datamanager(&readings).is_err());
    }
}
