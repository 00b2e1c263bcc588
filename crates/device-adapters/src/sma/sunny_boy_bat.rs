use std::sync::Arc;

use modbus_client::RegisterSource;
use tracing::debug;
use types::{BatState, DataType, RawReading};

use super::read;
use crate::collaborators::report_rejection;
use crate::sentinel::{Plausibility, SentinelRejected, SMA};
use crate::{AdapterError, ComponentContext, ComponentInfo, ComponentKind, FaultSink, ValueStore};

/// Charge power below this is noise; the discharge register is used instead.
const CHARGE_THRESHOLD_W: i64 = 5;

#[derive(Debug, Clone)]
pub struct SmaSunnyBoyBatSetup {
    pub id: u32,
    pub name: String,
    pub modbus_id: u8,
}

impl SmaSunnyBoyBatSetup {
    pub fn initialize(
        self,
        client: Arc<dyn RegisterSource>,
        store: Arc<dyn ValueStore<BatState>>,
        context: &ComponentContext,
    ) -> SmaSunnyBoyBat {
        SmaSunnyBoyBat {
            info: context.info(self.id, &self.name, ComponentKind::Bat),
            setup: self,
            client,
            store,
            faults: context.faults.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct BatReadings {
    soc: RawReading,
    charge_power: RawReading,
    discharge_power: RawReading,
    imported: RawReading,
    exported: RawReading,
}

/// Battery behind a Sunny Boy Storage. It reports its own charge/discharge energy counters.
pub struct SmaSunnyBoyBat {
    setup: SmaSunnyBoyBatSetup,
    info: ComponentInfo,
    client: Arc<dyn RegisterSource>,
    store: Arc<dyn ValueStore<BatState>>,
    faults: Arc<dyn FaultSink>,
}

impl SmaSunnyBoyBat {
    pub fn info(&self) -> &ComponentInfo {
        &self.info
    }

    pub async fn update(&mut self) -> Result<(), AdapterError> {
        let client = self.client.as_ref();
        let unit = self.setup.modbus_id;
        let readings = BatReadings {
            soc: read(client, unit, 30845, DataType::UInt32).await?,
            charge_power: read(client, unit, 31393, DataType::Int32).await?,
            discharge_power: read(client, unit, 31395, DataType::Int32).await?,
            imported: read(client, unit, 31397, DataType::UInt64).await?,
            exported: read(client, unit, 31401, DataType::UInt64).await?,
        };

        let state = normalize(&readings)
            .map_err(|rejected| report_rejection(self.faults.as_ref(), &self.info, rejected))?;
        debug!(component = %self.info.name, power = state.power, soc = state.soc, "bat normalized");
        self.store.set(state);
        Ok(())
    }
}

fn normalize(readings: &BatReadings) -> Result<BatState, SentinelRejected> {
    let mut check = Plausibility::new(&SMA);
    let imported = check.require_counter("imported", readings.imported);
    let exported = check.require_counter("exported", readings.exported);
    check.finish()?;

    // An empty storage with no DC production reports no values at all.
    let (soc, power) = match SMA.validate(readings.soc.value) {
        None => (0, 0),
        Some(soc) => {
            let charge = power_of(readings.charge_power);
            let power = if charge > CHARGE_THRESHOLD_W {
                charge
            } else {
                -power_of(readings.discharge_power)
            };
            (soc.as_u64().and_then(|soc| u32::try_from(soc).ok()).unwrap_or(0), power)
        }
    };

    Ok(BatState {
        power,
        soc,
        imported,
        exported,
    })
}

fn power_of(reading: RawReading) -> i64 {
    SMA.validate(reading.value)
        .and_then(|value| value.as_i64())
        .unwrap_or(0)
}
