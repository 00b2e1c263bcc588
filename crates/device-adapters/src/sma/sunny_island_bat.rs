use std::sync::Arc;

use modbus_client::RegisterSource;
use tracing::debug;
use types::{BatState, DataType, RawReading};

use super::{read, read_block};
use crate::collaborators::report_rejection;
use crate::sentinel::{Plausibility, SentinelRejected, SMA};
use crate::{AdapterError, ComponentContext, ComponentInfo, ComponentKind, FaultSink, ValueStore};

#[derive(Debug, Clone)]
pub struct SmaSunnyIslandBatSetup {
    pub id: u32,
    pub name: String,
    pub modbus_id: u8,
}

impl SmaSunnyIslandBatSetup {
    pub fn initialize(
        self,
        client: Arc<dyn RegisterSource>,
        store: Arc<dyn ValueStore<BatState>>,
        context: &ComponentContext,
    ) -> SmaSunnyIslandBat {
        SmaSunnyIslandBat {
            info: context.info(self.id, &self.name, ComponentKind::Bat),
            setup: self,
            client,
            store,
            faults: context.faults.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct IslandReadings {
    soc: RawReading,
    power: RawReading,
    counters: [RawReading; 2],
}

/// Off-grid battery inverter. Power register counts discharge as positive.
pub struct SmaSunnyIslandBat {
    setup: SmaSunnyIslandBatSetup,
    info: ComponentInfo,
    client: Arc<dyn RegisterSource>,
    store: Arc<dyn ValueStore<BatState>>,
    faults: Arc<dyn FaultSink>,
}

impl SmaSunnyIslandBat {
    pub fn info(&self) -> &ComponentInfo {
        &self.info
    }

    pub async fn update(&mut self) -> Result<(), AdapterError> {
        let client = self.client.as_ref();
        let unit = self.setup.modbus_id;
        let readings = IslandReadings {
            soc: read(client, unit, 30845, DataType::Int32).await?,
            power: read(client, unit, 30775, DataType::Int32).await?,
            counters: read_block(client, unit, 30595, DataType::Int32).await?,
        };

        let state = normalize(&readings)
            .map_err(|rejected| report_rejection(self.faults.as_ref(), &self.info, rejected))?;
        debug!(component = %self.info.name, power = state.power, soc = state.soc, "bat normalized");
        self.store.set(state);
        Ok(())
    }
}

fn normalize(readings: &IslandReadings) -> Result<BatState, SentinelRejected> {
    let mut check = Plausibility::new(&SMA);
    let [imported, exported] = readings.counters;
    let imported = check.require_counter("imported", imported);
    let exported = check.require_counter("exported", exported);
    let soc = match SMA.validate(readings.soc.value) {
        None => 0,
        Some(_) => check.require_counter("soc", readings.soc),
    };
    check.finish()?;

    let power = SMA
        .validate(readings.power.value)
        .and_then(|value| value.as_i64())
        .map_or(0, |power| -power);

    Ok(BatState {
        power,
        soc: u32::try_from(soc).unwrap_or(u32::MAX),
        imported,
        exported,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::PointValue;

    fn readings(soc: i32, power: i32, imported: i32, exported: i32) -> IslandReadings {
        IslandReadings {
            soc: RawReading::new(30845, PointValue::I32(soc)),
            power: RawReading::new(30775, PointValue::I32(power)),
            counters: [
                RawReading::new(30595, PointValue::I32(imported)),
                RawReading::new(30597, PointValue::I32(exported)),
            ],
        }
    }

    #[test]
    fn discharge_is_negative() {
        let state = normalize(&readings(64, 2_300, 120_000, 95_000)).expect("normalize");
        assert_eq!(state.power, -2_300);
        assert_eq!(state.soc, 64);
        assert_eq!((state.imported, state.exported), (120_000, 95_000));
    }

    #[test]
    fn missing_soc_and_power_read_as_zero() {
        let state = normalize(&readings(i32::MIN, i32::MIN, 1, 2)).expect("normalize");
        assert_eq!((state.soc, state.power), (0, 0));
    }

    #[test]
    fn negative_counter_is_rejected() {
        let err = normalize(&readings(50, 0, -3, 2)).expect_err("rejected");
        assert_eq!(err.readings[0].field, "imported");
        assert_eq!(err.readings[0].address, 30595);
    }
}
