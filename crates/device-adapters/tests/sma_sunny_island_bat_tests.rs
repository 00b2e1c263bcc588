mod common;

use std::sync::Arc;

use common::{context, RecordingFaults, RecordingStore};
use device_adapters::sma::SmaSunnyIslandBatSetup;
use device_adapters::{AdapterError, Component};
use modbus_client::InMemoryRegisters;
use simcount::MemoryCounterStore;
use types::{BatState, PointValue};

async fn island_registers() -> InMemoryRegisters {
    let registers = InMemoryRegisters::new();
    registers.write_value(30845, PointValue::I32(81)).await;
    registers.write_value(30775, PointValue::I32(-900)).await;
    registers.write_value(30595, PointValue::I32(310_000)).await;
    registers.write_value(30597, PointValue::I32(270_500)).await;
    registers
}

#[tokio::test]
async fn charging_island_battery_is_stored() {
    let registers = island_registers().await;
    let store = RecordingStore::<BatState>::new();
    let faults = Arc::new(RecordingFaults::default());
    let bat = SmaSunnyIslandBatSetup {
        id: 7,
        name: "Sunny Island".to_string(),
        modbus_id: 12,
    }
    .initialize(
        Arc::new(registers.clone()),
        store.clone(),
        &context(3, faults.clone(), MemoryCounterStore::new()),
    );
    let mut component = Component::from(bat);

    component.update().await.expect("update");

    assert_eq!(
        store.states(),
        vec![BatState {
            power: 900,
            soc: 81,
            imported: 310_000,
            exported: 270_500,
        }]
    );
    assert!(faults.conditions().is_empty());
}

#[tokio::test]
async fn negative_soc_is_rejected_with_counters() {
    let registers = island_registers().await;
    registers.write_value(30845, PointValue::I32(-5)).await;
    registers.write_value(30597, PointValue::I32(i32::MIN)).await;
    let store = RecordingStore::<BatState>::new();
    let faults = Arc::new(RecordingFaults::default());
    let mut bat = SmaSunnyIslandBatSetup {
        id: 7,
        name: "Sunny Island".to_string(),
        modbus_id: 12,
    }
    .initialize(
        Arc::new(registers.clone()),
        store.clone(),
        &context(3, faults.clone(), MemoryCounterStore::new()),
    );

    let err = bat.update().await.expect_err("rejected");
    let rejected = match err {
        AdapterError::SentinelRejected(rejected) => rejected,
        other => panic!("expected a sentinel rejection, got {other:?}"),
    };
    let fields: Vec<_> = rejected.readings.iter().map(|reading| reading.field).collect();
    assert_eq!(fields, vec!["exported", "soc"]);
    assert!(store.states().is_empty());
    assert_eq!(faults.conditions().len(), 1);
}
