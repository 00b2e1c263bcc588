mod common;

use std::sync::Arc;

use common::{context, RecordingFaults, RecordingStore};
use device_adapters::kostal_piko_old::KostalPikoOldInverterSetup;
use http_client::CannedResponses;
use simcount::{CounterIdentity, CounterSnapshot, MemoryCounterStore};
use types::InverterState;

async fn inverter_with_page(page: &str) -> (Vec<InverterState>, MemoryCounterStore) {
    let counters = MemoryCounterStore::new();
    counters
        .seed(
            CounterIdentity::new(0, 1, "inverter"),
            CounterSnapshot::with_totals(0, 200),
        )
        .await;

    let responses = CannedResponses::new();
    responses.set_text("index.fhtml", page);
    let store = RecordingStore::<InverterState>::new();
    let faults = Arc::new(RecordingFaults::default());

    let mut inverter = KostalPikoOldInverterSetup {
        id: 1,
        name: "Kostal Piko".to_string(),
    }
    .initialize(
        Arc::new(responses),
        store.clone(),
        &context(0, faults.clone(), counters.clone()),
    )
    .await
    .expect("initialize");

    inverter.update().await.expect("update");
    assert!(faults.conditions().is_empty());
    (store.states(), counters)
}

#[tokio::test]
async fn inverter_on_reports_production_and_baseline_energy() {
    let (states, _) = inverter_with_page(include_str!("fixtures/sample.html")).await;
    assert_eq!(states.len(), 1);
    assert_eq!(
        states[0],
        InverterState {
            power: -50,
            exported: 200,
            ..InverterState::default()
        }
    );
}

#[tokio::test]
async fn inverter_off_keeps_cumulative_energy() {
    let (states, counters) = inverter_with_page(include_str!("fixtures/sample_off.html")).await;
    assert_eq!(states.len(), 1);
    assert_eq!(
        states[0],
        InverterState {
            power: 0,
            exported: 200,
            ..InverterState::default()
        }
    );

    let snapshot = counters
        .get(&CounterIdentity::new(0, 1, "inverter"))
        .await
        .expect("persisted");
    assert_eq!(snapshot.exported, 200);
    assert!(snapshot.timestamp_ms.is_some());
}

#[tokio::test]
async fn unreachable_page_writes_nothing() {
    let responses = CannedResponses::new();
    let store = RecordingStore::<InverterState>::new();
    let faults = Arc::new(RecordingFaults::default());
    let mut inverter = KostalPikoOldInverterSetup {
        id: 1,
        name: "Kostal Piko".to_string(),
    }
    .initialize(
        Arc::new(responses),
        store.clone(),
        &context(0, faults.clone(), MemoryCounterStore::new()),
    )
    .await
    .expect("initialize");

    let err = inverter.update().await.expect_err("no page");
    assert_eq!(err.kind(), "transport");
    assert!(store.states().is_empty());
    assert!(faults.conditions().is_empty());
}
