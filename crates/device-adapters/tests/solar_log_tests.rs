mod common;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use common::{context, RecordingFaults, RecordingStore};
use device_adapters::solar_log::SolarLogCounterSetup;
use device_adapters::{AdapterError, Component};
use http_client::CannedResponses;
use serde_json::json;
use simcount::{CounterIdentity, CounterSnapshot, MemoryCounterStore};
use types::CounterState;

fn now_ms() -> i64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch");
    i64::try_from(elapsed.as_millis()).expect("millis fit")
}

#[tokio::test]
async fn grid_consumption_is_booked_as_imported() {
    let http = CannedResponses::new();
    http.set_json("getjp", json!({"801": {"170": {"110": 1000}}}));
    let counters = MemoryCounterStore::new();
    let identity = CounterIdentity::new(1, 2, "grid");
    counters
        .seed(
            identity.clone(),
            CounterSnapshot {
                timestamp_ms: Some(now_ms() - 1_800_000),
                ..CounterSnapshot::with_totals(10_000, 3_000)
            },
        )
        .await;
    let store = RecordingStore::<CounterState>::new();
    let faults = Arc::new(RecordingFaults::default());
    let counter = SolarLogCounterSetup {
        id: 2,
        name: "Solar-Log".to_string(),
    }
    .initialize(
        Arc::new(http.clone()),
        store.clone(),
        &context(1, faults, counters.clone()),
    )
    .await
    .expect("initialize");
    let mut component = Component::from(counter);

    component.update().await.expect("update");

    let states = store.states();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].power, 1000);
    assert!((10_500..=10_501).contains(&states[0].imported), "{:?}", states[0]);
    assert_eq!(states[0].exported, 3_000);
    let saved = counters.get(&identity).await.expect("saved");
    assert_eq!(saved.imported, states[0].imported);
}

#[tokio::test]
async fn missing_power_field_writes_nothing() {
    let http = CannedResponses::new();
    http.set_json("getjp", json!({"801": {"170": {"100": "2024-01-01"}}}));
    let store = RecordingStore::<CounterState>::new();
    let mut counter = SolarLogCounterSetup {
        id: 2,
        name: "Solar-Log".to_string(),
    }
    .initialize(
        Arc::new(http),
        store.clone(),
        &context(1, Arc::new(RecordingFaults::default()), MemoryCounterStore::new()),
    )
    .await
    .expect("initialize");

    let err = counter.update().await.expect_err("parse error");
    assert_eq!(err.kind(), "parse");
    assert!(store.states().is_empty());
}

#[tokio::test]
async fn unreachable_logger_is_transient() {
    let http = CannedResponses::new();
    let store = RecordingStore::<CounterState>::new();
    let mut counter = SolarLogCounterSetup {
        id: 2,
        name: "Solar-Log".to_string(),
    }
    .initialize(
        Arc::new(http),
        store.clone(),
        &context(1, Arc::new(RecordingFaults::default()), MemoryCounterStore::new()),
    )
    .await
    .expect("initialize");

    let err = counter.update().await.expect_err("no response");
    assert!(matches!(err, AdapterError::Http(_)));
    assert!(err.is_transient());
    assert!(store.states().is_empty());
}
