use std::sync::{Arc, Mutex};
use std::time::Duration;

use device_adapters::sma::SmaSunnyIslandBatSetup;
use device_adapters::{Component, ComponentContext, FaultCondition, FaultSink, ValueStore};
use modbus_client::InMemoryRegisters;
use poller_actor::{ActorConfig, CycleReport, PollerActor, PollerError};
use simcount::{MemoryCounterStore, SimCountConfig};
use tokio::sync::watch;
use types::{BatState, DeviceIdentity, PointValue};

#[derive(Default)]
struct Store {
    states: Mutex<Vec<BatState>>,
}

impl Store {
    fn len(&self) -> usize {
        self.states.lock().expect("store lock").len()
    }
}

impl ValueStore<BatState> for Store {
    fn set(&self, state: BatState) {
        self.states.lock().expect("store lock").push(state);
    }
}

struct IgnoreFaults;

impl FaultSink for IgnoreFaults {
    fn report(&self, _condition: &FaultCondition) {}
}

async fn battery(registers: &InMemoryRegisters, store: Arc<Store>) -> Component {
    registers.write_value(30845, PointValue::I32(55)).await;
    registers.write_value(30775, PointValue::I32(400)).await;
    registers.write_value(30595, PointValue::I32(1_000)).await;
    registers.write_value(30597, PointValue::I32(2_000)).await;
    let context = ComponentContext {
        device_id: 1,
        faults: Arc::new(IgnoreFaults),
        counters: Arc::new(MemoryCounterStore::new()),
        sim_count: SimCountConfig::default(),
    };
    SmaSunnyIslandBatSetup {
        id: 2,
        name: "island".to_string(),
        modbus_id: 3,
    }
    .initialize(Arc::new(registers.clone()), store, &context)
    .into()
}

fn identity() -> DeviceIdentity {
    DeviceIdentity {
        device_id: 1,
        host: "127.0.0.1".to_string(),
    }
}

fn fast_config() -> ActorConfig {
    ActorConfig {
        poll_interval: Duration::from_millis(10),
        request_timeout: Duration::from_millis(500),
        jitter_ms: 0,
        max_failed_cycles: 3,
    }
}

#[tokio::test]
async fn poll_once_updates_every_component() {
    let registers = InMemoryRegisters::new();
    let store = Arc::new(Store::default());
    let component = battery(&registers, store.clone()).await;
    let (_tx, rx) = watch::channel(false);
    let mut actor = PollerActor::new(identity(), vec![component], rx, fast_config());

    let report = actor.poll_once().await;

    assert_eq!(
        report,
        CycleReport {
            updated: 1,
            failed: 0,
            transient: 0
        }
    );
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn run_stops_on_shutdown() {
    let registers = InMemoryRegisters::new();
    let store = Arc::new(Store::default());
    let component = battery(&registers, store.clone()).await;
    let (tx, rx) = watch::channel(false);
    let actor = PollerActor::new(identity(), vec![component], rx, fast_config());

    let handle = tokio::spawn(actor.run());
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(true).expect("send shutdown");

    let result = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("actor stops")
        .expect("join");
    assert!(result.is_ok());
    assert!(store.len() >= 1);
}

#[tokio::test]
async fn unreachable_device_ends_the_actor() {
    let registers = InMemoryRegisters::new();
    let store = Arc::new(Store::default());
    let component = battery(&registers, store.clone()).await;
    registers.set_offline(true);
    let (_tx, rx) = watch::channel(false);
    let actor = PollerActor::new(identity(), vec![component], rx, fast_config());

    let result = tokio::time::timeout(Duration::from_secs(2), actor.run())
        .await
        .expect("actor gives up");

    assert!(matches!(
        result,
        Err(PollerError::Unreachable {
            device_id: 1,
            cycles: 3
        })
    ));
    assert_eq!(store.len(), 0);
}

#[tokio::test]
async fn actor_without_components_fails_fast() {
    let (_tx, rx) = watch::channel(false);
    let actor = PollerActor::new(identity(), Vec::new(), rx, fast_config());
    assert!(matches!(
        actor.run().await,
        Err(PollerError::NoComponents { device_id: 1 })
    ));
}
