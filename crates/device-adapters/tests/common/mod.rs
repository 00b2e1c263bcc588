#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use device_adapters::{ComponentContext, FaultCondition, FaultSink, ValueStore};
use simcount::{MemoryCounterStore, SimCountConfig};

/// Keeps every state handed to the store.
pub struct RecordingStore<S> {
    states: Mutex<Vec<S>>,
}

impl<S: Clone> RecordingStore<S> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            states: Mutex::new(Vec::new()),
        })
    }

    pub fn states(&self) -> Vec<S> {
        self.states.lock().expect("store lock").clone()
    }
}

impl<S: Send> ValueStore<S> for RecordingStore<S> {
    fn set(&self, state: S) {
        self.states.lock().expect("store lock").push(state);
    }
}

#[derive(Default)]
pub struct RecordingFaults {
    conditions: Mutex<Vec<FaultCondition>>,
}

impl RecordingFaults {
    pub fn conditions(&self) -> Vec<FaultCondition> {
        self.conditions.lock().expect("fault lock").clone()
    }
}

impl FaultSink for RecordingFaults {
    fn report(&self, condition: &FaultCondition) {
        self.conditions
            .lock()
            .expect("fault lock")
            .push(condition.clone());
    }
}

pub fn context(device_id: u32, faults: Arc<RecordingFaults>, counters: MemoryCounterStore) -> ComponentContext {
    ComponentContext {
        device_id,
        faults,
        counters: Arc::new(counters),
        sim_count: SimCountConfig::default(),
    }
}
