use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};

use metrics::{counter, gauge};
use tracing::{debug, warn};

use device_adapters::{FaultCondition, FaultSink, ValueStore};
use types::{BatState, CounterState, InverterState};

/// Latest normalized state of a component.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentState {
    Inverter(InverterState),
    Bat(BatState),
    Counter(CounterState),
}

impl ComponentState {
    pub fn power(&self) -> i64 {
        match self {
            ComponentState::Inverter(state) => state.power,
            ComponentState::Bat(state) => state.power,
            ComponentState::Counter(state) => state.power,
        }
    }
}

impl From<InverterState> for ComponentState {
    fn from(state: InverterState) -> Self {
        ComponentState::Inverter(state)
    }
}

impl From<BatState> for ComponentState {
    fn from(state: BatState) -> Self {
        ComponentState::Bat(state)
    }
}

impl From<CounterState> for ComponentState {
    fn from(state: CounterState) -> Self {
        ComponentState::Counter(state)
    }
}

/// Holds the last state every component stored, keyed by device and component id.
#[derive(Debug, Default)]
pub struct StateBoard {
    states: Mutex<HashMap<(u32, u32), ComponentState>>,
}

impl StateBoard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, device_id: u32, component_id: u32) -> Option<ComponentState> {
        self.lock().get(&(device_id, component_id)).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store handle for one component.
    pub fn store<S>(self: &Arc<Self>, (device_id, component_id, name): (u32, u32, &str)) -> Arc<dyn ValueStore<S>>
    where
        S: Into<ComponentState> + Send + 'static,
    {
        Arc::new(BoardStore {
            board: self.clone(),
            device_id,
            component_id,
            name: name.to_string(),
            _state: PhantomData::<fn(S)>,
        })
    }

    fn insert(&self, key: (u32, u32), state: ComponentState) {
        self.lock().insert(key, state);
    }

    /// Every write replaces a whole entry, so a guard left by a panicked writer is still usable.
    fn lock(&self) -> MutexGuard<'_, HashMap<(u32, u32), ComponentState>> {
        self.states.lock().unwrap_or_else(|poisoned| {
            warn!("state board lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

struct BoardStore<S> {
    board: Arc<StateBoard>,
    device_id: u32,
    component_id: u32,
    name: String,
    _state: PhantomData<fn(S)>,
}

impl<S> ValueStore<S> for BoardStore<S>
where
    S: Into<ComponentState> + Send,
{
    fn set(&self, state: S) {
        let state = state.into();
        gauge!("collector_component_power_watts", "component" => self.name.clone())
            .set(state.power() as f64);
        debug!(
            device = self.device_id,
            component = %self.name,
            state = ?state,
            "component state stored"
        );
        self.board.insert((self.device_id, self.component_id), state);
    }
}

/// Renders fault conditions as log events.
#[derive(Debug, Default)]
pub struct TracingFaultSink;

impl FaultSink for TracingFaultSink {
    fn report(&self, condition: &FaultCondition) {
        let component = &condition.component;
        counter!("collector_faults_total", "component" => component.name.clone()).increment(1);
        warn!(
            device = component.device_id,
            component = %component.name,
            kind = %component.kind,
            readings = condition.rejected.readings.len(),
            fault = %condition.rejected,
            "implausible readings discarded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poisoned_board_still_stores_states() {
        let board = StateBoard::new();
        let poisoner = board.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.states.lock().expect("first lock");
            panic!("writer died");
        })
        .join();
        assert!(board.states.is_poisoned());

        let store = board.store::<CounterState>((1, 2, "grid"));
        store.set(CounterState {
            power: 150,
            imported: 10,
            exported: 0,
        });

        assert_eq!(board.len(), 1);
        assert_eq!(board.get(1, 2).map(|state| state.power()), Some(150));
    }
}
