use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use simcount::{CounterBacking, SimCountConfig};

use crate::sentinel::SentinelRejected;

/// Receives the normalized snapshot of each successful cycle.
pub trait ValueStore<S>: Send + Sync {
    fn set(&self, state: S);
}

/// Operator-facing channel for conditions the core detected.
pub trait FaultSink: Send + Sync {
    fn report(&self, condition: &FaultCondition);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Inverter,
    Bat,
    Counter,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentKind::Inverter => "inverter",
            ComponentKind::Bat => "bat",
            ComponentKind::Counter => "counter",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentInfo {
    pub device_id: u32,
    pub component_id: u32,
    pub name: String,
    pub kind: ComponentKind,
}

/// A reading that failed the plausibility check, attributed to its component.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultCondition {
    pub component: ComponentInfo,
    pub rejected: SentinelRejected,
}

/// Shared by every component of one device.
#[derive(Clone)]
pub struct ComponentContext {
    pub device_id: u32,
    pub faults: Arc<dyn FaultSink>,
    pub counters: Arc<dyn CounterBacking>,
    pub sim_count: SimCountConfig,
}

impl ComponentContext {
    pub fn info(&self, component_id: u32, name: &str, kind: ComponentKind) -> ComponentInfo {
        ComponentInfo {
            device_id: self.device_id,
            component_id,
            name: name.to_string(),
            kind,
        }
    }
}

/// Hands a rejection to the fault sink and turns it into the cycle's error.
pub(crate) fn report_rejection(
    faults: &dyn FaultSink,
    component: &ComponentInfo,
    rejected: SentinelRejected,
) -> crate::AdapterError {
    faults.report(&FaultCondition {
        component: component.clone(),
        rejected: rejected.clone(),
    });
    crate::AdapterError::SentinelRejected(rejected)
}
