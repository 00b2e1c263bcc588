//! Vendor adapters that turn raw device readings into normalized power and energy state.
//!
//! A component starts life as its setup value (uninitialized). `initialize` binds the
//! transport, store and counter collaborators and returns the ready adapter; each
//! `update` then runs one full cycle: read, sentinel check, normalize, integrate, store.
//! A failed cycle writes nothing.

use http_client::HttpError;
use modbus_client::ClientError;
use simcount::SimCountError;
use thiserror::Error;

mod collaborators;
mod component;
pub mod kostal_piko_old;
pub mod sentinel;
pub mod sma;
pub mod solar_log;

pub use collaborators::{
    ComponentContext, ComponentInfo, ComponentKind, FaultCondition, FaultSink, ValueStore,
};
pub use component::Component;
pub use sentinel::{Plausibility, RejectedReading, SentinelRejected, SentinelTable};

/// A configured device variant this crate does not know.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {family} variant '{value}'")]
pub struct UnknownVariant {
    pub family: &'static str,
    pub value: String,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    SentinelRejected(#[from] SentinelRejected),
    #[error(transparent)]
    UnknownVariant(#[from] UnknownVariant),
    #[error("modbus transport error: {0}")]
    Modbus(#[from] ClientError),
    #[error("http transport error: {0}")]
    Http(#[from] HttpError),
    #[error("response field {field} unusable: {detail}")]
    Parse { field: &'static str, detail: String },
    #[error(transparent)]
    Counter(#[from] SimCountError),
}

impl AdapterError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterError::SentinelRejected(_) => "sentinel_rejected",
            AdapterError::UnknownVariant(_) => "unknown_variant",
            AdapterError::Modbus(_) | AdapterError::Http(_) => "transport",
            AdapterError::Parse { .. } => "parse",
            AdapterError::Counter(_) => "counter",
        }
    }

    /// Whether the next cycle may succeed without operator action. Transport retries are
    /// left to the poller.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AdapterError::Modbus(_) | AdapterError::Http(_) | AdapterError::Counter(_)
        )
    }
}
