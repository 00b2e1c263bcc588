//! Energy totals derived from power samples for devices that only report power.
//!
//! A [`SimCounter`] integrates power over wall-clock time into two monotonic counters.
//! Positive power accumulates into `exported`, negative power into `imported`; callers
//! choose the sign before handing a sample over. Every call persists the full state
//! through a [`CounterBacking`] so a restart resumes from the last saved totals.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

mod memory;
mod sqlite;

pub use memory::MemoryCounterStore;
pub use sqlite::SqliteCounterStore;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// One logical counter: a component of a device plus a direction prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CounterIdentity {
    pub device_id: u32,
    pub component_id: u32,
    pub prefix: String,
}

impl CounterIdentity {
    pub fn new(device_id: u32, component_id: u32, prefix: impl Into<String>) -> Self {
        Self {
            device_id,
            component_id,
            prefix: prefix.into(),
        }
    }

    /// Stable storage key.
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.prefix, self.device_id, self.component_id)
    }
}

/// Persisted accumulator state. Totals are whole Wh; remainders hold the sub-Wh part not yet
/// moved into the totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub imported: u64,
    pub exported: u64,
    pub imported_remainder: f64,
    pub exported_remainder: f64,
    /// Unix time of the last sample, `None` before the first one.
    pub timestamp_ms: Option<i64>,
}

/// What a sample did to the counter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Integration {
    /// No previous timestamp; the sample only starts the clock.
    FirstSample,
    Accumulated { elapsed_ms: i64, energy_wh: f64 },
    /// The clock went backwards; nothing accumulated.
    ClockSkew { elapsed_ms: i64 },
    /// The gap since the previous sample exceeds the configured maximum; nothing accumulated.
    GapTooLong { elapsed_ms: i64 },
}

impl CounterSnapshot {
    pub fn with_totals(imported: u64, exported: u64) -> Self {
        Self {
            imported,
            exported,
            ..Self::default()
        }
    }

    /// Applies one power sample taken at `timestamp_ms`. Totals never decrease.
    pub fn advance(&self, power: i64, timestamp_ms: i64, max_gap: Duration) -> (Self, Integration) {
        let mut next = Self {
            timestamp_ms: Some(timestamp_ms),
            ..*self
        };

        let Some(previous) = self.timestamp_ms else {
            return (next, Integration::FirstSample);
        };

        let elapsed_ms = timestamp_ms.saturating_sub(previous);
        if elapsed_ms < 0 {
            // Keep the later timestamp so the skipped stretch is not integrated twice.
            next.timestamp_ms = self.timestamp_ms;
            return (next, Integration::ClockSkew { elapsed_ms });
        }
        let max_gap_ms = i64::try_from(max_gap.as_millis()).unwrap_or(i64::MAX);
        if elapsed_ms > max_gap_ms {
            return (next, Integration::GapTooLong { elapsed_ms });
        }

        let energy_wh = power as f64 * elapsed_ms as f64 / MS_PER_HOUR;
        if power > 0 {
            let (total, remainder) = carry(self.exported, self.exported_remainder + energy_wh);
            next.exported = total;
            next.exported_remainder = remainder;
        } else if power < 0 {
            let (total, remainder) = carry(self.imported, self.imported_remainder - energy_wh);
            next.imported = total;
            next.imported_remainder = remainder;
        }

        (
            next,
            Integration::Accumulated {
                elapsed_ms,
                energy_wh,
            },
        )
    }
}

/// Moves the whole-Wh part of `remainder` into `total`.
fn carry(total: u64, remainder: f64) -> (u64, f64) {
    if !remainder.is_finite() || remainder < 1.0 {
        return (total, remainder.max(0.0));
    }
    let whole = remainder.floor();
    (total.saturating_add(whole as u64), remainder - whole)
}

#[derive(Debug, Error)]
pub enum CounterStoreError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("counter {key} value {value} does not fit the store")]
    Overflow { key: String, value: u64 },
    #[error("counter {key} holds a negative value {value}")]
    Negative { key: String, value: i64 },
}

#[derive(Debug, Error)]
pub enum SimCountError {
    #[error("counter backing failed for {key}: {source}")]
    Store {
        key: String,
        #[source]
        source: CounterStoreError,
    },
}

/// Durable home of counter snapshots.
#[async_trait]
pub trait CounterBacking: Send + Sync {
    async fn load(&self, identity: &CounterIdentity) -> Result<Option<CounterSnapshot>, CounterStoreError>;

    async fn save(&self, identity: &CounterIdentity, snapshot: &CounterSnapshot) -> Result<(), CounterStoreError>;
}

#[derive(Debug, Clone)]
pub struct SimCountConfig {
    /// Longest gap between samples that is still integrated.
    pub max_gap: Duration,
}

impl Default for SimCountConfig {
    fn default() -> Self {
        Self {
            max_gap: Duration::from_secs(3_600),
        }
    }
}

/// Simulated import/export counter owned by one component adapter.
pub struct SimCounter {
    identity: CounterIdentity,
    backing: Arc<dyn CounterBacking>,
    state: CounterSnapshot,
    config: SimCountConfig,
}

impl SimCounter {
    /// Restores the last saved snapshot for `identity`, or starts at zero.
    pub async fn load(
        identity: CounterIdentity,
        backing: Arc<dyn CounterBacking>,
        config: SimCountConfig,
    ) -> Result<Self, SimCountError> {
        let state = backing
            .load(&identity)
            .await
            .map_err(|source| SimCountError::Store {
                key: identity.key(),
                source,
            })?
            .unwrap_or_default();
        debug!(
            counter = %identity.key(),
            imported = state.imported,
            exported = state.exported,
            "sim counter loaded"
        );

        Ok(Self {
            identity,
            backing,
            state,
            config,
        })
    }

    pub fn identity(&self) -> &CounterIdentity {
        &self.identity
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        self.state
    }

    /// Integrates `power` up to now and returns `(imported, exported)`.
    pub async fn sim_count(&mut self, power: i64) -> Result<(u64, u64), SimCountError> {
        self.sim_count_at(power, unix_ms()).await
    }

    /// Integrates `power` up to `timestamp_ms`. The in-memory state only changes once the
    /// new snapshot has been saved.
    pub async fn sim_count_at(&mut self, power: i64, timestamp_ms: i64) -> Result<(u64, u64), SimCountError> {
        let (next, integration) = self.state.advance(power, timestamp_ms, self.config.max_gap);

        match integration {
            Integration::ClockSkew { elapsed_ms } => {
                warn!(counter = %self.identity.key(), elapsed_ms, "clock went backwards, sample skipped");
            }
            Integration::GapTooLong { elapsed_ms } => {
                warn!(
                    counter = %self.identity.key(),
                    elapsed_ms,
                    max_gap_ms = self.config.max_gap.as_millis(),
                    "sample gap too long, sample skipped"
                );
            }
            Integration::FirstSample | Integration::Accumulated { .. } => {}
        }

        self.backing
            .save(&self.identity, &next)
            .await
            .map_err(|source| SimCountError::Store {
                key: self.identity.key(),
                source,
            })?;
        self.state = next;

        Ok((next.imported, next.exported))
    }
}

fn unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
