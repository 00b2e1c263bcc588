use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{CounterBacking, CounterIdentity, CounterSnapshot, CounterStoreError};

/// Process-local counter backing. Clones share the same map, so a fresh [`crate::SimCounter`]
/// loaded from a clone sees what an earlier one saved.
#[derive(Debug, Clone, Default)]
pub struct MemoryCounterStore {
    snapshots: Arc<Mutex<HashMap<CounterIdentity, CounterSnapshot>>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a baseline, e.g. totals carried over from an earlier installation.
    pub async fn seed(&self, identity: CounterIdentity, snapshot: CounterSnapshot) {
        self.snapshots.lock().await.insert(identity, snapshot);
    }

    pub async fn get(&self, identity: &CounterIdentity) -> Option<CounterSnapshot> {
        self.snapshots.lock().await.get(identity).copied()
    }
}

#[async_trait]
impl CounterBacking for MemoryCounterStore {
    async fn load(&self, identity: &CounterIdentity) -> Result<Option<CounterSnapshot>, CounterStoreError> {
        Ok(self.get(identity).await)
    }

    async fn save(&self, identity: &CounterIdentity, snapshot: &CounterSnapshot) -> Result<(), CounterStoreError> {
        self.snapshots
            .lock()
            .await
            .insert(identity.clone(), *snapshot);
        Ok(())
    }
}
