use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use types::PointValue;

use crate::{encode, ClientError, RegisterSource};

/// In-memory register map standing in for a device.
///
/// Unset registers read as zero. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegisters {
    registers: Arc<Mutex<HashMap<u16, u16>>>,
    offline: Arc<AtomicBool>,
}

impl InMemoryRegisters {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn write_registers(&self, start: u16, words: &[u16]) {
        let mut registers = self.registers.lock().await;
        for (offset, word) in words.iter().enumerate() {
            registers.insert(start.wrapping_add(offset as u16), *word);
        }
    }

    pub async fn write_value(&self, address: u16, value: PointValue) {
        self.write_registers(address, &encode(value)).await;
    }

    /// While offline every read fails with a timeout.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl RegisterSource for InMemoryRegisters {
    async fn read_registers(
        &self,
        _unit_id: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, ClientError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ClientError::Timeout { timeout_ms: 0 });
        }

        let registers = self.registers.lock().await;
        let mut values = Vec::with_capacity(count as usize);
        for offset in 0..count {
            let address = u16::try_from(u32::from(start) + u32::from(offset))
                .map_err(|_| ClientError::AddressOverflow)?;
            values.push(*registers.get(&address).unwrap_or(&0));
        }
        Ok(values)
    }
}
