use std::cmp::min;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tokio_modbus::client::tcp;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::{Reader, Slave, SlaveContext};
use tracing::{debug, warn};
use types::{DataType, PointValue};

mod codec;
mod memory;

pub use codec::{decode, encode};
pub use memory::InMemoryRegisters;

/// Configuration options for connecting and polling a Modbus TCP device.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Maximum number of registers to read in a single request; devices with quirks may require lower batch sizes.
    pub max_batch_size: Option<u16>,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Number of retries per request after the initial attempt.
    pub retry_count: usize,
    /// Base delay between retries in milliseconds (exponential backoff).
    pub retry_backoff_ms: u64,
    /// Upper bound for retry backoff delay in milliseconds.
    pub retry_max_backoff_ms: u64,
    /// Optional delay between split reads to placate slower devices.
    pub inter_read_delay_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 502,
            max_batch_size: None,
            timeout_ms: 1_000,
            retry_count: 2,
            retry_backoff_ms: 100,
            retry_max_backoff_ms: 2_000,
            inter_read_delay_ms: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid socket address {0}:{1}")]
    InvalidAddress(String, u16),
    #[error("modbus transport error: {0}")]
    Modbus(std::io::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("register address overflow")]
    AddressOverflow,
    #[error("short read at {address}: expected {expected} registers, got {actual}")]
    ShortRead {
        address: u16,
        expected: usize,
        actual: usize,
    },
}

/// Anything that can hand out holding registers of one Modbus endpoint.
///
/// Values wider than one register are assembled high word first.
#[async_trait]
pub trait RegisterSource: Send + Sync {
    async fn read_registers(
        &self,
        unit_id: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, ClientError>;

    async fn read_value(
        &self,
        unit_id: u8,
        address: u16,
        data_type: DataType,
    ) -> Result<PointValue, ClientError> {
        let words = self
            .read_registers(unit_id, address, data_type.register_count())
            .await?;
        decode(address, data_type, &words)
    }

    /// Reads consecutive values starting at `address` in one request.
    async fn read_values(
        &self,
        unit_id: u8,
        address: u16,
        data_types: &[DataType],
    ) -> Result<Vec<PointValue>, ClientError> {
        let total: u32 = data_types
            .iter()
            .map(|data_type| u32::from(data_type.register_count()))
            .sum();
        let count = u16::try_from(total).map_err(|_| ClientError::AddressOverflow)?;
        let words = self.read_registers(unit_id, address, count).await?;

        let mut values = Vec::with_capacity(data_types.len());
        let mut offset = 0usize;
        for data_type in data_types {
            let width = data_type.register_count() as usize;
            let end = min(offset + width, words.len());
            let value_address = u16::try_from(u32::from(address) + offset as u32)
                .map_err(|_| ClientError::AddressOverflow)?;
            values.push(decode(value_address, *data_type, &words[offset..end])?);
            offset += width;
        }
        Ok(values)
    }
}

#[derive(Debug)]
pub struct ModbusClient {
    config: ClientConfig,
    context: Mutex<Context>,
}

impl ModbusClient {
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let addr = format!("{}:{}", config.host, config.port)
            .parse::<SocketAddr>()
            .map_err(|_| ClientError::InvalidAddress(config.host.clone(), config.port))?;
        let context = tcp::connect(addr).await?;
        Ok(Self {
            config,
            context: Mutex::new(context),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn read_range(&self, unit_id: u8, start: u16, count: u16) -> Result<Vec<u16>, ClientError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut ctx = self.context.lock().await;
        let batch_size = self
            .config
            .max_batch_size
            .unwrap_or(count)
            .max(1u16);
        let mut remaining = count;
        let mut offset = 0u16;
        let mut out = Vec::with_capacity(count as usize);

        while remaining > 0 {
            let chunk = min(remaining, batch_size);
            let chunk_start = u16::try_from(u32::from(start) + u32::from(offset))
                .map_err(|_| ClientError::AddressOverflow)?;
            let values = self
                .read_chunk(&mut ctx, unit_id, chunk_start, chunk)
                .await?;
            out.extend(values);
            remaining -= chunk;
            offset += chunk;

            if remaining > 0 {
                if let Some(delay_ms) = self.config.inter_read_delay_ms {
                    sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }

        Ok(out)
    }

    async fn read_chunk(
        &self,
        ctx: &mut Context,
        unit_id: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, ClientError> {
        ctx.set_slave(Slave(unit_id));
        let mut attempts = 0usize;
        let mut last_error = None;

        loop {
            let request = ctx.read_holding_registers(start, count);
            let result = timeout(Duration::from_millis(self.config.timeout_ms), request).await;
            match result {
                Ok(Ok(values)) => {
                    debug!(unit_id, start, count, "modbus read ok");
                    return Ok(values);
                }
                Ok(Err(err)) => {
                    warn!(unit_id, start, count, error = %err, "modbus read error");
                    last_error = Some(ClientError::Modbus(err));
                }
                Err(_) => {
                    warn!(unit_id, start, count, "modbus read timeout");
                    last_error = Some(ClientError::Timeout {
                        timeout_ms: self.config.timeout_ms,
                    });
                }
            }

            if attempts >= self.config.retry_count {
                return Err(last_error.unwrap_or(ClientError::Timeout {
                    timeout_ms: self.config.timeout_ms,
                }));
            }

            let delay_ms = retry_delay_ms(&self.config, attempts);
            attempts += 1;
            sleep(Duration::from_millis(delay_ms)).await;
        }
    }
}

#[async_trait]
impl RegisterSource for ModbusClient {
    async fn read_registers(
        &self,
        unit_id: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, ClientError> {
        self.read_range(unit_id, start, count).await
    }
}

fn retry_delay_ms(config: &ClientConfig, attempt: usize) -> u64 {
    let base = config.retry_backoff_ms.max(1);
    let shift = u32::try_from(attempt).unwrap_or(u32::MAX);
    let factor = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
    let delay = base.saturating_mul(factor);
    let max = config.retry_max_backoff_ms.max(base);
    min(delay, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_doubles_until_capped() {
        let config = ClientConfig {
            retry_backoff_ms: 100,
            retry_max_backoff_ms: 500,
            ..ClientConfig::default()
        };
        assert_eq!(retry_delay_ms(&config, 0), 100);
        assert_eq!(retry_delay_ms(&config, 1), 200);
        assert_eq!(retry_delay_ms(&config, 2), 400);
        assert_eq!(retry_delay_ms(&config, 3), 500);
        assert_eq!(retry_delay_ms(&config, 80), 500);
    }
}
