use modbus_client::{ClientConfig, ModbusClient, RegisterSource};
use types::DataType;

#[tokio::test]
async fn diagslave_integration_read() {
    let host = match std::env::var("MODBUS_TEST_HOST") {
        Ok(value) => value,
        Err(_) => return,
    };

    let port = env_u16("MODBUS_TEST_PORT").unwrap_or(1502);
    let unit_id = env_u16("MODBUS_TEST_UNIT_ID").unwrap_or(1) as u8;
    let start = env_u16("MODBUS_TEST_START").unwrap_or(0);
    let count = env_u16("MODBUS_TEST_COUNT").unwrap_or(8);
    let max_batch = env_u16("MODBUS_TEST_MAX_BATCH").unwrap_or(2);

    let config = ClientConfig {
        host,
        port,
        max_batch_size: Some(max_batch),
        timeout_ms: env_u64("MODBUS_TEST_TIMEOUT_MS").unwrap_or(1_000),
        retry_count: 1,
        retry_backoff_ms: 100,
        retry_max_backoff_ms: 500,
        ..ClientConfig::default()
    };

    let client = ModbusClient::connect(config).await.expect("connect");
    let values = client
        .read_range(unit_id, start, count)
        .await
        .expect("read");
    assert_eq!(values.len() as u16, count);

    let values = client
        .read_values(unit_id, start, &[DataType::UInt32, DataType::Int16])
        .await
        .expect("read values");
    assert_eq!(values.len(), 2);
}

fn env_u16(key: &str) -> Option<u16> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}
