use modbus_client::{ClientError, InMemoryRegisters, RegisterSource};
use types::{DataType, PointValue};

#[tokio::test]
async fn reads_consecutive_values_in_one_request() {
    let registers = InMemoryRegisters::new();
    registers.write_value(30977, PointValue::I32(-1_500)).await;
    registers.write_value(30979, PointValue::I32(i32::MIN)).await;
    registers.write_value(30981, PointValue::I32(2_000)).await;

    let values = registers
        .read_values(1, 30977, &[DataType::Int32; 3])
        .await
        .expect("read");
    assert_eq!(
        values,
        vec![
            PointValue::I32(-1_500),
            PointValue::I32(i32::MIN),
            PointValue::I32(2_000)
        ]
    );
}

#[tokio::test]
async fn single_value_keeps_declared_width() {
    let registers = InMemoryRegisters::new();
    registers.write_value(31397, PointValue::U64(u64::MAX)).await;

    let wide = registers
        .read_value(1, 31397, DataType::UInt64)
        .await
        .expect("read");
    assert_eq!(wide, PointValue::U64(u64::MAX));

    let narrow = registers
        .read_value(1, 31397, DataType::UInt32)
        .await
        .expect("read");
    assert_eq!(narrow, PointValue::U32(u32::MAX));
    assert_ne!(wide, narrow);
}

#[tokio::test]
async fn offline_map_times_out() {
    let registers = InMemoryRegisters::new();
    registers.set_offline(true);

    let err = registers
        .read_value(1, 30775, DataType::Int32)
        .await
        .expect_err("offline");
    assert!(matches!(err, ClientError::Timeout { .. }));
}
