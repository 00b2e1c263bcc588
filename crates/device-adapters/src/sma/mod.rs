//! SMA devices reached over Modbus/TCP.

use modbus_client::{ClientError, RegisterSource};
use types::{DataType, RawReading};

mod sunny_boy_bat;
mod sunny_boy_inverter;
mod sunny_island_bat;

pub use sunny_boy_bat::{SmaSunnyBoyBat, SmaSunnyBoyBatSetup};
pub use sunny_boy_inverter::{
    SmaInverterVersion, SmaSunnyBoyInverter, SmaSunnyBoyInverterSetup,
};
pub use sunny_island_bat::{SmaSunnyIslandBat, SmaSunnyIslandBatSetup};

async fn read(
    client: &dyn RegisterSource,
    unit_id: u8,
    address: u16,
    data_type: DataType,
) -> Result<RawReading, ClientError> {
    let value = client.read_value(unit_id, address, data_type).await?;
    Ok(RawReading::new(address, value))
}

/// `N` consecutive values of the same type in one request.
async fn read_block<const N: usize>(
    client: &dyn RegisterSource,
    unit_id: u8,
    address: u16,
    data_type: DataType,
) -> Result<[RawReading; N], ClientError> {
    let values = client.read_values(unit_id, address, &[data_type; N]).await?;
    let width = data_type.register_count();
    let mut readings = [RawReading::new(address, types::PointValue::U16(0)); N];
    for (index, (slot, value)) in readings.iter_mut().zip(values).enumerate() {
        let offset = u16::try_from(index).map_err(|_| ClientError::AddressOverflow)? * width;
        *slot = RawReading::new(
            address.checked_add(offset).ok_or(ClientError::AddressOverflow)?,
            value,
        );
    }
    Ok(readings)
}
