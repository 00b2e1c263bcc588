use std::fmt;

use serde::{Deserialize, Serialize};

/// Register encodings a device can declare for a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
}

impl DataType {
    /// Number of 16-bit holding registers the value occupies.
    pub fn register_count(self) -> u16 {
        match self {
            DataType::Int16 | DataType::UInt16 => 1,
            DataType::Int32 | DataType::UInt32 | DataType::Float32 => 2,
            DataType::Int64 | DataType::UInt64 => 4,
        }
    }
}

/// Raw point values before any vendor scaling is applied.
///
/// The variant is the declared width; two values of different widths never compare equal,
/// even when their numeric value is the same.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PointValue {
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
}

impl PointValue {
    pub fn data_type(&self) -> DataType {
        match self {
            PointValue::I16(_) => DataType::Int16,
            PointValue::U16(_) => DataType::UInt16,
            PointValue::I32(_) => DataType::Int32,
            PointValue::U32(_) => DataType::UInt32,
            PointValue::I64(_) => DataType::Int64,
            PointValue::U64(_) => DataType::UInt64,
            PointValue::F32(_) => DataType::Float32,
        }
    }

    /// Integer view of the value. `None` for floats and for u64 values above `i64::MAX`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            PointValue::I16(v) => Some(i64::from(v)),
            PointValue::U16(v) => Some(i64::from(v)),
            PointValue::I32(v) => Some(i64::from(v)),
            PointValue::U32(v) => Some(i64::from(v)),
            PointValue::I64(v) => Some(v),
            PointValue::U64(v) => i64::try_from(v).ok(),
            PointValue::F32(_) => None,
        }
    }

    /// Non-negative integer view, used for cumulative counters.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            PointValue::U64(v) => Some(v),
            PointValue::F32(_) => None,
            other => other.as_i64().and_then(|v| u64::try_from(v).ok()),
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            PointValue::I16(v) => f64::from(v),
            PointValue::U16(v) => f64::from(v),
            PointValue::I32(v) => f64::from(v),
            PointValue::U32(v) => f64::from(v),
            PointValue::I64(v) => v as f64,
            PointValue::U64(v) => v as f64,
            PointValue::F32(v) => f64::from(v),
        }
    }
}

impl fmt::Display for PointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointValue::I16(v) => write!(f, "{v}i16"),
            PointValue::U16(v) => write!(f, "{v}u16"),
            PointValue::I32(v) => write!(f, "{v}i32"),
            PointValue::U32(v) => write!(f, "{v}u32"),
            PointValue::I64(v) => write!(f, "{v}i64"),
            PointValue::U64(v) => write!(f, "{v}u64"),
            PointValue::F32(v) => write!(f, "{v}f32"),
        }
    }
}

/// One value read from a device register or field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub address: u16,
    pub value: PointValue,
}

impl RawReading {
    pub fn new(address: u16, value: PointValue) -> Self {
        Self { address, value }
    }
}

/// Basic identity for a polled endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub device_id: u32,
    pub host: String,
}

/// Normalized inverter snapshot. Power in W, energies in Wh, currents in A.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InverterState {
    pub power: i64,
    pub dc_power: Option<i64>,
    pub currents: Option<[f64; 3]>,
    pub imported: u64,
    pub exported: u64,
}

/// Normalized battery snapshot. `soc` is a percentage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatState {
    pub power: i64,
    pub soc: u32,
    pub imported: u64,
    pub exported: u64,
}

/// Normalized meter snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CounterState {
    pub power: i64,
    pub imported: u64,
    pub exported: u64,
}
