//! Reserved raw encodings that mean "this sensor has no valid reading".
//!
//! Each vendor family has a fixed [`SentinelTable`]. A sentinel only matches a reading of
//! the same declared width: `0xFFFF_FFFF` as a u32 is a sentinel for SMA, the same number
//! inside a u64 register is a perfectly good counter value.
//!
//! Fields are checked under one of two policies. Counters and other values that must always
//! be plausible go through [`Plausibility::require_counter`], which collects rejections so
//! the whole cycle can abort with every offending raw value. Fields that may legitimately be
//! absent are checked with [`SentinelTable::validate`] and the caller substitutes a default.

use std::fmt;

use thiserror::Error;
use types::{PointValue, RawReading};

#[derive(Debug, Clone, Copy)]
pub struct SentinelTable {
    vendor: &'static str,
    values: &'static [PointValue],
}

/// SMA marks missing values with the all-ones pattern for unsigned registers and the
/// minimum value for signed ones.
pub const SMA: SentinelTable = SentinelTable::new(
    "sma",
    &[
        PointValue::I16(i16::MIN),
        PointValue::U16(u16::MAX),
        PointValue::I32(i32::MIN),
        PointValue::U32(u32::MAX),
        PointValue::I64(i64::MIN),
        PointValue::U64(u64::MAX),
        PointValue::F32(f32::NAN),
    ],
);

impl SentinelTable {
    pub const fn new(vendor: &'static str, values: &'static [PointValue]) -> Self {
        Self { vendor, values }
    }

    pub fn vendor(&self) -> &'static str {
        self.vendor
    }

    pub fn is_sentinel(&self, value: &PointValue) -> bool {
        self.values.iter().any(|sentinel| same_encoding(sentinel, value))
    }

    /// Returns the value unchanged, or `None` when it is this vendor's "no data" marker.
    pub fn validate(&self, value: PointValue) -> Option<PointValue> {
        if self.is_sentinel(&value) {
            None
        } else {
            Some(value)
        }
    }
}

fn same_encoding(sentinel: &PointValue, value: &PointValue) -> bool {
    match (sentinel, value) {
        (PointValue::F32(a), PointValue::F32(b)) if a.is_nan() => b.is_nan(),
        _ => sentinel == value,
    }
}

/// Why a reading was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Sentinel,
    /// A cumulative counter that is negative or not an integer.
    NotACounter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedReading {
    pub field: &'static str,
    pub address: u16,
    pub raw: PointValue,
    pub reason: Rejection,
}

impl fmt::Display for RejectedReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}={}", self.field, self.address, self.raw)
    }
}

/// A must-be-plausible reading carried no valid data. The device is likely defective or
/// miswired; nothing from this cycle may be stored.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("implausible {vendor} readings: {}", join(.readings))]
pub struct SentinelRejected {
    pub vendor: &'static str,
    pub readings: Vec<RejectedReading>,
}

fn join(readings: &[RejectedReading]) -> String {
    readings
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Collects rejections for the must-be-plausible fields of one update cycle.
#[derive(Debug)]
pub struct Plausibility<'a> {
    table: &'a SentinelTable,
    rejected: Vec<RejectedReading>,
}

impl<'a> Plausibility<'a> {
    pub fn new(table: &'a SentinelTable) -> Self {
        Self {
            table,
            rejected: Vec::new(),
        }
    }

    /// Cumulative counter value. A sentinel, negative or fractional reading is recorded as
    /// rejected and `0` is returned; [`Plausibility::finish`] then fails the cycle.
    pub fn require_counter(&mut self, field: &'static str, reading: RawReading) -> u64 {
        if self.table.is_sentinel(&reading.value) {
            self.reject(field, reading, Rejection::Sentinel);
            return 0;
        }
        match reading.value.as_u64() {
            Some(value) => value,
            None => {
                self.reject(field, reading, Rejection::NotACounter);
                0
            }
        }
    }

    fn reject(&mut self, field: &'static str, reading: RawReading, reason: Rejection) {
        self.rejected.push(RejectedReading {
            field,
            address: reading.address,
            raw: reading.value,
            reason,
        });
    }

    pub fn finish(self) -> Result<(), SentinelRejected> {
        if self.rejected.is_empty() {
            Ok(())
        } else {
            Err(SentinelRejected {
                vendor: self.table.vendor,
                readings: self.rejected,
            })
        }
    }
}
