use types::{DataType, PointValue};

use crate::ClientError;

/// Assembles the registers of one value, high word first.
pub fn decode(address: u16, data_type: DataType, words: &[u16]) -> Result<PointValue, ClientError> {
    let expected = data_type.register_count() as usize;
    if words.len() < expected {
        return Err(ClientError::ShortRead {
            address,
            expected,
            actual: words.len(),
        });
    }

    let raw = words[..expected]
        .iter()
        .fold(0u64, |acc, word| (acc << 16) | u64::from(*word));

    let value = match data_type {
        DataType::Int16 => PointValue::I16(raw as u16 as i16),
        DataType::UInt16 => PointValue::U16(raw as u16),
        DataType::Int32 => PointValue::I32(raw as u32 as i32),
        DataType::UInt32 => PointValue::U32(raw as u32),
        DataType::Int64 => PointValue::I64(raw as i64),
        DataType::UInt64 => PointValue::U64(raw),
        DataType::Float32 => PointValue::F32(f32::from_bits(raw as u32)),
    };
    Ok(value)
}

/// Splits a value into registers, high word first.
pub fn encode(value: PointValue) -> Vec<u16> {
    let (raw, count) = match value {
        PointValue::I16(v) => (u64::from(v as u16), 1),
        PointValue::U16(v) => (u64::from(v), 1),
        PointValue::I32(v) => (u64::from(v as u32), 2),
        PointValue::U32(v) => (u64::from(v), 2),
        PointValue::I64(v) => (v as u64, 4),
        PointValue::U64(v) => (v, 4),
        PointValue::F32(v) => (u64::from(v.to_bits()), 2),
    };

    (0..count)
        .rev()
        .map(|index| (raw >> (16 * index)) as u16)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_signed_32_bit_high_word_first() {
        let value = decode(30775, DataType::Int32, &[0xFFFF, 0xFFCE]).expect("decode");
        assert_eq!(value, PointValue::I32(-50));
    }

    #[test]
    fn decodes_64_bit_all_ones() {
        let value = decode(31397, DataType::UInt64, &[0xFFFF; 4]).expect("decode");
        assert_eq!(value, PointValue::U64(u64::MAX));
    }

    #[test]
    fn short_read_is_reported() {
        let err = decode(30529, DataType::UInt32, &[1]).expect_err("short");
        assert!(matches!(
            err,
            ClientError::ShortRead {
                address: 30529,
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn encode_matches_decode_layout() {
        assert_eq!(encode(PointValue::I32(i32::MIN)), vec![0x8000, 0x0000]);
        assert_eq!(encode(PointValue::U64(1)), vec![0, 0, 0, 1]);
        assert_eq!(encode(PointValue::I16(-1)), vec![0xFFFF]);
    }
}
