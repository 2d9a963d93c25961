//! Codecs for booleans and unsigned integers.

use super::{basic_type_root, mismatch, Codec};
use crate::error::Error;
use crate::value::Value;
use crate::Hash256;

pub(crate) struct BoolCodec;

impl Codec for BoolCodec {
    fn marshal_to(&self, value: &Value, buf: &mut [u8], start: u64) -> Result<u64, Error> {
        match value {
            Value::Bool(b) => {
                buf[start as usize] = *b as u8;
                Ok(start + 1)
            }
            other => Err(mismatch("bool", other)),
        }
    }

    fn unmarshal_from(&self, input: &[u8], dest: &mut Value, start: u64) -> Result<u64, Error> {
        let byte = *input.get(start as usize).ok_or(Error::Truncated {
            len: input.len(),
            expected: start as usize + 1,
        })?;
        let parsed = match byte {
            0 => false,
            1 => true,
            other => {
                return Err(Error::BytesInvalid(format!(
                    "invalid bool byte: {}",
                    other
                )))
            }
        };
        match dest {
            Value::Bool(slot) => {
                *slot = parsed;
                Ok(start + 1)
            }
            other => Err(mismatch("bool", other)),
        }
    }

    fn hash_tree_root(&self, value: &Value, _max_capacity: u64) -> Result<Hash256, Error> {
        basic_type_root(self, value)
    }
}

/// Little-endian unsigned integer codec, one per width.
///
/// Width-4 destinations also accept `Int32` values when decoding: signed 32-bit
/// integers behave identically to unsigned ones there, while encoding them is
/// rejected.
pub(crate) struct UintCodec {
    pub width: usize,
}

impl Codec for UintCodec {
    fn marshal_to(&self, value: &Value, buf: &mut [u8], start: u64) -> Result<u64, Error> {
        let start = start as usize;
        match (self.width, value) {
            (1, Value::Uint8(x)) => buf[start] = *x,
            (2, Value::Uint16(x)) => buf[start..start + 2].copy_from_slice(&x.to_le_bytes()),
            (4, Value::Uint32(x)) => buf[start..start + 4].copy_from_slice(&x.to_le_bytes()),
            (8, Value::Uint64(x)) => buf[start..start + 8].copy_from_slice(&x.to_le_bytes()),
            (_, Value::Int32(_)) => {
                return Err(Error::UnsupportedType(
                    "signed integers are not serializable".to_string(),
                ))
            }
            (_, other) => return Err(mismatch("uint", other)),
        }
        Ok((start + self.width) as u64)
    }

    fn unmarshal_from(&self, input: &[u8], dest: &mut Value, start: u64) -> Result<u64, Error> {
        let start = start as usize;
        let bytes = input
            .get(start..start + self.width)
            .ok_or(Error::Truncated {
                len: input.len(),
                expected: start + self.width,
            })?;
        match (self.width, dest) {
            (1, Value::Uint8(slot)) => *slot = bytes[0],
            (2, Value::Uint16(slot)) => {
                *slot = u16::from_le_bytes([bytes[0], bytes[1]]);
            }
            (4, Value::Uint32(slot)) => {
                *slot = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
            (4, Value::Int32(slot)) => {
                *slot = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
            (8, Value::Uint64(slot)) => {
                let mut array = [0; 8];
                array.copy_from_slice(bytes);
                *slot = u64::from_le_bytes(array);
            }
            (_, other) => return Err(mismatch("uint", other)),
        }
        Ok((start + self.width) as u64)
    }

    fn hash_tree_root(&self, value: &Value, _max_capacity: u64) -> Result<Hash256, Error> {
        basic_type_root(self, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_marshal_bytes() {
        let codec = BoolCodec;
        let mut buf = [0u8; 1];
        codec.marshal_to(&Value::Bool(true), &mut buf, 0).unwrap();
        assert_eq!(buf, [1]);
        codec.marshal_to(&Value::Bool(false), &mut buf, 0).unwrap();
        assert_eq!(buf, [0]);
    }

    #[test]
    fn bool_rejects_garbage() {
        let codec = BoolCodec;
        let mut dest = Value::Bool(false);
        assert!(matches!(
            codec.unmarshal_from(&[2], &mut dest, 0),
            Err(Error::BytesInvalid(_))
        ));
    }

    #[test]
    fn uint64_little_endian() {
        let codec = UintCodec { width: 8 };
        let mut buf = [0u8; 8];
        codec.marshal_to(&Value::Uint64(4), &mut buf, 0).unwrap();
        assert_eq!(buf, [4, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn int32_decodes_as_unsigned() {
        let codec = UintCodec { width: 4 };
        let mut dest = Value::Int32(0);
        codec
            .unmarshal_from(&[0xff, 0xff, 0xff, 0xff], &mut dest, 0)
            .unwrap();
        assert_eq!(dest, Value::Int32(-1));
    }

    #[test]
    fn int32_does_not_encode() {
        let codec = UintCodec { width: 4 };
        let mut buf = [0u8; 4];
        assert!(matches!(
            codec.marshal_to(&Value::Int32(1), &mut buf, 0),
            Err(Error::UnsupportedType(_))
        ));
    }

    #[test]
    fn truncated_uint() {
        let codec = UintCodec { width: 8 };
        let mut dest = Value::Uint64(0);
        assert_eq!(
            codec.unmarshal_from(&[1, 2, 3], &mut dest, 0),
            Err(Error::Truncated {
                len: 3,
                expected: 8,
            })
        );
    }
}
