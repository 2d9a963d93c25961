//! Codec for byte strings: fixed-length byte vectors and variable-length byte lists.

use super::{basic_type_root, mismatch, Codec};
use crate::error::Error;
use crate::merkleize::{bitwise_merkleize, mix_in_length, pack};
use crate::value::Value;
use crate::Hash256;

pub(crate) struct BytesCodec {
    /// `Some(n)` for byte-vector(n), `None` for a byte list.
    pub fixed_len: Option<usize>,
    /// Descriptor-level capacity for byte lists (0 = caller supplies).
    pub limit: u64,
}

impl BytesCodec {
    fn value_bytes<'a>(&self, value: &'a Value) -> Result<&'a [u8], Error> {
        match value {
            Value::ByteVector(bytes) | Value::ByteList(bytes) => Ok(bytes),
            other => Err(mismatch("byte string", other)),
        }
    }
}

impl Codec for BytesCodec {
    fn marshal_to(&self, value: &Value, buf: &mut [u8], start: u64) -> Result<u64, Error> {
        let bytes = self.value_bytes(value)?;
        let start = start as usize;
        buf[start..start + bytes.len()].copy_from_slice(bytes);
        Ok((start + bytes.len()) as u64)
    }

    fn unmarshal_from(&self, input: &[u8], dest: &mut Value, start: u64) -> Result<u64, Error> {
        let start = start as usize;
        let (bytes, end) = match self.fixed_len {
            Some(len) => {
                let bytes = input.get(start..start + len).ok_or(Error::Truncated {
                    len: input.len(),
                    expected: start + len,
                })?;
                (bytes, start + len)
            }
            // A byte list consumes the entire remaining frame it is given.
            None => {
                let bytes = input.get(start..).ok_or(Error::Truncated {
                    len: input.len(),
                    expected: start,
                })?;
                (bytes, input.len())
            }
        };
        match dest {
            Value::ByteVector(slot) | Value::ByteList(slot) => {
                slot.clear();
                slot.extend_from_slice(bytes);
                Ok(end as u64)
            }
            other => Err(mismatch("byte string", other)),
        }
    }

    fn hash_tree_root(&self, value: &Value, max_capacity: u64) -> Result<Hash256, Error> {
        match self.fixed_len {
            // Byte vectors hash like any other basic-chunked fixed value.
            Some(_) => basic_type_root(self, value),
            None => {
                let bytes = self.value_bytes(value)?;
                let capacity = if max_capacity != 0 {
                    max_capacity
                } else {
                    self.limit
                };
                let limit = ((capacity + 31) / 32).max(1);
                let chunks = pack(&[bytes]);
                let root = bitwise_merkleize(&chunks, limit, true)?;
                Ok(mix_in_length(&root, bytes.len() as u64))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Hash256;

    #[test]
    fn byte_vector_marshal_is_identity() {
        let codec = BytesCodec {
            fixed_len: Some(4),
            limit: 0,
        };
        let mut buf = [0u8; 4];
        codec
            .marshal_to(&Value::ByteVector(vec![1, 2, 3, 4]), &mut buf, 0)
            .unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn byte_list_consumes_whole_frame() {
        let codec = BytesCodec {
            fixed_len: None,
            limit: 0,
        };
        let mut dest = Value::ByteList(vec![9, 9]);
        let end = codec.unmarshal_from(&[5, 6, 7], &mut dest, 0).unwrap();
        assert_eq!(end, 3);
        assert_eq!(dest, Value::ByteList(vec![5, 6, 7]));
    }

    #[test]
    fn short_byte_vector_input_is_truncated() {
        let codec = BytesCodec {
            fixed_len: Some(4),
            limit: 0,
        };
        let mut dest = Value::ByteVector(vec![0; 4]);
        assert_eq!(
            codec.unmarshal_from(&[1, 2], &mut dest, 0),
            Err(Error::Truncated {
                len: 2,
                expected: 4,
            })
        );
    }

    #[test]
    fn small_byte_vector_root_is_padded_chunk() {
        let codec = BytesCodec {
            fixed_len: Some(4),
            limit: 0,
        };
        let root = codec
            .hash_tree_root(&Value::ByteVector(vec![1, 2, 3, 4]), 0)
            .unwrap();
        let mut expected = [0u8; 32];
        expected[0..4].copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(root, Hash256::from(expected));
    }

    #[test]
    fn byte_list_root_mixes_in_length() {
        let codec = BytesCodec {
            fixed_len: None,
            limit: 0,
        };
        let root = codec
            .hash_tree_root(&Value::ByteList(vec![1, 2, 3, 4]), 0)
            .unwrap();
        let mut chunk = [0u8; 32];
        chunk[0..4].copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(root, mix_in_length(&Hash256::from(chunk), 4));
    }
}
