//! Codec for bitlists. The datatype itself is opaque (raw bytes plus a bit length);
//! serialization copies the raw bytes, hashing packs the payload and mixes in the bit
//! count against a `ceil(capacity / 256)` chunk limit.

use super::{mismatch, Codec};
use crate::error::Error;
use crate::merkleize::{bitwise_merkleize, mix_in_length, pack};
use crate::value::{Bitlist, Value};
use crate::Hash256;

pub(crate) struct BitlistCodec {
    /// Descriptor-level capacity in bits (0 = caller supplies).
    pub limit: u64,
}

impl Codec for BitlistCodec {
    fn marshal_to(&self, value: &Value, buf: &mut [u8], start: u64) -> Result<u64, Error> {
        match value {
            Value::Bitlist(bitlist) => {
                let raw = bitlist.raw();
                let start = start as usize;
                buf[start..start + raw.len()].copy_from_slice(raw);
                Ok((start + raw.len()) as u64)
            }
            other => Err(mismatch("bitlist", other)),
        }
    }

    fn unmarshal_from(&self, input: &[u8], dest: &mut Value, start: u64) -> Result<u64, Error> {
        let frame = input.get(start as usize..).ok_or(Error::Truncated {
            len: input.len(),
            expected: start as usize,
        })?;
        match dest {
            Value::Bitlist(slot) => {
                *slot = Bitlist::from_raw(frame.to_vec())?;
                Ok(input.len() as u64)
            }
            other => Err(mismatch("bitlist", other)),
        }
    }

    fn hash_tree_root(&self, value: &Value, max_capacity: u64) -> Result<Hash256, Error> {
        let bitlist = match value {
            Value::Bitlist(bitlist) => bitlist,
            other => return Err(mismatch("bitlist", other)),
        };
        let capacity = if max_capacity != 0 {
            max_capacity
        } else {
            self.limit
        };
        let limit = (capacity + 255) / 256;
        if bitlist.raw().is_empty() {
            let root = bitwise_merkleize(&[], limit, true)?;
            return Ok(mix_in_length(&root, 0));
        }
        let payload = bitlist.payload();
        let chunks = pack(&[&payload]);
        let root = bitwise_merkleize(&chunks, limit, true)?;
        Ok(mix_in_length(&root, bitlist.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_and_zero_bit_bitlists_share_a_root() {
        let codec = BitlistCodec { limit: 8 };
        let absent = codec
            .hash_tree_root(&Value::Bitlist(Bitlist::empty()), 0)
            .unwrap();
        let zero_bits = codec
            .hash_tree_root(
                &Value::Bitlist(Bitlist::from_raw(vec![0x01]).unwrap()),
                0,
            )
            .unwrap();
        assert_eq!(absent, zero_bits);
    }

    #[test]
    fn bitlist_root_mixes_in_bit_length() {
        let codec = BitlistCodec { limit: 8 };
        let bitlist = Bitlist::from_raw(vec![0x0b]).unwrap();
        let root = codec.hash_tree_root(&Value::Bitlist(bitlist), 0).unwrap();

        let mut chunk = [0u8; 32];
        chunk[0] = 0x03;
        let expected = mix_in_length(&Hash256::from(chunk), 3);
        assert_eq!(root, expected);
    }
}
