//! Codec for pointer-indirected values: an absent pointer serializes to the empty
//! byte string and merkleizes as 32 zero bytes.

use super::{mismatch, Codec, SszUtils};
use crate::descriptor::TypeDescriptor;
use crate::error::Error;
use crate::value::Value;
use crate::Hash256;
use std::sync::Arc;

pub(crate) struct PointerCodec {
    pub inner: Arc<SszUtils>,
    pub pointee: TypeDescriptor,
}

impl Codec for PointerCodec {
    fn marshal_to(&self, value: &Value, buf: &mut [u8], start: u64) -> Result<u64, Error> {
        match value {
            Value::Pointer(p) => match &p.value {
                None => Ok(start),
                Some(inner) => self.inner.marshal_to(inner, buf, start),
            },
            other => Err(mismatch("pointer", other)),
        }
    }

    fn unmarshal_from(&self, input: &[u8], dest: &mut Value, start: u64) -> Result<u64, Error> {
        match dest {
            Value::Pointer(p) => {
                // An empty sub-frame is the serialization of an absent pointer.
                if input.len() as u64 <= start {
                    p.value = None;
                    return Ok(start);
                }
                let inner = p
                    .value
                    .get_or_insert_with(|| Box::new(self.pointee.zero_value()));
                self.inner.unmarshal_from(input, inner, start)
            }
            _ => Err(Error::NonPointerDestination),
        }
    }

    fn hash_tree_root(&self, value: &Value, max_capacity: u64) -> Result<Hash256, Error> {
        match value {
            Value::Pointer(p) => match &p.value {
                None => Ok(Hash256::zero()),
                Some(inner) => self.inner.hash_tree_root(inner, max_capacity),
            },
            other => Err(mismatch("pointer", other)),
        }
    }
}
