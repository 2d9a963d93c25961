//! Codec for containers: fixed parts at a rolling cursor with backfilled offsets for
//! variable tails, a two-pass decode, and field-root merkleization.

use super::{mismatch, read_offset, sanitize_offset, write_offset, Codec, SszUtils};
use crate::descriptor::{conforms, TypeDescriptor};
use crate::error::Error;
use crate::hash_cache;
use crate::merkleize::{bitwise_merkleize, Chunk};
use crate::size::determine_size;
use crate::value::Value;
use crate::{Hash256, BYTES_PER_LENGTH_OFFSET};
use smallvec::SmallVec;
use std::sync::Arc;

const OFFSET_WIDTH: u64 = BYTES_PER_LENGTH_OFFSET as u64;

pub(crate) struct ResolvedField {
    pub td: TypeDescriptor,
    /// The `ssz-max` capacity this field passes to its hasher (0 = absent).
    pub capacity: u64,
    pub variable: bool,
    pub utils: Arc<SszUtils>,
}

pub(crate) struct ContainerCodec {
    pub fields: Vec<ResolvedField>,
}

impl ContainerCodec {
    fn check_field_count(&self, len: usize) -> Result<(), Error> {
        if len != self.fields.len() {
            return Err(Error::UnsupportedType(format!(
                "container value has {} fields, schema declares {}",
                len,
                self.fields.len()
            )));
        }
        Ok(())
    }
}

impl Codec for ContainerCodec {
    fn marshal_to(&self, value: &Value, buf: &mut [u8], start: u64) -> Result<u64, Error> {
        let container = match value {
            Value::Container(c) => c,
            other => return Err(mismatch("container", other)),
        };
        self.check_field_count(container.fields.len())?;

        // Total length of the fixed part: fixed fields at their serialized widths,
        // variable fields as offset slots.
        let mut fixed_length = 0;
        for (field, v) in self.fields.iter().zip(&container.fields) {
            fixed_length += if field.variable {
                OFFSET_WIDTH
            } else {
                determine_size(v)
            };
        }

        let mut fixed_index = start;
        let mut current = start + fixed_length;
        for (field, v) in self.fields.iter().zip(&container.fields) {
            if !field.variable {
                fixed_index = field.utils.marshal_to(v, buf, fixed_index)?;
            } else {
                let next = field.utils.marshal_to(v, buf, current)?;
                write_offset(buf, fixed_index, current - start);
                fixed_index += OFFSET_WIDTH;
                current = next;
            }
        }
        Ok(current)
    }

    fn unmarshal_from(&self, input: &[u8], dest: &mut Value, start: u64) -> Result<u64, Error> {
        let container = match dest {
            Value::Container(c) => c,
            other => return Err(mismatch("container", other)),
        };
        self.check_field_count(container.fields.len())?;
        for (field, v) in self.fields.iter().zip(container.fields.iter_mut()) {
            if !conforms(v, &field.td) {
                *v = field.td.zero_value();
            }
        }

        let frame_len = input.len() as u64;
        let mut cursor = start;
        let mut offsets: SmallVec<[(usize, u64); 8]> = SmallVec::new();
        for (i, field) in self.fields.iter().enumerate() {
            if !field.variable {
                cursor = field
                    .utils
                    .unmarshal_from(input, &mut container.fields[i], cursor)?;
            } else {
                let offset = read_offset(input.get(cursor as usize..).unwrap_or(&[]))?;
                let offset = sanitize_offset(
                    start + offset,
                    offsets.last().map(|(_, o)| *o),
                    frame_len,
                )?;
                offsets.push((i, offset));
                cursor += OFFSET_WIDTH;
            }
        }

        // Second pass: slice the input between successive offsets (frame end for the
        // last) and decode each variable tail into its field.
        for (k, (i, offset)) in offsets.iter().enumerate() {
            let end = offsets.get(k + 1).map(|(_, o)| *o).unwrap_or(frame_len);
            let frame = &input[*offset as usize..end as usize];
            self.fields[*i]
                .utils
                .unmarshal_from(frame, &mut container.fields[*i], 0)?;
        }

        if offsets.is_empty() {
            Ok(cursor)
        } else {
            Ok(frame_len)
        }
    }

    fn hash_tree_root(&self, value: &Value, _max_capacity: u64) -> Result<Hash256, Error> {
        let container = match value {
            Value::Container(c) => c,
            other => return Err(mismatch("container", other)),
        };
        self.check_field_count(container.fields.len())?;
        let mut roots: Vec<Chunk> = Vec::with_capacity(self.fields.len());
        for (field, v) in self.fields.iter().zip(&container.fields) {
            let root = hash_cache::lookup(&field.utils, v, field.capacity)?;
            roots.push(root.to_fixed_bytes());
        }
        bitwise_merkleize(&roots, self.fields.len() as u64, true)
    }
}
