//! Codec for vectors and lists of homogeneous elements.
//!
//! Serialization splits on whether the *element* is fixed-size (elements are simply
//! concatenated) or variable-size (a header of 4-byte offsets precedes the
//! concatenated tails). Hashing splits on whether the element is a basic scalar
//! (serializations are packed into chunks) or composite (element roots become the
//! leaves), with lists additionally mixing in their length.

use super::{mismatch, read_offset, sanitize_offset, write_offset, Codec, SszUtils};
use crate::descriptor::{conforms, TypeDescriptor};
use crate::error::Error;
use crate::hash_cache;
use crate::merkleize::{bitwise_merkleize, mix_in_length, pack, Chunk};
use crate::value::{SequenceValue, Value};
use crate::{Hash256, BYTES_PER_LENGTH_OFFSET};
use smallvec::{smallvec, SmallVec};
use std::sync::Arc;

const OFFSET_WIDTH: u64 = BYTES_PER_LENGTH_OFFSET as u64;

pub(crate) struct SequenceCodec {
    pub elem: Arc<SszUtils>,
    pub elem_td: Arc<TypeDescriptor>,
    /// Declared element count for vectors; `None` for lists.
    pub fixed_count: Option<usize>,
    /// Descriptor-level capacity for lists (0 = caller supplies).
    pub limit: u64,
    pub elem_variable: bool,
    /// True for scalar elements, whose serializations pack directly into chunks.
    pub elem_basic: bool,
    /// Serialized element width when elements are fixed-size.
    pub elem_fixed_size: u64,
}

impl SequenceCodec {
    fn items<'a>(&self, value: &'a Value) -> Result<&'a [Value], Error> {
        match value {
            Value::Vector(seq) | Value::List(seq) => Ok(&seq.items),
            other => Err(mismatch("sequence", other)),
        }
    }

    /// Resizes `seq` to `count` elements of this codec's element descriptor,
    /// preserving any already-decoded prefix whose shape still fits and replacing
    /// everything else with zero values.
    fn grow_items(&self, seq: &mut SequenceValue, count: usize) {
        seq.elem = self.elem_td.clone();
        seq.items.truncate(count);
        for item in seq.items.iter_mut() {
            if !conforms(item, &self.elem_td) {
                *item = self.elem_td.zero_value();
            }
        }
        while seq.items.len() < count {
            seq.items.push(self.elem_td.zero_value());
        }
    }

    fn unmarshal_fixed_elements(
        &self,
        input: &[u8],
        seq: &mut SequenceValue,
        start: u64,
    ) -> Result<u64, Error> {
        match self.fixed_count {
            Some(count) => {
                self.grow_items(seq, count);
                let mut index = start;
                for item in seq.items.iter_mut() {
                    index = self.elem.unmarshal_from(input, item, index)?;
                }
                Ok(index)
            }
            None => {
                // Decode element zero to learn the per-element width, then divide the
                // remaining input by it to find the element count.
                self.grow_items(seq, 1);
                let mut index = self.elem.unmarshal_from(input, &mut seq.items[0], start)?;
                let width = index - start;
                if width == 0 {
                    return Err(Error::BytesInvalid(
                        "list element serializes to zero bytes".to_string(),
                    ));
                }
                let count = ((input.len() as u64 - start) / width) as usize;
                self.grow_items(seq, count);
                for item in seq.items.iter_mut().skip(1) {
                    index = self.elem.unmarshal_from(input, item, index)?;
                }
                Ok(index)
            }
        }
    }

    fn unmarshal_variable_elements(
        &self,
        input: &[u8],
        seq: &mut SequenceValue,
        start: u64,
    ) -> Result<u64, Error> {
        let frame_len = input.len() as u64;
        let table_len = read_offset(input.get(start as usize..).unwrap_or(&[]))?;
        if table_len == 0 || table_len % OFFSET_WIDTH != 0 {
            return Err(Error::OffsetOutOfBounds(table_len));
        }
        let first = sanitize_offset(start + table_len, None, frame_len)?;
        let count = (table_len / OFFSET_WIDTH) as usize;
        if let Some(declared) = self.fixed_count {
            if count != declared {
                return Err(Error::BytesInvalid(format!(
                    "expected {} elements, found {}",
                    declared, count
                )));
            }
        }

        let mut offsets: SmallVec<[u64; 8]> = smallvec![first];
        for i in 1..count {
            let table_entry = start + i as u64 * OFFSET_WIDTH;
            let offset = read_offset(input.get(table_entry as usize..).unwrap_or(&[]))?;
            let offset = sanitize_offset(start + offset, offsets.last().copied(), frame_len)?;
            offsets.push(offset);
        }

        self.grow_items(seq, count);
        for (i, item) in seq.items.iter_mut().enumerate() {
            let end = offsets.get(i + 1).copied().unwrap_or(frame_len);
            let frame = &input[offsets[i] as usize..end as usize];
            self.elem.unmarshal_from(frame, item, 0)?;
        }
        Ok(start + table_len)
    }

    fn effective_capacity(&self, max_capacity: u64) -> u64 {
        if max_capacity != 0 {
            max_capacity
        } else {
            self.limit
        }
    }

    fn element_roots(&self, items: &[Value]) -> Result<Vec<Chunk>, Error> {
        let mut roots = Vec::with_capacity(items.len());
        for item in items {
            let root = hash_cache::lookup(&self.elem, item, 0)?;
            roots.push(root.to_fixed_bytes());
        }
        Ok(roots)
    }
}

impl Codec for SequenceCodec {
    fn marshal_to(&self, value: &Value, buf: &mut [u8], start: u64) -> Result<u64, Error> {
        let items = self.items(value)?;
        if !self.elem_variable {
            let mut index = start;
            for item in items {
                index = self.elem.marshal_to(item, buf, index)?;
            }
            Ok(index)
        } else {
            // Offsets first, tails after; each offset is relative to this frame.
            let mut fixed_index = start;
            let mut current = start + items.len() as u64 * OFFSET_WIDTH;
            for item in items {
                let next = self.elem.marshal_to(item, buf, current)?;
                write_offset(buf, fixed_index, current - start);
                fixed_index += OFFSET_WIDTH;
                current = next;
            }
            Ok(current)
        }
    }

    fn unmarshal_from(&self, input: &[u8], dest: &mut Value, start: u64) -> Result<u64, Error> {
        let seq = match dest {
            Value::Vector(seq) | Value::List(seq) => seq,
            other => return Err(mismatch("sequence", other)),
        };
        if input.len() as u64 <= start {
            match self.fixed_count {
                None => {
                    self.grow_items(seq, 0);
                    return Ok(start);
                }
                Some(0) => return Ok(start),
                // Non-empty vectors fall through so element decoding reports the
                // truncation.
                Some(_) => {}
            }
        }
        if self.elem_variable {
            self.unmarshal_variable_elements(input, seq, start)
        } else {
            self.unmarshal_fixed_elements(input, seq, start)
        }
    }

    fn hash_tree_root(&self, value: &Value, max_capacity: u64) -> Result<Hash256, Error> {
        let items = self.items(value)?;
        match self.fixed_count {
            // Vectors: no length mix-in.
            Some(_) => {
                if self.elem_basic {
                    let buf = super::marshaled_bytes(self, value)?;
                    let chunks = pack(&[&buf]);
                    let limit = (items.len() as u64 * self.elem_fixed_size + 31) / 32;
                    bitwise_merkleize(&chunks, limit, true)
                } else {
                    let roots = self.element_roots(items)?;
                    bitwise_merkleize(&roots, items.len() as u64, true)
                }
            }
            None => {
                let capacity = self.effective_capacity(max_capacity);
                if self.elem_basic {
                    let buf = super::marshaled_bytes(self, value)?;
                    let chunks = pack(&[&buf]);
                    let limit = ((capacity * self.elem_fixed_size + 31) / 32).max(1);
                    let root = bitwise_merkleize(&chunks, limit, true)?;
                    Ok(mix_in_length(&root, items.len() as u64))
                } else {
                    // An empty list with no capacity merkleizes against a zero limit.
                    if items.is_empty() && capacity == 0 {
                        let root = bitwise_merkleize(&[], 0, true)?;
                        return Ok(mix_in_length(&root, 0));
                    }
                    let limit = if capacity != 0 {
                        capacity
                    } else {
                        items.len() as u64
                    };
                    let roots = self.element_roots(items)?;
                    let root = bitwise_merkleize(&roots, limit, true)?;
                    Ok(mix_in_length(&root, items.len() as u64))
                }
            }
        }
    }
}
