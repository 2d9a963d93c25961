//! The size oracle: pure functions over values and descriptors that drive buffer
//! allocation and offset layout.

use crate::descriptor::TypeDescriptor;
use crate::value::Value;
use crate::BYTES_PER_LENGTH_OFFSET;

/// Full serialized byte length of `value`, offset headers included.
///
/// Sizes are value-directed: an absent pointer contributes zero bytes, and each
/// variable-size element or field contributes one offset slot plus its own length.
pub fn determine_size(value: &Value) -> u64 {
    match value {
        Value::Bool(_) | Value::Uint8(_) => 1,
        Value::Uint16(_) => 2,
        Value::Uint32(_) | Value::Int32(_) => 4,
        Value::Uint64(_) => 8,
        Value::ByteVector(bytes) | Value::ByteList(bytes) => bytes.len() as u64,
        Value::Bitlist(bitlist) => bitlist.raw().len() as u64,
        Value::Vector(seq) | Value::List(seq) => {
            if seq.elem.is_variable_size() {
                seq.items
                    .iter()
                    .map(|item| BYTES_PER_LENGTH_OFFSET as u64 + determine_size(item))
                    .sum()
            } else {
                seq.items.iter().map(determine_size).sum()
            }
        }
        Value::Container(c) => c
            .schema
            .fields()
            .iter()
            .zip(&c.fields)
            .map(|(f, v)| {
                if f.descriptor().is_variable_size() {
                    BYTES_PER_LENGTH_OFFSET as u64 + determine_size(v)
                } else {
                    determine_size(v)
                }
            })
            .sum(),
        Value::Pointer(p) => p.value.as_deref().map_or(0, determine_size),
    }
}

/// The number of bytes `value` occupies in the fixed part of an enclosing composite:
/// one offset slot for variable-size descriptors, the serialized length otherwise.
pub fn fixed_part_size(value: &Value, td: &TypeDescriptor) -> u64 {
    if td.is_variable_size() {
        BYTES_PER_LENGTH_OFFSET as u64
    } else {
        determine_size(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ContainerSchema, FieldDescriptor};

    #[test]
    fn scalar_sizes() {
        assert_eq!(determine_size(&Value::Bool(true)), 1);
        assert_eq!(determine_size(&Value::Uint16(3)), 2);
        assert_eq!(determine_size(&Value::Uint64(4)), 8);
    }

    #[test]
    fn container_size_includes_offset_slots() {
        let schema = ContainerSchema::new(
            "Sample",
            vec![
                FieldDescriptor::new("slot", TypeDescriptor::Uint64),
                FieldDescriptor::new("is_new", TypeDescriptor::Bool),
                FieldDescriptor::new("root", TypeDescriptor::ByteList { limit: 0 }),
            ],
        );
        let value = Value::container(
            &schema,
            vec![
                Value::Uint64(4),
                Value::Bool(true),
                Value::ByteList(vec![1, 2, 3, 4]),
            ],
        );
        assert_eq!(determine_size(&value), 8 + 1 + 4 + 4);
    }

    #[test]
    fn list_of_variable_elements() {
        let value = Value::list(
            TypeDescriptor::ByteList { limit: 0 },
            vec![
                Value::ByteList(vec![1, 2]),
                Value::ByteList(vec![]),
                Value::ByteList(vec![3]),
            ],
        );
        assert_eq!(determine_size(&value), 3 * 4 + 2 + 0 + 1);
    }

    #[test]
    fn absent_pointer_is_zero_sized() {
        let value = Value::pointer(
            crate::descriptor::PointerDescriptor::owned(TypeDescriptor::Uint64),
            None,
        );
        assert_eq!(determine_size(&value), 0);
        assert_eq!(
            fixed_part_size(&value, &crate::descriptor::describe(&value)),
            0
        );
    }
}
