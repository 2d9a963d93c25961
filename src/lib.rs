//! SimpleSerialize (SSZ) encoding, decoding and Merkle hashing driven by runtime type
//! descriptors.
//!
//! Values are dynamic trees ([`Value`]) whose shape is recovered as an immutable
//! [`TypeDescriptor`]; codecs dispatch on the descriptor and are memoized process-wide,
//! as are the Merkle roots of recently hashed content.
//!
//! ## Example
//!
//! ```rust
//! use dyn_ssz::{marshal, unmarshal, ContainerSchema, FieldDescriptor, TypeDescriptor, Value};
//!
//! let schema = ContainerSchema::new(
//!     "Checkpoint",
//!     vec![
//!         FieldDescriptor::new("slot", TypeDescriptor::Uint64),
//!         FieldDescriptor::new("root", TypeDescriptor::ByteList { limit: 0 }),
//!     ],
//! );
//!
//! let checkpoint = Value::container(
//!     &schema,
//!     vec![Value::Uint64(42), Value::ByteList(vec![1, 2, 3, 4])],
//! );
//!
//! let bytes = marshal(&checkpoint).unwrap();
//!
//! let mut decoded = schema.zero_value();
//! unmarshal(&bytes, &mut decoded).unwrap();
//!
//! assert_eq!(decoded, checkpoint);
//! ```

mod codec;
mod codec_cache;
mod descriptor;
mod error;
mod hash_cache;
mod hashing;
mod merkleize;
mod size;
mod value;

pub use descriptor::{
    apply_size_hints, describe, ContainerSchema, FieldDescriptor, PointerDescriptor, SizeHint,
    TypeDescriptor,
};
pub use error::Error;
pub use hashing::{hash, hash32_concat, hash_fixed, ZERO_HASHES, ZERO_HASHES_MAX_INDEX};
pub use merkleize::{bitwise_merkleize, mix_in_length, pack, Chunk};
pub use size::{determine_size, fixed_part_size};
pub use value::{Bitlist, ContainerValue, PointerValue, SequenceValue, Value};

/// A 32-byte Merkle root.
pub type Hash256 = ethereum_types::H256;

/// The number of bytes used to represent an offset.
pub const BYTES_PER_LENGTH_OFFSET: usize = 4;
/// The number of bytes in a Merkle tree leaf.
pub const BYTES_PER_CHUNK: usize = 32;

/// Serializes `value`, returning a buffer whose length equals
/// [`determine_size`]`(value)`.
pub fn marshal(value: &Value) -> Result<Vec<u8>, Error> {
    let td = describe(value);
    let utils = codec_cache::cached_ssz_utils(&td)?;
    let mut buf = vec![0; determine_size(value) as usize];
    utils.marshal_to(value, &mut buf, 0)?;
    Ok(buf)
}

/// Decodes `input` into `dest`, whose shape selects the codec. On success the
/// destination is fully populated; on failure it may hold partial writes.
pub fn unmarshal(input: &[u8], dest: &mut Value) -> Result<(), Error> {
    let td = describe(dest);
    let utils = codec_cache::cached_ssz_utils(&td).map_err(|e| {
        match (&e, &*dest) {
            // A pointer destination whose referent cannot be instantiated.
            (Error::UntypedNil, Value::Pointer(_)) => Error::NilPointerDestination,
            _ => e,
        }
    })?;
    utils.unmarshal_from(input, dest, 0)?;
    Ok(())
}

/// Computes the SSZ Merkle root of `value`.
pub fn hash_tree_root(value: &Value) -> Result<Hash256, Error> {
    let td = describe(value);
    let utils = codec_cache::cached_ssz_utils(&td)?;
    hash_cache::lookup(&utils, value, 0)
}

/// Computes the Merkle root of a list-kind value with `max_capacity` bounding its
/// merkleization. Non-list values are rejected.
pub fn hash_tree_root_with_capacity(
    value: &Value,
    max_capacity: u64,
) -> Result<Hash256, Error> {
    match value {
        Value::List(_) | Value::ByteList(_) | Value::Bitlist(_) => {}
        _ => return Err(Error::NonListForCapacity),
    }
    let td = describe(value);
    let utils = codec_cache::cached_ssz_utils(&td)?;
    hash_cache::lookup(&utils, value, max_capacity)
}

/// Enables or disables consultation of the process-wide hash-root cache. Results are
/// identical either way; only the amount of recomputation changes.
pub fn toggle_cache(enabled: bool) {
    hash_cache::set_enabled(enabled);
}
