//! Per-kind codec objects and the record type the codec cache stores.
//!
//! Every descriptor kind has one `Codec` implementation carrying all three operations
//! (serialize, deserialize, hash tree root); composite codecs hold `Arc` handles to
//! their children's records, resolved once at construction time.

pub(crate) mod basic;
pub(crate) mod bitlist;
pub(crate) mod bytes;
pub(crate) mod container;
pub(crate) mod pointer;
pub(crate) mod sequence;

use crate::error::Error;
use crate::merkleize;
use crate::size::determine_size;
use crate::value::Value;
use crate::{Hash256, BYTES_PER_LENGTH_OFFSET};
use parking_lot::RwLock;

/// The three operations every descriptor kind must support.
pub(crate) trait Codec: Send + Sync {
    /// Writes `value` into `buf` at `start`, returning the index one past the last
    /// byte written. The buffer is pre-sized by the size oracle.
    fn marshal_to(&self, value: &Value, buf: &mut [u8], start: u64) -> Result<u64, Error>;

    /// Reads into `dest` from `input` at `start`, returning the index one past the
    /// last byte consumed. `input` is untrusted.
    fn unmarshal_from(&self, input: &[u8], dest: &mut Value, start: u64) -> Result<u64, Error>;

    /// Computes the Merkle root. `max_capacity` bounds list kinds; zero means the
    /// descriptor-level limit (or the element count) applies.
    fn hash_tree_root(&self, value: &Value, max_capacity: u64) -> Result<Hash256, Error>;
}

/// A descriptor's codec record.
///
/// The slot starts empty: that empty record is the sentinel installed in the codec
/// cache before construction, which recursive descriptors resolve to mid-build. It is
/// filled in place once construction succeeds.
pub(crate) struct SszUtils {
    descriptor_hash: u64,
    slot: RwLock<Option<Box<dyn Codec>>>,
}

impl SszUtils {
    pub fn sentinel(descriptor_hash: u64) -> Self {
        Self {
            descriptor_hash,
            slot: RwLock::new(None),
        }
    }

    pub fn fill(&self, codec: Box<dyn Codec>) {
        *self.slot.write() = Some(codec);
    }

    /// A 64-bit fingerprint of the descriptor this record serves; part of the hash
    /// cache key.
    pub fn descriptor_hash(&self) -> u64 {
        self.descriptor_hash
    }

    pub fn marshal_to(&self, value: &Value, buf: &mut [u8], start: u64) -> Result<u64, Error> {
        let slot = self.slot.read_recursive();
        match slot.as_ref() {
            Some(codec) => codec.marshal_to(value, buf, start),
            None => Err(under_construction()),
        }
    }

    pub fn unmarshal_from(
        &self,
        input: &[u8],
        dest: &mut Value,
        start: u64,
    ) -> Result<u64, Error> {
        let slot = self.slot.read_recursive();
        match slot.as_ref() {
            Some(codec) => codec.unmarshal_from(input, dest, start),
            None => Err(under_construction()),
        }
    }

    pub fn hash_tree_root(&self, value: &Value, max_capacity: u64) -> Result<Hash256, Error> {
        let slot = self.slot.read_recursive();
        match slot.as_ref() {
            Some(codec) => codec.hash_tree_root(value, max_capacity),
            None => Err(under_construction()),
        }
    }
}

fn under_construction() -> Error {
    Error::UnsupportedType("codec record was never completed".to_string())
}

/// An error for a value that does not fit the descriptor it is being processed under.
pub(crate) fn mismatch(expected: &str, found: &Value) -> Error {
    Error::UnsupportedType(format!(
        "expected {} value, found {}",
        expected,
        found.kind_name()
    ))
}

/// Reads a 4-byte little-endian offset from the front of `bytes`.
pub(crate) fn read_offset(bytes: &[u8]) -> Result<u64, Error> {
    let bytes = bytes
        .get(0..BYTES_PER_LENGTH_OFFSET)
        .ok_or(Error::Truncated {
            len: bytes.len(),
            expected: BYTES_PER_LENGTH_OFFSET,
        })?;
    let mut array = [0; BYTES_PER_LENGTH_OFFSET];
    array.copy_from_slice(bytes);
    Ok(u32::from_le_bytes(array) as u64)
}

/// Checks a decoded offset against the enclosing frame and its predecessor.
pub(crate) fn sanitize_offset(
    offset: u64,
    previous_offset: Option<u64>,
    frame_len: u64,
) -> Result<u64, Error> {
    if offset > frame_len {
        Err(Error::OffsetOutOfBounds(offset))
    } else if previous_offset.map_or(false, |prev| prev > offset) {
        Err(Error::NonMonotonicOffsets(offset))
    } else {
        Ok(offset)
    }
}

/// Backfills an offset slot at `at` with `offset`, little-endian.
pub(crate) fn write_offset(buf: &mut [u8], at: u64, offset: u64) {
    let at = at as usize;
    buf[at..at + BYTES_PER_LENGTH_OFFSET].copy_from_slice(&(offset as u32).to_le_bytes());
}

/// Serializes `value` with `codec` into a fresh, size-oracle-sized buffer.
pub(crate) fn marshaled_bytes(codec: &dyn Codec, value: &Value) -> Result<Vec<u8>, Error> {
    let mut buf = vec![0; determine_size(value) as usize];
    codec.marshal_to(value, &mut buf, 0)?;
    Ok(buf)
}

/// The root of a basic value or byte vector: pack the serialization into chunks and
/// merkleize without a limit.
pub(crate) fn basic_type_root(codec: &dyn Codec, value: &Value) -> Result<Hash256, Error> {
    let buf = marshaled_bytes(codec, value)?;
    let chunks = merkleize::pack(&[&buf]);
    merkleize::bitwise_merkleize(&chunks, 1, false)
}
