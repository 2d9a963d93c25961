//! The process-wide codec cache: one `SszUtils` record per type descriptor, built
//! lazily and kept for the life of the process.
//!
//! Misses take the write lock, install a sentinel (an empty record) under the
//! descriptor's key, and only then build the codec. A recursive descriptor resolving
//! itself during construction finds the sentinel and terminates; the record is filled
//! in place once construction succeeds and removed again if it fails. All recursive
//! lookups go through the `_locked` variant so a constructing thread never
//! re-acquires the lock it already holds.

use crate::codec::basic::{BoolCodec, UintCodec};
use crate::codec::bitlist::BitlistCodec;
use crate::codec::bytes::BytesCodec;
use crate::codec::container::{ContainerCodec, ResolvedField};
use crate::codec::pointer::PointerCodec;
use crate::codec::sequence::SequenceCodec;
use crate::codec::{Codec, SszUtils};
use crate::descriptor::TypeDescriptor;
use crate::error::Error;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

type UtilsMap = HashMap<TypeDescriptor, Arc<SszUtils>>;

lazy_static! {
    static ref SSZ_UTILS_CACHE: RwLock<UtilsMap> = RwLock::new(HashMap::new());
}

/// Returns the cached codec record for `td`, building and caching it on first use.
pub(crate) fn cached_ssz_utils(td: &TypeDescriptor) -> Result<Arc<SszUtils>, Error> {
    if let Some(utils) = SSZ_UTILS_CACHE.read().get(td) {
        return Ok(utils.clone());
    }
    let mut cache = SSZ_UTILS_CACHE.write();
    cached_ssz_utils_locked(&mut cache, td)
}

fn cached_ssz_utils_locked(
    cache: &mut UtilsMap,
    td: &TypeDescriptor,
) -> Result<Arc<SszUtils>, Error> {
    // Double-check: another thread may have built this while we waited for the lock,
    // or we may be mid-construction and looking at our own sentinel.
    if let Some(utils) = cache.get(td) {
        return Ok(utils.clone());
    }
    let sentinel = Arc::new(SszUtils::sentinel(descriptor_hash(td)));
    cache.insert(td.clone(), sentinel.clone());
    match build_codec(cache, td) {
        Ok(codec) => {
            sentinel.fill(codec);
            Ok(sentinel)
        }
        Err(e) => {
            cache.remove(td);
            Err(e)
        }
    }
}

fn descriptor_hash(td: &TypeDescriptor) -> u64 {
    let mut hasher = DefaultHasher::new();
    td.hash(&mut hasher);
    hasher.finish()
}

fn build_codec(cache: &mut UtilsMap, td: &TypeDescriptor) -> Result<Box<dyn Codec>, Error> {
    match td {
        TypeDescriptor::Bool => Ok(Box::new(BoolCodec)),
        TypeDescriptor::Uint8 => Ok(Box::new(UintCodec { width: 1 })),
        TypeDescriptor::Uint16 => Ok(Box::new(UintCodec { width: 2 })),
        TypeDescriptor::Uint32 => Ok(Box::new(UintCodec { width: 4 })),
        TypeDescriptor::Uint64 => Ok(Box::new(UintCodec { width: 8 })),
        TypeDescriptor::ByteVector(len) => Ok(Box::new(BytesCodec {
            fixed_len: Some(*len),
            limit: 0,
        })),
        TypeDescriptor::ByteList { limit } => Ok(Box::new(BytesCodec {
            fixed_len: None,
            limit: *limit,
        })),
        TypeDescriptor::Vector { elem, len } => {
            build_sequence(cache, elem, Some(*len), 0).map(boxed)
        }
        TypeDescriptor::List { elem, limit } => {
            build_sequence(cache, elem, None, *limit).map(boxed)
        }
        TypeDescriptor::Container(schema) => {
            let mut fields = Vec::with_capacity(schema.fields().len());
            for field in schema.fields() {
                let utils = cached_ssz_utils_locked(cache, field.descriptor())?;
                fields.push(ResolvedField {
                    td: field.descriptor().clone(),
                    capacity: field.capacity(),
                    variable: field.descriptor().is_variable_size(),
                    utils,
                });
            }
            Ok(Box::new(ContainerCodec { fields }))
        }
        TypeDescriptor::Pointer(pd) => {
            let pointee = pd.pointee()?;
            let inner = cached_ssz_utils_locked(cache, &pointee)?;
            Ok(Box::new(PointerCodec { inner, pointee }))
        }
        TypeDescriptor::Bitlist { limit } => Ok(Box::new(BitlistCodec { limit: *limit })),
    }
}

fn build_sequence(
    cache: &mut UtilsMap,
    elem: &Arc<TypeDescriptor>,
    fixed_count: Option<usize>,
    limit: u64,
) -> Result<SequenceCodec, Error> {
    let elem_utils = cached_ssz_utils_locked(cache, elem)?;
    let elem_basic = matches!(
        **elem,
        TypeDescriptor::Bool
            | TypeDescriptor::Uint8
            | TypeDescriptor::Uint16
            | TypeDescriptor::Uint32
            | TypeDescriptor::Uint64
    );
    Ok(SequenceCodec {
        elem: elem_utils,
        elem_td: elem.clone(),
        fixed_count,
        limit,
        elem_variable: elem.is_variable_size(),
        elem_basic,
        elem_fixed_size: elem.fixed_size(),
    })
}

fn boxed(codec: SequenceCodec) -> Box<dyn Codec> {
    Box::new(codec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ContainerSchema, FieldDescriptor, PointerDescriptor};

    #[test]
    fn recursive_container_codec_builds() {
        let node = ContainerSchema::recursive("CacheNode", |this| {
            vec![
                FieldDescriptor::new("value", TypeDescriptor::Uint64),
                FieldDescriptor::new(
                    "next",
                    TypeDescriptor::Pointer(PointerDescriptor::recursive(this)),
                ),
            ]
        });
        let td = TypeDescriptor::Container(node);
        let utils = cached_ssz_utils(&td).unwrap();
        // A second lookup returns the same record.
        let again = cached_ssz_utils(&td).unwrap();
        assert!(Arc::ptr_eq(&utils, &again));
    }

    #[test]
    fn failed_construction_is_not_cached() {
        let weak = {
            let schema = ContainerSchema::new("Dropped", vec![]);
            Arc::downgrade(&schema)
        };
        let td = TypeDescriptor::Pointer(PointerDescriptor::Recursive(weak));
        assert!(matches!(cached_ssz_utils(&td), Err(Error::UntypedNil)));
        // The sentinel was removed: a retry reports the same error instead of
        // returning a dead record.
        assert!(matches!(cached_ssz_utils(&td), Err(Error::UntypedNil)));
    }

    #[test]
    fn descriptor_hash_distinguishes_kinds() {
        assert_ne!(
            descriptor_hash(&TypeDescriptor::Uint32),
            descriptor_hash(&TypeDescriptor::Uint64)
        );
    }
}
