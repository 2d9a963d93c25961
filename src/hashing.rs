//! SHA-256 primitives for merkleization.
//!
//! The hash function is treated as a pure 64-byte -> 32-byte primitive; everything here
//! is a thin wrapper over `sha2` plus the precomputed zero-subtree roots used to pad
//! merkleization to a power-of-two leaf count.

use lazy_static::lazy_static;
use sha2::{Digest, Sha256};

/// The max index that can be used in the `ZERO_HASHES` array.
///
/// Merkleization limits are `u64`, so no tree can be deeper than 64 levels.
pub const ZERO_HASHES_MAX_INDEX: usize = 64;

lazy_static! {
    /// Cached padding nodes: `ZERO_HASHES[i]` is the root of an all-zero subtree of
    /// height `i`.
    pub static ref ZERO_HASHES: Vec<[u8; 32]> = {
        let mut hashes = vec![[0; 32]; ZERO_HASHES_MAX_INDEX + 1];
        for i in 0..ZERO_HASHES_MAX_INDEX {
            hashes[i + 1] = hash32_concat(&hashes[i], &hashes[i]);
        }
        hashes
    };
}

/// Returns the digest of `input`.
pub fn hash(input: &[u8]) -> Vec<u8> {
    Sha256::digest(input).to_vec()
}

/// Returns the digest of `input` as a fixed-size array.
pub fn hash_fixed(input: &[u8]) -> [u8; 32] {
    Sha256::digest(input).into()
}

/// Hash of the concatenation of two 32-byte nodes.
pub fn hash32_concat(h1: &[u8], h2: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(h1);
    hasher.update(h2);
    hasher.finalize().into()
}

/// Returns a cached padding node for a given height.
pub(crate) fn get_zero_hash(height: usize) -> &'static [u8; 32] {
    if height <= ZERO_HASHES_MAX_INDEX {
        &ZERO_HASHES[height]
    } else {
        panic!("tree exceeds MAX_TREE_DEPTH of {}", ZERO_HASHES_MAX_INDEX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_hash_ladder() {
        assert_eq!(ZERO_HASHES[0], [0; 32]);
        assert_eq!(ZERO_HASHES[1], hash32_concat(&[0; 32], &[0; 32]));
        assert_eq!(
            ZERO_HASHES[2],
            hash32_concat(&ZERO_HASHES[1], &ZERO_HASHES[1])
        );
    }

    #[test]
    fn concat_matches_flat_hash() {
        let a = [42; 32];
        let b = [7; 32];
        let mut preimage = a.to_vec();
        preimage.extend_from_slice(&b);
        assert_eq!(hash32_concat(&a, &b).to_vec(), hash(&preimage));
    }
}
