//! Merkleization primitives: chunk packing, the limit-padded binary Merkle root, and
//! the length mix-in used by bounded collections.

use crate::error::Error;
use crate::hashing::{get_zero_hash, hash32_concat};
use crate::{Hash256, BYTES_PER_CHUNK};

/// A 32-byte Merkle tree leaf.
pub type Chunk = [u8; BYTES_PER_CHUNK];

/// Concatenates the given byte strings, right-pads with zeros to a multiple of 32, and
/// returns the resulting chunks.
pub fn pack(parts: &[&[u8]]) -> Vec<Chunk> {
    let total: usize = parts.iter().map(|part| part.len()).sum();
    let chunk_count = (total + BYTES_PER_CHUNK - 1) / BYTES_PER_CHUNK;
    let mut flat = Vec::with_capacity(chunk_count * BYTES_PER_CHUNK);
    for part in parts {
        flat.extend_from_slice(part);
    }
    flat.resize(chunk_count * BYTES_PER_CHUNK, 0);
    flat.chunks_exact(BYTES_PER_CHUNK)
        .map(|chunk| {
            let mut leaf = [0; BYTES_PER_CHUNK];
            leaf.copy_from_slice(chunk);
            leaf
        })
        .collect()
}

/// Computes the binary SHA-256 Merkle root of `chunks`.
///
/// With `has_limit`, the tree is sized for `limit` leaves (a limit of zero is treated
/// as one); otherwise it is sized for the chunk count. Padding leaves are zero chunks,
/// realized through the precomputed zero-subtree roots rather than materialized.
pub fn bitwise_merkleize(
    chunks: &[Chunk],
    limit: u64,
    has_limit: bool,
) -> Result<Hash256, Error> {
    let count = chunks.len() as u64;
    let leaf_count = if has_limit { limit } else { count };
    if has_limit && count > leaf_count.max(1) {
        return Err(Error::ChunkCountExceedsLimit {
            limit,
            len: count,
        });
    }
    let depth = tree_depth(leaf_count.max(1));
    if chunks.is_empty() {
        return Ok(Hash256::from(*get_zero_hash(depth)));
    }
    let mut layer = chunks.to_vec();
    for height in 0..depth {
        if layer.len() % 2 == 1 {
            layer.push(*get_zero_hash(height));
        }
        layer = layer
            .chunks_exact(2)
            .map(|pair| hash32_concat(&pair[0], &pair[1]))
            .collect();
    }
    Ok(Hash256::from(layer[0]))
}

/// Returns the node created by hashing `root` and `length`, the final root of a
/// length-prefixed collection. The length occupies the first 8 bytes of a zero-padded
/// 32-byte buffer, little-endian.
pub fn mix_in_length(root: &Hash256, length: u64) -> Hash256 {
    let mut length_bytes = [0; BYTES_PER_CHUNK];
    length_bytes[0..8].copy_from_slice(&length.to_le_bytes());
    Hash256::from(hash32_concat(root.as_bytes(), &length_bytes))
}

/// Depth of a tree with `leaf_count` leaves padded to a power of two.
fn tree_depth(leaf_count: u64) -> usize {
    if leaf_count <= 1 {
        0
    } else {
        (64 - (leaf_count - 1).leading_zeros()) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::hash;

    fn chunk(byte: u8) -> Chunk {
        [byte; BYTES_PER_CHUNK]
    }

    #[test]
    fn pack_pads_to_chunk_multiple() {
        assert_eq!(pack(&[]), Vec::<Chunk>::new());

        let chunks = pack(&[&[1, 2, 3]]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(&chunks[0][0..3], &[1, 2, 3]);
        assert_eq!(&chunks[0][3..], &[0; 29][..]);

        let chunks = pack(&[&[1; 32], &[2; 16]]);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], chunk(1));
        assert_eq!(&chunks[1][0..16], &[2; 16][..]);
    }

    #[test]
    fn single_chunk_is_its_own_root() {
        let root = bitwise_merkleize(&[chunk(42)], 1, false).unwrap();
        assert_eq!(root, Hash256::from(chunk(42)));
    }

    #[test]
    fn two_chunks_hash_together() {
        let root = bitwise_merkleize(&[chunk(1), chunk(2)], 2, true).unwrap();
        assert_eq!(root, Hash256::from(hash32_concat(&chunk(1), &chunk(2))));
    }

    #[test]
    fn padding_matches_literal_zero_chunks() {
        // Three chunks with limit four: the virtual fourth leaf is a zero chunk.
        let left = hash32_concat(&chunk(1), &chunk(2));
        let right = hash32_concat(&chunk(3), &[0; 32]);
        let expected = Hash256::from(hash32_concat(&left, &right));
        assert_eq!(
            bitwise_merkleize(&[chunk(1), chunk(2), chunk(3)], 4, true).unwrap(),
            expected
        );
    }

    #[test]
    fn empty_chunks_yield_zero_subtree_roots() {
        assert_eq!(
            bitwise_merkleize(&[], 0, true).unwrap(),
            Hash256::zero()
        );
        assert_eq!(
            bitwise_merkleize(&[], 1, true).unwrap(),
            Hash256::zero()
        );
        assert_eq!(
            bitwise_merkleize(&[], 2, true).unwrap(),
            Hash256::from(hash32_concat(&[0; 32], &[0; 32]))
        );
    }

    #[test]
    fn over_limit_is_rejected() {
        assert_eq!(
            bitwise_merkleize(&[chunk(1), chunk(2)], 1, true),
            Err(Error::ChunkCountExceedsLimit { limit: 1, len: 2 })
        );
    }

    #[test]
    fn mix_length() {
        let root = Hash256::from(chunk(42));
        let mut preimage = chunk(42).to_vec();
        preimage.extend_from_slice(&42u64.to_le_bytes());
        preimage.extend_from_slice(&[0; 24]);
        assert_eq!(
            mix_in_length(&root, 42).as_bytes(),
            &hash(&preimage)[..]
        );
    }
}
