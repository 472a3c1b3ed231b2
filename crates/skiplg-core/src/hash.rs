//! Domain hash, the fixed-leaf Merkle construction, and the condensed-row
//! funnel (Merkle-proof) machinery.
//!
//! The reference binding (spec.md §6) is SHA-256, so `Hash` is a 32-byte
//! array and `H` is built on [`sha2::Sha256`]. All hashing here is
//! stateless: every call constructs a fresh digest, so `Hash`, `Funnel`, and
//! every type built from them are `Send + Sync` and freely shared across
//! threads (spec.md §5).

use sha2::{Digest, Sha256};

use crate::error::{Result, SkipLedgerError};

/// Fixed width of every hash in the ledger (`W` in spec.md).
pub const HASH_WIDTH: usize = 32;

/// A `W`-byte digest.
pub type Hash = [u8; HASH_WIDTH];

/// The all-zero hash assigned to the virtual row 0.
pub const SENTINEL: Hash = [0u8; HASH_WIDTH];

/// Domain hash `H`: a stateless SHA-256 digest over the concatenation of its
/// inputs.
#[must_use]
pub fn domain_hash(parts: &[&[u8]]) -> Hash {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; HASH_WIDTH];
    out.copy_from_slice(&digest);
    out
}

/// `rowHash(inputHash, levelsHash) = H(inputHash ‖ levelsHash)`.
#[must_use]
pub fn row_hash(input_hash: &Hash, levels_hash: &Hash) -> Hash {
    domain_hash(&[input_hash, levels_hash])
}

/// Pairwise Merkle parent `H(left ‖ right)`.
#[must_use]
pub fn merkle_parent(left: &Hash, right: &Hash) -> Hash {
    domain_hash(&[left, right])
}

/// Root of the fixed-leaf binary Merkle tree over `leaves`, carrying an
/// unpaired node up unchanged at every level with an odd node count.
///
/// # Panics
/// Panics if `leaves` is empty; every caller in this crate guarantees at
/// least one leaf (a row always has `skipCount(rn) >= 1` references).
#[must_use]
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    assert!(!leaves.is_empty(), "merkle_root requires at least one leaf");
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = reduce_level(&level);
    }
    level[0]
}

fn reduce_level(level: &[Hash]) -> Vec<Hash> {
    let mut next = Vec::with_capacity(level.len().div_ceil(2));
    let mut i = 0;
    while i < level.len() {
        if i + 1 < level.len() {
            next.push(merkle_parent(&level[i], &level[i + 1]));
        } else {
            // Odd node at this level: carry up unchanged (spec.md §4.1).
            next.push(level[i]);
        }
        i += 2;
    }
    next
}

/// The levels-merkle-hash of a row's level hashes.
///
/// A single-hash list *is* its own levels-hash (no tree); otherwise it is
/// the fixed-leaf Merkle root over the list.
#[must_use]
pub fn levels_merkle_hash(level_hashes: &[Hash]) -> Hash {
    if level_hashes.len() == 1 {
        level_hashes[0]
    } else {
        merkle_root(level_hashes)
    }
}

/// Number of real hash-pairing steps needed to reconstruct the root of an
/// `n`-leaf fixed-leaf Merkle tree from the leaf at `leaf_index`.
///
/// This is leaf-position dependent: a leaf that is carried up unchanged at
/// some level (because it is the unpaired tail of an odd-length level)
/// needs no sibling at that level, so its funnel is one hash shorter than a
/// leaf that pairs at every level.
#[must_use]
pub fn funnel_length(n: usize, leaf_index: usize) -> usize {
    debug_assert!(leaf_index < n);
    let mut size = n;
    let mut idx = leaf_index;
    let mut count = 0usize;
    while size > 1 {
        if (idx ^ 1) < size {
            count += 1;
        }
        idx >>= 1;
        size = size.div_ceil(2);
    }
    count
}

/// Build the funnel (sibling sequence) that lets [`root_from_funnel`]
/// reconstruct the tree root from just `leaves[leaf_index]`.
#[must_use]
pub fn build_funnel(leaves: &[Hash], leaf_index: usize) -> Vec<Hash> {
    assert!(leaf_index < leaves.len(), "leaf index out of range");
    let mut level = leaves.to_vec();
    let mut idx = leaf_index;
    let mut funnel = Vec::with_capacity(funnel_length(leaves.len(), leaf_index));
    while level.len() > 1 {
        let size = level.len();
        let partner = idx ^ 1;
        if partner < size {
            funnel.push(level[partner]);
        }
        level = reduce_level(&level);
        idx >>= 1;
    }
    funnel
}

/// Reconstruct the tree root from a single leaf, its index, the total leaf
/// count `n`, and a funnel built by [`build_funnel`].
///
/// # Errors
/// Returns [`SkipLedgerError::ByteFormat`] if `funnel.len()` does not match
/// `funnelLength(n, leaf_index)` exactly.
pub fn root_from_funnel(leaf: &Hash, leaf_index: usize, n: usize, funnel: &[Hash]) -> Result<Hash> {
    let expected = funnel_length(n, leaf_index);
    if funnel.len() != expected {
        return Err(SkipLedgerError::byte_format(format!(
            "funnel length mismatch: expected {expected}, got {}",
            funnel.len()
        )));
    }
    let mut cur = *leaf;
    let mut idx = leaf_index;
    let mut size = n;
    let mut fi = 0usize;
    while size > 1 {
        let partner = idx ^ 1;
        if partner < size {
            let sib = &funnel[fi];
            fi += 1;
            cur = if idx & 1 == 0 {
                merkle_parent(&cur, sib)
            } else {
                merkle_parent(sib, &cur)
            };
        }
        idx >>= 1;
        size = size.div_ceil(2);
    }
    Ok(cur)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(n: u8) -> Hash {
        let mut h = [0u8; HASH_WIDTH];
        h[0] = n;
        h
    }

    #[test]
    fn single_leaf_levels_hash_is_identity() {
        let l = leaf(7);
        assert_eq!(levels_merkle_hash(&[l]), l);
    }

    #[test]
    fn odd_node_carried_up_unchanged() {
        let (a, b, c) = (leaf(1), leaf(2), leaf(3));
        let r1 = merkle_parent(&a, &b);
        let expected_root = merkle_parent(&r1, &c);
        assert_eq!(merkle_root(&[a, b, c]), expected_root);
    }

    #[test]
    fn funnel_roundtrip_every_leaf_every_size() {
        for n in 2..=20usize {
            let leaves: Vec<Hash> = (0..n as u8).map(leaf).collect();
            let root = merkle_root(&leaves);
            for idx in 0..n {
                let funnel = build_funnel(&leaves, idx);
                assert_eq!(funnel.len(), funnel_length(n, idx));
                let got = root_from_funnel(&leaves[idx], idx, n, &funnel).unwrap();
                assert_eq!(got, root, "n={n} idx={idx}");
            }
        }
    }

    #[test]
    fn funnel_length_rejects_wrong_size_funnel() {
        let leaves: Vec<Hash> = (0..5u8).map(leaf).collect();
        let funnel = build_funnel(&leaves, 2);
        let mut short = funnel.clone();
        short.pop();
        let err = root_from_funnel(&leaves[2], 2, 5, &short).unwrap_err();
        assert!(matches!(err, SkipLedgerError::ByteFormat { .. }));
    }
}
