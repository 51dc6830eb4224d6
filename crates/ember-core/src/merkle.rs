//! Merkle root over a block's transactions.
//!
//! Leaves are the SHA-256 of each transaction's canonical serialization.
//! Internal nodes are `SHA-256(left ∥ right)` with no domain-separation
//! prefix — the root must be reproducible from nothing but these bytes,
//! since it is folded directly into the block hash.

use crate::crypto::sha256;
use crate::types::{Hash256, Transaction};

/// Root over transaction hashes that have already been computed.
///
/// Duplicates the last element of any odd-length level before pairing.
/// A single-leaf input's root is that leaf, unchanged.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    assert!(!leaves.is_empty(), "merkle root is undefined for an empty transaction set");

    let mut level: Vec<Hash256> = leaves.to_vec();
    while level.len() > 1 {
        level = next_layer(&level);
    }
    level[0]
}

/// Root over a block's transactions: hashes each transaction's canonical
/// serialization, then folds with [`merkle_root`].
pub fn merkle_root_of_transactions(transactions: &[Transaction]) -> Hash256 {
    let leaves: Vec<Hash256> = transactions
        .iter()
        .map(|tx| {
            let bytes = tx
                .canonical_bytes()
                .expect("a transaction already accepted into a block serializes cleanly");
            Hash256(sha256(&bytes))
        })
        .collect();
    merkle_root(&leaves)
}

fn next_layer(level: &[Hash256]) -> Vec<Hash256> {
    let mut padded = level.to_vec();
    if padded.len() % 2 == 1 {
        padded.push(*padded.last().unwrap());
    }

    padded
        .chunks_exact(2)
        .map(|pair| node_hash(&pair[0], &pair[1]))
        .collect()
}

fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut data = Vec::with_capacity(64);
    data.extend_from_slice(left.as_bytes());
    data.extend_from_slice(right.as_bytes());
    Hash256(sha256(&data))
}
