//! Fixed-difficulty SHA-256 proof of work.
//!
//! `TARGET = 1 << (256 - DIFFICULTY)`. A block hash is valid iff, read as
//! a 256-bit big-endian unsigned integer, it is numerically below
//! `TARGET`. There is no retargeting: `DIFFICULTY` is a protocol constant.

use ember_core::constants::{DIFFICULTY, MAX_NONCE};
use ember_core::crypto::pow_hash;
use ember_core::error::BlockError;
use ember_core::types::{Block, Hash256};

/// `1 << (256 - difficulty)` as a 256-bit big-endian byte array.
pub fn target_bytes(difficulty: u32) -> [u8; 32] {
    assert!(difficulty < 256, "difficulty must leave at least one bit of target");
    let shift = 256 - difficulty;
    let byte_from_lsb = (shift / 8) as usize;
    let bit_in_byte = shift % 8;
    let mut bytes = [0u8; 32];
    bytes[31 - byte_from_lsb] = 1u8 << bit_in_byte;
    bytes
}

/// This protocol's fixed target, `1 << (256 - DIFFICULTY)`.
pub fn target() -> [u8; 32] {
    target_bytes(DIFFICULTY)
}

fn below_target(hash: &Hash256, target: &[u8; 32]) -> bool {
    hash.as_uint_be() < *target
}

/// Search for the first `nonce` such that
/// `SHA-256(prev_hash ∥ merkle_root ∥ be64(nonce) ∥ be64(DIFFICULTY))` is
/// numerically below [`target`]. Returns the nonce and the winning hash.
///
/// Runs on the calling thread; callers mining on a shared runtime should
/// dispatch this to a dedicated blocking task.
pub fn run(prev_hash: &Hash256, merkle_root: &Hash256) -> Result<(u64, Hash256), BlockError> {
    let target = target();
    for nonce in 0..=MAX_NONCE {
        let hash = pow_hash(prev_hash, merkle_root, nonce);
        if below_target(&hash, &target) {
            return Ok((nonce, hash));
        }
    }
    Err(BlockError::NonceExhausted)
}

/// Recompute a block's header hash from its stored `nonce` and check both
/// that it matches the stored `hash` and that it satisfies the target.
pub fn validate(block: &Block) -> Result<(), BlockError> {
    let recomputed = block.recompute_hash();
    if recomputed != block.hash {
        return Err(BlockError::HashMismatch);
    }
    if !below_target(&recomputed, &target()) {
        return Err(BlockError::ProofOfWorkFailed);
    }
    Ok(())
}
