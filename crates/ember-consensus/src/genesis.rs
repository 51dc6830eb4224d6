//! Block assembly: merkle root, proof of work, and the genesis block.

use std::time::{SystemTime, UNIX_EPOCH};

use ember_core::constants::MINING_REWARD;
use ember_core::error::BlockError;
use ember_core::types::{Block, Hash256, PubkeyHash, Transaction};
use tracing::info;

use crate::pow;

/// Assemble and mine a block over `transactions`, chained to `prev_hash`
/// at `height`. Rejects an empty transaction set: every block, including
/// genesis, carries at least its coinbase.
pub fn create_block(
    transactions: Vec<Transaction>,
    prev_hash: Hash256,
    height: u64,
) -> Result<Block, BlockError> {
    if transactions.is_empty() {
        return Err(BlockError::Empty);
    }
    let merkle_root = ember_core::merkle::merkle_root_of_transactions(&transactions);
    let (nonce, hash) = pow::run(&prev_hash, &merkle_root)?;
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    info!(height, nonce, hash = %hash, "mined block");
    Ok(Block {
        timestamp,
        prev_hash,
        transactions,
        nonce,
        height,
        hash,
    })
}

/// The genesis block: height 0, chained to the zero hash, carrying a
/// single coinbase minting [`MINING_REWARD`] to `reward_pubkey_hash`.
pub fn build_genesis_block(reward_pubkey_hash: PubkeyHash) -> Result<Block, BlockError> {
    let coinbase = Transaction::new_coinbase(
        reward_pubkey_hash,
        b"First Transaction from Genesis".to_vec(),
        MINING_REWARD,
    );
    create_block(vec![coinbase], Hash256::ZERO, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_block_has_zero_prev_hash_and_height() {
        let block = build_genesis_block(PubkeyHash([1; 20])).unwrap();
        assert!(block.prev_hash.is_zero());
        assert_eq!(block.height, 0);
    }

    #[test]
    fn genesis_block_carries_a_coinbase() {
        let block = build_genesis_block(PubkeyHash([2; 20])).unwrap();
        let coinbase = block.coinbase().expect("genesis block must have a coinbase");
        assert_eq!(coinbase.total_output_value(), MINING_REWARD);
    }

    #[test]
    fn genesis_block_satisfies_proof_of_work() {
        let block = build_genesis_block(PubkeyHash([3; 20])).unwrap();
        assert!(pow::validate(&block).is_ok());
    }

    #[test]
    fn create_block_rejects_empty_transaction_set() {
        let err = create_block(vec![], Hash256::ZERO, 1).unwrap_err();
        assert!(matches!(err, BlockError::Empty));
    }

    #[test]
    fn different_reward_addresses_yield_different_genesis_blocks() {
        let a = build_genesis_block(PubkeyHash([4; 20])).unwrap();
        let b = build_genesis_block(PubkeyHash([5; 20])).unwrap();
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn non_genesis_block_chains_to_its_parent() {
        let genesis = build_genesis_block(PubkeyHash([6; 20])).unwrap();
        let coinbase =
            Transaction::new_coinbase(PubkeyHash([7; 20]), b"next".to_vec(), MINING_REWARD);
        let next = create_block(vec![coinbase], genesis.hash, 1).unwrap();
        assert_eq!(next.prev_hash, genesis.hash);
        assert_eq!(next.height, 1);
    }
}
