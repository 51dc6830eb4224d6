//! Core wire/ledger types: hashes, transactions, and blocks.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TransactionError;
use crate::merkle;

/// A 32-byte SHA-256 digest, used for transaction ids and block hashes.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The all-zero hash, used as `prev_hash` on the genesis block and as
    /// the sentinel `prev_tx_id` on a coinbase input.
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash256(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Treat the digest as a big-endian unsigned integer, for comparison
    /// against the proof-of-work target.
    pub fn as_uint_be(&self) -> [u8; 32] {
        self.0
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", hex::encode(self.0))
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A 20-byte RIPEMD-160(SHA-256(pubkey)) digest identifying an address's
/// spending key.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct PubkeyHash(pub [u8; 20]);

impl PubkeyHash {
    pub const ZERO: PubkeyHash = PubkeyHash([0u8; 20]);

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Debug for PubkeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PubkeyHash({})", hex::encode(self.0))
    }
}

impl fmt::Display for PubkeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// One spend reference: the previous transaction and the output index it
/// consumes, plus the unlocking data proving ownership.
///
/// A coinbase input has `prev_tx_id == Hash256::ZERO`, `output_index == -1`,
/// an empty `signature`, and an arbitrary `pubkey` payload (the miner's
/// address bytes, or arbitrary genesis/coinbase data).
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TxInput {
    pub prev_tx_id: Hash256,
    pub output_index: i64,
    pub signature: Vec<u8>,
    pub pubkey: Vec<u8>,
}

impl TxInput {
    /// Build the sentinel coinbase input carrying `data` as its payload.
    pub fn coinbase(data: Vec<u8>) -> Self {
        TxInput {
            prev_tx_id: Hash256::ZERO,
            output_index: -1,
            signature: Vec::new(),
            pubkey: data,
        }
    }

    pub fn is_coinbase_input(&self) -> bool {
        self.prev_tx_id.is_zero() && self.output_index == -1 && self.signature.is_empty()
    }
}

/// One value locked to a recipient's `pubkey_hash`.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TxOutput {
    pub value: u64,
    pub pubkey_hash: PubkeyHash,
}

/// A transaction: a coinbase mint, or a set of inputs spending prior
/// outputs balanced against a set of new outputs.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    pub id: Hash256,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// A transaction is coinbase iff it has exactly one input and that
    /// input is the coinbase sentinel.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase_input()
    }

    /// Canonical serialization used both for hashing and for wire/store
    /// persistence: bincode's standard little-endian, fixed-int encoding.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, TransactionError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| TransactionError::Codec(e.to_string()))
    }

    /// `hash(tx)`: blank `id`, canonically serialize, SHA-256 the bytes.
    pub fn hash(&self) -> Result<Hash256, TransactionError> {
        let mut blanked = self.clone();
        blanked.id = Hash256::ZERO;
        let bytes = blanked.canonical_bytes()?;
        Ok(Hash256(crate::crypto::sha256(&bytes)))
    }

    /// Recompute and set `self.id` to `hash(self)`.
    pub fn set_id(&mut self) -> Result<(), TransactionError> {
        self.id = self.hash()?;
        Ok(())
    }

    /// Total value across all outputs.
    pub fn total_output_value(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// Build a coinbase transaction paying `reward` to `pubkey_hash`, with
    /// `data` embedded in the coinbase input (arbitrary bytes; random if
    /// the caller supplies none).
    pub fn new_coinbase(pubkey_hash: PubkeyHash, data: Vec<u8>, reward: u64) -> Self {
        let mut tx = Transaction {
            id: Hash256::ZERO,
            inputs: vec![TxInput::coinbase(data)],
            outputs: vec![TxOutput {
                value: reward,
                pubkey_hash,
            }],
        };
        // A hardcoded/caller-provided coinbase cannot fail to serialize.
        tx.set_id().expect("coinbase transaction is always serializable");
        tx
    }
}

/// A block: a Merkle-committed batch of transactions chained to its
/// predecessor by hash, stamped with the nonce that satisfies the
/// proof-of-work target.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    pub timestamp: u64,
    pub prev_hash: Hash256,
    pub transactions: Vec<Transaction>,
    pub nonce: u64,
    pub height: u64,
    pub hash: Hash256,
}

impl Block {
    /// Compute `merkle_root(transactions)`.
    pub fn merkle_root(&self) -> Hash256 {
        merkle::merkle_root_of_transactions(&self.transactions)
    }

    /// Recompute `SHA-256(prev_hash ∥ merkle_root ∥ be64(nonce) ∥ be64(DIFFICULTY))`
    /// for the block's stored `nonce`, independent of the stored `hash` field.
    pub fn recompute_hash(&self) -> Hash256 {
        crate::crypto::pow_hash(&self.prev_hash, &self.merkle_root(), self.nonce)
    }

    /// The block's coinbase transaction (always the first transaction).
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first().filter(|tx| tx.is_coinbase())
    }

    /// Canonical serialization for store persistence and wire transfer.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, crate::error::BlockError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| crate::error::BlockError::Codec(e.to_string()))
    }

    pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, crate::error::BlockError> {
        let (block, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| crate::error::BlockError::Codec(e.to_string()))?;
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // --- Hash256 ---

    #[test]
    fn zero_hash_is_zero() {
        assert!(Hash256::ZERO.is_zero());
    }

    #[test]
    fn nonzero_hash_is_not_zero() {
        assert!(!Hash256([1u8; 32]).is_zero());
    }

    #[test]
    fn hash_display_is_hex() {
        let h = Hash256([0xAB; 32]);
        assert_eq!(h.to_string(), "ab".repeat(32));
    }

    #[test]
    fn hash_bincode_round_trip() {
        let h = Hash256([7u8; 32]);
        let bytes = bincode::encode_to_vec(h, bincode::config::standard()).unwrap();
        let (decoded, _): (Hash256, _) =
            bincode::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
        assert_eq!(h, decoded);
    }

    // --- TxInput / coinbase ---

    #[test]
    fn coinbase_input_is_coinbase() {
        let input = TxInput::coinbase(b"genesis".to_vec());
        assert!(input.is_coinbase_input());
    }

    #[test]
    fn normal_input_is_not_coinbase() {
        let input = TxInput {
            prev_tx_id: Hash256([1; 32]),
            output_index: 0,
            signature: vec![0; 64],
            pubkey: vec![0; 64],
        };
        assert!(!input.is_coinbase_input());
    }

    #[test]
    fn input_with_negative_index_but_signature_is_not_coinbase() {
        let input = TxInput {
            prev_tx_id: Hash256::ZERO,
            output_index: -1,
            signature: vec![1],
            pubkey: vec![],
        };
        assert!(!input.is_coinbase_input());
    }

    // --- Transaction ---

    fn pkh(seed: u8) -> PubkeyHash {
        PubkeyHash([seed; 20])
    }

    #[test]
    fn single_input_coinbase_tx_is_coinbase() {
        let tx = Transaction::new_coinbase(pkh(1), b"data".to_vec(), 20);
        assert!(tx.is_coinbase());
    }

    #[test]
    fn multi_input_tx_with_coinbase_shaped_first_input_is_not_coinbase() {
        let mut tx = Transaction::new_coinbase(pkh(1), b"data".to_vec(), 20);
        tx.inputs.push(TxInput {
            prev_tx_id: Hash256([9; 32]),
            output_index: 0,
            signature: vec![0; 10],
            pubkey: vec![0; 64],
        });
        assert!(!tx.is_coinbase());
    }

    #[test]
    fn hash_is_deterministic() {
        let tx = Transaction::new_coinbase(pkh(2), b"x".to_vec(), 20);
        assert_eq!(tx.hash().unwrap(), tx.hash().unwrap());
    }

    #[test]
    fn hash_ignores_current_id_field() {
        let mut a = Transaction::new_coinbase(pkh(3), b"x".to_vec(), 20);
        let mut b = a.clone();
        b.id = Hash256([0xFF; 32]);
        assert_eq!(a.hash().unwrap(), b.hash().unwrap());
        a.set_id().unwrap();
    }

    #[test]
    fn total_output_value_sums_outputs() {
        let mut tx = Transaction::new_coinbase(pkh(4), vec![], 20);
        tx.outputs.push(TxOutput {
            value: 5,
            pubkey_hash: pkh(5),
        });
        assert_eq!(tx.total_output_value(), 25);
    }

    #[test]
    fn canonical_bytes_round_trip_through_block() {
        let tx = Transaction::new_coinbase(pkh(6), b"msg".to_vec(), 20);
        let block = Block {
            timestamp: 1000,
            prev_hash: Hash256::ZERO,
            transactions: vec![tx],
            nonce: 0,
            height: 0,
            hash: Hash256::ZERO,
        };
        let bytes = block.canonical_bytes().unwrap();
        let decoded = Block::from_canonical_bytes(&bytes).unwrap();
        assert_eq!(block, decoded);
    }

    #[test]
    fn single_tx_block_merkle_root_is_tx_hash() {
        let tx = Transaction::new_coinbase(pkh(7), b"only".to_vec(), 20);
        let txid = tx.hash().unwrap();
        let block = Block {
            timestamp: 0,
            prev_hash: Hash256::ZERO,
            transactions: vec![tx],
            nonce: 0,
            height: 0,
            hash: Hash256::ZERO,
        };
        assert_eq!(block.merkle_root(), merkle::merkle_root(&[txid]));
    }

    #[test]
    fn coinbase_accessor_finds_first_tx() {
        let tx = Transaction::new_coinbase(pkh(8), vec![], 20);
        let block = Block {
            timestamp: 0,
            prev_hash: Hash256::ZERO,
            transactions: vec![tx.clone()],
            nonce: 0,
            height: 0,
            hash: Hash256::ZERO,
        };
        assert_eq!(block.coinbase(), Some(&tx));
    }

    proptest! {
        /// `deserialize(serialize(tx)) == tx` for any coinbase transaction
        /// shape, regardless of reward value or embedded payload.
        #[test]
        fn coinbase_canonical_bytes_round_trip(seed: u8, reward: u64, data in proptest::collection::vec(any::<u8>(), 0..64)) {
            let tx = Transaction::new_coinbase(pkh(seed), data, reward);
            let bytes = tx.canonical_bytes().unwrap();
            let (decoded, _): (Transaction, _) =
                bincode::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
            prop_assert_eq!(decoded, tx);
        }

        /// `hash(tx)` does not depend on whatever `id` the transaction
        /// happened to carry beforehand.
        #[test]
        fn hash_is_independent_of_prior_id(seed: u8, garbage_id: [u8; 32]) {
            let mut tx = Transaction::new_coinbase(pkh(seed), vec![], 20);
            let expected = tx.hash().unwrap();
            tx.id = Hash256(garbage_id);
            prop_assert_eq!(tx.hash().unwrap(), expected);
        }
    }
}
