//! The sled-backed ledger: block storage, the chain tip, and the
//! operations a node performs on them.

use std::path::Path;

use ember_consensus::genesis;
use ember_core::crypto;
use ember_core::error::{StoreError, TransactionError};
use ember_core::types::{Block, Hash256, PubkeyHash, Transaction};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{info, instrument};

const TREE_BLOCKS: &str = "blocks";
const TREE_CHAINSTATE: &str = "chainstate";
pub(crate) const TREE_UTXO: &str = "utxo";
const LAST_HASH_KEY: &[u8] = b"lh";

/// A single node's view of the chain: its blocks, keyed by hash, and the
/// hash of its current tip.
pub struct Chain {
    db: sled::Db,
    blocks: sled::Tree,
    chainstate: sled::Tree,
    pub(crate) utxo: sled::Tree,
    last_hash: RwLock<Hash256>,
}

fn open_sled(path: &Path) -> Result<sled::Db, StoreError> {
    sled::open(path).or_else(|first_err| {
        // sled takes an exclusive lock on its directory; a stale lock from
        // a crashed process of ours is the only case worth retrying.
        sled::Config::new()
            .path(path)
            .open()
            .map_err(|_| StoreError::Io(first_err.to_string()))
    })
}

fn db_exists(path: &Path) -> bool {
    path.join("db").exists()
}

impl Chain {
    /// Create a brand-new chain at `path`, seeded with a genesis block
    /// paying the fixed mining reward to `reward_address`. Fails if a
    /// chain already exists at `path`.
    #[instrument(skip(reward_address), fields(path = %path.as_ref().display()))]
    pub fn init(path: impl AsRef<Path>, reward_address: PubkeyHash) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if db_exists(path) {
            return Err(StoreError::AlreadyExists(path.display().to_string()));
        }
        let db = open_sled(path)?;
        let blocks = db.open_tree(TREE_BLOCKS).map_err(|e| StoreError::Io(e.to_string()))?;
        let chainstate = db
            .open_tree(TREE_CHAINSTATE)
            .map_err(|e| StoreError::Io(e.to_string()))?;
        let utxo = db.open_tree(TREE_UTXO).map_err(|e| StoreError::Io(e.to_string()))?;

        let genesis = genesis::build_genesis_block(reward_address)
            .map_err(|e| StoreError::Io(e.to_string()))?;
        info!(hash = %genesis.hash, "genesis block created");

        let bytes = genesis
            .canonical_bytes()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        blocks
            .insert(genesis.hash.as_bytes(), bytes)
            .map_err(|e| StoreError::Io(e.to_string()))?;
        chainstate
            .insert(LAST_HASH_KEY, genesis.hash.as_bytes())
            .map_err(|e| StoreError::Io(e.to_string()))?;
        db.flush().map_err(|e| StoreError::Io(e.to_string()))?;

        let chain = Chain {
            db,
            blocks,
            chainstate,
            utxo,
            last_hash: RwLock::new(genesis.hash),
        };
        crate::utxo::UtxoIndex(&chain).reindex()?;
        Ok(chain)
    }

    /// Open a chain previously created with [`Chain::init`]. Fails if no
    /// chain exists at `path`.
    #[instrument(fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !db_exists(path) {
            return Err(StoreError::NotFound(path.display().to_string()));
        }
        let db = open_sled(path)?;
        let blocks = db.open_tree(TREE_BLOCKS).map_err(|e| StoreError::Io(e.to_string()))?;
        let chainstate = db
            .open_tree(TREE_CHAINSTATE)
            .map_err(|e| StoreError::Io(e.to_string()))?;
        let utxo = db.open_tree(TREE_UTXO).map_err(|e| StoreError::Io(e.to_string()))?;

        let last_hash = chainstate
            .get(LAST_HASH_KEY)
            .map_err(|e| StoreError::Io(e.to_string()))?
            .ok_or_else(|| StoreError::NotFound("missing chain tip".to_string()))?;
        let last_hash = Hash256(last_hash.as_ref().try_into().map_err(|_| {
            StoreError::Io("corrupt chain tip: wrong length".to_string())
        })?);

        Ok(Chain {
            db,
            blocks,
            chainstate,
            utxo,
            last_hash: RwLock::new(last_hash),
        })
    }

    /// Current tip hash.
    pub fn tip_hash(&self) -> Hash256 {
        *self.last_hash.read()
    }

    /// Force every pending write to disk. `add_block`/`mine_block` already
    /// flush after each commit; this exists for callers (the CLI's
    /// `start-node` shutdown hook) that want a final flush before exit
    /// regardless of what was last written.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush().map(|_| ()).map_err(|e| StoreError::Io(e.to_string()))
    }

    /// Fetch a block by hash.
    pub fn get_block(&self, hash: &Hash256) -> Result<Block, StoreError> {
        let bytes = self
            .blocks
            .get(hash.as_bytes())
            .map_err(|e| StoreError::Io(e.to_string()))?
            .ok_or(StoreError::BlockNotFound(*hash))?;
        Block::from_canonical_bytes(&bytes).map_err(|e| StoreError::Io(e.to_string()))
    }

    /// Hashes of every block, from the tip back to genesis.
    pub fn get_block_hashes(&self) -> Result<Vec<Hash256>, StoreError> {
        self.iter().map(|r| r.map(|b| b.hash)).collect()
    }

    /// Height of the current tip block.
    pub fn get_best_height(&self) -> Result<u64, StoreError> {
        let tip = self.get_block(&self.tip_hash())?;
        Ok(tip.height)
    }

    /// An iterator walking blocks from the tip back to (and including)
    /// genesis.
    pub fn iter(&self) -> ChainIter<'_> {
        ChainIter {
            chain: self,
            current: Some(self.tip_hash()),
        }
    }

    /// Persist a block received from a peer. A no-op if the block is
    /// already known. Advances the tip only if the block is taller than
    /// the current tip (first-seen-at-max-height wins; this protocol does
    /// not reorganize deeper forks).
    #[instrument(skip(self, block), fields(height = block.height, hash = %block.hash))]
    pub fn add_block(&self, block: &Block) -> Result<(), StoreError> {
        if self
            .blocks
            .contains_key(block.hash.as_bytes())
            .map_err(|e| StoreError::Io(e.to_string()))?
        {
            return Ok(());
        }
        let bytes = block.canonical_bytes().map_err(|e| StoreError::Io(e.to_string()))?;
        self.blocks
            .insert(block.hash.as_bytes(), bytes)
            .map_err(|e| StoreError::Io(e.to_string()))?;

        let mut last_hash = self.last_hash.write();
        let tip = self.get_block(&last_hash)?;
        if block.height > tip.height {
            self.chainstate
                .insert(LAST_HASH_KEY, block.hash.as_bytes())
                .map_err(|e| StoreError::Io(e.to_string()))?;
            *last_hash = block.hash;
            info!(height = block.height, "chain tip advanced");
        }
        self.db.flush().map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }

    /// Mine a new block over `transactions` atop the current tip. Every
    /// non-coinbase transaction must verify against the chain's recorded
    /// history, or mining aborts without touching the store.
    #[instrument(skip(self, transactions))]
    pub fn mine_block(&self, transactions: Vec<Transaction>) -> Result<Block, StoreError> {
        for tx in &transactions {
            self.verify_transaction(tx)
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }

        let tip_hash = self.tip_hash();
        let tip = self.get_block(&tip_hash)?;
        let block = genesis::create_block(transactions, tip_hash, tip.height + 1)
            .map_err(|e| StoreError::Io(e.to_string()))?;

        let bytes = block.canonical_bytes().map_err(|e| StoreError::Io(e.to_string()))?;
        self.blocks
            .insert(block.hash.as_bytes(), bytes)
            .map_err(|e| StoreError::Io(e.to_string()))?;
        self.chainstate
            .insert(LAST_HASH_KEY, block.hash.as_bytes())
            .map_err(|e| StoreError::Io(e.to_string()))?;
        *self.last_hash.write() = block.hash;
        self.db.flush().map_err(|e| StoreError::Io(e.to_string()))?;

        crate::utxo::UtxoIndex(self).update(&block)?;
        info!(height = block.height, hash = %block.hash, "mined and connected block");
        Ok(block)
    }

    /// Find a transaction anywhere in the chain by id.
    pub fn find_transaction(&self, id: &Hash256) -> Result<Transaction, StoreError> {
        for block in self.iter() {
            let block = block?;
            if let Some(tx) = block.transactions.iter().find(|tx| &tx.id == id) {
                return Ok(tx.clone());
            }
        }
        Err(StoreError::NotFound(format!("transaction {id}")))
    }

    fn prev_transactions(&self, tx: &Transaction) -> Result<HashMap<Hash256, Transaction>, StoreError> {
        let mut prev_txs = HashMap::new();
        if tx.is_coinbase() {
            return Ok(prev_txs);
        }
        for input in &tx.inputs {
            let prev_tx = self.find_transaction(&input.prev_tx_id)?;
            prev_txs.insert(prev_tx.id, prev_tx);
        }
        Ok(prev_txs)
    }

    /// Sign every input of `tx` against the transactions it spends from.
    pub fn sign_transaction(
        &self,
        tx: &mut Transaction,
        key: &crypto::KeyPair,
    ) -> Result<(), StoreError> {
        let prev_txs = self.prev_transactions(tx)?;
        crypto::sign_transaction(tx, key, &prev_txs).map_err(|e| StoreError::Io(e.to_string()))
    }

    /// Verify every input signature of `tx` against the transactions it
    /// spends from. Coinbase transactions always verify.
    pub fn verify_transaction(&self, tx: &Transaction) -> Result<(), TransactionError> {
        if tx.is_coinbase() {
            return Ok(());
        }
        let prev_txs = self
            .prev_transactions(tx)
            .map_err(|e| TransactionError::Codec(e.to_string()))?;
        crypto::verify_transaction(tx, &prev_txs)
    }
}

/// Walks blocks from the tip back to genesis, oldest-last.
pub struct ChainIter<'a> {
    chain: &'a Chain,
    current: Option<Hash256>,
}

impl Iterator for ChainIter<'_> {
    type Item = Result<Block, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.current?;
        let block = match self.chain.get_block(&hash) {
            Ok(b) => b,
            Err(e) => {
                self.current = None;
                return Some(Err(e));
            }
        };
        self.current = if block.prev_hash.is_zero() {
            None
        } else {
            Some(block.prev_hash)
        };
        Some(Ok(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::constants::MINING_REWARD;
    use tempfile::tempdir;

    fn pkh(seed: u8) -> PubkeyHash {
        PubkeyHash([seed; 20])
    }

    #[test]
    fn init_creates_genesis_and_refuses_to_reinit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chain");
        let chain = Chain::init(&path, pkh(1)).unwrap();
        assert_eq!(chain.get_best_height().unwrap(), 0);
        assert!(matches!(
            Chain::init(&path, pkh(1)),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn open_fails_when_nothing_exists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing");
        assert!(matches!(Chain::open(&path), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn open_recovers_existing_tip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chain");
        let tip = {
            let chain = Chain::init(&path, pkh(2)).unwrap();
            chain.tip_hash()
        };
        let reopened = Chain::open(&path).unwrap();
        assert_eq!(reopened.tip_hash(), tip);
    }

    #[test]
    fn mine_block_advances_height_and_tip() {
        let dir = tempdir().unwrap();
        let chain = Chain::init(dir.path().join("chain"), pkh(3)).unwrap();
        let tx = Transaction::new_coinbase(pkh(4), b"block 1".to_vec(), MINING_REWARD);
        let block = chain.mine_block(vec![tx]).unwrap();
        assert_eq!(block.height, 1);
        assert_eq!(chain.tip_hash(), block.hash);
        assert_eq!(chain.get_best_height().unwrap(), 1);
    }

    #[test]
    fn get_block_hashes_walks_from_tip_to_genesis() {
        let dir = tempdir().unwrap();
        let chain = Chain::init(dir.path().join("chain"), pkh(5)).unwrap();
        let tx = Transaction::new_coinbase(pkh(6), b"block 1".to_vec(), MINING_REWARD);
        let block1 = chain.mine_block(vec![tx]).unwrap();
        let hashes = chain.get_block_hashes().unwrap();
        assert_eq!(hashes.len(), 2);
        assert_eq!(hashes[0], block1.hash);
    }

    #[test]
    fn find_transaction_locates_coinbase_by_id() {
        let dir = tempdir().unwrap();
        let chain = Chain::init(dir.path().join("chain"), pkh(7)).unwrap();
        let genesis = chain.get_block(&chain.tip_hash()).unwrap();
        let coinbase = genesis.coinbase().unwrap();
        let found = chain.find_transaction(&coinbase.id).unwrap();
        assert_eq!(found.id, coinbase.id);
    }

    #[test]
    fn add_block_is_idempotent() {
        let dir = tempdir().unwrap();
        let chain = Chain::init(dir.path().join("chain"), pkh(8)).unwrap();
        let tx = Transaction::new_coinbase(pkh(9), b"b1".to_vec(), MINING_REWARD);
        let block = chain.mine_block(vec![tx]).unwrap();
        chain.add_block(&block).unwrap();
        assert_eq!(chain.get_best_height().unwrap(), 1);
    }

    #[test]
    fn add_block_ignores_shorter_fork() {
        let dir = tempdir().unwrap();
        let chain = Chain::init(dir.path().join("chain"), pkh(10)).unwrap();
        let tx = Transaction::new_coinbase(pkh(11), b"b1".to_vec(), MINING_REWARD);
        let block1 = chain.mine_block(vec![tx]).unwrap();

        let genesis_hash = block1.prev_hash;
        let rival_tx = Transaction::new_coinbase(pkh(12), b"rival".to_vec(), MINING_REWARD);
        let rival = ember_consensus::genesis::create_block(vec![rival_tx], genesis_hash, 1).unwrap();

        chain.add_block(&rival).unwrap();
        assert_eq!(chain.tip_hash(), block1.hash);
    }
}
