//! The UTXO index: a cache of unspent outputs, keyed by the transaction
//! that created them, so that building a new transaction never requires
//! walking the whole chain.

use std::collections::HashMap;

use ember_core::error::StoreError;
use ember_core::types::{Hash256, PubkeyHash, TxOutput};
use tracing::instrument;

use crate::chain::Chain;

/// One unspent output together with the index it occupies in its
/// transaction's output list (needed to build a spending [`TxInput`](ember_core::types::TxInput)).
#[derive(Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
struct IndexedOutput {
    index: i64,
    output: StoredOutput,
}

#[derive(Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
struct StoredOutput {
    value: u64,
    pubkey_hash: [u8; 20],
}

impl From<&TxOutput> for StoredOutput {
    fn from(o: &TxOutput) -> Self {
        StoredOutput {
            value: o.value,
            pubkey_hash: *o.pubkey_hash.as_bytes(),
        }
    }
}

impl From<StoredOutput> for TxOutput {
    fn from(s: StoredOutput) -> Self {
        TxOutput {
            value: s.value,
            pubkey_hash: PubkeyHash(s.pubkey_hash),
        }
    }
}

/// A view over a [`Chain`]'s UTXO tree.
pub struct UtxoIndex<'a>(pub &'a Chain);

impl UtxoIndex<'_> {
    fn encode(outs: &[IndexedOutput]) -> Result<Vec<u8>, StoreError> {
        bincode::encode_to_vec(outs, bincode::config::standard())
            .map_err(|e| StoreError::Io(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Vec<IndexedOutput>, StoreError> {
        bincode::decode_from_slice(bytes, bincode::config::standard())
            .map(|(v, _)| v)
            .map_err(|e| StoreError::Io(e.to_string()))
    }

    /// Rebuild the UTXO index from scratch by walking the whole chain.
    /// Used after `reindexutxo` and whenever a fresh chain is created.
    #[instrument(skip(self))]
    pub fn reindex(&self) -> Result<(), StoreError> {
        self.0.utxo.clear().map_err(|e| StoreError::Io(e.to_string()))?;

        let mut spent: HashMap<Hash256, Vec<i64>> = HashMap::new();
        let mut unspent: HashMap<Hash256, Vec<IndexedOutput>> = HashMap::new();

        for block in self.0.iter() {
            let block = block?;
            for tx in &block.transactions {
                'outputs: for (idx, out) in tx.outputs.iter().enumerate() {
                    let idx = idx as i64;
                    if let Some(spent_indices) = spent.get(&tx.id) {
                        if spent_indices.contains(&idx) {
                            continue 'outputs;
                        }
                    }
                    unspent.entry(tx.id).or_default().push(IndexedOutput {
                        index: idx,
                        output: out.into(),
                    });
                }
                if !tx.is_coinbase() {
                    for input in &tx.inputs {
                        spent.entry(input.prev_tx_id).or_default().push(input.output_index);
                    }
                }
            }
        }

        for (txid, outs) in unspent {
            let bytes = Self::encode(&outs)?;
            self.0
                .utxo
                .insert(txid.as_bytes(), bytes)
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }
        self.0.flush()?;
        Ok(())
    }

    /// Apply the effect of a newly connected `block` on the UTXO index:
    /// remove the outputs it spends, record the outputs it creates.
    #[instrument(skip(self, block), fields(height = block.height))]
    pub fn update(&self, block: &ember_core::types::Block) -> Result<(), StoreError> {
        for tx in &block.transactions {
            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    let key = input.prev_tx_id;
                    let remaining = match self
                        .0
                        .utxo
                        .get(key.as_bytes())
                        .map_err(|e| StoreError::Io(e.to_string()))?
                    {
                        Some(bytes) => Self::decode(&bytes)?
                            .into_iter()
                            .filter(|o| o.index != input.output_index)
                            .collect::<Vec<_>>(),
                        None => Vec::new(),
                    };
                    if remaining.is_empty() {
                        self.0
                            .utxo
                            .remove(key.as_bytes())
                            .map_err(|e| StoreError::Io(e.to_string()))?;
                    } else {
                        let bytes = Self::encode(&remaining)?;
                        self.0
                            .utxo
                            .insert(key.as_bytes(), bytes)
                            .map_err(|e| StoreError::Io(e.to_string()))?;
                    }
                }
            }

            let outs: Vec<IndexedOutput> = tx
                .outputs
                .iter()
                .enumerate()
                .map(|(idx, out)| IndexedOutput {
                    index: idx as i64,
                    output: out.into(),
                })
                .collect();
            let bytes = Self::encode(&outs)?;
            self.0
                .utxo
                .insert(tx.id.as_bytes(), bytes)
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }
        self.0.flush()
    }

    /// Number of transactions with at least one unspent output.
    pub fn count_transactions(&self) -> usize {
        self.0.utxo.len()
    }

    /// Every unspent output locked to `pubkey_hash`, across all transactions.
    pub fn find_unspent_outputs(&self, pubkey_hash: &PubkeyHash) -> Result<Vec<TxOutput>, StoreError> {
        let mut found = Vec::new();
        for entry in self.0.utxo.iter() {
            let (_, bytes) = entry.map_err(|e| StoreError::Io(e.to_string()))?;
            for out in Self::decode(&bytes)? {
                let out: TxOutput = out.output.into();
                if &out.pubkey_hash == pubkey_hash {
                    found.push(out);
                }
            }
        }
        Ok(found)
    }

    /// Accumulate unspent outputs locked to `pubkey_hash` until their total
    /// reaches `amount` (or the index is exhausted). Returns the amount
    /// actually accumulated and the `(txid, output_index)` pairs to spend.
    pub fn find_spendable(
        &self,
        pubkey_hash: &PubkeyHash,
        amount: u64,
    ) -> Result<(u64, HashMap<Hash256, Vec<i64>>), StoreError> {
        let mut accumulated = 0u64;
        let mut unspent: HashMap<Hash256, Vec<i64>> = HashMap::new();

        'scan: for entry in self.0.utxo.iter() {
            let (key, bytes) = entry.map_err(|e| StoreError::Io(e.to_string()))?;
            let txid = Hash256(key.as_ref().try_into().map_err(|_| {
                StoreError::Io("corrupt utxo key: wrong length".to_string())
            })?);
            for indexed in Self::decode(&bytes)? {
                let out: TxOutput = indexed.output.clone().into();
                if &out.pubkey_hash == pubkey_hash && accumulated < amount {
                    accumulated += out.value;
                    unspent.entry(txid).or_default().push(indexed.index);
                }
                if accumulated >= amount {
                    break 'scan;
                }
            }
        }
        Ok((accumulated, unspent))
    }
}
