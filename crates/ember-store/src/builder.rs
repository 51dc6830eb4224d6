//! `NewTransaction`: the high-level spend operation the CLI's `send`
//! subcommand drives. Selects spendable outputs, balances them against
//! the requested amount plus a change output, and leaves the result
//! signed and ready to broadcast.

use ember_core::address::Address;
use ember_core::crypto::KeyPair;
use ember_core::error::{EmberError, TransactionError};
use ember_core::types::{Hash256, Transaction, TxInput, TxOutput};

use crate::chain::Chain;
use crate::utxo::UtxoIndex;

/// Build, balance, and sign a transaction spending `amount` from `from_key`
/// to `to`:
///
/// 1. Accumulate spendable outputs under `from_key`'s pubkey hash until
///    their total covers `amount`; fail with [`TransactionError::InsufficientFunds`]
///    if the index is exhausted first.
/// 2. Emit one input per selected `(tx_id, output_index)`, unsigned.
/// 3. Emit the payment output and, if there is change, a change output
///    back to `from_key`.
/// 4. Set the transaction id, then sign every input against the chain's
///    recorded history.
pub fn new_transaction(
    chain: &Chain,
    from_key: &KeyPair,
    to: &Address,
    amount: u64,
) -> Result<Transaction, EmberError> {
    let utxo = UtxoIndex(chain);
    let from_pubkey_hash = from_key.pubkey_hash();

    let (accumulated, selection) = utxo.find_spendable(&from_pubkey_hash, amount)?;
    if accumulated < amount {
        return Err(TransactionError::InsufficientFunds {
            needed: amount,
            available: accumulated,
        }
        .into());
    }

    let mut inputs: Vec<TxInput> = Vec::new();
    let mut selected: Vec<(Hash256, Vec<i64>)> = selection.into_iter().collect();
    selected.sort_by_key(|(txid, _)| *txid);
    for (txid, mut indices) in selected {
        indices.sort_unstable();
        for output_index in indices {
            inputs.push(TxInput {
                prev_tx_id: txid,
                output_index,
                signature: Vec::new(),
                pubkey: from_key.public_key_bytes().to_vec(),
            });
        }
    }

    let mut outputs = vec![TxOutput {
        value: amount,
        pubkey_hash: to.pubkey_hash(),
    }];
    if accumulated > amount {
        outputs.push(TxOutput {
            value: accumulated - amount,
            pubkey_hash: from_pubkey_hash,
        });
    }

    let mut tx = Transaction {
        id: Hash256::ZERO,
        inputs,
        outputs,
    };
    tx.set_id()?;
    chain.sign_transaction(&mut tx, from_key)?;
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::constants::MINING_REWARD;
    use tempfile::tempdir;

    #[test]
    fn spends_genesis_coinbase_and_leaves_change() {
        let dir = tempdir().unwrap();
        let from_key = KeyPair::generate();
        let to_key = KeyPair::generate();
        let from_addr = Address::new(from_key.pubkey_hash());
        let to_addr = Address::new(to_key.pubkey_hash());

        let chain = Chain::init(dir.path().join("chain"), from_addr.pubkey_hash()).unwrap();

        let tx = new_transaction(&chain, &from_key, &to_addr, 5).unwrap();
        assert_eq!(tx.total_output_value(), MINING_REWARD);
        assert!(chain.verify_transaction(&tx).is_ok());

        let payment = tx.outputs.iter().find(|o| o.pubkey_hash == to_addr.pubkey_hash()).unwrap();
        assert_eq!(payment.value, 5);
        let change = tx
            .outputs
            .iter()
            .find(|o| o.pubkey_hash == from_addr.pubkey_hash())
            .unwrap();
        assert_eq!(change.value, MINING_REWARD - 5);
    }

    #[test]
    fn exact_amount_leaves_no_change_output() {
        let dir = tempdir().unwrap();
        let from_key = KeyPair::generate();
        let to_key = KeyPair::generate();
        let to_addr = Address::new(to_key.pubkey_hash());
        let chain = Chain::init(dir.path().join("chain"), from_key.pubkey_hash()).unwrap();

        let tx = new_transaction(&chain, &from_key, &to_addr, MINING_REWARD).unwrap();
        assert_eq!(tx.outputs.len(), 1);
    }

    #[test]
    fn insufficient_funds_is_reported_and_nothing_is_mutated() {
        let dir = tempdir().unwrap();
        let from_key = KeyPair::generate();
        let to_key = KeyPair::generate();
        let to_addr = Address::new(to_key.pubkey_hash());
        let chain = Chain::init(dir.path().join("chain"), from_key.pubkey_hash()).unwrap();

        let before = chain.get_best_height().unwrap();
        let err = new_transaction(&chain, &from_key, &to_addr, 1000).unwrap_err();
        assert!(matches!(
            err,
            EmberError::Transaction(TransactionError::InsufficientFunds { .. })
        ));
        assert_eq!(chain.get_best_height().unwrap(), before);
    }
}
