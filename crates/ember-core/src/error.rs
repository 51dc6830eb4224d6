//! Layered error types for the Ember protocol.
//!
//! Each subsystem gets its own [`thiserror::Error`] enum; [`EmberError`]
//! aggregates them so callers at any layer can propagate with `?`.

use thiserror::Error;

use crate::types::Hash256;

/// Address encoding/decoding failures.
#[derive(Debug, Error)]
pub enum AddressError {
    #[error("address is not valid base58: {0}")]
    InvalidBase58(String),
    #[error("decoded address has wrong length: expected {expected}, got {got}")]
    WrongLength { expected: usize, got: usize },
    #[error("address checksum mismatch")]
    ChecksumMismatch,
    #[error("unsupported address version byte: {0:#04x}")]
    UnsupportedVersion(u8),
}

/// Transaction construction, signing, and verification failures.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("transaction references unknown previous transaction {0}")]
    UnknownInput(Hash256),
    #[error("previous output index {index} out of range for transaction {txid}")]
    OutputIndexOutOfRange { txid: Hash256, index: i64 },
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },
    #[error("signature verification failed for input {0}")]
    InvalidSignature(usize),
    #[error("ECDSA signing failed: {0}")]
    Sign(String),
    #[error("non-coinbase transaction inputs and outputs do not balance: in={inputs} out={outputs}")]
    Unbalanced { inputs: u64, outputs: u64 },
    #[error("failed to canonically serialize transaction: {0}")]
    Codec(String),
}

/// Block validation failures.
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("block has no transactions")]
    Empty,
    #[error("block hash does not satisfy the proof-of-work target")]
    ProofOfWorkFailed,
    #[error("stored block hash does not match its recomputed header hash")]
    HashMismatch,
    #[error("nonce search exhausted without finding a valid hash")]
    NonceExhausted,
    #[error("block contains an invalid transaction: {0}")]
    InvalidTransaction(#[from] Box<TransactionError>),
    #[error("failed to canonically serialize block: {0}")]
    Codec(String),
}

/// Persistent store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("chain data already exists at {0}")]
    AlreadyExists(String),
    #[error("no chain data found at {0}")]
    NotFound(String),
    #[error("block not found: {0}")]
    BlockNotFound(Hash256),
    #[error("underlying store I/O error: {0}")]
    Io(String),
}

/// Peer wire protocol failures.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("socket I/O error: {0}")]
    Io(String),
    #[error("wire frame could not be decoded: {0}")]
    Malformed(String),
    #[error("unknown wire command: {0:?}")]
    UnknownCommand(String),
}

/// Wallet collaborator failures.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet file I/O error: {0}")]
    Io(String),
    #[error("wallet file is not valid JSON: {0}")]
    Malformed(String),
    #[error("no wallet found for address {0}")]
    AddressNotFound(String),
}

/// Top-level error type every public Ember operation returns.
#[derive(Debug, Error)]
pub enum EmberError {
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Wallet(#[from] WalletError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_error_converts_into_ember_error() {
        let e: EmberError = AddressError::ChecksumMismatch.into();
        assert!(matches!(e, EmberError::Address(AddressError::ChecksumMismatch)));
    }

    #[test]
    fn transaction_error_converts_into_ember_error() {
        let e: EmberError = TransactionError::InsufficientFunds {
            needed: 10,
            available: 5,
        }
        .into();
        assert!(matches!(e, EmberError::Transaction(_)));
    }

    #[test]
    fn store_error_display_includes_path() {
        let e = StoreError::AlreadyExists("./tmp/blocks_3000".into());
        assert!(e.to_string().contains("blocks_3000"));
    }

    #[test]
    fn block_error_wraps_transaction_error() {
        let tx_err = TransactionError::InvalidSignature(0);
        let block_err = BlockError::InvalidTransaction(Box::new(tx_err));
        assert!(block_err.to_string().contains("invalid transaction"));
    }
}
