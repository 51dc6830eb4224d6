//! Hashing primitives, P-256 keypairs, and the transaction signing scheme.

use std::collections::HashMap;
use std::fmt;

use ecdsa::signature::{Signer, Verifier};
use elliptic_curve::sec1::ToEncodedPoint;
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::constants::DIFFICULTY;
use crate::error::TransactionError;
use crate::types::{Hash256, PubkeyHash, Transaction};

/// Single SHA-256, per FIPS-180-4.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// SHA-256 applied twice, used for Base58Check checksums.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// RIPEMD-160, used to derive a pubkey hash from SHA-256(pubkey).
pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    let digest = Ripemd160::digest(data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}

/// `RIPEMD-160(SHA-256(pubkey))`.
pub fn pubkey_hash(pubkey_bytes: &[u8]) -> PubkeyHash {
    PubkeyHash(ripemd160(&sha256(pubkey_bytes)))
}

/// `be64(n)`: eight bytes, big-endian.
fn be64(n: u64) -> [u8; 8] {
    n.to_be_bytes()
}

/// `SHA-256(prev_hash ∥ merkle_root ∥ be64(nonce) ∥ be64(DIFFICULTY))`.
pub fn pow_hash(prev_hash: &Hash256, merkle_root: &Hash256, nonce: u64) -> Hash256 {
    let mut data = Vec::with_capacity(32 + 32 + 8 + 8);
    data.extend_from_slice(prev_hash.as_bytes());
    data.extend_from_slice(merkle_root.as_bytes());
    data.extend_from_slice(&be64(nonce));
    data.extend_from_slice(&be64(DIFFICULTY as u64));
    Hash256(sha256(&data))
}

/// A P-256 (secp256r1) keypair.
///
/// `Debug` never prints the private scalar.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &hex::encode(self.public_key_bytes()))
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
        KeyPair { signing_key }
    }

    /// Reconstruct a keypair from its 32-byte private scalar.
    pub fn from_private_scalar(bytes: &[u8]) -> Result<Self, TransactionError> {
        let signing_key = SigningKey::from_slice(bytes)
            .map_err(|e| TransactionError::Sign(format!("invalid private scalar: {e}")))?;
        Ok(KeyPair { signing_key })
    }

    /// The 32-byte private scalar, for wallet persistence.
    pub fn private_scalar_bytes(&self) -> Vec<u8> {
        self.signing_key.to_bytes().to_vec()
    }

    /// Uncompressed public key as the 64-byte concatenation `X ∥ Y`
    /// (no leading format byte, unlike SEC1's usual 0x04 prefix).
    pub fn public_key_bytes(&self) -> [u8; 64] {
        encode_public_key(&VerifyingKey::from(&self.signing_key))
    }

    pub fn pubkey_hash(&self) -> PubkeyHash {
        pubkey_hash(&self.public_key_bytes())
    }

    /// Sign a 32-byte digest, returning `r ∥ s` (both fixed to the curve's
    /// 32-byte order width).
    fn sign_digest(&self, digest: &[u8; 32]) -> Result<Vec<u8>, TransactionError> {
        let signature: Signature = self
            .signing_key
            .try_sign(digest)
            .map_err(|e| TransactionError::Sign(e.to_string()))?;
        Ok(signature.to_bytes().to_vec())
    }
}

/// Encode a verifying key as the bare 64-byte `X ∥ Y` point, stripping
/// SEC1's leading format byte.
fn encode_public_key(key: &VerifyingKey) -> [u8; 64] {
    let point = key.to_encoded_point(false);
    let mut out = [0u8; 64];
    // `point` is 0x04 || X(32) || Y(32) in uncompressed form.
    out.copy_from_slice(&point.as_bytes()[1..65]);
    out
}

/// Reconstruct a verifying key from a 64-byte `X ∥ Y` point.
fn decode_public_key(bytes: &[u8]) -> Result<VerifyingKey, TransactionError> {
    if bytes.len() != 64 {
        return Err(TransactionError::Sign(format!(
            "public key must be 64 bytes (X || Y), got {}",
            bytes.len()
        )));
    }
    let mut sec1 = [0u8; 65];
    sec1[0] = 0x04;
    sec1[1..].copy_from_slice(bytes);
    VerifyingKey::from_sec1_bytes(&sec1)
        .map_err(|e| TransactionError::Sign(format!("invalid public key point: {e}")))
}

fn verify_digest(pubkey_bytes: &[u8], digest: &[u8; 32], sig_bytes: &[u8]) -> Result<bool, TransactionError> {
    let verifying_key = decode_public_key(pubkey_bytes)?;
    let signature = Signature::from_slice(sig_bytes)
        .map_err(|e| TransactionError::Sign(format!("malformed signature: {e}")))?;
    Ok(verifying_key.verify(digest, &signature).is_ok())
}

/// Build the "trimmed copy" used for both signing and verification: every
/// input's `signature` and `pubkey` cleared, outputs untouched, `id` left
/// as-is (the caller sets it per-input below).
fn trimmed_copy(tx: &Transaction) -> Transaction {
    let mut copy = tx.clone();
    for input in &mut copy.inputs {
        input.signature = Vec::new();
        input.pubkey = Vec::new();
    }
    copy
}

/// Sign every non-coinbase input of `tx` under `priv_key`: for each
/// input, substitute the referenced output's `pubkey_hash` into
/// the trimmed copy, rehash to get the per-input signing digest, then
/// ECDSA-sign that digest and store the result in the original input.
pub fn sign_transaction(
    tx: &mut Transaction,
    priv_key: &KeyPair,
    prev_txs: &HashMap<Hash256, Transaction>,
) -> Result<(), TransactionError> {
    if tx.is_coinbase() {
        return Ok(());
    }

    let mut trimmed = trimmed_copy(tx);

    for i in 0..tx.inputs.len() {
        let input = &tx.inputs[i];
        let prev_tx = prev_txs
            .get(&input.prev_tx_id)
            .ok_or(TransactionError::UnknownInput(input.prev_tx_id))?;
        let output = prev_output(prev_tx, input.output_index)?;

        trimmed.inputs[i].pubkey = output.pubkey_hash.as_bytes().to_vec();
        trimmed.id = trimmed.hash()?;
        trimmed.inputs[i].pubkey = Vec::new();

        let digest = *trimmed.id.as_bytes();
        let signature = priv_key.sign_digest(&digest)?;
        tx.inputs[i].signature = signature;
    }

    Ok(())
}

/// Verify every non-coinbase input of `tx`, mirroring [`sign_transaction`]
/// exactly to reconstruct each input's signing digest.
pub fn verify_transaction(
    tx: &Transaction,
    prev_txs: &HashMap<Hash256, Transaction>,
) -> Result<(), TransactionError> {
    if tx.is_coinbase() {
        return Ok(());
    }

    let mut trimmed = trimmed_copy(tx);
    let mut input_value = 0u64;

    for i in 0..tx.inputs.len() {
        let input = &tx.inputs[i];
        let prev_tx = prev_txs
            .get(&input.prev_tx_id)
            .ok_or(TransactionError::UnknownInput(input.prev_tx_id))?;
        let output = prev_output(prev_tx, input.output_index)?;
        input_value += output.value;

        trimmed.inputs[i].pubkey = output.pubkey_hash.as_bytes().to_vec();
        trimmed.id = trimmed.hash()?;
        trimmed.inputs[i].pubkey = Vec::new();

        let digest = *trimmed.id.as_bytes();
        let ok = verify_digest(&input.pubkey, &digest, &input.signature)?;
        if !ok {
            return Err(TransactionError::InvalidSignature(i));
        }
    }

    let output_value = tx.total_output_value();
    if input_value != output_value {
        return Err(TransactionError::Unbalanced {
            inputs: input_value,
            outputs: output_value,
        });
    }

    Ok(())
}

fn prev_output(
    prev_tx: &Transaction,
    output_index: i64,
) -> Result<&crate::types::TxOutput, TransactionError> {
    if output_index < 0 || output_index as usize >= prev_tx.outputs.len() {
        return Err(TransactionError::OutputIndexOutOfRange {
            txid: prev_tx.id,
            index: output_index,
        });
    }
    Ok(&prev_tx.outputs[output_index as usize])
}
