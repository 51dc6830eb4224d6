//! Base58Check address encoding and validation.
//!
//! `address(pk) = Base58(version ∥ pubkey_hash ∥ checksum)` where
//! `checksum = SHA-256(SHA-256(version ∥ pubkey_hash))[0..4]`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{ADDRESS_VERSION, CHECKSUM_LEN, PUBKEY_HASH_LEN};
use crate::crypto::sha256d;
use crate::error::AddressError;
use crate::types::PubkeyHash;

/// A decoded, validated address: a version byte plus a pubkey hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    version: u8,
    pubkey_hash: PubkeyHash,
}

impl Address {
    /// Build an address for `pubkey_hash` under the protocol's single
    /// supported version byte.
    pub fn new(pubkey_hash: PubkeyHash) -> Self {
        Address {
            version: ADDRESS_VERSION,
            pubkey_hash,
        }
    }

    pub fn pubkey_hash(&self) -> PubkeyHash {
        self.pubkey_hash
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    fn checksum(version: u8, pubkey_hash: &PubkeyHash) -> [u8; CHECKSUM_LEN] {
        let mut payload = Vec::with_capacity(1 + PUBKEY_HASH_LEN);
        payload.push(version);
        payload.extend_from_slice(pubkey_hash.as_bytes());
        let digest = sha256d(&payload);
        let mut out = [0u8; CHECKSUM_LEN];
        out.copy_from_slice(&digest[..CHECKSUM_LEN]);
        out
    }

    /// Base58-encode `version ∥ pubkey_hash ∥ checksum`.
    pub fn encode(&self) -> String {
        let checksum = Self::checksum(self.version, &self.pubkey_hash);
        let mut full = Vec::with_capacity(1 + PUBKEY_HASH_LEN + CHECKSUM_LEN);
        full.push(self.version);
        full.extend_from_slice(self.pubkey_hash.as_bytes());
        full.extend_from_slice(&checksum);
        bs58::encode(full).into_string()
    }

    /// Decode and validate a Base58Check address string: the checksum
    /// over `version ∥ pubkey_hash` must match the trailing four bytes,
    /// and the version byte must be the one this protocol supports.
    pub fn decode(s: &str) -> Result<Self, AddressError> {
        let full = bs58::decode(s)
            .into_vec()
            .map_err(|e| AddressError::InvalidBase58(e.to_string()))?;

        let expected_len = 1 + PUBKEY_HASH_LEN + CHECKSUM_LEN;
        if full.len() != expected_len {
            return Err(AddressError::WrongLength {
                expected: expected_len,
                got: full.len(),
            });
        }

        let version = full[0];
        let mut pubkey_hash_bytes = [0u8; PUBKEY_HASH_LEN];
        pubkey_hash_bytes.copy_from_slice(&full[1..1 + PUBKEY_HASH_LEN]);
        let pubkey_hash = PubkeyHash(pubkey_hash_bytes);

        let claimed_checksum = &full[1 + PUBKEY_HASH_LEN..];
        let expected_checksum = Self::checksum(version, &pubkey_hash);
        if claimed_checksum != expected_checksum {
            return Err(AddressError::ChecksumMismatch);
        }

        if version != ADDRESS_VERSION {
            return Err(AddressError::UnsupportedVersion(version));
        }

        Ok(Address { version, pubkey_hash })
    }
}

/// `validate_address(s)`: true iff `s` decodes to a well-formed,
/// checksum-matching address under a supported version byte.
pub fn validate_address(s: &str) -> bool {
    Address::decode(s).is_ok()
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.encode())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::decode(s)
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Address::decode(&s).map_err(serde::de::Error::custom)
    }
}
