//! # ember-wallet
//! A flat JSON keystore mapping addresses to keypairs: create a wallet,
//! list known addresses, and look a keypair up by its address. No HD
//! derivation, no passphrase encryption — every private key is held
//! in the clear under `./tmp/wallets_<NODE_ID>.data`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use ember_core::address::Address;
use ember_core::crypto::KeyPair;
use ember_core::error::WalletError;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    private_key_hex: String,
}

#[derive(Serialize, Deserialize, Default)]
struct WalletFile {
    wallets: HashMap<String, StoredEntry>,
}

/// A JSON-file-backed collection of keypairs, indexed by their Base58Check
/// address.
pub struct Wallets {
    path: PathBuf,
    entries: HashMap<Address, KeyPair>,
}

impl Wallets {
    /// Load wallets from `path`, or start empty if the file does not yet
    /// exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, WalletError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read(&path) {
            Ok(bytes) => Self::decode(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(WalletError::Io(e.to_string())),
        };
        Ok(Wallets { path, entries })
    }

    fn decode(bytes: &[u8]) -> Result<HashMap<Address, KeyPair>, WalletError> {
        let file: WalletFile =
            serde_json::from_slice(bytes).map_err(|e| WalletError::Malformed(e.to_string()))?;
        let mut entries = HashMap::new();
        for (address_str, entry) in file.wallets {
            let address: Address = address_str
                .parse()
                .map_err(|_| WalletError::Malformed(format!("invalid address {address_str}")))?;
            let scalar = hex::decode(&entry.private_key_hex)
                .map_err(|e| WalletError::Malformed(e.to_string()))?;
            let key = KeyPair::from_private_scalar(&scalar)
                .map_err(|e| WalletError::Malformed(e.to_string()))?;
            entries.insert(address, key);
        }
        Ok(entries)
    }

    fn save(&self) -> Result<(), WalletError> {
        let wallets = self
            .entries
            .iter()
            .map(|(address, key)| {
                (
                    address.encode(),
                    StoredEntry {
                        private_key_hex: hex::encode(key.private_scalar_bytes()),
                    },
                )
            })
            .collect();
        let file = WalletFile { wallets };
        let bytes =
            serde_json::to_vec_pretty(&file).map_err(|e| WalletError::Malformed(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| WalletError::Io(e.to_string()))?;
        }
        fs::write(&self.path, bytes).map_err(|e| WalletError::Io(e.to_string()))?;
        Ok(())
    }

    /// Generate a new keypair, persist it, and return its address.
    pub fn create_wallet(&mut self) -> Result<Address, WalletError> {
        let key = KeyPair::generate();
        let address = Address::new(key.pubkey_hash());
        self.entries.insert(address.clone(), key);
        self.save()?;
        info!(address = %address, "created wallet");
        Ok(address)
    }

    /// All addresses currently held in this keystore.
    pub fn addresses(&self) -> Vec<Address> {
        self.entries.keys().cloned().collect()
    }

    /// Look up the keypair controlling `address`, if this keystore holds it.
    pub fn lookup(&self, address: &Address) -> Result<&KeyPair, WalletError> {
        self.entries
            .get(address)
            .ok_or_else(|| WalletError::AddressNotFound(address.encode()))
    }
}
