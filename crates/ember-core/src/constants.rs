//! Protocol-wide constants.
//!
//! All values are fixed for the lifetime of the chain; there is no
//! retargeting and no halving schedule.

/// Proof-of-work difficulty: number of leading zero bits required of a
/// valid block hash. Fixed for the lifetime of the chain.
pub const DIFFICULTY: u32 = 12;

/// Fixed mining reward paid by every coinbase transaction.
pub const MINING_REWARD: u64 = 20;

/// Base58Check version byte prepended to every address payload.
pub const ADDRESS_VERSION: u8 = 0x00;

/// Length in bytes of the Base58Check checksum suffix.
pub const CHECKSUM_LEN: usize = 4;

/// Length in bytes of a pubkey hash (RIPEMD-160 output).
pub const PUBKEY_HASH_LEN: usize = 20;

/// Fixed width, right-NUL-padded, of a wire protocol command name.
pub const COMMAND_LEN: usize = 12;

/// The well-known bootstrap/primary peer every other node dials first.
pub const SEED_NODE: &str = "localhost:3000";

/// `NODE_ID` of the primary/seed node.
pub const PRIMARY_NODE_ID: &str = "3000";

/// Mempool size at or above which a configured miner attempts to mine.
pub const MEMPOOL_MINING_THRESHOLD: usize = 2;

/// Upper bound on the nonce search space; exceeding it without finding a
/// valid hash is a fatal mining failure.
pub const MAX_NONCE: u64 = i64::MAX as u64;
