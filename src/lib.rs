//! # UTXO Ledger - My Single-Node Proof-of-Work Ledger
//!
//! An append-only chain of proof-of-work sealed blocks, each committing its
//! transactions through a Merkle root, plus a persisted index of unspent
//! outputs that keeps balance queries and spend checks off the full chain.
//!
//! ## How I Organized My Code
//! - `core/`: hashes, blocks, Merkle tree, proof-of-work, transactions, the chain
//! - `storage/`: the UTXO index, rebuilt from scratch or updated per block
//! - `wallet/`: ECDSA P-256 key pairs, Base58Check addresses, the wallet file
//! - `config/`: the explicit `Config` every constructor takes
//! - `error/`: `LedgerError` and the crate `Result`
//! - `utils/`: hashing, Base58, signing helpers, bincode wrappers
//! - `cli/`: clap definitions for the binary
//!
//! ## Things To Remember
//! - The chain is the source of truth; the UTXO index can always be rebuilt.
//! - Mining and index updates run one at a time behind the chain's writer lock.
//! - Index readers never see a half-applied block: updates are single store
//!   transactions and readers share a lock the writers take exclusively.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod storage;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub mod testnet;

pub use cli::{Command, Opt};
pub use config::Config;
pub use core::{
    calculate_merkle_root, Address, Block, Blockchain, BlockchainIterator, Hash, Header,
    MerkleProof, MerkleTree, PrevTransactions, ProofOfWork, TXInput, TXOutput, Transaction,
    Witness,
};
pub use error::{LedgerError, Result};
pub use storage::{TXOutputs, UTXOSet, UnspentOutput};
pub use utils::{
    base58_decode, base58_encode, current_timestamp, deserialize, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, new_key_pair, ripemd160_digest, serialize, sha256_digest,
};
pub use wallet::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, Wallet, Wallets,
    ADDRESS_CHECK_SUM_LEN,
};
