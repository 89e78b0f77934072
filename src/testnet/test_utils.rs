//! Test utilities for ledger testing

use crate::config::Config;
use crate::core::{Block, Blockchain, Transaction};
use crate::error::Result;
use crate::storage::UTXOSet;
use crate::wallet::Wallet;
use std::path::Path;
use tempfile::TempDir;

/// Difficulty low enough that a block seals in a few hundred hashes
pub const TEST_DIFFICULTY_BITS: u32 = 8;

/// Default config with cheap mining. Paths are left at their defaults, so
/// only use it for tests that never open a store.
pub fn fast_config() -> Config {
    Config {
        difficulty_bits: TEST_DIFFICULTY_BITS,
        mining_workers: 2,
        ..Config::default()
    }
}

/// Cheap-mining config whose store and wallet file live under `dir`
pub fn config_in(dir: &Path) -> Config {
    Config {
        difficulty_bits: TEST_DIFFICULTY_BITS,
        mining_workers: 2,
        ..Config::with_data_dir(dir)
    }
}

pub fn new_test_wallet() -> Wallet {
    Wallet::new().unwrap()
}

/// Fresh chain in a temporary directory whose genesis pays the returned wallet.
/// Keep the `TempDir` alive for as long as the chain is used.
pub fn create_test_blockchain() -> (Blockchain, Wallet, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = config_in(temp_dir.path());
    let wallet = new_test_wallet();
    let blockchain = Blockchain::create_blockchain(&wallet.get_address(), &config).unwrap();
    (blockchain, wallet, temp_dir)
}

/// Builds a spend, mines it alone into a block and folds the block into the index.
pub fn send_and_mine(utxo_set: &UTXOSet, from: &Wallet, to: &str, amount: u64) -> Result<Block> {
    let tx = Transaction::new_utxo_transaction(from, to, amount, utxo_set)?;
    let block = utxo_set.get_blockchain().mine_block(&[tx])?;
    utxo_set.update(&block)?;
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;

    #[test]
    fn test_create_test_blockchain() {
        let (blockchain, _wallet, temp_dir) = create_test_blockchain();
        assert_eq!(blockchain.get_best_height().unwrap(), BigUint::from(0u32));
        assert!(blockchain
            .get_config()
            .data_dir
            .starts_with(temp_dir.path()));
    }

    #[test]
    fn test_send_and_mine_moves_funds() {
        let (blockchain, sender, _dir) = create_test_blockchain();
        let recipient = new_test_wallet();
        let utxo_set = UTXOSet::new(blockchain);
        utxo_set.reindex().unwrap();

        send_and_mine(&utxo_set, &sender, &recipient.get_address(), 30).unwrap();

        let sender_hash = crate::wallet::hash_pub_key(sender.get_public_key());
        let recipient_hash = crate::wallet::hash_pub_key(recipient.get_public_key());
        assert_eq!(utxo_set.get_balance(&sender_hash).unwrap(), 20);
        assert_eq!(utxo_set.get_balance(&recipient_hash).unwrap(), 30);
    }
}
