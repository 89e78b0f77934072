//! Ledger integration tests
//!
//! End-to-end runs against real sled stores in temporary directories:
//! genesis, spends, index maintenance, persistence and failure paths.

use num_bigint::BigUint;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tempfile::{tempdir, TempDir};
use utxo_ledger::core::{Blockchain, Hash, ProofOfWork, Transaction};
use utxo_ledger::storage::{TXOutputs, UTXOSet};
use utxo_ledger::wallet::{hash_pub_key, Wallet, Wallets};
use utxo_ledger::{Config, LedgerError};

fn test_config(dir: &TempDir) -> Config {
    Config {
        difficulty_bits: 8,
        mining_workers: 2,
        ..Config::with_data_dir(dir.path())
    }
}

// Chain whose genesis pays a fresh wallet, with the index built.
fn funded_chain(dir: &TempDir) -> (UTXOSet, Wallet) {
    let config = test_config(dir);
    let wallet = Wallet::new().unwrap();
    let blockchain = Blockchain::create_blockchain(&wallet.get_address(), &config).unwrap();
    let utxo_set = UTXOSet::new(blockchain);
    utxo_set.reindex().unwrap();
    (utxo_set, wallet)
}

fn balance(utxo_set: &UTXOSet, wallet: &Wallet) -> u64 {
    utxo_set
        .get_balance(&hash_pub_key(wallet.get_public_key()))
        .unwrap()
}

#[test]
fn test_genesis_pays_subsidy_to_address() {
    let dir = tempdir().unwrap();
    let (utxo_set, wallet) = funded_chain(&dir);

    let utxos = utxo_set
        .find_utxo(&hash_pub_key(wallet.get_public_key()))
        .unwrap();
    assert_eq!(utxos.len(), 1);
    assert_eq!(utxos[0].get_value(), 50);

    let genesis = utxo_set.get_blockchain().iterator().next().unwrap().unwrap();
    assert!(genesis.is_genesis());
    assert!(ProofOfWork::validate(&genesis, 8));
}

#[test]
fn test_spend_updates_both_balances() {
    let dir = tempdir().unwrap();
    let (utxo_set, alice) = funded_chain(&dir);
    let bob = Wallet::new().unwrap();

    let tx = Transaction::new_utxo_transaction(&alice, &bob.get_address(), 30, &utxo_set).unwrap();
    assert_eq!(tx.get_vout().len(), 2);
    let block = utxo_set.get_blockchain().mine_block(&[tx]).unwrap();
    utxo_set.update(&block).unwrap();

    assert_eq!(balance(&utxo_set, &alice), 20);
    assert_eq!(balance(&utxo_set, &bob), 30);
    assert_eq!(
        utxo_set.get_blockchain().get_best_height().unwrap(),
        BigUint::from(1u32)
    );
}

#[test]
fn test_exact_spend_has_no_change_output() {
    let dir = tempdir().unwrap();
    let (utxo_set, alice) = funded_chain(&dir);
    let bob = Wallet::new().unwrap();

    let tx = Transaction::new_utxo_transaction(&alice, &bob.get_address(), 50, &utxo_set).unwrap();
    assert_eq!(tx.get_vout().len(), 1);
    let block = utxo_set.get_blockchain().mine_block(&[tx]).unwrap();
    utxo_set.update(&block).unwrap();

    assert_eq!(balance(&utxo_set, &alice), 0);
    assert_eq!(balance(&utxo_set, &bob), 50);
}

#[test]
fn test_insufficient_funds_leaves_everything_unchanged() {
    let dir = tempdir().unwrap();
    let (utxo_set, alice) = funded_chain(&dir);
    let bob = Wallet::new().unwrap();

    let tx = Transaction::new_utxo_transaction(&alice, &bob.get_address(), 30, &utxo_set).unwrap();
    let block = utxo_set.get_blockchain().mine_block(&[tx]).unwrap();
    utxo_set.update(&block).unwrap();

    let tip_before = utxo_set.get_blockchain().get_tip_hash();
    let index_before = utxo_set.snapshot().unwrap();

    let result = Transaction::new_utxo_transaction(&alice, &bob.get_address(), 100, &utxo_set);
    assert_eq!(
        result.unwrap_err(),
        LedgerError::InsufficientFunds {
            required: 100,
            available: 20
        }
    );
    assert_eq!(utxo_set.get_blockchain().get_tip_hash(), tip_before);
    assert_eq!(utxo_set.snapshot().unwrap(), index_before);
}

#[test]
fn test_incremental_index_matches_reindex() {
    let dir = tempdir().unwrap();
    let config = test_config(&dir);
    let (utxo_set, alice) = funded_chain(&dir);
    let bob = Wallet::new().unwrap();
    let carol = Wallet::new().unwrap();
    let blockchain = utxo_set.get_blockchain().clone();

    let tx = Transaction::new_utxo_transaction(&alice, &bob.get_address(), 30, &utxo_set).unwrap();
    let coinbase = Transaction::new_coinbase_tx(&carol.get_address(), "", &config).unwrap();
    let block = blockchain.mine_block(&[coinbase, tx]).unwrap();
    utxo_set.update(&block).unwrap();

    let tx = Transaction::new_utxo_transaction(&bob, &carol.get_address(), 12, &utxo_set).unwrap();
    let tx2 = Transaction::new_utxo_transaction(&alice, &carol.get_address(), 20, &utxo_set).unwrap();
    let block = blockchain.mine_block(&[tx, tx2]).unwrap();
    utxo_set.update(&block).unwrap();

    let tx = Transaction::new_utxo_transaction(&carol, &alice.get_address(), 60, &utxo_set).unwrap();
    let block = blockchain.mine_block(&[tx]).unwrap();
    utxo_set.update(&block).unwrap();

    let incremental = utxo_set.snapshot().unwrap();
    utxo_set.reindex().unwrap();
    let rebuilt = utxo_set.snapshot().unwrap();
    assert_eq!(incremental, rebuilt);

    assert_eq!(balance(&utxo_set, &alice), 60);
    assert_eq!(balance(&utxo_set, &bob), 18);
    assert_eq!(balance(&utxo_set, &carol), 50 + 12 + 20 - 60);
    assert_eq!(blockchain.verify_chain().unwrap(), 4);
}

#[test]
fn test_double_spend_within_block_is_rejected() {
    let dir = tempdir().unwrap();
    let (utxo_set, alice) = funded_chain(&dir);
    let bob = Wallet::new().unwrap();
    let carol = Wallet::new().unwrap();

    let to_bob = Transaction::new_utxo_transaction(&alice, &bob.get_address(), 50, &utxo_set).unwrap();
    let to_carol =
        Transaction::new_utxo_transaction(&alice, &carol.get_address(), 50, &utxo_set).unwrap();
    let tip = utxo_set.get_blockchain().get_tip_hash();

    let result = utxo_set.get_blockchain().mine_block(&[to_bob, to_carol]);
    assert!(matches!(result, Err(LedgerError::Validation(_))));
    assert_eq!(utxo_set.get_blockchain().get_tip_hash(), tip);
}

#[test]
fn test_spending_an_already_spent_output_is_rejected() {
    let dir = tempdir().unwrap();
    let (utxo_set, alice) = funded_chain(&dir);
    let bob = Wallet::new().unwrap();
    let carol = Wallet::new().unwrap();

    let to_bob = Transaction::new_utxo_transaction(&alice, &bob.get_address(), 50, &utxo_set).unwrap();
    let to_carol =
        Transaction::new_utxo_transaction(&alice, &carol.get_address(), 50, &utxo_set).unwrap();

    let block = utxo_set.get_blockchain().mine_block(&[to_bob]).unwrap();
    utxo_set.update(&block).unwrap();

    let result = utxo_set.get_blockchain().mine_block(&[to_carol]);
    assert!(matches!(result, Err(LedgerError::Validation(_))));
}

#[test]
fn test_chain_survives_reopen() {
    let dir = tempdir().unwrap();
    let config = test_config(&dir);
    let bob = Wallet::new().unwrap();

    let (tip, alice) = {
        let (utxo_set, alice) = funded_chain(&dir);
        let tx = Transaction::new_utxo_transaction(&alice, &bob.get_address(), 30, &utxo_set).unwrap();
        let block = utxo_set.get_blockchain().mine_block(&[tx]).unwrap();
        utxo_set.update(&block).unwrap();
        (block.get_hash(), alice)
    };

    let blockchain = Blockchain::new_blockchain(&config).unwrap();
    assert_eq!(blockchain.get_tip_hash(), tip);
    let utxo_set = UTXOSet::new(blockchain);
    assert_eq!(balance(&utxo_set, &alice), 20);
    assert_eq!(balance(&utxo_set, &bob), 30);
}

#[test]
fn test_iterator_ends_after_genesis() {
    let dir = tempdir().unwrap();
    let config = test_config(&dir);
    let (utxo_set, alice) = funded_chain(&dir);
    let blockchain = utxo_set.get_blockchain();

    for _ in 0..3 {
        let coinbase = Transaction::new_coinbase_tx(&alice.get_address(), "", &config).unwrap();
        blockchain.mine_block(&[coinbase]).unwrap();
    }

    let numbers: Vec<BigUint> = blockchain
        .iterator()
        .map(|block| block.unwrap().get_number().clone())
        .collect();
    let expected: Vec<BigUint> = (0u32..4).rev().map(BigUint::from).collect();
    assert_eq!(numbers, expected);

    let mut iter = blockchain.iterator();
    assert_eq!(iter.by_ref().count(), 4);
    assert!(iter.next().is_none());
}

#[test]
fn test_missing_transaction_is_not_found() {
    let dir = tempdir().unwrap();
    let (utxo_set, _alice) = funded_chain(&dir);
    let result = utxo_set.get_blockchain().find_transaction(&[0x5a; 32]);
    assert!(matches!(result, Err(LedgerError::NotFound(_))));
}

#[test]
fn test_wallet_file_drives_a_spend() {
    let dir = tempdir().unwrap();
    let config = test_config(&dir);

    let (alice_addr, bob_addr) = {
        let mut wallets = Wallets::new(&config).unwrap();
        (wallets.create_wallet().unwrap(), wallets.create_wallet().unwrap())
    };

    let blockchain = Blockchain::create_blockchain(&alice_addr, &config).unwrap();
    let utxo_set = UTXOSet::new(blockchain.clone());
    utxo_set.reindex().unwrap();

    let wallets = Wallets::new(&config).unwrap();
    let alice = wallets.require_wallet(&alice_addr).unwrap();
    let tx = Transaction::new_utxo_transaction(alice, &bob_addr, 5, &utxo_set).unwrap();
    let coinbase = Transaction::new_coinbase_tx(&alice_addr, "", &config).unwrap();
    let block = blockchain.mine_block(&[coinbase, tx]).unwrap();
    utxo_set.update(&block).unwrap();

    assert_eq!(balance(&utxo_set, alice), 50 - 5 + 50);
    assert_eq!(utxo_set.count_transactions().unwrap(), 2);
}

#[test]
fn test_exhausted_nonce_budget_leaves_chain_untouched() {
    let dir = tempdir().unwrap();
    let (tip, before, alice) = {
        let (utxo_set, alice) = funded_chain(&dir);
        let tip = utxo_set.get_blockchain().get_tip_hash();
        (tip, utxo_set.snapshot().unwrap(), alice)
    };

    let config = Config {
        difficulty_bits: 255,
        max_nonce: 64,
        ..test_config(&dir)
    };
    let utxo_set = UTXOSet::new(Blockchain::new_blockchain(&config).unwrap());
    let coinbase = Transaction::new_coinbase_tx(&alice.get_address(), "", &config).unwrap();

    let result = utxo_set.get_blockchain().mine_block(&[coinbase]);
    assert!(matches!(result, Err(LedgerError::NoSolutionFound { .. })));
    assert_eq!(utxo_set.get_blockchain().get_tip_hash(), tip);
    assert_eq!(utxo_set.get_blockchain().iterator().count(), 1);
    assert_eq!(utxo_set.snapshot().unwrap(), before);
    drop(utxo_set);

    let reopened = Blockchain::new_blockchain(&test_config(&dir)).unwrap();
    assert_eq!(reopened.get_tip_hash(), tip);
}

fn total_value(state: &BTreeMap<Hash, TXOutputs>) -> u64 {
    state
        .values()
        .flat_map(|entry| entry.get_outputs())
        .map(|unspent| unspent.get_output().get_value())
        .sum()
}

#[test]
fn test_readers_see_whole_blocks_only() {
    const BLOCKS: usize = 4;
    const MAX_SNAPSHOTS: usize = 200;

    let dir = tempdir().unwrap();
    let config = test_config(&dir);
    let (utxo_set, alice) = funded_chain(&dir);
    let utxo_set = Arc::new(utxo_set);
    let bob = Wallet::new().unwrap();
    let carol = Wallet::new().unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let utxo_set = Arc::clone(&utxo_set);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut seen = Vec::new();
                loop {
                    let finished = done.load(Ordering::SeqCst);
                    if seen.len() < MAX_SNAPSHOTS {
                        seen.push(utxo_set.snapshot().unwrap());
                    }
                    if finished {
                        return seen;
                    }
                }
            })
        })
        .collect();

    // Every block moves value between entries: a reward to carol, and a
    // spend from alice to bob that removes her entry and adds change.
    let mut states = vec![utxo_set.snapshot().unwrap()];
    for _ in 0..BLOCKS {
        let spend =
            Transaction::new_utxo_transaction(&alice, &bob.get_address(), 10, &utxo_set).unwrap();
        let coinbase = Transaction::new_coinbase_tx(&carol.get_address(), "", &config).unwrap();
        let block = utxo_set
            .get_blockchain()
            .mine_block(&[coinbase, spend])
            .unwrap();
        utxo_set.update(&block).unwrap();
        states.push(utxo_set.snapshot().unwrap());
    }
    done.store(true, Ordering::SeqCst);

    for (applied, state) in states.iter().enumerate() {
        assert_eq!(total_value(state), 50 * (applied as u64 + 1));
    }
    for reader in readers {
        let seen = reader.join().unwrap();
        assert!(!seen.is_empty());
        for snapshot in &seen {
            assert!(
                states.contains(snapshot),
                "reader saw a partially applied block"
            );
        }
    }

    assert_eq!(balance(&utxo_set, &alice), 50 - 10 * BLOCKS as u64);
    assert_eq!(balance(&utxo_set, &bob), 10 * BLOCKS as u64);
    assert_eq!(balance(&utxo_set, &carol), 50 * BLOCKS as u64);
}
