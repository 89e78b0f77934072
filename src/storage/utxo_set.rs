use crate::core::{Block, Blockchain, Hash, TXOutput};
use crate::error::{LedgerError, Result};
use crate::utils::{deserialize, serialize};
use data_encoding::HEXLOWER;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult};
use sled::{Batch, Tree};
use std::collections::BTreeMap;

/// One unspent output, remembered under the index it had in its transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct UnspentOutput {
    vout: i64,
    output: TXOutput,
}

impl UnspentOutput {
    pub fn new(vout: i64, output: TXOutput) -> UnspentOutput {
        UnspentOutput { vout, output }
    }

    pub fn get_vout(&self) -> i64 {
        self.vout
    }

    pub fn get_output(&self) -> &TXOutput {
        &self.output
    }
}

/// Index entry for one transaction id, ordered by output index
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct TXOutputs {
    outputs: Vec<UnspentOutput>,
}

impl TXOutputs {
    pub fn new(mut outputs: Vec<UnspentOutput>) -> TXOutputs {
        outputs.sort_by_key(|out| out.vout);
        TXOutputs { outputs }
    }

    /// Every output of a freshly mined transaction
    pub fn from_vout(vout: &[TXOutput]) -> TXOutputs {
        TXOutputs {
            outputs: vout
                .iter()
                .enumerate()
                .map(|(idx, out)| UnspentOutput::new(idx as i64, out.clone()))
                .collect(),
        }
    }

    pub fn get_outputs(&self) -> &[UnspentOutput] {
        self.outputs.as_slice()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Drops output `vout`; false if it was not in the entry.
    pub fn remove(&mut self, vout: i64) -> bool {
        let before = self.outputs.len();
        self.outputs.retain(|out| out.vout != vout);
        self.outputs.len() != before
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<TXOutputs> {
        deserialize(bytes)
    }
}

/// Materialized view of the chain's unspent outputs, rebuilt from scratch or
/// advanced one mined block at a time.
pub struct UTXOSet {
    blockchain: Blockchain,
}

impl UTXOSet {
    pub fn new(blockchain: Blockchain) -> UTXOSet {
        UTXOSet { blockchain }
    }

    pub fn get_blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    fn utxo_tree(&self) -> Result<Tree> {
        self.blockchain
            .open_tree(&self.blockchain.get_config().utxo_tree)
    }

    /// First-fit selection of outputs locked to `pub_key_hash`, in ascending
    /// transaction id and then output index, stopping once `amount` is
    /// covered. Returns the accumulated value and the chosen outputs.
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: u64,
    ) -> Result<(u64, BTreeMap<Hash, Vec<i64>>)> {
        let _read = self.blockchain.read_index();
        let mut unspent_outputs: BTreeMap<Hash, Vec<i64>> = BTreeMap::new();
        let mut accumulated = 0u64;

        'scan: for item in self.utxo_tree()?.iter() {
            let (k, v) = item?;
            let outs = TXOutputs::deserialize(v.as_ref())?;
            for out in outs.get_outputs() {
                if accumulated >= amount {
                    break 'scan;
                }
                if out.get_output().is_locked_with_key(pub_key_hash) {
                    accumulated = accumulated.saturating_add(out.get_output().get_value());
                    unspent_outputs
                        .entry(Hash::from_slice(&k))
                        .or_default()
                        .push(out.get_vout());
                }
            }
        }
        Ok((accumulated, unspent_outputs))
    }

    /// All unspent outputs locked to `pub_key_hash`
    pub fn find_utxo(&self, pub_key_hash: &[u8]) -> Result<Vec<TXOutput>> {
        let _read = self.blockchain.read_index();
        let mut utxos = vec![];

        for item in self.utxo_tree()?.iter() {
            let (_, v) = item?;
            let outs = TXOutputs::deserialize(v.as_ref())?;
            utxos.extend(
                outs.get_outputs()
                    .iter()
                    .filter(|out| out.get_output().is_locked_with_key(pub_key_hash))
                    .map(|out| out.get_output().clone()),
            );
        }
        Ok(utxos)
    }

    pub fn get_balance(&self, pub_key_hash: &[u8]) -> Result<u64> {
        Ok(self
            .find_utxo(pub_key_hash)?
            .iter()
            .map(TXOutput::get_value)
            .sum())
    }

    /// Number of transactions with at least one unspent output
    pub fn count_transactions(&self) -> Result<u64> {
        let _read = self.blockchain.read_index();
        let mut counter = 0;
        for item in self.utxo_tree()?.iter() {
            item?;
            counter += 1;
        }
        Ok(counter)
    }

    /// Whole index in key order
    pub fn snapshot(&self) -> Result<BTreeMap<Hash, TXOutputs>> {
        let _read = self.blockchain.read_index();
        let mut entries = BTreeMap::new();
        for item in self.utxo_tree()?.iter() {
            let (k, v) = item?;
            entries.insert(Hash::from_slice(&k), TXOutputs::deserialize(v.as_ref())?);
        }
        Ok(entries)
    }

    /// Drops the index and rebuilds it from a full chain scan. Old entries
    /// are removed and new ones written in one atomic batch.
    pub fn reindex(&self) -> Result<()> {
        let _writer = self.blockchain.lock_writer();
        let utxo_map = self.blockchain.find_utxo()?;

        let _write = self.blockchain.write_index();
        let utxo_tree = self.utxo_tree()?;

        let mut batch = Batch::default();
        for key in utxo_tree.iter().keys() {
            batch.remove(key?);
        }
        for (txid, outs) in &utxo_map {
            batch.insert(txid.as_bytes(), outs.serialize()?);
        }
        utxo_tree.apply_batch(batch)?;

        info!("Rebuilt UTXO index with {} transactions", utxo_map.len());
        Ok(())
    }

    /// Folds a newly mined block into the index. Runs as one store
    /// transaction: either every transaction of the block is applied or
    /// none is.
    pub fn update(&self, block: &Block) -> Result<()> {
        let _writer = self.blockchain.lock_writer();
        let _write = self.blockchain.write_index();
        let utxo_tree = self.utxo_tree()?;

        utxo_tree
            .transaction(|tx_tree| -> ConflictableTransactionResult<(), LedgerError> {
                for tx in block.get_transactions() {
                    if !tx.is_coinbase() {
                        for vin in tx.get_vin() {
                            let outs_bytes = tx_tree.get(vin.get_txid())?.ok_or_else(|| {
                                ConflictableTransactionError::Abort(LedgerError::NotFound(
                                    format!(
                                        "UTXO entry for {}",
                                        HEXLOWER.encode(vin.get_txid())
                                    ),
                                ))
                            })?;
                            let mut outs = TXOutputs::deserialize(outs_bytes.as_ref())
                                .map_err(ConflictableTransactionError::Abort)?;

                            if !outs.remove(vin.get_vout()) {
                                return Err(ConflictableTransactionError::Abort(
                                    LedgerError::NotFound(format!(
                                        "Unspent output {}:{}",
                                        HEXLOWER.encode(vin.get_txid()),
                                        vin.get_vout()
                                    )),
                                ));
                            }

                            if outs.is_empty() {
                                tx_tree.remove(vin.get_txid())?;
                            } else {
                                let bytes =
                                    outs.serialize().map_err(ConflictableTransactionError::Abort)?;
                                tx_tree.insert(vin.get_txid(), bytes)?;
                            }
                        }
                    }

                    let new_outputs = TXOutputs::from_vout(tx.get_vout());
                    if new_outputs.is_empty() {
                        continue;
                    }
                    let bytes = new_outputs
                        .serialize()
                        .map_err(ConflictableTransactionError::Abort)?;
                    tx_tree.insert(tx.get_id().as_bytes(), bytes)?;
                }
                Ok(())
            })?;

        debug!(
            "Applied block {} ({} transactions) to UTXO index",
            block.get_hash(),
            block.get_transactions().len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;
    use crate::testnet::test_utils::{create_test_blockchain, new_test_wallet, send_and_mine};
    use crate::wallet::hash_pub_key;

    #[test]
    fn test_genesis_output_is_indexed_after_reindex() {
        let (blockchain, wallet, _dir) = create_test_blockchain();
        let utxo_set = UTXOSet::new(blockchain);
        utxo_set.reindex().unwrap();

        let pub_key_hash = hash_pub_key(wallet.get_public_key());
        let utxos = utxo_set.find_utxo(&pub_key_hash).unwrap();
        assert_eq!(utxos.len(), 1);
        assert_eq!(utxos[0].get_value(), 50);
        assert_eq!(utxo_set.count_transactions().unwrap(), 1);
    }

    #[test]
    fn test_spend_keeps_original_output_indices() {
        let (blockchain, sender, _dir) = create_test_blockchain();
        let recipient = new_test_wallet();
        let utxo_set = UTXOSet::new(blockchain);
        utxo_set.reindex().unwrap();

        let block = send_and_mine(&utxo_set, &sender, &recipient.get_address(), 30).unwrap();
        let spend = &block.get_transactions()[0];

        let entry = utxo_set.snapshot().unwrap()[&spend.get_id()].clone();
        let indices: Vec<i64> = entry.get_outputs().iter().map(|o| o.get_vout()).collect();
        assert_eq!(indices, vec![0, 1]);

        // Spending the change output (index 1) must leave index 0 addressable.
        let change_block =
            send_and_mine(&utxo_set, &sender, &recipient.get_address(), 20).unwrap();
        let entry = &utxo_set.snapshot().unwrap()[&spend.get_id()];
        assert_eq!(entry.get_outputs().len(), 1);
        assert_eq!(entry.get_outputs()[0].get_vout(), 0);
        assert_eq!(entry.get_outputs()[0].get_output().get_value(), 30);
        assert!(!change_block.get_transactions().is_empty());
    }

    #[test]
    fn test_spendable_selection_stops_once_covered() {
        let (blockchain, wallet, _dir) = create_test_blockchain();
        let config = blockchain.get_config().clone();
        let utxo_set = UTXOSet::new(blockchain.clone());
        utxo_set.reindex().unwrap();

        let coinbase = Transaction::new_coinbase_tx(&wallet.get_address(), "", &config).unwrap();
        let block = blockchain.mine_block(&[coinbase]).unwrap();
        utxo_set.update(&block).unwrap();

        let pub_key_hash = hash_pub_key(wallet.get_public_key());
        let (accumulated, outputs) = utxo_set.find_spendable_outputs(&pub_key_hash, 10).unwrap();
        assert_eq!(accumulated, 50);
        assert_eq!(outputs.values().map(Vec::len).sum::<usize>(), 1);

        let (accumulated, outputs) = utxo_set.find_spendable_outputs(&pub_key_hash, 80).unwrap();
        assert_eq!(accumulated, 100);
        assert_eq!(outputs.len(), 2);
        assert_eq!(utxo_set.get_balance(&pub_key_hash).unwrap(), 100);
    }

    #[test]
    fn test_update_with_unknown_input_changes_nothing() {
        let (blockchain, wallet, _dir) = create_test_blockchain();
        let config = blockchain.get_config().clone();
        let utxo_set = UTXOSet::new(blockchain);
        utxo_set.reindex().unwrap();
        let before = utxo_set.snapshot().unwrap();

        let coinbase = Transaction::new_coinbase_tx(&wallet.get_address(), "", &config).unwrap();
        let bogus = Transaction::from_parts(
            vec![crate::core::TXInput::new(&[0x42; 32], 0)],
            vec![TXOutput::new(5, &wallet.get_address()).unwrap()],
        )
        .unwrap();
        let block = Block::unsealed(
            utxo_set.get_blockchain().get_tip_hash(),
            num_bigint::BigUint::from(1u32),
            &[coinbase, bogus],
        )
        .unwrap();

        assert!(matches!(
            utxo_set.update(&block),
            Err(LedgerError::NotFound(_))
        ));
        assert_eq!(utxo_set.snapshot().unwrap(), before);
    }

    #[test]
    fn test_entry_round_trip() {
        let entry = TXOutputs::new(vec![
            UnspentOutput::new(2, TXOutput::new_locked(7, vec![1; 20])),
            UnspentOutput::new(0, TXOutput::new_locked(3, vec![2; 20])),
        ]);
        assert_eq!(entry.get_outputs()[0].get_vout(), 0);
        let bytes = entry.serialize().unwrap();
        assert_eq!(TXOutputs::deserialize(&bytes).unwrap(), entry);
    }
}
