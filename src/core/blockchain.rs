// The chain is the source of truth: blocks keyed by their own hash, a tip
// pointer, and a tx id -> block hash index, all in one sled database.
// Mutations go through a single writer; readers only ever see whole blocks.

use crate::config::Config;
use crate::core::{Block, Hash, PrevTransactions, ProofOfWork, Transaction};
use crate::error::{LedgerError, Result};
use crate::storage::{TXOutputs, UnspentOutput};
use data_encoding::HEXLOWER;
use log::{debug, info, warn};
use num_bigint::BigUint;
use sled::transaction::ConflictableTransactionResult;
use sled::{Db, Transactional, Tree};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

const TIP_BLOCK_HASH_KEY: &str = "tip_block_hash";

#[derive(Clone)]
pub struct Blockchain {
    tip_hash: Arc<RwLock<Hash>>,
    db: Db,
    blocks: Tree,
    tx_index: Tree,
    config: Config,
    // Held for the whole of a mining attempt or index update.
    writer: Arc<Mutex<()>>,
    // Readers of the UTXO index share this; index writes take it exclusively.
    index_lock: Arc<RwLock<()>>,
}

impl Blockchain {
    /// Opens the store and mines a genesis block paying `genesis_address`.
    /// An existing chain at the same location is returned unchanged.
    pub fn create_blockchain(genesis_address: &str, config: &Config) -> Result<Blockchain> {
        let (db, blocks, tx_index) = Self::open_store(config)?;

        let tip_hash = match blocks.get(TIP_BLOCK_HASH_KEY)? {
            Some(data) => {
                info!("Chain already exists at {}", config.data_dir.display());
                Hash::from_slice(&data)
            }
            None => {
                info!("Creating genesis block for address: {genesis_address}");
                let coinbase_tx = Transaction::new_coinbase_tx(genesis_address, "", config)?;
                let block = Block::generate_genesis_block(&coinbase_tx, config)?;
                Self::persist_block(&blocks, &tx_index, &block)?;
                block.get_hash()
            }
        };

        Ok(Self::assemble(db, blocks, tx_index, tip_hash, config))
    }

    /// Opens an existing chain.
    pub fn new_blockchain(config: &Config) -> Result<Blockchain> {
        let (db, blocks, tx_index) = Self::open_store(config)?;

        let tip_bytes = blocks.get(TIP_BLOCK_HASH_KEY)?.ok_or_else(|| {
            LedgerError::NotFound(format!(
                "No existing chain at {}. Create one first.",
                config.data_dir.display()
            ))
        })?;

        Ok(Self::assemble(
            db,
            blocks,
            tx_index,
            Hash::from_slice(&tip_bytes),
            config,
        ))
    }

    fn open_store(config: &Config) -> Result<(Db, Tree, Tree)> {
        config.validate()?;
        let db = sled::open(&config.data_dir).map_err(|e| {
            LedgerError::Store(format!(
                "Failed to open database at {}: {e}",
                config.data_dir.display()
            ))
        })?;
        let blocks = db.open_tree(&config.blocks_tree)?;
        let tx_index = db.open_tree(&config.tx_index_tree)?;
        Ok((db, blocks, tx_index))
    }

    fn assemble(db: Db, blocks: Tree, tx_index: Tree, tip_hash: Hash, config: &Config) -> Blockchain {
        Blockchain {
            tip_hash: Arc::new(RwLock::new(tip_hash)),
            db,
            blocks,
            tx_index,
            config: config.clone(),
            writer: Arc::new(Mutex::new(())),
            index_lock: Arc::new(RwLock::new(())),
        }
    }

    // Block, tip pointer and tx index entries land together or not at all.
    fn persist_block(blocks: &Tree, tx_index: &Tree, block: &Block) -> Result<()> {
        let block_hash = block.get_hash();
        let block_data = block.serialize()?;

        (blocks, tx_index).transaction(
            |(blocks, tx_index)| -> ConflictableTransactionResult<(), LedgerError> {
                blocks.insert(block_hash.as_bytes(), block_data.as_slice())?;
                blocks.insert(TIP_BLOCK_HASH_KEY, block_hash.as_bytes())?;
                for tx in block.get_transactions() {
                    tx_index.insert(tx.get_id().as_bytes(), block_hash.as_bytes())?;
                }
                Ok(())
            },
        )?;

        debug!("Persisted block {block_hash}");
        Ok(())
    }

    pub fn get_config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn open_tree(&self, name: &str) -> Result<Tree> {
        Ok(self.db.open_tree(name)?)
    }

    pub(crate) fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn read_index(&self) -> RwLockReadGuard<'_, ()> {
        self.index_lock.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write_index(&self) -> RwLockWriteGuard<'_, ()> {
        self.index_lock.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_tip_hash(&self) -> Hash {
        *self.tip_hash.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_tip_hash(&self, new_tip_hash: Hash) {
        *self.tip_hash.write().unwrap_or_else(PoisonError::into_inner) = new_tip_hash;
    }

    /// Validates `transactions`, seals them into a block on top of the tip
    /// and persists it. The caller feeds the returned block to
    /// `UTXOSet::update`.
    ///
    /// Coinbase transactions skip signature checks, but a block holds at
    /// most one and it must pay exactly the subsidy in a single output.
    /// Every other transaction needs at least one input. Its inputs must
    /// reference outputs that exist and are unspent on the chain, with no
    /// output spent twice in the candidate. Its signatures must verify, and
    /// its outputs may not exceed the value it consumes.
    pub fn mine_block(&self, transactions: &[Transaction]) -> Result<Block> {
        let _writer = self.lock_writer();

        let mut seen_ids = HashSet::new();
        for (i, transaction) in transactions.iter().enumerate() {
            if !seen_ids.insert(transaction.get_id()) {
                return Err(LedgerError::Validation(format!(
                    "Transaction {} appears twice in the block",
                    transaction.get_id()
                )));
            }
            if self.tx_index.contains_key(transaction.get_id().as_bytes())? {
                return Err(LedgerError::Validation(format!(
                    "Transaction {} at index {i} is already on the chain",
                    transaction.get_id()
                )));
            }
            if transaction.is_coinbase() {
                continue;
            }
            if transaction.get_vin().is_empty() {
                return Err(LedgerError::Validation(format!(
                    "Transaction at index {i} has no inputs"
                )));
            }
            let prev_txs = self.prev_transactions(transaction)?;
            if !transaction.verify(&prev_txs)? {
                warn!("Rejecting invalid transaction {}", transaction.get_id());
                return Err(LedgerError::Validation(format!(
                    "Invalid transaction at index {i}"
                )));
            }
            Self::check_value_conserved(i, transaction, &prev_txs)?;
        }

        self.check_coinbase_shape(transactions)?;
        self.check_for_double_spending(transactions)?;
        self.check_inputs_unspent(transactions)?;

        let tip_hash = self.get_tip_hash();
        let parent = self.require_block(&tip_hash)?;
        let number = parent.get_number() + BigUint::from(1u32);

        info!(
            "Mining block {} with {} transactions",
            number,
            transactions.len()
        );
        let block = Block::new_block(tip_hash, number, transactions, &self.config)?;

        Self::persist_block(&self.blocks, &self.tx_index, &block)?;
        self.set_tip_hash(block.get_hash());
        info!(
            "Successfully mined block {} at number {}",
            block.get_hash(),
            block.get_number()
        );

        Ok(block)
    }

    pub fn iterator(&self) -> BlockchainIterator {
        BlockchainIterator::new(self.get_tip_hash(), self.blocks.clone())
    }

    /// Every still-unspent output on the chain, grouped by transaction id.
    ///
    /// Blocks are visited tip first and each block's transactions last to
    /// first, so every spend is recorded before the output it consumes.
    pub fn find_utxo(&self) -> Result<BTreeMap<Hash, TXOutputs>> {
        let mut utxo: BTreeMap<Hash, TXOutputs> = BTreeMap::new();
        let mut spent_txos: HashMap<Vec<u8>, HashSet<i64>> = HashMap::new();

        for block in self.iterator() {
            let block = block?;
            for tx in block.get_transactions().iter().rev() {
                let spent = spent_txos.get(tx.get_id().as_bytes());
                let unspent: Vec<UnspentOutput> = tx
                    .get_vout()
                    .iter()
                    .enumerate()
                    .map(|(idx, out)| UnspentOutput::new(idx as i64, out.clone()))
                    .filter(|out| !spent.is_some_and(|s| s.contains(&out.get_vout())))
                    .collect();
                if !unspent.is_empty() {
                    utxo.insert(tx.get_id(), TXOutputs::new(unspent));
                }

                if tx.is_coinbase() {
                    continue;
                }
                for txin in tx.get_vin() {
                    spent_txos
                        .entry(txin.get_txid().to_vec())
                        .or_default()
                        .insert(txin.get_vout());
                }
            }
        }
        Ok(utxo)
    }

    /// Looks `txid` up through the tx index, falling back to a backward scan
    /// for chains written before the index existed.
    pub fn find_transaction(&self, txid: &[u8]) -> Result<Transaction> {
        if let Some(block_hash) = self.tx_index.get(txid)? {
            if let Some(block) = self.get_block(&Hash::from_slice(&block_hash))? {
                if let Some(tx) = block
                    .get_transactions()
                    .iter()
                    .find(|tx| tx.get_id().as_bytes() == txid)
                {
                    return Ok(tx.clone());
                }
            }
        }

        debug!("Scanning chain for transaction {}", HEXLOWER.encode(txid));
        for block in self.iterator() {
            for transaction in block?.get_transactions() {
                if transaction.get_id().as_bytes() == txid {
                    return Ok(transaction.clone());
                }
            }
        }
        Err(LedgerError::NotFound(format!(
            "Transaction {}",
            HEXLOWER.encode(txid)
        )))
    }

    /// The transactions referenced by `tx`'s inputs
    pub fn prev_transactions(&self, tx: &Transaction) -> Result<PrevTransactions> {
        let mut prev_txs = PrevTransactions::new();
        if tx.is_coinbase() {
            return Ok(prev_txs);
        }
        for vin in tx.get_vin() {
            if !prev_txs.contains_key(vin.get_txid()) {
                let prev_tx = self.find_transaction(vin.get_txid())?;
                prev_txs.insert(vin.get_txid().to_vec(), prev_tx);
            }
        }
        Ok(prev_txs)
    }

    pub fn sign_transaction(&self, tx: &mut Transaction, pkcs8: &[u8]) -> Result<()> {
        let prev_txs = self.prev_transactions(tx)?;
        tx.sign(pkcs8, &prev_txs)
    }

    pub fn verify_transaction(&self, tx: &Transaction) -> Result<bool> {
        if tx.is_coinbase() {
            return Ok(true);
        }
        let prev_txs = self.prev_transactions(tx)?;
        tx.verify(&prev_txs)
    }

    pub fn get_block(&self, block_hash: &Hash) -> Result<Option<Block>> {
        match self.blocks.get(block_hash.as_bytes())? {
            Some(block_bytes) => Ok(Some(Block::deserialize(block_bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    fn require_block(&self, block_hash: &Hash) -> Result<Block> {
        self.get_block(block_hash)?
            .ok_or_else(|| LedgerError::NotFound(format!("Block {block_hash}")))
    }

    /// Number of the tip block
    pub fn get_best_height(&self) -> Result<BigUint> {
        let tip = self.require_block(&self.get_tip_hash())?;
        Ok(tip.get_number().clone())
    }

    /// Block hashes from tip to genesis
    pub fn get_block_hashes(&self) -> Result<Vec<Hash>> {
        self.iterator()
            .map(|block| block.map(|b| b.get_hash()))
            .collect()
    }

    /// Walks tip to genesis re-checking proof-of-work, Merkle roots and
    /// numbering. Returns the number of blocks checked.
    pub fn verify_chain(&self) -> Result<usize> {
        let mut checked = 0;
        let mut expected_number: Option<BigUint> = None;

        for block in self.iterator() {
            let block = block?;
            let hash = block.get_hash();

            let pow = ProofOfWork::new(block.get_header(), self.config.difficulty_bits);
            if pow.digest(block.get_nonce()) != hash
                || !ProofOfWork::validate(&block, self.config.difficulty_bits)
            {
                return Err(LedgerError::Validation(format!(
                    "Block {hash} fails proof-of-work"
                )));
            }
            if !block.verify_tx_root()? {
                return Err(LedgerError::Validation(format!(
                    "Block {hash} has a mismatched transaction root"
                )));
            }
            if let Some(expected) = &expected_number {
                if block.get_number() != expected {
                    return Err(LedgerError::Validation(format!(
                        "Block {hash} has number {}, expected {expected}",
                        block.get_number()
                    )));
                }
            }
            if block.is_genesis() && block.get_number() != &BigUint::from(0u32) {
                return Err(LedgerError::Validation(format!(
                    "Genesis block {hash} has non-zero number"
                )));
            }

            expected_number = if block.get_number() == &BigUint::from(0u32) {
                None
            } else {
                Some(block.get_number() - BigUint::from(1u32))
            };
            checked += 1;
        }

        Ok(checked)
    }

    // At most one reward per block, paying exactly the subsidy in one output.
    fn check_coinbase_shape(&self, transactions: &[Transaction]) -> Result<()> {
        let mut coinbases = transactions.iter().filter(|tx| tx.is_coinbase());
        let coinbase = match coinbases.next() {
            Some(coinbase) => coinbase,
            None => return Ok(()),
        };
        if coinbases.next().is_some() {
            return Err(LedgerError::Validation(
                "Block carries more than one coinbase transaction".to_string(),
            ));
        }
        match coinbase.get_vout() {
            [reward] if reward.get_value() == self.config.subsidy => Ok(()),
            outputs => Err(LedgerError::Validation(format!(
                "Coinbase {} must pay exactly {} in one output, pays {} in {}",
                coinbase.get_id(),
                self.config.subsidy,
                coinbase.get_output_value(),
                outputs.len()
            ))),
        }
    }

    // Outputs may not carry more value than the inputs they consume.
    fn check_value_conserved(
        tx_index: usize,
        transaction: &Transaction,
        prev_txs: &PrevTransactions,
    ) -> Result<()> {
        let mut input_value = 0u64;
        for input in transaction.get_vin() {
            let spent = prev_txs
                .get(input.get_txid())
                .and_then(|prev| {
                    let vout = usize::try_from(input.get_vout()).ok()?;
                    prev.get_vout().get(vout)
                })
                .ok_or_else(|| {
                    LedgerError::NotFound(format!(
                        "Output {}:{}",
                        HEXLOWER.encode(input.get_txid()),
                        input.get_vout()
                    ))
                })?;
            input_value = input_value.saturating_add(spent.get_value());
        }

        let output_value = transaction
            .get_vout()
            .iter()
            .try_fold(0u64, |sum, out| sum.checked_add(out.get_value()));
        match output_value {
            Some(output_value) if output_value <= input_value => Ok(()),
            _ => Err(LedgerError::Validation(format!(
                "Transaction at index {tx_index} spends more than its inputs hold ({input_value})"
            ))),
        }
    }

    // No output may be spent by two inputs of the same candidate block.
    fn check_for_double_spending(&self, transactions: &[Transaction]) -> Result<()> {
        let mut spent_outputs: HashSet<(Vec<u8>, i64)> = HashSet::new();

        for (tx_index, transaction) in transactions.iter().enumerate() {
            if transaction.is_coinbase() {
                continue;
            }
            for input in transaction.get_vin() {
                let output_reference = (input.get_txid().to_vec(), input.get_vout());
                if !spent_outputs.insert(output_reference) {
                    return Err(LedgerError::Validation(format!(
                        "Double spend in transaction {}: output {}:{} already spent in this block",
                        tx_index,
                        HEXLOWER.encode(input.get_txid()),
                        input.get_vout()
                    )));
                }
            }
        }
        Ok(())
    }

    // One backward pass over the chain looking for earlier spends of any
    // output the candidate block wants to consume.
    fn check_inputs_unspent(&self, transactions: &[Transaction]) -> Result<()> {
        let wanted: HashSet<(&[u8], i64)> = transactions
            .iter()
            .filter(|tx| !tx.is_coinbase())
            .flat_map(|tx| tx.get_vin())
            .map(|input| (input.get_txid(), input.get_vout()))
            .collect();
        if wanted.is_empty() {
            return Ok(());
        }

        for block in self.iterator() {
            for transaction in block?.get_transactions() {
                if transaction.is_coinbase() {
                    continue;
                }
                for input in transaction.get_vin() {
                    if wanted.contains(&(input.get_txid(), input.get_vout())) {
                        return Err(LedgerError::Validation(format!(
                            "Input already spent: {}:{}",
                            HEXLOWER.encode(input.get_txid()),
                            input.get_vout()
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Walks from a starting hash back to genesis, yielding each block once.
pub struct BlockchainIterator {
    blocks: Tree,
    current_hash: Hash,
}

impl BlockchainIterator {
    fn new(tip_hash: Hash, blocks: Tree) -> BlockchainIterator {
        BlockchainIterator {
            current_hash: tip_hash,
            blocks,
        }
    }

    fn load_current(&self) -> Result<Block> {
        let data = self
            .blocks
            .get(self.current_hash.as_bytes())?
            .ok_or_else(|| LedgerError::NotFound(format!("Block {}", self.current_hash)))?;
        Block::deserialize(data.as_ref())
    }
}

impl Iterator for BlockchainIterator {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_hash.is_zero() {
            return None;
        }
        match self.load_current() {
            Ok(block) => {
                self.current_hash = block.get_parent_hash();
                Some(Ok(block))
            }
            Err(e) => {
                // A broken link ends the walk after reporting it once.
                self.current_hash = Hash::ZERO;
                Some(Err(e))
            }
        }
    }
}
