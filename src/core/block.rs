use crate::config::Config;
use crate::core::{calculate_merkle_root, Address, Hash, ProofOfWork, Transaction};
use crate::error::{LedgerError, Result};
use crate::utils::{current_timestamp, deserialize, serialize};
use log::info;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Fields committed by a block. Immutable once the block is sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Header {
    parent_hash: Hash,
    miner: Address,
    tx_root: Hash,
    #[bincode(with_serde)]
    number: BigUint,
    #[bincode(with_serde)]
    timestamp: BigUint,
    nonce: i64,
}

impl Header {
    pub fn new(
        parent_hash: Hash,
        miner: Address,
        tx_root: Hash,
        number: BigUint,
        timestamp: BigUint,
    ) -> Header {
        Header {
            parent_hash,
            miner,
            tx_root,
            number,
            timestamp,
            nonce: 0,
        }
    }

    pub fn get_parent_hash(&self) -> Hash {
        self.parent_hash
    }

    pub fn get_miner(&self) -> Address {
        self.miner
    }

    pub fn get_tx_root(&self) -> Hash {
        self.tx_root
    }

    pub fn get_number(&self) -> &BigUint {
        &self.number
    }

    pub fn get_timestamp(&self) -> &BigUint {
        &self.timestamp
    }

    pub fn get_nonce(&self) -> i64 {
        self.nonce
    }
}

/// A sealed block. `hash` is the proof-of-work digest and the storage key;
/// it is deliberately kept outside the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    header: Header,
    transactions: Vec<Transaction>,
    hash: Hash,
}

impl Block {
    /// Assembles a candidate on top of `parent_hash`, commits the
    /// transactions and runs proof-of-work.
    pub fn new_block(
        parent_hash: Hash,
        number: BigUint,
        transactions: &[Transaction],
        config: &Config,
    ) -> Result<Block> {
        let mut block = Block::unsealed(parent_hash, number, transactions)?;

        info!(
            "Starting proof-of-work for block {} with {} transactions (difficulty {})",
            block.header.number,
            transactions.len(),
            config.difficulty_bits
        );
        let (nonce, hash) = ProofOfWork::from_config(&block.header, config).run()?;
        block.header.nonce = nonce;
        block.hash = hash;
        info!("Proof-of-work completed for block {hash} (nonce {nonce})");

        Ok(block)
    }

    pub fn generate_genesis_block(coinbase: &Transaction, config: &Config) -> Result<Block> {
        if !coinbase.is_coinbase() {
            return Err(LedgerError::Validation(
                "Genesis block must be paid by a coinbase transaction".to_string(),
            ));
        }
        Block::new_block(
            Hash::ZERO,
            BigUint::from(0u32),
            std::slice::from_ref(coinbase),
            config,
        )
    }

    /// Header and body without a nonce or hash; `new_block` seals it.
    pub(crate) fn unsealed(
        parent_hash: Hash,
        number: BigUint,
        transactions: &[Transaction],
    ) -> Result<Block> {
        if transactions.is_empty() {
            return Err(LedgerError::Validation(
                "Block must contain at least one transaction".to_string(),
            ));
        }

        let tx_root = calculate_merkle_root(transactions)?;
        let header = Header::new(
            parent_hash,
            Self::miner_of(transactions),
            tx_root,
            number,
            BigUint::from(current_timestamp()?),
        );

        Ok(Block {
            header,
            transactions: transactions.to_vec(),
            hash: Hash::ZERO,
        })
    }

    // The miner is whoever the coinbase pays; blocks without one have none.
    fn miner_of(transactions: &[Transaction]) -> Address {
        transactions
            .iter()
            .find(|tx| tx.is_coinbase())
            .and_then(|tx| tx.get_vout().first())
            .map(|out| Address::from_slice(out.get_pub_key_hash()))
            .unwrap_or(Address::ZERO)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn get_header(&self) -> &Header {
        &self.header
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_parent_hash(&self) -> Hash {
        self.header.parent_hash
    }

    pub fn get_hash(&self) -> Hash {
        self.hash
    }

    pub fn get_number(&self) -> &BigUint {
        &self.header.number
    }

    pub fn get_timestamp(&self) -> &BigUint {
        &self.header.timestamp
    }

    pub fn get_nonce(&self) -> i64 {
        self.header.nonce
    }

    pub fn get_tx_root(&self) -> Hash {
        self.header.tx_root
    }

    pub fn is_genesis(&self) -> bool {
        self.header.parent_hash.is_zero()
    }

    /// Recomputes the Merkle root over the stored transactions
    pub fn verify_tx_root(&self) -> Result<bool> {
        Ok(calculate_merkle_root(&self.transactions)? == self.header.tx_root)
    }

    #[cfg(test)]
    pub(crate) fn set_nonce(&mut self, nonce: i64) {
        self.header.nonce = nonce;
    }
}
