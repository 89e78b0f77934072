//! Ledger core
//!
//! Primitives, blocks and their Merkle commitment, proof-of-work sealing,
//! the signed transaction model, and the chain that strings blocks together.

pub mod block;
pub mod blockchain;
pub mod merkle;
pub mod primitives;
pub mod proof_of_work;
pub mod transaction;

pub use block::{Block, Header};
pub use blockchain::{Blockchain, BlockchainIterator};
pub use merkle::{calculate_merkle_root, MerkleProof, MerkleTree, ProofElement};
pub use primitives::{Address, Hash, ADDRESS_LENGTH, HASH_LENGTH};
pub use proof_of_work::ProofOfWork;
pub use transaction::{PrevTransactions, TXInput, TXOutput, Transaction, Witness, COINBASE_VOUT};
