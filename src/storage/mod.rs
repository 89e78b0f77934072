//! Persisted indexes derived from the chain

pub mod utxo_set;

pub use utxo_set::{TXOutputs, UTXOSet, UnspentOutput};
