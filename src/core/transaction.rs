// Value moves through pay-to-public-key-hash outputs. Each input points at
// one earlier output and carries a signature made over a trimmed copy of the
// spending transaction, one input at a time.

use crate::config::Config;
use crate::core::Hash;
use crate::error::{LedgerError, Result};
use crate::storage::UTXOSet;
use crate::utils::{
    deserialize, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify, serialize,
    sha256_digest,
};
use crate::wallet::{address_to_pub_key_hash, hash_pub_key, Wallet};
use data_encoding::HEXLOWER;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Output index carried by the single input of a coinbase transaction
pub const COINBASE_VOUT: i64 = -1;

/// Previous transactions keyed by id, as needed for signing and verification
pub type PrevTransactions = HashMap<Vec<u8>, Transaction>;

/// What an input carries besides its output reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum Witness {
    /// Free-form data minted into a coinbase input
    Coinbase { memo: Vec<u8> },
    /// `r ‖ s` signature and the spender's `x ‖ y` public key
    Spend { signature: Vec<u8>, pub_key: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXInput {
    txid: Vec<u8>,
    vout: i64,
    witness: Witness,
}

impl TXInput {
    /// Unsigned spend of output `vout` of transaction `txid`
    pub fn new(txid: &[u8], vout: i64) -> TXInput {
        TXInput {
            txid: txid.to_vec(),
            vout,
            witness: Witness::Spend {
                signature: vec![],
                pub_key: vec![],
            },
        }
    }

    pub fn coinbase(memo: &[u8]) -> TXInput {
        TXInput {
            txid: vec![],
            vout: COINBASE_VOUT,
            witness: Witness::Coinbase {
                memo: memo.to_vec(),
            },
        }
    }

    pub fn get_txid(&self) -> &[u8] {
        self.txid.as_slice()
    }

    pub fn get_vout(&self) -> i64 {
        self.vout
    }

    pub fn get_witness(&self) -> &Witness {
        &self.witness
    }

    pub fn get_signature(&self) -> Option<&[u8]> {
        match &self.witness {
            Witness::Spend { signature, .. } if !signature.is_empty() => Some(signature.as_slice()),
            _ => None,
        }
    }

    pub fn get_pub_key(&self) -> Option<&[u8]> {
        match &self.witness {
            Witness::Spend { pub_key, .. } if !pub_key.is_empty() => Some(pub_key.as_slice()),
            _ => None,
        }
    }

    pub fn get_memo(&self) -> Option<&[u8]> {
        match &self.witness {
            Witness::Coinbase { memo } => Some(memo.as_slice()),
            Witness::Spend { .. } => None,
        }
    }

    pub fn uses_key(&self, pub_key_hash: &[u8]) -> bool {
        self.get_pub_key()
            .is_some_and(|pub_key| hash_pub_key(pub_key) == pub_key_hash)
    }

    pub(crate) fn set_pub_key(&mut self, key: Vec<u8>) {
        if let Witness::Spend { pub_key, .. } = &mut self.witness {
            *pub_key = key;
        }
    }

    fn set_signature(&mut self, sig: Vec<u8>) {
        if let Witness::Spend { signature, .. } = &mut self.witness {
            *signature = sig;
        }
    }

    // Index into the referenced transaction's outputs, if it is in range.
    fn output_index(&self, prev_tx: &Transaction) -> Result<usize> {
        usize::try_from(self.vout)
            .ok()
            .filter(|idx| *idx < prev_tx.vout.len())
            .ok_or_else(|| {
                LedgerError::Validation(format!(
                    "Input references output {} of {}, which has {} outputs",
                    self.vout,
                    HEXLOWER.encode(&self.txid),
                    prev_tx.vout.len()
                ))
            })
    }
}

/// Pay `value` to whoever holds the key hashing to `pub_key_hash`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXOutput {
    value: u64,
    pub_key_hash: Vec<u8>,
}

impl TXOutput {
    pub fn new(value: u64, address: &str) -> Result<TXOutput> {
        Ok(TXOutput::new_locked(value, address_to_pub_key_hash(address)?))
    }

    pub fn new_locked(value: u64, pub_key_hash: Vec<u8>) -> TXOutput {
        TXOutput {
            value,
            pub_key_hash,
        }
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_pub_key_hash(&self) -> &[u8] {
        self.pub_key_hash.as_slice()
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash.eq(pub_key_hash)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    id: Hash,
    vin: Vec<TXInput>,
    vout: Vec<TXOutput>,
}

impl Transaction {
    /// Mints `config.subsidy` to `to`. An empty `data` gets a templated memo
    /// tagged with a random UUID so repeated rewards never share an id.
    pub fn new_coinbase_tx(to: &str, data: &str, config: &Config) -> Result<Transaction> {
        let memo = if data.is_empty() {
            format!("Reward to '{to}' [{}]", Uuid::new_v4())
        } else {
            data.to_string()
        };

        let txout = TXOutput::new(config.subsidy, to)?;
        let mut tx = Transaction {
            id: Hash::ZERO,
            vin: vec![TXInput::coinbase(memo.as_bytes())],
            vout: vec![txout],
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    /// Builds and signs a spend of `amount` from `wallet` to `to`.
    ///
    /// Outputs are selected first-fit in index order (ascending transaction
    /// id, then output index) until they cover `amount`; any surplus comes
    /// back to the sender as a change output.
    pub fn new_utxo_transaction(
        wallet: &Wallet,
        to: &str,
        amount: u64,
        utxo_set: &UTXOSet,
    ) -> Result<Transaction> {
        if amount == 0 {
            return Err(LedgerError::Validation(
                "Amount must be positive".to_string(),
            ));
        }
        let recipient = address_to_pub_key_hash(to)?;
        let public_key_hash = hash_pub_key(wallet.get_public_key());

        let (accumulated, valid_outputs) =
            utxo_set.find_spendable_outputs(public_key_hash.as_slice(), amount)?;
        if accumulated < amount {
            return Err(LedgerError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }

        let mut inputs = vec![];
        for (txid, outs) in valid_outputs {
            for out in outs {
                let mut input = TXInput::new(txid.as_bytes(), out);
                input.set_pub_key(wallet.get_public_key().to_vec());
                inputs.push(input);
            }
        }

        let mut outputs = vec![TXOutput::new_locked(amount, recipient)];
        if accumulated > amount {
            outputs.push(TXOutput::new_locked(
                accumulated - amount,
                public_key_hash,
            ));
        }

        let mut tx = Transaction {
            id: Hash::ZERO,
            vin: inputs,
            vout: outputs,
        };
        tx.id = tx.hash()?;

        utxo_set
            .get_blockchain()
            .sign_transaction(&mut tx, wallet.get_pkcs8())?;
        Ok(tx)
    }

    /// Assembles a transaction from parts and derives its id. Inputs are
    /// left as given; call [`Transaction::sign`] afterwards.
    pub fn from_parts(vin: Vec<TXInput>, vout: Vec<TXOutput>) -> Result<Transaction> {
        let mut tx = Transaction {
            id: Hash::ZERO,
            vin,
            vout,
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    /// Exactly one input, with an empty previous id and output index -1.
    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].txid.is_empty() && self.vin[0].vout == COINBASE_VOUT
    }

    // Every input stripped to its output reference.
    fn trimmed_copy(&self) -> Transaction {
        let inputs = self
            .vin
            .iter()
            .map(|input| TXInput::new(input.get_txid(), input.get_vout()))
            .collect();
        Transaction {
            id: self.id,
            vin: inputs,
            vout: self.vout.clone(),
        }
    }

    // Payload for input `idx`: the trimmed copy with only that input's
    // public key slot holding the referenced output's lock.
    fn signing_payload(
        tx_copy: &mut Transaction,
        idx: usize,
        prev_txs: &PrevTransactions,
    ) -> Result<(Hash, Vec<u8>)> {
        let input = &tx_copy.vin[idx];
        let prev_tx = prev_txs.get(input.get_txid()).ok_or_else(|| {
            LedgerError::NotFound(format!(
                "Previous transaction {}",
                HEXLOWER.encode(input.get_txid())
            ))
        })?;
        let out_idx = input.output_index(prev_tx)?;
        let locking_hash = prev_tx.vout[out_idx].pub_key_hash.clone();

        tx_copy.vin[idx].set_pub_key(locking_hash.clone());
        let payload = tx_copy.hash();
        tx_copy.vin[idx].set_pub_key(vec![]);
        Ok((payload?, locking_hash))
    }

    /// Signs every input with `pkcs8`. Coinbase transactions carry no
    /// signatures and are left untouched.
    pub fn sign(&mut self, pkcs8: &[u8], prev_txs: &PrevTransactions) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        let mut tx_copy = self.trimmed_copy();
        for idx in 0..self.vin.len() {
            let (payload, _) = Self::signing_payload(&mut tx_copy, idx, prev_txs)?;
            let signature = ecdsa_p256_sha256_sign_digest(pkcs8, payload.as_bytes())?;
            debug!("Signed input {idx} of {}", self.id);
            self.vin[idx].set_signature(signature);
        }
        Ok(())
    }

    /// `Ok(true)` when every input carries the key its referenced output is
    /// locked to and a signature that checks out against it. An out-of-range
    /// output reference is `Ok(false)`; a missing previous transaction is a
    /// `NotFound` error.
    pub fn verify(&self, prev_txs: &PrevTransactions) -> Result<bool> {
        if self.is_coinbase() {
            return Ok(true);
        }

        let mut tx_copy = self.trimmed_copy();
        for (idx, vin) in self.vin.iter().enumerate() {
            let (payload, locking_hash) = match Self::signing_payload(&mut tx_copy, idx, prev_txs) {
                Ok(signed) => signed,
                Err(LedgerError::Validation(msg)) => {
                    warn!("Input {idx} of {} is malformed: {msg}", self.id);
                    return Ok(false);
                }
                Err(e) => return Err(e),
            };
            let (signature, pub_key) = match (vin.get_signature(), vin.get_pub_key()) {
                (Some(signature), Some(pub_key)) => (signature, pub_key),
                _ => {
                    warn!("Input {idx} of {} is unsigned", self.id);
                    return Ok(false);
                }
            };
            if hash_pub_key(pub_key) != locking_hash {
                warn!("Input {idx} of {} is not signed by the output's owner", self.id);
                return Ok(false);
            }
            if !ecdsa_p256_sha256_sign_verify(pub_key, signature, payload.as_bytes()) {
                warn!("Signature mismatch on input {idx} of {}", self.id);
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// SHA-256 of the encoding with the id field cleared.
    fn hash(&self) -> Result<Hash> {
        let tx_copy = Transaction {
            id: Hash::ZERO,
            vin: self.vin.clone(),
            vout: self.vout.clone(),
        };
        Ok(Hash::from_slice(&sha256_digest(&tx_copy.serialize()?)))
    }

    pub fn get_id(&self) -> Hash {
        self.id
    }

    pub fn get_vin(&self) -> &[TXInput] {
        self.vin.as_slice()
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        self.vout.as_slice()
    }

    pub fn get_output_value(&self) -> u64 {
        self.vout.iter().map(TXOutput::get_value).sum()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        deserialize(bytes)
    }

    #[cfg(test)]
    pub(crate) fn vout_mut(&mut self) -> &mut Vec<TXOutput> {
        &mut self.vout
    }

    #[cfg(test)]
    pub(crate) fn vin_mut(&mut self) -> &mut Vec<TXInput> {
        &mut self.vin
    }
}

#[cfg(test)]
impl TXOutput {
    pub(crate) fn set_value(&mut self, value: u64) {
        self.value = value;
    }
}

#[cfg(test)]
impl TXInput {
    pub(crate) fn set_vout(&mut self, vout: i64) {
        self.vout = vout;
    }
}
