use crate::config::Config;
use crate::error::{LedgerError, Result};
use crate::utils::{deserialize, serialize};
use crate::wallet::Wallet;
use log::info;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Named collection of key pairs, loaded and saved wholesale.
pub struct Wallets {
    wallets: BTreeMap<String, Wallet>,
    path: PathBuf,
}

impl Wallets {
    pub fn new(config: &Config) -> Result<Wallets> {
        Wallets::load(&config.wallet_file)
    }

    /// Opens the wallet file at `path`; a missing file is an empty collection.
    pub fn load(path: impl AsRef<Path>) -> Result<Wallets> {
        let mut wallets = Wallets {
            wallets: BTreeMap::new(),
            path: path.as_ref().to_path_buf(),
        };
        wallets.load_from_file()?;
        Ok(wallets)
    }

    /// Generates a key pair, stores it and persists the collection.
    pub fn create_wallet(&mut self) -> Result<String> {
        let wallet = Wallet::new()?;
        let address = wallet.get_address();
        self.wallets.insert(address.clone(), wallet);
        self.save_to_file()?;
        info!("Created wallet {address}");
        Ok(address)
    }

    /// Addresses in sorted order
    pub fn get_addresses(&self) -> Vec<String> {
        self.wallets.keys().cloned().collect()
    }

    pub fn get_wallet(&self, address: &str) -> Option<&Wallet> {
        self.wallets.get(address)
    }

    pub fn require_wallet(&self, address: &str) -> Result<&Wallet> {
        self.get_wallet(address)
            .ok_or_else(|| LedgerError::Wallet(format!("Wallet not found for address: {address}")))
    }

    fn load_from_file(&mut self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }

        let mut file = File::open(&self.path)?;
        let mut buf = vec![];
        file.read_to_end(&mut buf)?;
        self.wallets = deserialize(&buf[..])
            .map_err(|e| LedgerError::Wallet(format!("Corrupt wallet file: {e}")))?;
        Ok(())
    }

    pub fn save_to_file(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        let wallets_bytes = serialize(&self.wallets)?;
        writer.write_all(wallets_bytes.as_slice())?;
        writer.flush()?;
        Ok(())
    }
}
