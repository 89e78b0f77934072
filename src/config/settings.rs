use crate::error::{LedgerError, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE_KEY: &str = "LEDGER_CONFIG";
const DATA_DIR_KEY: &str = "LEDGER_DATA_DIR";
const WALLET_FILE_KEY: &str = "LEDGER_WALLET_FILE";
const DIFFICULTY_KEY: &str = "LEDGER_DIFFICULTY";
const WORKERS_KEY: &str = "LEDGER_WORKERS";

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_WALLET_FILE: &str = "wallet.dat";
pub const DEFAULT_DIFFICULTY_BITS: u32 = 16;
pub const DEFAULT_SUBSIDY: u64 = 50;

/// Everything the chain, UTXO index and wallet need to know at startup.
///
/// Built once and passed by reference into constructors; nothing reads
/// ambient state after that.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub wallet_file: PathBuf,
    pub blocks_tree: String,
    pub utxo_tree: String,
    pub tx_index_tree: String,
    pub difficulty_bits: u32,
    pub subsidy: u64,
    pub mining_workers: usize,
    pub max_nonce: i64,
    pub mining_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from(DEFAULT_DATA_DIR);
        Config {
            wallet_file: data_dir.join(DEFAULT_WALLET_FILE),
            data_dir,
            blocks_tree: String::from("blocks"),
            utxo_tree: String::from("chainstate"),
            tx_index_tree: String::from("txindex"),
            difficulty_bits: DEFAULT_DIFFICULTY_BITS,
            subsidy: DEFAULT_SUBSIDY,
            mining_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            max_nonce: i64::MAX,
            mining_timeout_secs: None,
        }
    }
}

impl Config {
    /// Config rooted at `dir`: the store and the wallet file both live there.
    pub fn with_data_dir(dir: impl AsRef<Path>) -> Config {
        let dir = dir.as_ref();
        Config {
            data_dir: dir.join(DEFAULT_DATA_DIR),
            wallet_file: dir.join(DEFAULT_WALLET_FILE),
            ..Config::default()
        }
    }

    /// Read a TOML file; keys it omits keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            LedgerError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let config: Config = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, then the file named by `LEDGER_CONFIG`, then per-key
    /// environment overrides.
    pub fn from_env() -> Result<Config> {
        let mut config = match env::var(CONFIG_FILE_KEY) {
            Ok(path) => Config::load(path)?,
            Err(_) => Config::default(),
        };

        if let Ok(dir) = env::var(DATA_DIR_KEY) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(file) = env::var(WALLET_FILE_KEY) {
            config.wallet_file = PathBuf::from(file);
        }
        if let Ok(bits) = env::var(DIFFICULTY_KEY) {
            config.difficulty_bits = bits
                .parse()
                .map_err(|e| LedgerError::Config(format!("{DIFFICULTY_KEY}: {e}")))?;
        }
        if let Ok(workers) = env::var(WORKERS_KEY) {
            config.mining_workers = workers
                .parse()
                .map_err(|e| LedgerError::Config(format!("{WORKERS_KEY}: {e}")))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=255).contains(&self.difficulty_bits) {
            return Err(LedgerError::Config(format!(
                "difficulty_bits must be in 1..=255, got {}",
                self.difficulty_bits
            )));
        }
        if self.mining_workers == 0 {
            return Err(LedgerError::Config(
                "mining_workers must be at least 1".to_string(),
            ));
        }
        if self.max_nonce < 0 {
            return Err(LedgerError::Config("max_nonce must not be negative".to_string()));
        }
        Ok(())
    }

    pub fn mining_timeout(&self) -> Option<Duration> {
        self.mining_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "difficulty_bits = 12").unwrap();
        writeln!(file, "data_dir = \"/tmp/ledger-data\"").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.difficulty_bits, 12);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/ledger-data"));
        assert_eq!(config.subsidy, DEFAULT_SUBSIDY);
        assert_eq!(config.utxo_tree, "chainstate");
    }

    #[test]
    fn test_validate_rejects_out_of_range_difficulty() {
        let config = Config {
            difficulty_bits: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(LedgerError::Config(_))));

        let config = Config {
            difficulty_bits: 256,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_with_data_dir_roots_store_and_wallet() {
        let config = Config::with_data_dir("/srv/ledger");
        assert!(config.data_dir.starts_with("/srv/ledger"));
        assert!(config.wallet_file.starts_with("/srv/ledger"));
        assert!(config.validate().is_ok());
    }
}
