//! Error handling for the ledger
//!
//! Every fallible operation returns [`Result`], carrying one of the
//! [`LedgerError`] kinds. Only store-level failures are fatal to the process;
//! everything else is recoverable at the operation boundary.

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The embedded store could not be opened, read or written
    Store(String),
    /// A persisted record could not be encoded or decoded
    Serialization(String),
    /// File I/O errors
    Io(String),
    /// Signature mismatch, malformed coinbase, double spend and friends
    Validation(String),
    /// Address text failed base58 decoding or checksum re-derivation
    InvalidAddress(String),
    /// Key generation or signing failed
    Crypto(String),
    /// Spendable outputs never reached the requested amount
    InsufficientFunds { required: u64, available: u64 },
    /// A referenced transaction or block is absent from the chain
    NotFound(String),
    /// Proof-of-work exhausted its nonce or time budget
    NoSolutionFound { attempts: u64 },
    /// Wallet collection errors
    Wallet(String),
    /// Configuration errors
    Config(String),
}

impl LedgerError {
    /// Store-class failures abort the whole process; the rest are
    /// recoverable by the caller of the failing operation.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LedgerError::Store(_) | LedgerError::Serialization(_) | LedgerError::Io(_)
        )
    }
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Store(msg) => write!(f, "Store error: {msg}"),
            LedgerError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            LedgerError::Io(msg) => write!(f, "I/O error: {msg}"),
            LedgerError::Validation(msg) => write!(f, "Validation failed: {msg}"),
            LedgerError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
            LedgerError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            LedgerError::InsufficientFunds {
                required,
                available,
            } => {
                write!(
                    f,
                    "Insufficient funds: required {required}, available {available}"
                )
            }
            LedgerError::NotFound(what) => write!(f, "Not found: {what}"),
            LedgerError::NoSolutionFound { attempts } => {
                write!(f, "No proof-of-work solution found after {attempts} nonces")
            }
            LedgerError::Wallet(msg) => write!(f, "Wallet error: {msg}"),
            LedgerError::Config(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Io(err.to_string())
    }
}

impl From<sled::Error> for LedgerError {
    fn from(err: sled::Error) -> Self {
        LedgerError::Store(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for LedgerError {
    fn from(err: bincode::error::EncodeError) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for LedgerError {
    fn from(err: bincode::error::DecodeError) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        LedgerError::Config(err.to_string())
    }
}

impl From<sled::transaction::TransactionError<LedgerError>> for LedgerError {
    fn from(err: sled::transaction::TransactionError<LedgerError>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(e) => e,
            sled::transaction::TransactionError::Storage(e) => LedgerError::Store(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_store_class_errors_are_fatal() {
        assert!(LedgerError::Store("disk".into()).is_fatal());
        assert!(LedgerError::Io("eof".into()).is_fatal());
        assert!(!LedgerError::NotFound("tx".into()).is_fatal());
        assert!(!LedgerError::NoSolutionFound { attempts: 10 }.is_fatal());
        assert!(!LedgerError::InsufficientFunds {
            required: 100,
            available: 20
        }
        .is_fatal());
    }

    #[test]
    fn test_transaction_abort_unwraps_inner_error() {
        let err = sled::transaction::TransactionError::Abort(LedgerError::NotFound(
            "utxo entry".to_string(),
        ));
        assert_eq!(
            LedgerError::from(err),
            LedgerError::NotFound("utxo entry".to_string())
        );
    }
}
