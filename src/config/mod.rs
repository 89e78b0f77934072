//! Configuration management
//!
//! Store location, bucket names, wallet file, mining difficulty and the
//! proof-of-work budget, gathered into one [`Config`] value.

pub mod settings;

pub use settings::{Config, DEFAULT_DIFFICULTY_BITS, DEFAULT_SUBSIDY};
