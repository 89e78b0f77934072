//! Helpers for tests that need a throwaway chain
//!
//! Every chain lives in its own temporary directory and mines at a low
//! difficulty so tests stay fast.

pub mod test_utils;

pub use test_utils::*;
