use crate::config::Config;
use crate::core::{Block, Hash, Header};
use crate::error::{LedgerError, Result};
use crate::utils::sha256_digest;
use log::{debug, warn};
use num_bigint::BigUint;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

const MAX_NONCE: i64 = i64::MAX;

// How many nonces a worker tries between wall-clock checks.
const DEADLINE_CHECK_INTERVAL: u64 = 4096;

/// Nonce search for one header.
///
/// The hashed payload is `parent ‖ tx_root ‖ timestamp ‖ difficulty ‖ nonce`,
/// with the difficulty and nonce as 8-byte big-endian integers. A nonce wins
/// when the SHA-256 of that payload, read as an unsigned big-endian integer,
/// is below `1 << (256 - difficulty_bits)`.
pub struct ProofOfWork {
    prefix: Vec<u8>,
    target: BigUint,
    workers: usize,
    max_nonce: i64,
    timeout: Option<Duration>,
}

impl ProofOfWork {
    pub fn new(header: &Header, difficulty_bits: u32) -> ProofOfWork {
        let target = BigUint::from(1u32) << (256 - difficulty_bits.min(256)) as usize;

        let mut prefix = vec![];
        prefix.extend(header.get_parent_hash().as_bytes());
        prefix.extend(header.get_tx_root().as_bytes());
        prefix.extend(header.get_timestamp().to_bytes_be());
        prefix.extend(i64::from(difficulty_bits).to_be_bytes());

        ProofOfWork {
            prefix,
            target,
            workers: 1,
            max_nonce: MAX_NONCE,
            timeout: None,
        }
    }

    pub fn from_config(header: &Header, config: &Config) -> ProofOfWork {
        ProofOfWork::new(header, config.difficulty_bits)
            .with_workers(config.mining_workers)
            .with_max_nonce(config.max_nonce)
            .with_timeout(config.mining_timeout())
    }

    pub fn with_workers(mut self, workers: usize) -> ProofOfWork {
        self.workers = workers.max(1);
        self
    }

    /// Nonces at or above `max_nonce` are never tried.
    pub fn with_max_nonce(mut self, max_nonce: i64) -> ProofOfWork {
        self.max_nonce = max_nonce;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> ProofOfWork {
        self.timeout = timeout;
        self
    }

    pub fn target(&self) -> &BigUint {
        &self.target
    }

    fn prepare_data(&self, nonce: i64) -> Vec<u8> {
        let mut data_bytes = Vec::with_capacity(self.prefix.len() + 8);
        data_bytes.extend_from_slice(&self.prefix);
        data_bytes.extend(nonce.to_be_bytes());
        data_bytes
    }

    pub fn digest(&self, nonce: i64) -> Hash {
        Hash::from_slice(&sha256_digest(&self.prepare_data(nonce)))
    }

    fn meets_target(&self, digest: &Hash) -> bool {
        BigUint::from_bytes_be(digest.as_bytes()) < self.target
    }

    /// Checks the inequality for the block's stored nonce.
    pub fn validate(block: &Block, difficulty_bits: u32) -> bool {
        let pow = ProofOfWork::new(block.get_header(), difficulty_bits);
        pow.meets_target(&pow.digest(block.get_nonce()))
    }

    /// Searches nonces from 0 upward across `workers` threads.
    ///
    /// Worker `k` tries `k, k + workers, k + 2*workers, ...`. The first
    /// worker to hit the target publishes its result and raises the shared
    /// stop flag; the others drop out at their next iteration.
    pub fn run(&self) -> Result<(i64, Hash)> {
        let stop = AtomicBool::new(false);
        let attempts = AtomicU64::new(0);
        let found: Mutex<Option<(i64, Hash)>> = Mutex::new(None);
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let stride = self.workers as i64;

        thread::scope(|scope| {
            for worker in 0..stride {
                let (stop, attempts, found) = (&stop, &attempts, &found);
                scope.spawn(move || self.search(worker, stride, deadline, stop, attempts, found));
            }
        });

        let attempts = attempts.load(Ordering::SeqCst);
        let winner = found
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match winner {
            Some((nonce, hash)) => {
                debug!("Found nonce {nonce} after {attempts} attempts: {hash}");
                Ok((nonce, hash))
            }
            None => {
                warn!("Proof-of-work gave up after {attempts} attempts");
                Err(LedgerError::NoSolutionFound { attempts })
            }
        }
    }

    fn search(
        &self,
        start: i64,
        stride: i64,
        deadline: Option<Instant>,
        stop: &AtomicBool,
        attempts: &AtomicU64,
        found: &Mutex<Option<(i64, Hash)>>,
    ) {
        let mut nonce = start;
        let mut tried = 0u64;

        while nonce < self.max_nonce && !stop.load(Ordering::Relaxed) {
            let digest = self.digest(nonce);
            tried += 1;

            if self.meets_target(&digest) {
                if let Ok(mut slot) = found.lock() {
                    if slot.is_none() {
                        *slot = Some((nonce, digest));
                    }
                }
                stop.store(true, Ordering::SeqCst);
                break;
            }

            if tried % DEADLINE_CHECK_INTERVAL == 0
                && deadline.is_some_and(|deadline| Instant::now() >= deadline)
            {
                debug!("Worker {start} hit the mining deadline");
                stop.store(true, Ordering::SeqCst);
                break;
            }

            nonce = match nonce.checked_add(stride) {
                Some(next) => next,
                None => break,
            };
        }

        attempts.fetch_add(tried, Ordering::SeqCst);
    }
}
