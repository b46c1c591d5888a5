use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use super::block::{Block, UnsealedBlock};
use super::chain::BlockchainError;

/// Number of leading `'0'` hex characters a block hash must have
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Difficulty(u8);

impl Difficulty {
    /// Length of a hex encoded SHA-256 digest
    pub const MAX: u8 = 64;

    pub fn new(value: u8) -> Result<Self, BlockchainError> {
        if value > Self::MAX {
            return Err(BlockchainError::InvalidDifficulty(value));
        }
        Ok(Difficulty(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Whether `hash` starts with the required run of zeros
    pub fn is_met_by(self, hash: &str) -> bool {
        let required = usize::from(self.0);
        hash.len() >= required && hash.bytes().take(required).all(|b| b == b'0')
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty(3)
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Brute-force nonce search
#[derive(Debug, Clone, Copy)]
pub struct ProofOfWork {
    difficulty: Difficulty,
}

impl ProofOfWork {
    pub fn new(difficulty: Difficulty) -> Self {
        ProofOfWork { difficulty }
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    /// Performs proof of work on a candidate block
    ///
    /// Nonces are tried in increasing order from the candidate's starting
    /// nonce, so the result carries the smallest one whose hash meets the
    /// difficulty. The search has no upper bound.
    ///
    /// # Returns
    ///
    /// The sealed block
    pub fn mine(&self, mut candidate: UnsealedBlock) -> Block {
        let start = candidate.nonce;

        loop {
            let hash = candidate.calculate_hash();

            if self.difficulty.is_met_by(&hash) {
                debug!(
                    "Mined block {} at difficulty {} with nonce {} after {} attempts",
                    candidate.index,
                    self.difficulty,
                    candidate.nonce,
                    candidate.nonce - start + 1
                );
                return candidate.seal_with(hash);
            }

            candidate.nonce += 1;
        }
    }
}
