//! Identifier generators
//!
//! The store draws record identities from an injectable [`IdGenerator`].
//! `RandomIds` is the production default; `SequentialIds` exists so tests
//! can get deterministic, readable ids.

use crate::traits::IdGenerator;
use crate::types::RecordId;
use rand::Rng;
use std::sync::atomic::{AtomicI64, Ordering};

/// Pseudo-random 63-bit identifier source (production default)
#[derive(Debug, Default)]
pub struct RandomIds;

impl RandomIds {
    /// Create a new random generator
    pub fn new() -> Self {
        RandomIds
    }
}

impl IdGenerator for RandomIds {
    fn next_id(&self) -> RecordId {
        let mut rng = rand::thread_rng();
        loop {
            // gen_range excludes 0, so every draw is a valid positive id
            let candidate = rng.gen_range(1..=i64::MAX);
            if let Ok(id) = RecordId::from_i64(candidate) {
                return id;
            }
        }
    }
}

/// Deterministic counter-based identifier source for tests
#[derive(Debug)]
pub struct SequentialIds {
    next: AtomicI64,
}

impl SequentialIds {
    /// Start counting from `first` (must be positive)
    pub fn starting_at(first: i64) -> Self {
        SequentialIds {
            next: AtomicI64::new(first.max(1)),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> RecordId {
        let value = self.next.fetch_add(1, Ordering::SeqCst);
        RecordId::from_i64(value).unwrap_or_else(|_| RecordId::from_i64(1).unwrap())
    }
}
