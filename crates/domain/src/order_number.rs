//! Human-readable order numbers: `<PREFIX>-<YYMMDD>-<XXXX>`.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rand::Rng;

/// Prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "VEL";

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SUFFIX_LEN: usize = 4;

/// Source of order numbers. Uniqueness is enforced by the store, not here.
pub trait OrderNumberGenerator: Send + Sync {
    fn generate(&self, now: DateTime<Utc>) -> String;
}

/// Date-stamped numbers with a random `[A-Z0-9]{4}` suffix.
#[derive(Debug, Clone)]
pub struct RandomOrderNumbers {
    prefix: String,
}

impl RandomOrderNumbers {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Default for RandomOrderNumbers {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl OrderNumberGenerator for RandomOrderNumbers {
    fn generate(&self, now: DateTime<Utc>) -> String {
        let mut rng = rand::rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect();
        format!("{}-{}-{}", self.prefix, now.format("%y%m%d"), suffix)
    }
}

/// Hands out queued numbers first, then falls back to random ones.
///
/// Lets tests force a collision or pin the number of a placed order.
#[derive(Debug, Default)]
pub struct QueuedOrderNumbers {
    queue: Mutex<VecDeque<String>>,
    fallback: RandomOrderNumbers,
}

impl QueuedOrderNumbers {
    pub fn new<I, S>(numbers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue: Mutex::new(numbers.into_iter().map(Into::into).collect()),
            fallback: RandomOrderNumbers::default(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }
}

impl OrderNumberGenerator for QueuedOrderNumbers {
    fn generate(&self, now: DateTime<Utc>) -> String {
        let queued = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        queued.unwrap_or_else(|| self.fallback.generate(now))
    }
}
