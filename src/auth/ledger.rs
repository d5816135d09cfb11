//! Attempt ledger: an append-only log of admitted authentication attempts.
//!
//! The ledger owns the counting window. Counts are derived per request, so the
//! rate limiter never keeps process-wide counters of its own.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

pub const DEFAULT_ATTEMPT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Attempt counts within the ledger window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AttemptCounts {
    pub global: i64,
    pub origin: i64,
    pub email: i64,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("attempt ledger query failed")]
    Storage(#[source] anyhow::Error),
    #[error("attempt ledger timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait AttemptLedger: Send + Sync {
    /// Count attempts (all, from `origin`, for `email`) inside the window.
    async fn counts(&self, email: &str, origin: IpAddr) -> Result<AttemptCounts, LedgerError>;

    /// Record one admitted attempt.
    async fn append(&self, email: &str, origin: IpAddr) -> Result<(), LedgerError>;

    /// Administrative purge of attempts older than `older_than`. Returns rows removed.
    async fn purge(&self, older_than: Duration) -> Result<u64, LedgerError>;
}

#[derive(Debug)]
struct Attempt {
    email: String,
    origin: IpAddr,
    at: Instant,
}

/// Process-local ledger for single-instance deployments and tests.
///
/// Entries older than the window are dropped lazily; they can no longer affect counts.
#[derive(Debug)]
pub struct MemoryAttemptLedger {
    window: Duration,
    attempts: Mutex<VecDeque<Attempt>>,
}

impl MemoryAttemptLedger {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            attempts: Mutex::new(VecDeque::new()),
        }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    fn evict_expired(&self, attempts: &mut VecDeque<Attempt>) {
        // Appends are in time order, so expired entries sit at the front.
        while attempts
            .front()
            .is_some_and(|attempt| attempt.at.elapsed() >= self.window)
        {
            attempts.pop_front();
        }
    }
}

impl Default for MemoryAttemptLedger {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPT_WINDOW)
    }
}

#[async_trait]
impl AttemptLedger for MemoryAttemptLedger {
    async fn counts(&self, email: &str, origin: IpAddr) -> Result<AttemptCounts, LedgerError> {
        let mut attempts = self.attempts.lock().await;
        self.evict_expired(&mut attempts);

        let counts = attempts
            .iter()
            .fold(AttemptCounts::default(), |mut counts, attempt| {
                counts.global += 1;
                if attempt.origin == origin {
                    counts.origin += 1;
                }
                if attempt.email == email {
                    counts.email += 1;
                }
                counts
            });
        Ok(counts)
    }

    async fn append(&self, email: &str, origin: IpAddr) -> Result<(), LedgerError> {
        let mut attempts = self.attempts.lock().await;
        attempts.push_back(Attempt {
            email: email.to_string(),
            origin,
            at: Instant::now(),
        });
        Ok(())
    }

    async fn purge(&self, older_than: Duration) -> Result<u64, LedgerError> {
        let mut attempts = self.attempts.lock().await;
        let before = attempts.len();
        attempts.retain(|attempt| attempt.at.elapsed() < older_than);
        Ok(u64::try_from(before - attempts.len()).unwrap_or(u64::MAX))
    }
}
