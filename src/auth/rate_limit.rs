//! Three-dimensional rate limiting for authentication attempts.
//!
//! Flow Overview:
//! 1) Parse the origin address; malformed origins are rejected before any ledger access.
//! 2) Read global, per-origin, and per-account counts from the ledger window.
//! 3) Deny on the first exceeded threshold, checked global, then origin, then account.
//! 4) Append the attempt only when admitted, so denied retries never deepen a denial.
//!
//! Read-then-append is not atomic. Requests racing near a threshold can all be
//! admitted, overshooting by at most the number of in-flight requests. Limits are
//! soft; the ledger itself never drops or duplicates an admitted attempt.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::error::{AuthError, Denial};
use super::ledger::{AttemptCounts, AttemptLedger, LedgerError};
use super::utils::parse_origin;

pub const GLOBAL_ATTEMPT_LIMIT: i64 = 300;
pub const ORIGIN_ATTEMPT_LIMIT: i64 = 25;
pub const ACCOUNT_ATTEMPT_LIMIT: i64 = 10;

pub const DEFAULT_LEDGER_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    ledger_timeout: Duration,
}

impl RateLimitConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ledger_timeout: DEFAULT_LEDGER_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_ledger_timeout(mut self, timeout: Duration) -> Self {
        self.ledger_timeout = timeout;
        self
    }

    #[must_use]
    pub fn ledger_timeout(&self) -> Duration {
        self.ledger_timeout
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// First exceeded threshold, in fixed precedence order.
#[must_use]
pub fn evaluate(counts: &AttemptCounts) -> Option<Denial> {
    if counts.global > GLOBAL_ATTEMPT_LIMIT {
        Some(Denial::Global)
    } else if counts.origin > ORIGIN_ATTEMPT_LIMIT {
        Some(Denial::Origin)
    } else if counts.email > ACCOUNT_ATTEMPT_LIMIT {
        Some(Denial::Account)
    } else {
        None
    }
}

pub struct RateLimiter {
    ledger: Arc<dyn AttemptLedger>,
    config: RateLimitConfig,
}

impl RateLimiter {
    #[must_use]
    pub fn new(ledger: Arc<dyn AttemptLedger>, config: RateLimitConfig) -> Self {
        Self { ledger, config }
    }

    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admit or deny an attempt for `email` from `origin`, recording it when admitted.
    ///
    /// # Errors
    /// - `AuthError::BadRequest` if `origin` is not an IP address.
    /// - `AuthError::RateLimited` if a threshold is exceeded.
    /// - `AuthError::Internal` if the ledger fails or times out (fail closed).
    pub async fn check_and_record(&self, email: &str, origin: &str) -> Result<(), AuthError> {
        let Some(origin_ip) = parse_origin(origin) else {
            warn!(origin, "Invalid origin address format");
            return Err(AuthError::BadRequest("invalid IP address"));
        };

        let counts = self
            .bounded(self.ledger.counts(email, origin_ip))
            .await
            .map_err(AuthError::internal)?;

        if let Some(denial) = evaluate(&counts) {
            debug!(origin = %origin_ip, reason = denial.reason(), "Auth attempt denied");
            return Err(AuthError::RateLimited(denial));
        }

        self.bounded(self.ledger.append(email, origin_ip))
            .await
            .map_err(AuthError::internal)
    }

    async fn bounded<T, F>(&self, operation: F) -> Result<T, LedgerError>
    where
        F: Future<Output = Result<T, LedgerError>>,
    {
        let timeout = self.config.ledger_timeout;
        tokio::time::timeout(timeout, operation)
            .await
            .map_err(|_| LedgerError::Timeout(timeout))?
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::super::ledger::MemoryAttemptLedger;
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ORIGIN: &str = "192.168.1.100";

    fn limiter(ledger: Arc<MemoryAttemptLedger>) -> RateLimiter {
        RateLimiter::new(ledger, RateLimitConfig::new())
    }

    async fn seed(ledger: &MemoryAttemptLedger, email: &str, origin: &str, n: usize) -> Result<()> {
        let origin: IpAddr = origin.parse()?;
        for _ in 0..n {
            ledger.append(email, origin).await?;
        }
        Ok(())
    }

    /// Ledger that counts calls and can be told to fail or stall.
    #[derive(Default)]
    struct ScriptedLedger {
        calls: AtomicUsize,
        fail: bool,
        stall: bool,
    }

    #[async_trait]
    impl AttemptLedger for ScriptedLedger {
        async fn counts(&self, _email: &str, _origin: IpAddr) -> Result<AttemptCounts, LedgerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.stall {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if self.fail {
                return Err(LedgerError::Storage(anyhow::anyhow!("connection reset")));
            }
            Ok(AttemptCounts::default())
        }

        async fn append(&self, _email: &str, _origin: IpAddr) -> Result<(), LedgerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn purge(&self, _older_than: Duration) -> Result<u64, LedgerError> {
            Ok(0)
        }
    }

    #[test]
    fn evaluate_thresholds_are_strictly_greater() {
        let at_limit = AttemptCounts {
            global: GLOBAL_ATTEMPT_LIMIT,
            origin: ORIGIN_ATTEMPT_LIMIT,
            email: ACCOUNT_ATTEMPT_LIMIT,
        };
        assert_eq!(evaluate(&at_limit), None);
        assert_eq!(
            evaluate(&AttemptCounts {
                email: ACCOUNT_ATTEMPT_LIMIT + 1,
                ..at_limit
            }),
            Some(Denial::Account)
        );
    }

    #[test]
    fn evaluate_precedence_is_global_origin_account() {
        let all = AttemptCounts {
            global: 301,
            origin: 26,
            email: 11,
        };
        assert_eq!(evaluate(&all), Some(Denial::Global));
        assert_eq!(
            evaluate(&AttemptCounts { global: 0, ..all }),
            Some(Denial::Origin)
        );
        assert_eq!(
            evaluate(&AttemptCounts {
                global: 0,
                origin: 0,
                ..all
            }),
            Some(Denial::Account)
        );
    }

    #[tokio::test]
    async fn attempt_after_eleven_admitted_is_denied_from_any_origin() -> Result<()> {
        let ledger = Arc::new(MemoryAttemptLedger::default());
        let limiter = limiter(Arc::clone(&ledger));

        for _ in 0..11 {
            limiter.check_and_record("a@x.com", ORIGIN).await?;
        }
        let result = limiter.check_and_record("a@x.com", ORIGIN).await;
        assert!(matches!(result, Err(AuthError::RateLimited(Denial::Account))));

        let result = limiter.check_and_record("a@x.com", "10.9.9.9").await;
        assert!(matches!(result, Err(AuthError::RateLimited(Denial::Account))));

        // Other accounts from the same origin are unaffected.
        limiter.check_and_record("b@x.com", ORIGIN).await?;
        Ok(())
    }

    #[tokio::test]
    async fn mapped_and_plain_ipv4_share_an_origin_count() -> Result<()> {
        let ledger = Arc::new(MemoryAttemptLedger::default());
        let limiter = limiter(Arc::clone(&ledger));

        for i in 0..13 {
            limiter.check_and_record(&format!("m{i}@x.com"), "[::ffff:10.0.0.9]:40000").await?;
            limiter.check_and_record(&format!("p{i}@x.com"), "10.0.0.9").await?;
        }
        let origin: IpAddr = "10.0.0.9".parse()?;
        assert_eq!(ledger.counts("x@x.com", origin).await?.origin, 26);

        let result = limiter.check_and_record("late@x.com", "::ffff:10.0.0.9").await;
        assert!(matches!(result, Err(AuthError::RateLimited(Denial::Origin))));
        Ok(())
    }

    #[tokio::test]
    async fn account_limit_boundary() -> Result<()> {
        let ledger = Arc::new(MemoryAttemptLedger::default());
        seed(&ledger, "a@x.com", ORIGIN, 10).await?;
        let limiter = limiter(Arc::clone(&ledger));

        // A count of exactly 10 is at the limit, not over it.
        limiter.check_and_record("a@x.com", "10.0.0.2").await?;
        let result = limiter.check_and_record("a@x.com", "10.0.0.3").await;
        assert!(matches!(result, Err(AuthError::RateLimited(Denial::Account))));
        Ok(())
    }

    #[tokio::test]
    async fn origin_limit_applies_across_distinct_emails() -> Result<()> {
        let ledger = Arc::new(MemoryAttemptLedger::default());
        let limiter = limiter(Arc::clone(&ledger));

        for i in 0..26 {
            limiter
                .check_and_record(&format!("user-{i}@example.com"), ORIGIN)
                .await?;
        }
        let result = limiter
            .check_and_record("fresh@example.com", ORIGIN)
            .await;
        assert!(matches!(result, Err(AuthError::RateLimited(Denial::Origin))));

        limiter
            .check_and_record("fresh@example.com", "10.0.0.1")
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn global_limit_denies_fresh_pairs() -> Result<()> {
        let ledger = Arc::new(MemoryAttemptLedger::default());
        for i in 0..301u32 {
            let origin = IpAddr::V4(Ipv4Addr::from(0x0a00_0000 + i));
            ledger.append(&format!("user-{i}@example.com"), origin).await?;
        }
        let limiter = limiter(Arc::clone(&ledger));

        let result = limiter
            .check_and_record("fresh@example.com", "172.16.0.1")
            .await;
        assert!(matches!(result, Err(AuthError::RateLimited(Denial::Global))));
        Ok(())
    }

    #[tokio::test]
    async fn denied_attempts_are_not_recorded() -> Result<()> {
        let ledger = Arc::new(MemoryAttemptLedger::default());
        seed(&ledger, "a@x.com", ORIGIN, 11).await?;
        let limiter = limiter(Arc::clone(&ledger));
        let origin: IpAddr = ORIGIN.parse()?;

        let before = ledger.counts("a@x.com", origin).await?;
        for _ in 0..20 {
            let result = limiter.check_and_record("a@x.com", ORIGIN).await;
            assert!(matches!(result, Err(AuthError::RateLimited(Denial::Account))));
        }
        assert_eq!(ledger.counts("a@x.com", origin).await?, before);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_origin_is_rejected_without_ledger_access() {
        let ledger = Arc::new(ScriptedLedger::default());
        let limiter = RateLimiter::new(ledger.clone(), RateLimitConfig::new());

        for origin in ["", "not-an-ip", "999.1.1.1", "1.2.3"] {
            let result = limiter.check_and_record("a@x.com", origin).await;
            assert!(matches!(result, Err(AuthError::BadRequest(_))), "{origin}");
        }
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ledger_failure_is_internal_not_admit() {
        let ledger = Arc::new(ScriptedLedger {
            fail: true,
            ..ScriptedLedger::default()
        });
        let limiter = RateLimiter::new(ledger.clone(), RateLimitConfig::new());

        let result = limiter.check_and_record("a@x.com", ORIGIN).await;
        assert!(matches!(result, Err(AuthError::Internal(_))));
        // counts only; nothing appended
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ledger_timeout_fails_closed() {
        let ledger = Arc::new(ScriptedLedger {
            stall: true,
            ..ScriptedLedger::default()
        });
        let config = RateLimitConfig::new().with_ledger_timeout(Duration::from_millis(50));
        let limiter = RateLimiter::new(ledger.clone(), config);

        let result = limiter.check_and_record("a@x.com", ORIGIN).await;
        assert!(matches!(result, Err(AuthError::Internal(_))));
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn config_defaults_and_overrides() {
        let config = RateLimitConfig::new();
        assert_eq!(config.ledger_timeout(), DEFAULT_LEDGER_TIMEOUT);
        let config = config.with_ledger_timeout(Duration::from_millis(10));
        assert_eq!(config.ledger_timeout(), Duration::from_millis(10));
    }
}
