//! Authentication orchestrator: signup, login, and token-to-identity resolution.
//!
//! Login order is fixed: rate limit, credential lookup, password verification,
//! token issuance. Unknown accounts are verified against a dummy digest so they
//! cost the same Argon2 work as a wrong password.
//!
//! Every store call runs under a deadline. Argon2 derivations share a fixed
//! pool of permits; callers past the limit wait for one.

use anyhow::anyhow;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::error::AuthError;
use super::password::{dummy_digest, hash_password, verify_password, PasswordError};
use super::rate_limit::RateLimiter;
use super::store::{CreateOutcome, CredentialRecord, CredentialStore, StoreError};
use super::token::TokenSigner;
use super::utils::{normalize_email, valid_email};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// One concurrent password derivation per available core.
#[must_use]
pub fn default_hash_concurrency() -> usize {
    std::thread::available_parallelism().map_or(4, NonZeroUsize::get)
}

pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    limiter: RateLimiter,
    signer: TokenSigner,
    dummy_digest: String,
    store_timeout: Duration,
    argon2_permits: Arc<Semaphore>,
}

impl Authenticator {
    /// # Errors
    /// Returns an error if the dummy digest cannot be generated (random source failure).
    pub fn new(
        store: Arc<dyn CredentialStore>,
        limiter: RateLimiter,
        signer: TokenSigner,
    ) -> Result<Self, PasswordError> {
        Ok(Self {
            store,
            limiter,
            signer,
            dummy_digest: dummy_digest()?,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            argon2_permits: Arc::new(Semaphore::new(default_hash_concurrency())),
        })
    }

    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// At most `permits` password derivations run at once; zero is treated as one.
    #[must_use]
    pub fn with_hash_concurrency(mut self, permits: usize) -> Self {
        self.argon2_permits = Arc::new(Semaphore::new(permits.max(1)));
        self
    }

    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    /// Register a new account.
    ///
    /// # Errors
    /// `BadRequest` for empty or malformed input, `Conflict` if the email is taken,
    /// `Internal` on storage or random-source failure.
    #[instrument(skip_all)]
    pub async fn signup(&self, email: &str, password: &str) -> Result<Uuid, AuthError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::BadRequest("email and password are required"));
        }
        if !valid_email(&email) {
            return Err(AuthError::BadRequest("invalid email"));
        }

        let existing = self.bounded(self.store.lookup_by_email(&email)).await?;
        if existing.is_some() {
            return Err(AuthError::Conflict);
        }

        let password = password.to_string();
        let digest = self
            .argon2(move || hash_password(&password))
            .await?
            .map_err(AuthError::internal)?;

        match self.bounded(self.store.create_account(&email, &digest)).await? {
            CreateOutcome::Created(id) => {
                info!(user_id = %id, "Account created");
                Ok(id)
            }
            // Lost a race with a concurrent signup for the same email.
            CreateOutcome::AlreadyExists => Err(AuthError::Conflict),
        }
    }

    /// Verify credentials and issue an identity token.
    ///
    /// # Errors
    /// `Unauthorized` for empty fields, unknown accounts, or wrong passwords (indistinguishable),
    /// `RateLimited` when a threshold is exceeded, `BadRequest` for a malformed origin,
    /// `Internal` on infrastructure failure.
    #[instrument(skip_all, fields(origin = %origin))]
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
        origin: &str,
    ) -> Result<String, AuthError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AuthError::Unauthorized);
        }
        let email = normalize_email(email);

        self.limiter.check_and_record(&email, origin).await?;

        let record = self.bounded(self.store.lookup_by_email(&email)).await?;

        let (digest, subject) = match record {
            Some(record) => (record.password_hash, Some(record.id)),
            None => (self.dummy_digest.clone(), None),
        };

        let password = password.to_string();
        let verified = self
            .argon2(move || verify_password(&digest, &password))
            .await?;

        let Some(subject) = subject.filter(|_| verified) else {
            debug!("Credential verification failed");
            return Err(AuthError::Unauthorized);
        };

        self.signer
            .issue(&subject.to_string())
            .map_err(AuthError::internal)
    }

    /// Resolve a bearer token to its subject.
    ///
    /// # Errors
    /// `Unauthorized` for any invalid, expired, or mis-issued token.
    pub fn authenticated_identity(&self, token: &str) -> Result<String, AuthError> {
        self.signer
            .validate(token)
            .map(|claims| claims.sub)
            .map_err(|_| AuthError::Unauthorized)
    }

    /// Resolve a bearer token to the account it was issued for.
    ///
    /// # Errors
    /// `Unauthorized` if the token is invalid or the account no longer exists,
    /// `Internal` on storage failure.
    pub async fn current_user(&self, token: &str) -> Result<CredentialRecord, AuthError> {
        let subject = self.authenticated_identity(token)?;
        let id = Uuid::parse_str(&subject).map_err(|_| AuthError::Unauthorized)?;
        self.bounded(self.store.get_by_id(id))
            .await?
            .ok_or(AuthError::Unauthorized)
    }

    async fn bounded<T, F>(&self, operation: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let timeout = self.store_timeout;
        tokio::time::timeout(timeout, operation)
            .await
            .unwrap_or_else(|_| {
                Err(StoreError(anyhow!(
                    "credential store timed out after {timeout:?}"
                )))
            })
            .map_err(AuthError::internal)
    }

    /// Run a password derivation on the blocking pool once a permit is free.
    /// The permit moves into the task, so it is held until the derivation ends
    /// even if the caller is dropped.
    async fn argon2<T, F>(&self, work: F) -> Result<T, AuthError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.argon2_permits)
            .acquire_owned()
            .await
            .map_err(AuthError::internal)?;
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            work()
        })
        .await
        .map_err(AuthError::internal)
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("limiter", &self.limiter)
            .field("signer", &self.signer)
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::super::error::Denial;
    use super::super::ledger::{AttemptLedger, MemoryAttemptLedger};
    use super::super::rate_limit::RateLimitConfig;
    use super::super::store::MemoryCredentialStore;
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use secrecy::SecretString;
    use std::net::IpAddr;
    use std::time::Instant;

    const ORIGIN: &str = "192.168.1.100";

    struct Harness {
        auth: Authenticator,
        ledger: Arc<MemoryAttemptLedger>,
    }

    fn harness() -> Result<Harness> {
        let ledger = Arc::new(MemoryAttemptLedger::default());
        let limiter = RateLimiter::new(ledger.clone(), RateLimitConfig::new());
        let signer = TokenSigner::new(SecretString::from("test-signing-key".to_string()));
        let auth = Authenticator::new(Arc::new(MemoryCredentialStore::new()), limiter, signer)?;
        Ok(Harness { auth, ledger })
    }

    /// Store whose calls never complete.
    struct StalledStore;

    #[async_trait]
    impl CredentialStore for StalledStore {
        async fn lookup_by_email(&self, _email: &str) -> Result<Option<CredentialRecord>, StoreError> {
            std::future::pending().await
        }

        async fn create_account(
            &self,
            _email: &str,
            _password_hash: &str,
        ) -> Result<CreateOutcome, StoreError> {
            std::future::pending().await
        }

        async fn get_by_id(&self, _id: Uuid) -> Result<Option<CredentialRecord>, StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn signup_then_duplicate_conflicts() -> Result<()> {
        let h = harness()?;
        h.auth.signup("a@x.com", "pw").await?;
        let result = h.auth.signup("a@x.com", "pw2").await;
        assert!(matches!(result, Err(AuthError::Conflict)));

        // Normalization makes case and whitespace variants the same account.
        let result = h.auth.signup(" A@X.com ", "pw3").await;
        assert!(matches!(result, Err(AuthError::Conflict)));
        Ok(())
    }

    #[tokio::test]
    async fn signup_rejects_empty_and_malformed_input() -> Result<()> {
        let h = harness()?;
        for (email, password) in [("", "pw"), ("a@x.com", ""), ("   ", "pw"), ("nope", "pw")] {
            let result = h.auth.signup(email, password).await;
            assert!(matches!(result, Err(AuthError::BadRequest(_))), "{email:?}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn authenticate_issues_token_for_account_id() -> Result<()> {
        let h = harness()?;
        let id = h.auth.signup("a@x.com", "pw").await?;

        let token = h.auth.authenticate("a@x.com", "pw", ORIGIN).await?;
        assert!(!token.is_empty());
        assert_eq!(h.auth.authenticated_identity(&token)?, id.to_string());

        let record = h.auth.current_user(&token).await?;
        assert_eq!(record.id, id);
        assert_eq!(record.email, "a@x.com");
        Ok(())
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_account_look_the_same() -> Result<()> {
        let h = harness()?;
        h.auth.signup("a@x.com", "pw").await?;

        let wrong = h.auth.authenticate("a@x.com", "wrong", ORIGIN).await;
        let unknown = h.auth.authenticate("nobody@x.com", "pw", ORIGIN).await;
        assert!(matches!(wrong, Err(AuthError::Unauthorized)));
        assert!(matches!(unknown, Err(AuthError::Unauthorized)));
        if let (Err(wrong), Err(unknown)) = (wrong, unknown) {
            assert_eq!(wrong.to_string(), unknown.to_string());
        }
        Ok(())
    }

    #[tokio::test]
    async fn unknown_account_still_pays_for_verification() -> Result<()> {
        let h = harness()?;
        h.auth.signup("a@x.com", "pw").await?;

        let start = Instant::now();
        let _ = h.auth.authenticate("a@x.com", "wrong", ORIGIN).await;
        let wrong_password = start.elapsed();

        let start = Instant::now();
        let _ = h.auth.authenticate("nobody@x.com", "pw", ORIGIN).await;
        let unknown_account = start.elapsed();

        // Both paths run one Argon2id derivation; a skipped derivation would be
        // orders of magnitude faster.
        assert!(
            unknown_account * 4 >= wrong_password,
            "unknown account took {unknown_account:?}, wrong password took {wrong_password:?}"
        );
        Ok(())
    }

    #[tokio::test]
    async fn empty_fields_are_unauthorized_and_not_logged() -> Result<()> {
        let h = harness()?;
        for (email, password) in [("", "pw"), ("a@x.com", ""), ("  ", "pw")] {
            let result = h.auth.authenticate(email, password, ORIGIN).await;
            assert!(matches!(result, Err(AuthError::Unauthorized)));
        }
        let origin: IpAddr = ORIGIN.parse()?;
        assert_eq!(h.ledger.counts("a@x.com", origin).await?.global, 0);
        Ok(())
    }

    #[tokio::test]
    async fn admitted_attempts_are_logged_once() -> Result<()> {
        let h = harness()?;
        h.auth.signup("a@x.com", "pw").await?;
        h.auth.authenticate("a@x.com", "pw", ORIGIN).await?;
        let _ = h.auth.authenticate("A@x.com", "wrong", ORIGIN).await;

        let origin: IpAddr = ORIGIN.parse()?;
        let counts = h.ledger.counts("a@x.com", origin).await?;
        assert_eq!(counts.email, 2);
        assert_eq!(counts.global, 2);
        Ok(())
    }

    #[tokio::test]
    async fn rate_limited_before_lookup() -> Result<()> {
        let h = harness()?;
        h.auth.signup("a@x.com", "pw").await?;
        let origin: IpAddr = ORIGIN.parse()?;
        for _ in 0..11 {
            h.ledger.append("a@x.com", origin).await?;
        }

        // Correct credentials do not bypass the limiter.
        let result = h.auth.authenticate("a@x.com", "pw", ORIGIN).await;
        assert!(matches!(result, Err(AuthError::RateLimited(Denial::Account))));
        Ok(())
    }

    #[tokio::test]
    async fn malformed_origin_is_bad_request() -> Result<()> {
        let h = harness()?;
        let result = h.auth.authenticate("a@x.com", "pw", "not-an-ip").await;
        assert!(matches!(result, Err(AuthError::BadRequest(_))));
        Ok(())
    }

    #[tokio::test]
    async fn garbage_token_is_unauthorized() -> Result<()> {
        let h = harness()?;
        assert!(matches!(
            h.auth.authenticated_identity("garbage"),
            Err(AuthError::Unauthorized)
        ));
        assert!(matches!(
            h.auth.current_user("garbage").await,
            Err(AuthError::Unauthorized)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn token_for_unknown_subject_is_unauthorized() -> Result<()> {
        let h = harness()?;
        let signer = TokenSigner::new(SecretString::from("test-signing-key".to_string()));
        let token = signer.issue(&Uuid::new_v4().to_string())?;
        assert!(h.auth.authenticated_identity(&token).is_ok());
        assert!(matches!(
            h.auth.current_user(&token).await,
            Err(AuthError::Unauthorized)
        ));

        let token = signer.issue("not-a-uuid")?;
        assert!(matches!(
            h.auth.current_user(&token).await,
            Err(AuthError::Unauthorized)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_logins_are_each_recorded() -> Result<()> {
        let h = Arc::new(harness()?);
        h.auth.signup("a@x.com", "pw").await?;

        let mut handles = Vec::new();
        for _ in 0..5 {
            let h = Arc::clone(&h);
            handles.push(tokio::spawn(async move {
                h.auth.authenticate("a@x.com", "pw", ORIGIN).await
            }));
        }
        for handle in handles {
            assert!(!handle.await??.is_empty());
        }

        let origin: IpAddr = ORIGIN.parse()?;
        assert_eq!(h.ledger.counts("a@x.com", origin).await?.email, 5);
        Ok(())
    }

    #[tokio::test]
    async fn stalled_store_fails_instead_of_hanging() -> Result<()> {
        let limiter = RateLimiter::new(
            Arc::new(MemoryAttemptLedger::default()),
            RateLimitConfig::new(),
        );
        let signer = TokenSigner::new(SecretString::from("test-signing-key".to_string()));
        let token = signer.issue(&Uuid::new_v4().to_string())?;
        let auth = Authenticator::new(Arc::new(StalledStore), limiter, signer)?
            .with_store_timeout(Duration::from_millis(50));
        let outer = Duration::from_secs(5);

        let result = tokio::time::timeout(outer, auth.authenticate("a@x.com", "pw", ORIGIN)).await?;
        assert!(matches!(result, Err(AuthError::Internal(_))));

        let result = tokio::time::timeout(outer, auth.signup("a@x.com", "pw")).await?;
        assert!(matches!(result, Err(AuthError::Internal(_))));

        let result = tokio::time::timeout(outer, auth.current_user(&token)).await?;
        assert!(matches!(result, Err(AuthError::Internal(_))));
        Ok(())
    }

    #[tokio::test]
    async fn store_timeout_defaults_and_overrides() -> Result<()> {
        let h = harness()?;
        assert_eq!(h.auth.store_timeout(), DEFAULT_STORE_TIMEOUT);
        let auth = h.auth.with_store_timeout(Duration::from_millis(250));
        assert_eq!(auth.store_timeout(), Duration::from_millis(250));
        Ok(())
    }

    #[tokio::test]
    async fn password_work_waits_for_a_free_permit() -> Result<()> {
        let mut h = harness()?;
        h.auth = h.auth.with_hash_concurrency(1);

        let held = Arc::clone(&h.auth.argon2_permits).acquire_owned().await?;
        let blocked =
            tokio::time::timeout(Duration::from_millis(200), h.auth.signup("a@x.com", "pw")).await;
        assert!(blocked.is_err(), "signup derived a digest without a permit");

        drop(held);
        h.auth.signup("a@x.com", "pw").await?;
        assert_eq!(h.auth.argon2_permits.available_permits(), 1);
        Ok(())
    }

    #[test]
    fn zero_hash_concurrency_still_admits_one() -> Result<()> {
        let h = harness()?;
        let auth = h.auth.with_hash_concurrency(0);
        assert_eq!(auth.argon2_permits.available_permits(), 1);
        assert!(default_hash_concurrency() >= 1);
        Ok(())
    }
}
