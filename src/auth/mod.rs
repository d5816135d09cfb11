//! Credential verification and login abuse control.
//!
//! ## Flow Overview
//!
//! 1. `signup` normalizes the email, hashes the password with Argon2id, and stores the account.
//! 2. `authenticate` consults the [`RateLimiter`] first, then looks the account up and verifies
//!    the password. Success yields a short-lived HS256 token whose subject is the account id.
//! 3. `authenticated_identity` turns a token back into its subject.
//!
//! Storage is behind the [`CredentialStore`] and [`AttemptLedger`] traits. The Postgres
//! implementations live in [`postgres`]; the in-memory ones back tests and single-process runs.

mod error;
pub mod ledger;
pub mod password;
pub mod postgres;
pub mod rate_limit;
mod service;
pub mod store;
pub mod token;
mod utils;

pub use self::error::{AuthError, Denial};
pub use self::ledger::{AttemptCounts, AttemptLedger, LedgerError, MemoryAttemptLedger};
pub use self::rate_limit::{RateLimitConfig, RateLimiter};
pub use self::service::Authenticator;
pub use self::store::{CredentialRecord, CredentialStore, MemoryCredentialStore};
pub use self::token::{Claims, TokenSigner};
pub use self::utils::forwarded_client_ip;
