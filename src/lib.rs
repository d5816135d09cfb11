//! # Odin
//!
//! Credential verification service with abuse-resistant login.
//!
//! Accounts are stored with Argon2id digests. A successful login returns a
//! short-lived HS256 token whose subject is the account id. Every login attempt
//! that passes the rate limiter is written to an attempt ledger, and the limiter
//! reads that ledger over a sliding window along three dimensions:
//!
//! - **global**: all attempts
//! - **origin**: attempts from the same client address
//! - **account**: attempts for the same (normalized) email
//!
//! The ledger and the account store are Postgres tables in production. In-memory
//! implementations of both exist for tests and single-process runs.

pub mod api;
pub mod auth;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
