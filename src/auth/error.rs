//! Outcomes surfaced by the auth core.
//!
//! Every failure collapses into one of five caller-visible variants. Causes of
//! `Unauthorized` are never carried in the value, so a wrong password, an
//! unknown account, and a forged token are indistinguishable to the caller.

use std::fmt;
use thiserror::Error;
use tracing::error;

/// Which rate-limit threshold rejected an attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Denial {
    Global,
    Origin,
    Account,
}

impl Denial {
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Global => "global limit exceeded",
            Self::Origin => "origin limit exceeded",
            Self::Account => "account limit exceeded",
        }
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed or missing input, including a malformed origin address.
    #[error("bad request: {0}")]
    BadRequest(&'static str),
    /// An account with the submitted email already exists.
    #[error("account already exists")]
    Conflict,
    #[error("unauthorized")]
    Unauthorized,
    #[error("rate limited: {0}")]
    RateLimited(Denial),
    /// Storage, random source, signing, or task failure. Detail stays server side.
    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl AuthError {
    /// Log an infrastructure failure with full context and wrap it as opaque.
    pub(crate) fn internal<E>(err: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        let err = err.into();
        error!("{err:#}");
        Self::Internal(err)
    }
}
