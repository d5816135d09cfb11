//! HS256 identity tokens (compact JWS, base64url segments).
//!
//! Tokens are stateless: validity is signature + issuer + expiry, nothing else.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const TOKEN_ISSUER: &str = "odin";
pub const TOKEN_TTL: Duration = Duration::from_secs(15 * 60);

const ALG_HS256: &str = "HS256";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: ALG_HS256.to_string(),
            typ: "JWT".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid signing key")]
    Key,
    #[error("failed to encode token")]
    Encode(#[from] serde_json::Error),
}

/// The single rejection outcome of [`TokenSigner::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid token")]
pub struct InvalidToken;

fn b64e_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Option<T> {
    let bytes = Base64UrlUnpadded::decode_vec(s).ok()?;
    serde_json::from_slice(&bytes).ok()
}

pub struct TokenSigner {
    key: SecretString,
}

impl TokenSigner {
    #[must_use]
    pub fn new(key: SecretString) -> Self {
        Self { key }
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(self.key.expose_secret().as_bytes()).map_err(|_| TokenError::Key)
    }

    /// Issue a token for `subject` expiring [`TOKEN_TTL`] from now.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be encoded or the key is unusable.
    pub fn issue(&self, subject: &str) -> Result<String, TokenError> {
        self.issue_at(subject, chrono::Utc::now().timestamp())
    }

    pub(crate) fn issue_at(&self, subject: &str, now_unix_seconds: i64) -> Result<String, TokenError> {
        let ttl = i64::try_from(TOKEN_TTL.as_secs()).unwrap_or(i64::MAX);
        self.sign(&Claims {
            sub: subject.to_string(),
            iss: TOKEN_ISSUER.to_string(),
            exp: now_unix_seconds.saturating_add(ttl),
            iat: now_unix_seconds,
        })
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        let header_b64 = b64e_json(&TokenHeader::hs256())?;
        let claims_b64 = b64e_json(claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature_b64 = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Validate a token and return its claims.
    ///
    /// # Errors
    /// Returns [`InvalidToken`] for any malformed, forged, expired, or mis-issued token.
    pub fn validate(&self, token: &str) -> Result<Claims, InvalidToken> {
        self.validate_at(token, chrono::Utc::now().timestamp())
    }

    pub(crate) fn validate_at(&self, token: &str, now_unix_seconds: i64) -> Result<Claims, InvalidToken> {
        self.decode(token, now_unix_seconds).ok_or(InvalidToken)
    }

    fn decode(&self, token: &str, now_unix_seconds: i64) -> Option<Claims> {
        let mut parts = token.split('.');
        let header_b64 = parts.next()?;
        let claims_b64 = parts.next()?;
        let signature_b64 = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != ALG_HS256 {
            return None;
        }

        let signature = Base64UrlUnpadded::decode_vec(signature_b64).ok()?;
        let mut mac = self.mac().ok()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&signature).ok()?;

        let claims: Claims = b64d_json(claims_b64)?;
        if claims.iss != TOKEN_ISSUER || claims.exp <= now_unix_seconds {
            return None;
        }

        Some(claims)
    }
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").field("key", &"***").finish()
    }
}
