//! Password digests: `hex(salt || argon2id(password, salt))`.
//!
//! Parameters are fixed (t=1, m=64 MiB, p=4, 32-byte key) and not read from the
//! stored digest, so a stored value can never select weaker parameters.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::{rngs::OsRng, RngCore};
use subtle::ConstantTimeEq;
use thiserror::Error;

const SALT_LEN: usize = 32;
const KEY_LEN: usize = 32;
const DIGEST_LEN: usize = SALT_LEN + KEY_LEN;

const TIME_COST: u32 = 1;
const MEMORY_COST_KIB: u32 = 64 * 1024;
const PARALLELISM: u32 = 4;

// Salt used when a digest cannot be decoded, so the failure path still pays for one derivation.
const DUMMY_SALT: [u8; SALT_LEN] = [0x5a; SALT_LEN];

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("failed to read from the OS random source")]
    Random(#[source] rand::Error),
    #[error("key derivation failed: {0}")]
    Derive(argon2::Error),
}

fn derive_key(password: &[u8], salt: &[u8]) -> Result<[u8; KEY_LEN], PasswordError> {
    let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, Some(KEY_LEN))
        .map_err(PasswordError::Derive)?;
    let mut key = [0u8; KEY_LEN];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(password, salt, &mut key)
        .map_err(PasswordError::Derive)?;
    Ok(key)
}

/// Hash a password with a fresh 32-byte salt.
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let mut salt = [0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(PasswordError::Random)?;

    let key = derive_key(password.as_bytes(), &salt)?;

    let mut combined = Vec::with_capacity(DIGEST_LEN);
    combined.extend_from_slice(&salt);
    combined.extend_from_slice(&key);
    Ok(hex::encode(combined))
}

/// Check a password against a stored digest.
///
/// Malformed digests (bad hex, wrong length) return `false` after running one
/// derivation, never an error.
#[must_use]
pub fn verify_password(digest: &str, password: &str) -> bool {
    let decoded = hex::decode(digest)
        .ok()
        .filter(|bytes| bytes.len() == DIGEST_LEN);

    let (salt, stored_key, well_formed) = match decoded.as_deref() {
        Some(bytes) => {
            let (salt, key) = bytes.split_at(SALT_LEN);
            (salt.to_vec(), key.to_vec(), true)
        }
        None => (DUMMY_SALT.to_vec(), vec![0u8; KEY_LEN], false),
    };

    let Ok(candidate) = derive_key(password.as_bytes(), &salt) else {
        return false;
    };

    let matches: bool = candidate.as_slice().ct_eq(stored_key.as_slice()).into();
    matches && well_formed
}

/// Digest of a random password, used to equalize work for unknown accounts.
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn dummy_digest() -> Result<String, PasswordError> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(PasswordError::Random)?;
    hash_password(&hex::encode(bytes))
}
