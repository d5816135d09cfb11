//! Credential record storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

/// A registered account as read by the auth core.
#[derive(Clone)]
pub struct CredentialRecord {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &"***")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Outcome when creating a new account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(Uuid),
    AlreadyExists,
}

#[derive(Debug, Error)]
#[error("credential store unavailable")]
pub struct StoreError(#[source] pub anyhow::Error);

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn lookup_by_email(&self, email: &str) -> Result<Option<CredentialRecord>, StoreError>;

    async fn create_account(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<CreateOutcome, StoreError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<CredentialRecord>, StoreError>;
}

#[derive(Debug, Default)]
struct Accounts {
    by_id: HashMap<Uuid, CredentialRecord>,
    by_email: HashMap<String, Uuid>,
}

/// In-process store, used for tests and local runs without Postgres.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    accounts: Mutex<Accounts>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn lookup_by_email(&self, email: &str) -> Result<Option<CredentialRecord>, StoreError> {
        let accounts = self.accounts.lock().await;
        Ok(accounts
            .by_email
            .get(email)
            .and_then(|id| accounts.by_id.get(id))
            .cloned())
    }

    async fn create_account(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<CreateOutcome, StoreError> {
        let mut accounts = self.accounts.lock().await;
        if accounts.by_email.contains_key(email) {
            return Ok(CreateOutcome::AlreadyExists);
        }

        let id = Uuid::new_v4();
        accounts.by_email.insert(email.to_string(), id);
        accounts.by_id.insert(
            id,
            CredentialRecord {
                id,
                email: email.to_string(),
                password_hash: password_hash.to_string(),
                created_at: Utc::now(),
            },
        );
        Ok(CreateOutcome::Created(id))
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<CredentialRecord>, StoreError> {
        Ok(self.accounts.lock().await.by_id.get(&id).cloned())
    }
}
