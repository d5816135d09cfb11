//! Postgres-backed credential store and attempt ledger.
//!
//! Both share one `PgPool`; every query runs inside a `db.query` span.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{types::ipnetwork::IpNetwork, PgPool, Row};
use std::net::IpAddr;
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

use super::ledger::{AttemptCounts, AttemptLedger, LedgerError};
use super::store::{CreateOutcome, CredentialRecord, CredentialStore, StoreError};

pub const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/db/sql/schema.sql"));

/// Apply the idempotent schema.
///
/// # Errors
/// Returns an error if any statement fails.
pub async fn apply_schema(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .await
        .context("failed to apply database schema")?;
    Ok(())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn window_seconds(window: Duration) -> i64 {
    i64::try_from(window.as_secs()).unwrap_or(i64::MAX)
}

fn query_span(operation: &'static str, statement: &'static str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

#[derive(Clone, Debug)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn credential_from_row(row: &sqlx::postgres::PgRow) -> CredentialRecord {
    CredentialRecord {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn lookup_by_email(&self, email: &str) -> Result<Option<CredentialRecord>, StoreError> {
        let query = "SELECT id, email, password_hash, created_at FROM users WHERE email = $1";
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup user by email")
            .map_err(StoreError)?;

        Ok(row.as_ref().map(credential_from_row))
    }

    async fn create_account(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<CreateOutcome, StoreError> {
        let query = "INSERT INTO users (email, password_hash) VALUES ($1, $2) RETURNING id";
        let row = sqlx::query(query)
            .bind(email)
            .bind(password_hash)
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT", query))
            .await;

        match row {
            Ok(row) => Ok(CreateOutcome::Created(row.get("id"))),
            Err(err) if is_unique_violation(&err) => Ok(CreateOutcome::AlreadyExists),
            Err(err) => Err(StoreError(
                anyhow::Error::new(err).context("failed to insert user"),
            )),
        }
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<CredentialRecord>, StoreError> {
        let query = "SELECT id, email, password_hash, created_at FROM users WHERE id = $1";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to get user by id")
            .map_err(StoreError)?;

        Ok(row.as_ref().map(credential_from_row))
    }
}

/// Ledger over the `auth_attempts` table. Shared by every server instance on the database.
#[derive(Clone, Debug)]
pub struct PgAttemptLedger {
    pool: PgPool,
    window: Duration,
}

impl PgAttemptLedger {
    #[must_use]
    pub fn new(pool: PgPool, window: Duration) -> Self {
        Self { pool, window }
    }
}

#[async_trait]
impl AttemptLedger for PgAttemptLedger {
    async fn counts(&self, email: &str, origin: IpAddr) -> Result<AttemptCounts, LedgerError> {
        let query = r"
            SELECT
                COUNT(*) AS global_count,
                COUNT(*) FILTER (WHERE remote_ip = $1) AS origin_count,
                COUNT(*) FILTER (WHERE email = $2) AS email_count
            FROM auth_attempts
            WHERE created_at > NOW() - ($3 * INTERVAL '1 second')
        ";
        let row = sqlx::query(query)
            .bind(IpNetwork::from(origin))
            .bind(email)
            .bind(window_seconds(self.window))
            .fetch_one(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to count auth attempts")
            .map_err(LedgerError::Storage)?;

        Ok(AttemptCounts {
            global: row.get("global_count"),
            origin: row.get("origin_count"),
            email: row.get("email_count"),
        })
    }

    async fn append(&self, email: &str, origin: IpAddr) -> Result<(), LedgerError> {
        let query = "INSERT INTO auth_attempts (email, remote_ip) VALUES ($1, $2)";
        sqlx::query(query)
            .bind(email)
            .bind(IpNetwork::from(origin))
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to log auth attempt")
            .map_err(LedgerError::Storage)?;
        Ok(())
    }

    async fn purge(&self, older_than: Duration) -> Result<u64, LedgerError> {
        let query =
            "DELETE FROM auth_attempts WHERE created_at <= NOW() - ($1 * INTERVAL '1 second')";
        let result = sqlx::query(query)
            .bind(window_seconds(older_than))
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to purge auth attempts")
            .map_err(LedgerError::Storage)?;
        Ok(result.rows_affected())
    }
}
