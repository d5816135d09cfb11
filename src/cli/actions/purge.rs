use super::{dsn_with_password, redact_dsn};
use crate::{
    api,
    auth::{postgres::PgAttemptLedger, AttemptLedger},
    cli::telemetry,
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::time::Duration;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub dsn: String,
    pub db_password: Option<SecretString>,
    pub older_than: Duration,
}

/// Delete ledger entries older than `older_than` and report how many went.
/// # Errors
/// Returns an error if the database is unreachable or the delete fails.
pub async fn execute(args: Args) -> Result<()> {
    info!(dsn = %redact_dsn(&args.dsn), older_than_secs = args.older_than.as_secs(), "Purging attempts");

    let result = connect_and_purge(&args).await;

    telemetry::shutdown_tracer();

    result.map(|_| ())
}

async fn connect_and_purge(args: &Args) -> Result<u64> {
    let dsn = dsn_with_password(&args.dsn, args.db_password.as_ref())?;
    let pool = api::connect(&dsn).await?;

    let ledger = PgAttemptLedger::new(pool, args.older_than);
    purge(&ledger, args.older_than).await
}

async fn purge(ledger: &dyn AttemptLedger, older_than: Duration) -> Result<u64> {
    let purged = ledger
        .purge(older_than)
        .await
        .context("Failed to purge login attempts")?;

    info!(purged, "Purged login attempts");

    Ok(purged)
}
