use super::{dsn_with_password, redact_dsn};
use crate::{
    api::{self, OriginPolicy, ServerConfig},
    cli::telemetry,
};
use anyhow::Result;
use secrecy::SecretString;
use std::time::Duration;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub db_password: Option<SecretString>,
    pub token_secret: SecretString,
    pub attempt_window: Duration,
    pub ledger_timeout: Duration,
    pub origin_policy: OriginPolicy,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let dsn = dsn_with_password(&args.dsn, args.db_password.as_ref())?;

    let config = ServerConfig::new(args.token_secret)
        .with_attempt_window(args.attempt_window)
        .with_ledger_timeout(args.ledger_timeout)
        .with_origin_policy(args.origin_policy);

    let result = api::new(args.port, dsn, config).await;

    telemetry::shutdown_tracer();

    result
}

fn log_startup_args(args: &Args) {
    info!(
        port = args.port,
        dsn = %redact_dsn(&args.dsn),
        attempt_window_secs = args.attempt_window.as_secs(),
        ledger_timeout_ms = u64::try_from(args.ledger_timeout.as_millis()).unwrap_or(u64::MAX),
        origin_policy = ?args.origin_policy,
        "Starting {} {} ({})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        crate::GIT_COMMIT_HASH
    );
}
