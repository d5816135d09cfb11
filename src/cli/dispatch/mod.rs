use crate::api::OriginPolicy;
use crate::cli::{
    actions::{purge, server, Action},
    commands::{auth, ARG_OLDER_THAN, CMD_PURGE_ATTEMPTS},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::time::Duration;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;
    let db_password = matches
        .get_one::<String>("db-password")
        .cloned()
        .map(SecretString::from);
    let attempt_window = Duration::from_secs(
        matches
            .get_one::<u64>(auth::ARG_ATTEMPT_WINDOW)
            .copied()
            .unwrap_or(86_400),
    );

    if let Some(sub_m) = matches.subcommand_matches(CMD_PURGE_ATTEMPTS) {
        let older_than = sub_m
            .get_one::<u64>(ARG_OLDER_THAN)
            .copied()
            .map_or(attempt_window, Duration::from_secs);

        return Ok(Action::PurgeAttempts(purge::Args {
            dsn,
            db_password,
            older_than,
        }));
    }

    let token_secret = matches
        .get_one::<String>(auth::ARG_TOKEN_SECRET)
        .filter(|secret| !secret.trim().is_empty())
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --token-secret")?;

    let ledger_timeout = Duration::from_millis(
        matches
            .get_one::<u64>(auth::ARG_LEDGER_TIMEOUT)
            .copied()
            .unwrap_or(2000),
    );

    let origin_policy = if matches.get_flag(auth::ARG_TRUST_PROXY_HEADERS) {
        OriginPolicy::ForwardedHeaders
    } else {
        OriginPolicy::Peer
    };

    Ok(Action::Server(server::Args {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn,
        db_password,
        token_secret,
        attempt_window,
        ledger_timeout,
        origin_policy,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    const DSN: &str = "postgres://odin@localhost:5432/odin";

    fn dispatch(args: &[&str]) -> Result<Action> {
        let matches = commands::new().try_get_matches_from(args.iter().copied())?;
        handler(&matches)
    }

    #[test]
    fn server_action() -> Result<()> {
        let action = temp_env::with_vars_unset(["ODIN_TRUST_PROXY_HEADERS"], || {
            dispatch(&[
                "odin",
                "--dsn",
                DSN,
                "--token-secret",
                "key",
                "--ledger-timeout-ms",
                "500",
            ])
        })?;

        let Action::Server(args) = action else {
            anyhow::bail!("expected server action");
        };
        assert_eq!(args.port, 8080);
        assert_eq!(args.dsn, DSN);
        assert!(args.db_password.is_none());
        assert_eq!(args.token_secret.expose_secret(), "key");
        assert_eq!(args.ledger_timeout, Duration::from_millis(500));
        assert_eq!(args.origin_policy, OriginPolicy::Peer);
        Ok(())
    }

    #[test]
    fn server_requires_token_secret() {
        let result = temp_env::with_vars_unset(["ODIN_TOKEN_SECRET"], || {
            dispatch(&["odin", "--dsn", DSN])
        });
        let message = result.err().map(|e| e.to_string());
        assert_eq!(
            message.as_deref(),
            Some("missing required argument: --token-secret")
        );
    }

    #[test]
    fn blank_token_secret_is_rejected() {
        let result = dispatch(&["odin", "--dsn", DSN, "--token-secret", "  "]);
        assert!(result.is_err());
    }

    #[test]
    fn trust_proxy_headers_selects_forwarded_policy() -> Result<()> {
        let action = dispatch(&[
            "odin",
            "--dsn",
            DSN,
            "--token-secret",
            "key",
            "--trust-proxy-headers",
        ])?;
        let Action::Server(args) = action else {
            anyhow::bail!("expected server action");
        };
        assert_eq!(args.origin_policy, OriginPolicy::ForwardedHeaders);
        Ok(())
    }

    #[test]
    fn purge_action_does_not_need_token_secret() -> Result<()> {
        let action = temp_env::with_vars_unset(["ODIN_TOKEN_SECRET"], || {
            dispatch(&[
                "odin",
                "--dsn",
                DSN,
                "--db-password",
                "pw",
                CMD_PURGE_ATTEMPTS,
                "--older-than-seconds",
                "60",
            ])
        })?;

        let Action::PurgeAttempts(args) = action else {
            anyhow::bail!("expected purge action");
        };
        assert_eq!(args.older_than, Duration::from_secs(60));
        assert_eq!(
            args.db_password.as_ref().map(|secret| secret.expose_secret()),
            Some("pw")
        );
        Ok(())
    }
}
