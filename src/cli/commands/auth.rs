use clap::{Arg, ArgAction, Command};

pub const ARG_TOKEN_SECRET: &str = "token-secret";
pub const ARG_ATTEMPT_WINDOW: &str = "attempt-window-seconds";
pub const ARG_LEDGER_TIMEOUT: &str = "ledger-timeout-ms";
pub const ARG_TRUST_PROXY_HEADERS: &str = "trust-proxy-headers";

/// One year. Postgres rejects intervals far past this.
pub const MAX_ATTEMPT_WINDOW_SECONDS: u64 = 31_536_000;

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_SECRET)
                .long(ARG_TOKEN_SECRET)
                .help("HMAC key used to sign and verify identity tokens")
                .env("ODIN_TOKEN_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_ATTEMPT_WINDOW)
                .long(ARG_ATTEMPT_WINDOW)
                .help("Sliding window for login rate limits, in seconds (at most one year)")
                .env("ODIN_ATTEMPT_WINDOW_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_ATTEMPT_WINDOW_SECONDS)),
        )
        .arg(
            Arg::new(ARG_LEDGER_TIMEOUT)
                .long(ARG_LEDGER_TIMEOUT)
                .help("Deadline for attempt ledger and credential store queries, in milliseconds")
                .env("ODIN_LEDGER_TIMEOUT_MS")
                .default_value("2000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_TRUST_PROXY_HEADERS)
                .long(ARG_TRUST_PROXY_HEADERS)
                .help("Take the client address from X-Forwarded-For / X-Real-IP (only behind a trusted proxy)")
                .env("ODIN_TRUST_PROXY_HEADERS")
                .action(ArgAction::SetTrue),
        )
}
