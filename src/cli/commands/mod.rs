pub mod auth;
pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const CMD_PURGE_ATTEMPTS: &str = "purge-attempts";
pub const ARG_OLDER_THAN: &str = "older-than-seconds";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("odin")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("ODIN_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .env("ODIN_DSN")
                .required(true),
        )
        .arg(
            Arg::new("db-password")
                .long("db-password")
                .help("Database password, injected into the DSN")
                .env("ODIN_DB_PASSWORD")
                .hide_env_values(true),
        )
        .subcommand(
            Command::new(CMD_PURGE_ATTEMPTS)
                .about("Delete login attempts older than the given age and exit")
                .arg(
                    Arg::new(ARG_OLDER_THAN)
                        .long(ARG_OLDER_THAN)
                        .help("Minimum age of the attempts to delete, in seconds")
                        .default_value("86400")
                        .value_parser(
                            clap::value_parser!(u64).range(..=auth::MAX_ATTEMPT_WINDOW_SECONDS),
                        ),
                ),
        );

    let command = auth::with_args(command);
    logging::with_args(command)
}
