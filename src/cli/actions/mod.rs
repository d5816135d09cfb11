pub mod purge;
pub mod server;

use anyhow::{anyhow, Result};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

#[derive(Debug)]
pub enum Action {
    Server(server::Args),
    PurgeAttempts(purge::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> Result<()> {
        match self {
            Self::Server(args) => server::execute(args).await,
            Self::PurgeAttempts(args) => purge::execute(args).await,
        }
    }
}

/// Inject the database password into the DSN, if one was given separately.
pub(crate) fn dsn_with_password(dsn: &str, password: Option<&SecretString>) -> Result<String> {
    let mut dsn = Url::parse(dsn)?;

    if let Some(password) = password {
        dsn.set_password(Some(password.expose_secret()))
            .map_err(|()| anyhow!("Error setting password"))?;
    }

    Ok(dsn.to_string())
}

/// DSN with any password replaced, for logging.
pub(crate) fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}
