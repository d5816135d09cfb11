use crate::auth::{
    postgres::{apply_schema, PgAttemptLedger, PgCredentialStore},
    Authenticator, RateLimitConfig, RateLimiter, TokenSigner,
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
    Extension, Router,
};
use secrecy::SecretString;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;

pub mod handlers;
mod openapi;

pub use self::openapi::openapi;

use self::handlers::{health, login, signup, user};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Where the origin address of a login attempt comes from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OriginPolicy {
    /// The TCP peer address.
    #[default]
    Peer,
    /// `X-Forwarded-For` (first hop) or `X-Real-IP`, falling back to the peer.
    /// Only safe behind a reverse proxy that overwrites these headers.
    ForwardedHeaders,
}

#[derive(Debug)]
pub struct ServerConfig {
    token_secret: SecretString,
    attempt_window: Duration,
    ledger_timeout: Duration,
    origin_policy: OriginPolicy,
}

impl ServerConfig {
    #[must_use]
    pub fn new(token_secret: SecretString) -> Self {
        Self {
            token_secret,
            attempt_window: crate::auth::ledger::DEFAULT_ATTEMPT_WINDOW,
            ledger_timeout: crate::auth::rate_limit::DEFAULT_LEDGER_TIMEOUT,
            origin_policy: OriginPolicy::Peer,
        }
    }

    #[must_use]
    pub fn with_attempt_window(mut self, window: Duration) -> Self {
        self.attempt_window = window;
        self
    }

    #[must_use]
    pub fn with_ledger_timeout(mut self, timeout: Duration) -> Self {
        self.ledger_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_origin_policy(mut self, policy: OriginPolicy) -> Self {
        self.origin_policy = policy;
        self
    }

    #[must_use]
    pub fn attempt_window(&self) -> Duration {
        self.attempt_window
    }

    #[must_use]
    pub fn ledger_timeout(&self) -> Duration {
        self.ledger_timeout
    }

    #[must_use]
    pub fn origin_policy(&self) -> OriginPolicy {
        self.origin_policy
    }
}

/// Connect to Postgres and make sure the schema exists.
///
/// # Errors
/// Returns an error if the database is unreachable or the schema cannot be applied.
pub async fn connect(dsn: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .max_lifetime(Duration::from_secs(60 * 30))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;

    apply_schema(&pool).await?;

    Ok(pool)
}

/// Build the HTTP router around an [`Authenticator`].
///
/// `pool` is only used by the health check; without it the check reports no database.
pub fn router(
    authenticator: Arc<Authenticator>,
    origin_policy: OriginPolicy,
    pool: Option<PgPool>,
) -> Router {
    let router = Router::new()
        .route("/api/health", get(health::health).options(health::health))
        .route("/api/signup", post(signup::signup))
        .route("/api/auth", post(login::login))
        .route("/api/user", get(user::user))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static(REQUEST_ID_HEADER),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID_HEADER,
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(authenticator))
                .layer(Extension(origin_policy)),
        );

    match pool {
        Some(pool) => router.layer(Extension(pool)),
        None => router,
    }
}

/// Start the server
/// # Errors
/// Returns an error if the database is unavailable or the listener fails
pub async fn new(port: u16, dsn: String, config: ServerConfig) -> Result<()> {
    let pool = connect(&dsn).await?;

    let store = Arc::new(PgCredentialStore::new(pool.clone()));
    let ledger = Arc::new(PgAttemptLedger::new(pool.clone(), config.attempt_window));
    let limiter = RateLimiter::new(
        ledger,
        RateLimitConfig::new().with_ledger_timeout(config.ledger_timeout),
    );
    let signer = TokenSigner::new(config.token_secret);
    let authenticator = Arc::new(
        Authenticator::new(store, limiter, signer)
            .context("Failed to initialize authenticator")?
            .with_store_timeout(config.ledger_timeout),
    );

    let app = router(authenticator, config.origin_policy, Some(pool));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

// Headers are left out of the span: requests carry bearer tokens.
fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.path = request.uri().path(),
        request_id
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("Failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
