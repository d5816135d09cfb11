use super::{invalid_body, Credentials, ErrorBody};
use crate::{
    api::OriginPolicy,
    auth::{forwarded_client_ip, Authenticator},
};
use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tracing::instrument;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub token: String,
}

#[utoipa::path(
    post,
    path = "/api/auth",
    request_body = Credentials,
    responses(
        (status = 200, description = "Credentials accepted", body = TokenResponse),
        (status = 400, description = "Malformed body or origin address", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 429, description = "Rate limit exceeded", body = ErrorBody),
        (status = 500, description = "Internal error", body = ErrorBody),
    ),
    tag = "auth",
)]
#[instrument(skip_all)]
pub async fn login(
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    auth: Extension<Arc<Authenticator>>,
    policy: Extension<OriginPolicy>,
    payload: Option<Json<Credentials>>,
) -> impl IntoResponse {
    let Some(Json(credentials)) = payload else {
        return invalid_body();
    };

    let origin = resolve_origin(*policy, &headers, peer.map(|ConnectInfo(addr)| addr));

    match auth
        .authenticate(&credentials.email, &credentials.password, &origin)
        .await
    {
        Ok(token) => (StatusCode::OK, Json(TokenResponse { token })).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Pick the origin address for a login attempt. An empty result is rejected downstream.
fn resolve_origin(policy: OriginPolicy, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = match policy {
        OriginPolicy::ForwardedHeaders => forwarded_client_ip(headers),
        OriginPolicy::Peer => None,
    };
    forwarded
        .or_else(|| peer.map(|addr| addr.ip().to_canonical().to_string()))
        .unwrap_or_default()
}
