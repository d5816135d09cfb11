use super::{bearer_token, ErrorBody};
use crate::auth::{AuthError, Authenticator};
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[utoipa::path(
    get,
    path = "/api/user",
    responses(
        (status = 200, description = "Account behind the bearer token", body = UserResponse),
        (status = 401, description = "Missing, invalid, or expired token", body = ErrorBody),
        (status = 500, description = "Internal error", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth",
)]
#[instrument(skip_all)]
pub async fn user(headers: HeaderMap, auth: Extension<Arc<Authenticator>>) -> impl IntoResponse {
    let Some(token) = bearer_token(&headers) else {
        return AuthError::Unauthorized.into_response();
    };

    match auth.current_user(token).await {
        Ok(record) => (
            StatusCode::OK,
            Json(UserResponse {
                id: record.id,
                email: record.email,
                created_at: record.created_at,
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
