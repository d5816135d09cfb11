use super::{invalid_body, Credentials, ErrorBody};
use crate::auth::Authenticator;
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupResponse {
    pub status: String,
}

#[utoipa::path(
    post,
    path = "/api/signup",
    request_body = Credentials,
    responses(
        (status = 200, description = "Account created", body = SignupResponse),
        (status = 400, description = "Missing or malformed email or password", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody),
        (status = 500, description = "Internal error", body = ErrorBody),
    ),
    tag = "auth",
)]
#[instrument(skip_all)]
pub async fn signup(
    auth: Extension<Arc<Authenticator>>,
    payload: Option<Json<Credentials>>,
) -> impl IntoResponse {
    let Some(Json(credentials)) = payload else {
        return invalid_body();
    };

    match auth.signup(&credentials.email, &credentials.password).await {
        Ok(_) => (
            StatusCode::OK,
            Json(SignupResponse {
                status: "ok".to_string(),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
