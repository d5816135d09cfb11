use crate::api::handlers::{self, health, login, signup, user};
use axum::response::{IntoResponse, Json};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(health::health, signup::signup, login::login, user::user),
    components(schemas(
        health::Health,
        handlers::Credentials,
        handlers::ErrorBody,
        signup::SignupResponse,
        login::TokenResponse,
        user::UserResponse,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Signup, login and token identity"),
        (name = "health", description = "Service health"),
    )
)]
struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

pub(crate) async fn openapi_json() -> impl IntoResponse {
    Json(openapi())
}
