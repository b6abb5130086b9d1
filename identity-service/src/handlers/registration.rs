use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::RegistrationRequest, models::TenantContext, services::TokenResponse,
    utils::ValidatedJson, AppState,
};

/// Register a new user with a password
///
/// Creates the user in the tenant's application and returns a token set for
/// the `password` grant with the `openid` scope.
#[utoipa::path(
    post,
    path = "/registration",
    request_body = RegistrationRequest,
    responses(
        (status = 201, description = "User created and signed in", body = TokenResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 403, description = "Sign-up disabled for the application", body = ErrorResponse),
        (status = 404, description = "Unknown tenant", body = ErrorResponse),
        (status = 409, description = "Username taken", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("tenent_id" = [])),
    tag = "Registration"
)]
pub async fn register(
    State(state): State<AppState>,
    ctx: TenantContext,
    ValidatedJson(req): ValidatedJson<RegistrationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state
        .registration
        .register(&ctx, &req.username, &req.password, &req.password_confirmation)
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}
