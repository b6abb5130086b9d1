use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::{PasswordResetConfirm, PasswordResetRequest},
    models::TenantContext,
    services::TokenResponse,
    utils::ValidatedJson,
    AppState,
};

/// Request a password reset token
///
/// Always answers 204 so callers cannot learn which emails are registered.
#[utoipa::path(
    post,
    path = "/password-reset/request",
    request_body = PasswordResetRequest,
    responses(
        (status = 204, description = "Request received"),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("tenent_id" = [])),
    tag = "Password Reset"
)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    ctx: TenantContext,
    ValidatedJson(req): ValidatedJson<PasswordResetRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .password_reset
        .request_reset(&ctx, req.email.trim())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, tenant_id = ctx.tenant.id, "Failed to process password reset request");
            e
        })?;

    Ok(StatusCode::NO_CONTENT)
}

/// Set a new password with a reset token
#[utoipa::path(
    post,
    path = "/password-reset/confirm",
    request_body = PasswordResetConfirm,
    responses(
        (status = 200, description = "Password reset, token set issued", body = TokenResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Invalid or expired token", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("tenent_id" = [])),
    tag = "Password Reset"
)]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    ctx: TenantContext,
    ValidatedJson(req): ValidatedJson<PasswordResetConfirm>,
) -> Result<impl IntoResponse, AppError> {
    let response = state
        .password_reset
        .confirm_reset(&ctx, &req.token, &req.password, &req.password_confirmation)
        .await?;

    Ok(Json(response))
}
