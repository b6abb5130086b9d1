use axum::{extract::State, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::{TokenRequest, ValidateMfaRequest},
    middleware::AuthContext,
    models::TenantContext,
    services::{MfaClaims, TokenResponse},
    utils::ValidatedJson,
    AppState,
};

/// Exchange credentials for a token set
#[utoipa::path(
    post,
    path = "/token",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Token set issued", body = TokenResponse),
        (status = 400, description = "Invalid grant type, scope or body", body = ErrorResponse),
        (status = 401, description = "Invalid credentials or token", body = ErrorResponse),
        (status = 404, description = "Unknown tenant", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("tenent_id" = [])),
    tag = "Token"
)]
#[tracing::instrument(skip(state, ctx, req), fields(tenant_id = ctx.tenant.id))]
pub async fn token(
    State(state): State<AppState>,
    ctx: TenantContext,
    ValidatedJson(req): ValidatedJson<TokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.grants.handle_token_request(&ctx, req).await?;
    Ok(Json(response))
}

/// Complete an MFA step-up with a one-time code
#[utoipa::path(
    post,
    path = "/mfa",
    request_body = ValidateMfaRequest,
    responses(
        (status = 200, description = "Token set issued", body = TokenResponse),
        (status = 401, description = "Missing or invalid MFA token", body = ErrorResponse),
        (status = 403, description = "MFA disabled or code invalid", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Token"
)]
#[tracing::instrument(skip(state, auth, req), fields(subject_id = auth.subject.id()))]
pub async fn validate_mfa(
    State(state): State<AppState>,
    auth: AuthContext<MfaClaims>,
    ValidatedJson(req): ValidatedJson<ValidateMfaRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = auth.require_user()?;
    let response = state
        .mfa
        .validate_step_up(
            &auth.tenant,
            &auth.application,
            user,
            &auth.claims,
            req.code.trim(),
        )
        .await?;
    Ok(Json(response))
}
