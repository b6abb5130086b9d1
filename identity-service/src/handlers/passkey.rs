//! WebAuthn passkey ceremonies. Each begin/finish pair shares one challenge
//! session keyed by the user id.

use axum::{body::Bytes, extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{middleware::AuthContext, AppState};

#[utoipa::path(
    post,
    path = "/user/passkeys/begin-registration",
    responses(
        (status = 200, description = "WebAuthn creation options", body = Object),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "User subject required", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Passkeys"
)]
pub async fn begin_registration(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let user = auth.require_user()?;
    let challenge = state.passkeys.begin_registration(&auth.tenant, user).await?;
    Ok(Json(challenge))
}

#[utoipa::path(
    post,
    path = "/user/passkeys/finish-registration",
    request_body(content = Object, description = "WebAuthn registration credential"),
    responses(
        (status = 204, description = "Passkey registered"),
        (status = 400, description = "Malformed credential or ceremony rejected", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Passkeys"
)]
pub async fn finish_registration(
    State(state): State<AppState>,
    auth: AuthContext,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let user = auth.require_user()?;
    state
        .passkeys
        .finish_registration(&auth.tenant, user, &body)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/user/passkeys/begin-login",
    responses(
        (status = 200, description = "WebAuthn request options", body = Object),
        (status = 400, description = "No passkeys registered", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Passkeys"
)]
pub async fn begin_login(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let user = auth.require_user()?;
    let challenge = state.passkeys.begin_login(&auth.tenant, user).await?;
    Ok(Json(challenge))
}

#[utoipa::path(
    post,
    path = "/user/passkeys/finish-login",
    request_body(content = Object, description = "WebAuthn assertion"),
    responses(
        (status = 204, description = "Passkey verified"),
        (status = 400, description = "Malformed assertion or ceremony rejected", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Passkeys"
)]
pub async fn finish_login(
    State(state): State<AppState>,
    auth: AuthContext,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let user = auth.require_user()?;
    state
        .passkeys
        .finish_login(&auth.tenant, user, &body)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
