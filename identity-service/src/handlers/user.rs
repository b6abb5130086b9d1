use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::{CurrentUserResponse, TotpEnrollmentResponse, UserInfoResponse},
    middleware::AuthContext,
    services::{claims::OpenIdProfile, store::SubjectStore, OPENID_SCOPE},
    AppState,
};

/// The authenticated subject with its scope and permissions
#[utoipa::path(
    get,
    path = "/user",
    responses(
        (status = 200, description = "Current subject", body = CurrentUserResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn current_user(auth: AuthContext) -> Result<impl IntoResponse, AppError> {
    Ok(Json(CurrentUserResponse::new(
        &auth.subject,
        &auth.claims.scope,
        &auth.permissions,
    )))
}

/// OpenID claims of the authenticated user
#[utoipa::path(
    get,
    path = "/userinfo",
    responses(
        (status = 200, description = "OpenID user info", body = UserInfoResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Not a user or openid scope missing", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
#[tracing::instrument(skip(state, auth), fields(subject_id = auth.subject.id()))]
pub async fn user_info(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let user = auth.require_user()?;
    auth.require_scope(&[OPENID_SCOPE])?;

    let profile = state.store.find_user_profile(user.id).await?;

    Ok(Json(UserInfoResponse {
        sub: user.id,
        profile: OpenIdProfile::from(&profile),
    }))
}

/// Enroll a new TOTP factor, replacing any existing one
#[utoipa::path(
    post,
    path = "/user/totp",
    responses(
        (status = 201, description = "TOTP factor enrolled", body = TotpEnrollmentResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "User subject required", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn enroll_totp(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let user = auth.require_user()?;
    let enrollment = state
        .mfa
        .enroll_totp(&auth.tenant, &auth.application, user)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(TotpEnrollmentResponse {
            secret: enrollment.secret,
            url: enrollment.url,
        }),
    ))
}

/// Disable MFA for the authenticated user
#[utoipa::path(
    delete,
    path = "/user/totp",
    responses(
        (status = 204, description = "MFA disabled"),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "No MFA record", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn disable_mfa(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let user = auth.require_user()?;
    state.mfa.disable(user).await?;
    Ok(StatusCode::NO_CONTENT)
}
