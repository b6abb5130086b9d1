use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{Jwks, OpenIdConfiguration},
    models::TenantContext,
    services::{jwt, SubjectType, OPENID_SCOPE},
    AppState,
};

const CLAIMS_SUPPORTED: &[&str] = &[
    "sub",
    "sub_type",
    "type",
    "client_id",
    "aud",
    "nbf",
    "iat",
    "iss",
    "exp",
    "scope",
    "email",
    "email_verified",
    "phone_number",
    "phone_number_verified",
    "name",
    "given_name",
    "family_name",
    "middle_name",
    "nickname",
    "profile",
    "picture",
    "website",
    "gender",
    "birthdate",
    "zoneinfo",
    "locale",
    "address",
];

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// OpenID discovery document for the tenant
#[utoipa::path(
    get,
    path = "/.well-known/openid-configuration",
    responses(
        (status = 200, description = "Discovery document", body = OpenIdConfiguration),
        (status = 400, description = "Missing or invalid Tenent-Id", body = ErrorResponse),
        (status = 404, description = "Unknown tenant", body = ErrorResponse)
    ),
    security(("tenent_id" = [])),
    tag = "Well-Known"
)]
pub async fn openid_configuration(
    State(state): State<AppState>,
    ctx: TenantContext,
) -> Result<impl IntoResponse, AppError> {
    let url = state.settings.current().url.clone();

    let mut grant_types_supported = vec!["refresh_token".to_string()];
    if ctx.application.signup_enabled && ctx.application.signup_password_enabled {
        grant_types_supported.push("password".to_string());
    }

    Ok(Json(OpenIdConfiguration {
        jwks_uri: format!("{}/.well-known/jwks.json", url),
        token_endpoint: format!("{}/token", url),
        userinfo_endpoint: format!("{}/userinfo", url),
        registration_endpoint: ctx
            .application
            .signup_enabled
            .then(|| format!("{}/registration", url)),
        scopes_supported: strings(&[OPENID_SCOPE]),
        grant_types_supported,
        response_types_supported: strings(&["id_token", "access_token", "refresh_token"]),
        subject_types_supported: strings(&[
            SubjectType::User.as_str(),
            SubjectType::ServiceAccount.as_str(),
        ]),
        id_token_signing_alg_values_supported: vec![ctx.tenant.algorithm.clone()],
        token_endpoint_auth_methods_supported: strings(&["client_secret_post"]),
        claims_supported: strings(CLAIMS_SUPPORTED),
        code_challenge_methods_supported: strings(&["plain", "S256"]),
        issuer: url,
    }))
}

/// Get JSON Web Key Set (JWKS)
#[utoipa::path(
    get,
    path = "/.well-known/jwks.json",
    responses(
        (status = 200, description = "Public JWKS returned", body = Jwks),
        (status = 404, description = "Unknown tenant", body = ErrorResponse)
    ),
    security(("tenent_id" = [])),
    tag = "Well-Known"
)]
pub async fn jwks(ctx: TenantContext) -> Result<impl IntoResponse, AppError> {
    let keys = jwt::public_jwk(&ctx.tenant)?.into_iter().collect();
    Ok((
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        Json(Jwks { keys }),
    ))
}
