pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(test)]
pub(crate) mod fixtures;

use axum::{
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{from_fn, from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    rate_limit::{ip_rate_limit_middleware, IpRateLimit},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{IdentityConfig, SwaggerMode};
use crate::services::store::TenantDirectory;
use crate::services::{
    ChallengeSessionBroker, GrantService, IdentityStore, MfaService, Notifier, PasskeyService,
    PasswordResetService, PermissionResolver, RegistrationService, SettingsService, TokenService,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::token::token,
        handlers::token::validate_mfa,
        handlers::well_known::openid_configuration,
        handlers::well_known::jwks,
        handlers::user::current_user,
        handlers::user::user_info,
        handlers::user::enroll_totp,
        handlers::user::disable_mfa,
        handlers::passkey::begin_registration,
        handlers::passkey::finish_registration,
        handlers::passkey::begin_login,
        handlers::passkey::finish_login,
        handlers::password_reset::request_password_reset,
        handlers::password_reset::confirm_password_reset,
        handlers::registration::register,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::TokenRequest,
            dtos::ValidateMfaRequest,
            dtos::PasswordResetRequest,
            dtos::PasswordResetConfirm,
            dtos::RegistrationRequest,
            dtos::CurrentUserResponse,
            dtos::UserInfoResponse,
            dtos::TotpEnrollmentResponse,
            dtos::OpenIdConfiguration,
            dtos::Jwk,
            dtos::Jwks,
            services::TokenResponse,
            services::SubjectType,
            services::claims::OpenIdProfile,
            services::claims::OpenIdAddress,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Token", description = "Token issuance and MFA step-up"),
        (name = "User", description = "The authenticated subject"),
        (name = "Passkeys", description = "WebAuthn passkey ceremonies"),
        (name = "Password Reset", description = "Password reset by emailed token"),
        (name = "Registration", description = "Self-service sign-up"),
        (name = "Well-Known", description = "Discovery and signing keys"),
        (name = "Observability", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "tenent_id",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("Tenent-Id"))),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: IdentityConfig,
    pub store: Arc<dyn IdentityStore>,
    pub settings: SettingsService,
    pub tokens: TokenService,
    pub grants: GrantService,
    pub mfa: MfaService,
    pub passkeys: PasskeyService,
    pub password_reset: PasswordResetService,
    pub registration: RegistrationService,
    pub permissions: PermissionResolver,
    pub token_rate_limiter: IpRateLimit,
    pub password_reset_rate_limiter: IpRateLimit,
}

impl AppState {
    /// Wire every service over one store. Password-reset requests share the
    /// token endpoint's limits.
    pub fn new(
        config: IdentityConfig,
        store: Arc<dyn IdentityStore>,
        settings: SettingsService,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let tokens = TokenService::new(Arc::clone(&store), settings.clone());
        let mfa = MfaService::new(Arc::clone(&store), tokens.clone());
        let grants = GrantService::new(Arc::clone(&store), tokens.clone(), mfa.clone());
        let passkeys = PasskeyService::new(
            Arc::clone(&store),
            ChallengeSessionBroker::new(),
            Duration::from_secs(config.challenge_ttl_seconds),
        );
        let password_reset =
            PasswordResetService::new(Arc::clone(&store), tokens.clone(), mfa.clone(), notifier);
        let registration = RegistrationService::new(Arc::clone(&store), tokens.clone());
        let permissions = PermissionResolver::new(Arc::clone(&store));

        let limits = &config.rate_limit;
        let token_rate_limiter = IpRateLimit::new(
            limits.token_attempts,
            limits.token_window_seconds,
            limits.trusted_proxy_hops,
        );
        let password_reset_rate_limiter = IpRateLimit::new(
            limits.token_attempts,
            limits.token_window_seconds,
            limits.trusted_proxy_hops,
        );

        Self {
            config,
            store,
            settings,
            tokens,
            grants,
            mfa,
            passkeys,
            password_reset,
            registration,
            permissions,
            token_rate_limiter,
            password_reset_rate_limiter,
        }
    }
}

/// Hides the API documentation while the `openapi.enabled` setting is off.
async fn openapi_gate(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if state.settings.current().openapi_enabled {
        next.run(req).await
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    // Tenant-scoped routes resolve the Tenent-Id header first. Route layers
    // only run on a matched route, so unknown paths stay 404.
    let token_route = Router::new()
        .route("/token", post(handlers::token::token))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::tenant_middleware,
        ))
        .route_layer(from_fn_with_state(
            state.token_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let reset_request_route = Router::new()
        .route(
            "/password-reset/request",
            post(handlers::password_reset::request_password_reset),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::tenant_middleware,
        ))
        .route_layer(from_fn_with_state(
            state.password_reset_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let tenant_routes = Router::new()
        .route("/registration", post(handlers::registration::register))
        .route(
            "/password-reset/confirm",
            post(handlers::password_reset::confirm_password_reset),
        )
        .route(
            "/.well-known/openid-configuration",
            get(handlers::well_known::openid_configuration),
        )
        .route("/.well-known/jwks.json", get(handlers::well_known::jwks))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::tenant_middleware,
        ));

    let bearer_routes = Router::new()
        .route("/user", get(handlers::user::current_user))
        .route("/userinfo", get(handlers::user::user_info))
        .route(
            "/user/totp",
            post(handlers::user::enroll_totp).delete(handlers::user::disable_mfa),
        )
        .route(
            "/user/passkeys/begin-registration",
            post(handlers::passkey::begin_registration),
        )
        .route(
            "/user/passkeys/finish-registration",
            post(handlers::passkey::finish_registration),
        )
        .route(
            "/user/passkeys/begin-login",
            post(handlers::passkey::begin_login),
        )
        .route(
            "/user/passkeys/finish-login",
            post(handlers::passkey::finish_login),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::authorized_middleware,
        ));

    let mfa_routes = Router::new()
        .route("/mfa", post(handlers::token::validate_mfa))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::mfa_authorized_middleware,
        ));

    let docs: Router<AppState> = match state.config.swagger.enabled {
        SwaggerMode::Public => {
            Router::from(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()))
        }
        SwaggerMode::Disabled => Router::new().route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        ),
    };
    let docs = docs.route_layer(from_fn_with_state(state.clone(), openapi_gate));

    let cors = cors_layer(&state.config.security.allowed_origins)?;

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(docs)
        .merge(token_route)
        .merge(reset_request_route)
        .merge(tenant_routes)
        .merge(bearer_routes)
        .merge(mfa_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");

            tracing::info_span!(
                "http_request",
                request_id = %request_id,
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version(),
            )
        }))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors);

    Ok(app)
}

fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer, AppError> {
    let origins = allowed_origins
        .iter()
        .map(|origin| {
            origin.parse::<HeaderValue>().map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Invalid CORS origin '{}': {}", origin, e))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(middleware::TENANT_ID_HEADER),
            HeaderName::from_static("x-request-id"),
        ]))
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 500, description = "Service is unhealthy")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        AppError::from(e)
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "database": "up"
        }
    })))
}
