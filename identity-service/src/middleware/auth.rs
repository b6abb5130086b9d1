//! Bearer-token authorization.
//!
//! The token is first decoded without verification only to learn which
//! tenant issued it, then verified against that tenant's key and algorithm.
//! On success an [`AuthContext`] is attached to the request.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::models::{Application, Permissions, Subject, Tenant, User, ADMIN_PERMISSION};
use crate::services::claims::{decode_unverified, Claims, MfaClaims, TokenClaims, TokenType};
use crate::services::store::{SubjectStore, TenantDirectory};
use crate::services::{jwt, SubjectType};
use crate::AppState;

/// Verified caller of a protected endpoint.
#[derive(Debug, Clone)]
pub struct AuthContext<C = Claims> {
    pub tenant: Tenant,
    pub application: Application,
    pub claims: C,
    pub subject: Subject,
    pub permissions: Permissions,
}

impl<C: TokenClaims> AuthContext<C> {
    /// True when every scope in `required` was granted.
    pub fn has_scope(&self, required: &[&str]) -> bool {
        required
            .iter()
            .all(|scope| self.claims.base().has_scope(scope))
    }

    pub fn is_user(&self) -> bool {
        matches!(self.subject, Subject::User(_))
    }

    pub fn is_service_account(&self) -> bool {
        matches!(self.subject, Subject::ServiceAccount(_))
    }

    pub fn has_permission(&self, resource: &str, action: &str) -> bool {
        self.permissions.has(resource, action)
    }

    /// Holds the reserved `admin` permission, or belongs to the admin application.
    pub fn is_admin(&self) -> bool {
        self.permissions.is_admin() || self.application.is_admin
    }

    pub fn require_user(&self) -> Result<&User, AppError> {
        self.subject
            .as_user()
            .ok_or_else(|| AppError::Forbidden(anyhow::anyhow!("user subject required")))
    }

    pub fn require_scope(&self, required: &[&str]) -> Result<(), AppError> {
        if self.has_scope(required) {
            Ok(())
        } else {
            Err(AppError::Forbidden(anyhow::anyhow!(
                "scope {} required",
                required.join(" ")
            )))
        }
    }

    pub fn require_permission(&self, resource: &str, action: &str) -> Result<(), AppError> {
        if self.is_admin() || self.has_permission(resource, action) {
            Ok(())
        } else {
            Err(AppError::Forbidden(anyhow::anyhow!(
                "{} on {} not permitted",
                action,
                resource
            )))
        }
    }
}

fn unauthorized(message: &str) -> AppError {
    AppError::Unauthorized(anyhow::anyhow!(message.to_string()))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            value
                .strip_prefix("Bearer ")
                .or_else(|| value.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolve and verify the bearer token in `headers`, expecting `expected`
/// as its token type.
#[tracing::instrument(skip(state, headers))]
pub async fn authorize<C: TokenClaims>(
    state: &AppState,
    headers: &HeaderMap,
    expected: TokenType,
) -> Result<AuthContext<C>, AppError> {
    let token = bearer_token(headers).ok_or_else(|| unauthorized("missing bearer token"))?;

    let peek = decode_unverified(token).map_err(|e| {
        tracing::debug!(error = %e, "Malformed bearer token");
        unauthorized("invalid token")
    })?;
    if peek.token_type() != expected {
        tracing::debug!(found = %peek.token_type(), "Unexpected token type");
        return Err(unauthorized("invalid token"));
    }

    let tenant = state
        .store
        .find_tenant_by_client_id(peek.client_id())
        .await?
        .ok_or_else(|| unauthorized("invalid token"))?;

    let claims: C = jwt::validate(token, &tenant)?;
    let base = claims.base();

    let application = state
        .store
        .find_application_by_id(tenant.application_id)
        .await?
        .ok_or_else(|| {
            tracing::error!(tenant_id = tenant.id, "Tenant references a missing application");
            AppError::InternalError(anyhow::anyhow!("application not found for tenant"))
        })?;

    let subject = match base.sub_type {
        SubjectType::User => state
            .store
            .find_user_by_id(application.id, base.sub)
            .await?
            .map(Subject::User),
        SubjectType::ServiceAccount => state
            .store
            .find_service_account_by_id(application.id, base.sub)
            .await?
            .map(Subject::ServiceAccount),
    }
    .ok_or_else(|| unauthorized("invalid token"))?;

    let permissions = state.permissions.resolve(&subject).await?;

    Ok(AuthContext {
        tenant,
        application,
        claims,
        subject,
        permissions,
    })
}

/// Requires a `bearer` access token.
pub async fn authorized_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ctx = authorize::<Claims>(&state, req.headers(), TokenType::Bearer).await?;
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

/// Requires a pending-MFA token held by a user.
pub async fn mfa_authorized_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ctx = authorize::<MfaClaims>(&state, req.headers(), TokenType::Mfa).await?;
    ctx.require_user()?;
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

#[async_trait]
impl<S, C> FromRequestParts<S> for AuthContext<C>
where
    S: Send + Sync,
    C: Clone + Send + Sync + 'static,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext<C>>()
            .cloned()
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!("Authorization context missing from request"))
            })
    }
}
