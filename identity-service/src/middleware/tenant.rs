//! Resolves the `Tenent-Id` header of unauthenticated tenant-scoped
//! endpoints into a [`TenantContext`].

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::TenantContext;
use crate::services::store::TenantDirectory;
use crate::AppState;

/// Header carrying the tenant's client id. The spelling is part of the
/// public API.
pub const TENANT_ID_HEADER: &str = "tenent-id";

pub async fn tenant_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client_id = req
        .headers()
        .get(TENANT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Tenent-Id header missing or invalid")))?;

    let tenant = state
        .store
        .find_tenant_by_client_id(client_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("tenant not found")))?;

    let application = state
        .store
        .find_application_by_id(tenant.application_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("application not found")))?;

    req.extensions_mut().insert(TenantContext {
        tenant,
        application,
    });

    Ok(next.run(req).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantContext>()
            .cloned()
            .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("Tenant context not found")))
    }
}
