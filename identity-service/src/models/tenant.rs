//! Tenant model: one signing configuration for a client surface of an application.

use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

use super::Application;

/// Tenant entity. Key material is never serialized and is redacted from `Debug`.
#[derive(Clone, FromRow)]
pub struct Tenant {
    pub id: i32,
    pub application_id: i32,
    pub description: String,
    pub uri: String,
    pub public_uri: Option<String>,
    pub client_id: Uuid,
    pub client_secret: String,
    pub algorithm: String,
    pub public_key: Option<String>,
    pub private_key: String,
    pub expires_in_seconds: i64,
    pub refresh_expires_in_seconds: i64,
    pub reset_expires_in_seconds: i64,
}

impl Tenant {
    /// URI presented to browsers; falls back to the base URI.
    pub fn public_uri_or_base(&self) -> &str {
        self.public_uri.as_deref().unwrap_or(&self.uri)
    }
}

impl fmt::Debug for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tenant")
            .field("id", &self.id)
            .field("application_id", &self.application_id)
            .field("uri", &self.uri)
            .field("client_id", &self.client_id)
            .field("algorithm", &self.algorithm)
            .field("has_public_key", &self.public_key.is_some())
            .finish_non_exhaustive()
    }
}

/// Tenant and owning application resolved from the `Tenent-Id` header.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant: Tenant,
    pub application: Application,
}
