//! Shared token-set construction used by every grant and by MFA step-up.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use super::claims::{Claims, MfaClaims, OpenIdClaims, OPENID_SCOPE};
use super::store::SubjectStore;
use super::{jwt, IdentityStore, ServiceError, SettingsService};
use crate::models::{Application, MfaKind, Subject, Tenant};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    /// `bearer`, or `mfa:<factor>` for a pending step-up token
    pub token_type: String,
    /// Grant that produced this token set
    pub issued_token_type: String,
    pub expires_in: i64,
    pub scope: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_expires_in: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

/// Inputs for one token issuance.
pub struct TokenGrant<'a> {
    pub subject: &'a Subject,
    pub tenant: &'a Tenant,
    pub application: &'a Application,
    pub scope: &'a str,
    pub issued_token_type: &'a str,
    /// Pending factor; when set only a restricted MFA token is issued.
    pub step_up: Option<&'a MfaKind>,
}

#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn IdentityStore>,
    settings: SettingsService,
}

impl TokenService {
    pub fn new(store: Arc<dyn IdentityStore>, settings: SettingsService) -> Self {
        Self { store, settings }
    }

    pub fn issuer(&self) -> String {
        self.settings.current().url.clone()
    }

    #[tracing::instrument(
        skip(self, grant),
        fields(
            subject_id = grant.subject.id(),
            tenant_id = grant.tenant.id,
            issued_token_type = %grant.issued_token_type,
        )
    )]
    pub async fn issue(&self, grant: TokenGrant<'_>) -> Result<TokenResponse, ServiceError> {
        let claims = Claims::build(
            grant.subject,
            grant.tenant,
            grant.application,
            grant.scope,
            &self.issuer(),
            Utc::now(),
        );

        if let Some(kind) = grant.step_up {
            let mfa_claims = MfaClaims::new(claims, grant.issued_token_type);
            let access_token = jwt::sign(&mfa_claims, grant.tenant)?;
            tracing::info!(factor = %kind, "Issued pending MFA token");
            return Ok(TokenResponse {
                access_token,
                token_type: format!("mfa:{}", kind),
                issued_token_type: grant.issued_token_type.to_string(),
                expires_in: grant.tenant.expires_in_seconds,
                scope: mfa_claims.claims.scope,
                refresh_token: None,
                refresh_token_expires_in: None,
                id_token: None,
            });
        }

        let id_claims = if claims.has_scope(OPENID_SCOPE) {
            let user = grant.subject.as_user().ok_or(ServiceError::InvalidScope)?;
            let profile = self.store.find_user_profile(user.id).await?;
            Some(OpenIdClaims::build(&claims, &profile).map_err(|_| ServiceError::InvalidScope)?)
        } else {
            None
        };

        let access_token = jwt::sign(&claims, grant.tenant)?;
        let refresh_token = jwt::sign(&claims.to_refresh(grant.tenant), grant.tenant)?;
        let id_token = id_claims
            .map(|id_claims| jwt::sign(&id_claims, grant.tenant))
            .transpose()?;

        tracing::info!(openid = id_token.is_some(), "Issued token set");

        Ok(TokenResponse {
            access_token,
            token_type: claims.token_type.to_string(),
            issued_token_type: grant.issued_token_type.to_string(),
            expires_in: grant.tenant.expires_in_seconds,
            scope: claims.scope,
            refresh_token: Some(refresh_token),
            refresh_token_expires_in: Some(grant.tenant.refresh_expires_in_seconds),
            id_token,
        })
    }
}
