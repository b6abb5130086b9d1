//! `POST /token` grant dispatch: password, service-account key/secret and
//! refresh-token exchanges.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use super::claims::{Claims, SubjectType, TokenType};
use super::store::SubjectStore;
use super::{
    jwt, CredentialKind, IdentityStore, MfaService, ServiceError, TokenGrant, TokenResponse,
    TokenService,
};
use crate::dtos::TokenRequest;
use crate::models::{Subject, TenantContext};
use crate::utils::{verify_password, Password};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    Password,
    ServiceAccount,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::Password => "password",
            GrantType::ServiceAccount => "service-account",
            GrantType::RefreshToken => "refresh-token",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantType {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password" => Ok(GrantType::Password),
            "service-account" => Ok(GrantType::ServiceAccount),
            "refresh-token" => Ok(GrantType::RefreshToken),
            _ => Err(ServiceError::InvalidGrantType),
        }
    }
}

#[derive(Clone)]
pub struct GrantService {
    store: Arc<dyn IdentityStore>,
    tokens: TokenService,
    mfa: MfaService,
}

impl GrantService {
    pub fn new(store: Arc<dyn IdentityStore>, tokens: TokenService, mfa: MfaService) -> Self {
        Self { store, tokens, mfa }
    }

    #[tracing::instrument(
        skip(self, ctx, request),
        fields(tenant_id = ctx.tenant.id, grant_type = %request.grant_type)
    )]
    pub async fn handle_token_request(
        &self,
        ctx: &TenantContext,
        request: TokenRequest,
    ) -> Result<TokenResponse, ServiceError> {
        let grant_type: GrantType = request.grant_type.parse()?;
        match grant_type {
            GrantType::Password => self.password_grant(ctx, &request).await,
            GrantType::ServiceAccount => self.service_account_grant(ctx, &request).await,
            GrantType::RefreshToken => self.refresh_token_grant(ctx, &request).await,
        }
    }

    async fn password_grant(
        &self,
        ctx: &TenantContext,
        request: &TokenRequest,
    ) -> Result<TokenResponse, ServiceError> {
        let invalid = ServiceError::InvalidCredentials(CredentialKind::Password);
        let login = request.username.as_deref().unwrap_or_default().trim();
        let password = request.password.as_deref().unwrap_or_default().trim();

        let Some(user) = self
            .store
            .find_user_by_username_or_email(ctx.application.id, login)
            .await?
        else {
            tracing::warn!("Password grant for unknown user");
            return Err(invalid);
        };

        if !check_secret(password, &user.encrypted_password) {
            tracing::warn!(user_id = user.id, "Password grant with wrong password");
            return Err(invalid);
        }

        let state = self.mfa.step_up_state(&user).await?;
        let subject = Subject::User(user);
        self.tokens
            .issue(TokenGrant {
                subject: &subject,
                tenant: &ctx.tenant,
                application: &ctx.application,
                scope: request.scope.as_deref().unwrap_or_default(),
                issued_token_type: GrantType::Password.as_str(),
                step_up: state.pending_factor(),
            })
            .await
    }

    async fn service_account_grant(
        &self,
        ctx: &TenantContext,
        request: &TokenRequest,
    ) -> Result<TokenResponse, ServiceError> {
        let invalid = ServiceError::InvalidCredentials(CredentialKind::ServiceAccount);
        let Ok(key) = Uuid::parse_str(request.key.as_deref().unwrap_or_default().trim()) else {
            tracing::warn!("Service account grant with malformed key");
            return Err(invalid);
        };
        let secret = request.secret.as_deref().unwrap_or_default().trim();

        let Some(account) = self
            .store
            .find_service_account_by_key(ctx.application.id, key)
            .await?
        else {
            tracing::warn!(key = %key, "Service account grant for unknown key");
            return Err(invalid);
        };

        if !check_secret(secret, &account.encrypted_secret) {
            tracing::warn!(service_account_id = account.id, "Service account grant with wrong secret");
            return Err(invalid);
        }

        let subject = Subject::ServiceAccount(account);
        self.tokens
            .issue(TokenGrant {
                subject: &subject,
                tenant: &ctx.tenant,
                application: &ctx.application,
                scope: request.scope.as_deref().unwrap_or_default(),
                issued_token_type: GrantType::ServiceAccount.as_str(),
                step_up: None,
            })
            .await
    }

    async fn refresh_token_grant(
        &self,
        ctx: &TenantContext,
        request: &TokenRequest,
    ) -> Result<TokenResponse, ServiceError> {
        let token = request.refresh_token.as_deref().unwrap_or_default().trim();
        let claims: Claims = jwt::validate(token, &ctx.tenant)?;
        claims
            .expect_type(TokenType::Refresh)
            .map_err(|e| ServiceError::InvalidToken(e.to_string()))?;

        let subject = match claims.sub_type {
            SubjectType::User => self
                .store
                .find_user_by_id(ctx.application.id, claims.sub)
                .await?
                .map(Subject::User),
            SubjectType::ServiceAccount => self
                .store
                .find_service_account_by_id(ctx.application.id, claims.sub)
                .await?
                .map(Subject::ServiceAccount),
        }
        .ok_or_else(|| ServiceError::InvalidToken("refresh token subject no longer exists".to_string()))?;

        let scope = match request.scope.as_deref() {
            Some(scope) if !scope.trim().is_empty() => scope.to_string(),
            _ => claims.scope.join(" "),
        };

        self.tokens
            .issue(TokenGrant {
                subject: &subject,
                tenant: &ctx.tenant,
                application: &ctx.application,
                scope: &scope,
                issued_token_type: GrantType::RefreshToken.as_str(),
                step_up: None,
            })
            .await
    }
}

/// Verify a presented secret against a stored argon2 hash. Malformed hashes
/// count as a mismatch.
fn check_secret(presented: &str, hash: &str) -> bool {
    match verify_password(&Password::new(presented.to_string()), hash) {
        Ok(matched) => matched,
        Err(e) => {
            tracing::error!(error = %e, "Stored credential hash is unreadable");
            false
        }
    }
}
