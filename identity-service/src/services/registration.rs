//! Self-service sign-up with a username and password.

use std::sync::Arc;

use super::claims::OPENID_SCOPE;
use super::store::SubjectStore;
use super::{IdentityStore, ServiceError, TokenGrant, TokenResponse, TokenService};
use crate::models::{Subject, TenantContext};
use crate::utils::{hash_password, Password};

/// Grant recorded on tokens issued at sign-up.
pub const REGISTRATION_GRANT: &str = "password";

#[derive(Clone)]
pub struct RegistrationService {
    store: Arc<dyn IdentityStore>,
    tokens: TokenService,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn IdentityStore>, tokens: TokenService) -> Self {
        Self { store, tokens }
    }

    /// Create a user in the tenant's application and sign them in with an
    /// `openid` token set. New users have no second factor, so no step-up.
    #[tracing::instrument(skip_all, fields(tenant_id = ctx.tenant.id))]
    pub async fn register(
        &self,
        ctx: &TenantContext,
        username: &str,
        password: &str,
        password_confirmation: &str,
    ) -> Result<TokenResponse, ServiceError> {
        let application = &ctx.application;
        if !application.signup_enabled || !application.signup_password_enabled {
            return Err(ServiceError::Forbidden("signup disabled".to_string()));
        }

        let username = username.trim();
        let password = password.trim();
        if username.is_empty() {
            return Err(ServiceError::Validation("username is required".to_string()));
        }
        if password.is_empty() {
            return Err(ServiceError::Validation("password is required".to_string()));
        }
        if password != password_confirmation.trim() {
            return Err(ServiceError::Validation(
                "password confirmation does not match".to_string(),
            ));
        }

        let hash = hash_password(&Password::new(password.to_string()))?;
        let user = self
            .store
            .create_user(application.id, username, hash.as_str())
            .await?;
        tracing::info!(user_id = user.id, "User registered");

        let subject = Subject::User(user);
        self.tokens
            .issue(TokenGrant {
                subject: &subject,
                tenant: &ctx.tenant,
                application,
                scope: OPENID_SCOPE,
                issued_token_type: REGISTRATION_GRANT,
                step_up: None,
            })
            .await
    }
}
