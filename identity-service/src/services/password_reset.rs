//! Password reset via short-lived `password-reset` tokens.

use chrono::Utc;
use std::sync::Arc;

use super::claims::{PasswordResetClaims, SubjectType, OPENID_SCOPE};
use super::store::SubjectStore;
use super::{
    jwt, IdentityStore, MfaService, Notifier, PasswordResetMessage, ServiceError, TokenGrant,
    TokenResponse, TokenService,
};
use crate::models::{Subject, TenantContext};
use crate::utils::{hash_password, Password};

pub const PASSWORD_RESET_GRANT: &str = "password-reset";

#[derive(Clone)]
pub struct PasswordResetService {
    store: Arc<dyn IdentityStore>,
    tokens: TokenService,
    mfa: MfaService,
    notifier: Arc<dyn Notifier>,
}

impl PasswordResetService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        tokens: TokenService,
        mfa: MfaService,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            tokens,
            mfa,
            notifier,
        }
    }

    /// Issue a reset token to the user owning `email`, if any. Succeeds
    /// whether or not such a user exists.
    #[tracing::instrument(skip(self, ctx, email), fields(tenant_id = ctx.tenant.id))]
    pub async fn request_reset(&self, ctx: &TenantContext, email: &str) -> Result<(), ServiceError> {
        let Some(user) = self
            .store
            .find_user_by_email(ctx.application.id, email.trim())
            .await?
        else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(());
        };

        let user_id = user.id;
        let claims = PasswordResetClaims::new(
            &Subject::User(user),
            &ctx.tenant,
            &ctx.application,
            &self.tokens.issuer(),
            Utc::now(),
        );
        let token = jwt::sign(&claims, &ctx.tenant)?;

        let message = PasswordResetMessage {
            user_id,
            email: email.trim().to_string(),
            token,
            base_url: ctx.tenant.public_uri_or_base().to_string(),
        };
        if let Err(e) = self.notifier.send_password_reset(message).await {
            tracing::error!(error = %e, user_id, "Failed to deliver password reset");
        }
        Ok(())
    }

    /// Set a new password using a reset token and sign the user in. Each
    /// token works once, and a user with an enabled second factor only gets
    /// the pending MFA token.
    #[tracing::instrument(skip_all, fields(tenant_id = ctx.tenant.id))]
    pub async fn confirm_reset(
        &self,
        ctx: &TenantContext,
        token: &str,
        password: &str,
        password_confirmation: &str,
    ) -> Result<TokenResponse, ServiceError> {
        if password != password_confirmation {
            return Err(ServiceError::Validation(
                "password confirmation does not match".to_string(),
            ));
        }

        let reset: PasswordResetClaims = jwt::validate(token, &ctx.tenant)?;
        if reset.claims.sub_type != SubjectType::User {
            return Err(ServiceError::InvalidToken(
                "password reset token must name a user".to_string(),
            ));
        }

        let user = self
            .store
            .find_user_by_id(ctx.application.id, reset.claims.sub)
            .await?
            .ok_or_else(|| ServiceError::InvalidToken("user no longer exists".to_string()))?;

        if !self
            .store
            .redeem_password_reset(reset.jti, user.id, reset.expires_at())
            .await?
        {
            tracing::warn!(user_id = user.id, "Password reset token reused");
            return Err(ServiceError::InvalidToken(
                "password reset token already used".to_string(),
            ));
        }

        let hash = hash_password(&Password::new(password.to_string()))?;
        self.store
            .update_user_password(user.id, hash.as_str())
            .await?;
        tracing::info!(user_id = user.id, "Password reset completed");

        let state = self.mfa.step_up_state(&user).await?;
        let subject = Subject::User(user);
        self.tokens
            .issue(TokenGrant {
                subject: &subject,
                tenant: &ctx.tenant,
                application: &ctx.application,
                scope: OPENID_SCOPE,
                issued_token_type: PASSWORD_RESET_GRANT,
                step_up: state.pending_factor(),
            })
            .await
    }
}
