//! Step-up authentication: deciding whether a verified primary credential
//! earns a full token set or a restricted pending-MFA token, and completing
//! the step-up with a one-time code.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;
use totp_rs::{Algorithm, Secret, TOTP};

use super::claims::MfaClaims;
use super::store::MfaStore;
use super::{IdentityStore, ServiceError, TokenGrant, TokenResponse, TokenService};
use crate::models::{Application, MfaKind, Subject, Tenant, User};

const TOTP_DIGITS: usize = 6;
const TOTP_SKEW: u8 = 0;
const TOTP_STEP: u64 = 30;

/// Where a subject stands after its primary credential was verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepUpState {
    /// No enabled factor: issue the full token set.
    NoMfa,
    /// An enabled factor must be presented before a full token set is issued.
    Pending(MfaKind),
}

impl StepUpState {
    pub fn pending_factor(&self) -> Option<&MfaKind> {
        match self {
            StepUpState::NoMfa => None,
            StepUpState::Pending(kind) => Some(kind),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TotpEnrollment {
    /// Base32 shared secret
    pub secret: String,
    /// `otpauth://` provisioning URL
    pub url: String,
}

#[derive(Clone)]
pub struct MfaService {
    store: Arc<dyn IdentityStore>,
    tokens: TokenService,
}

impl MfaService {
    pub fn new(store: Arc<dyn IdentityStore>, tokens: TokenService) -> Self {
        Self { store, tokens }
    }

    pub async fn step_up_state(&self, user: &User) -> Result<StepUpState, ServiceError> {
        let state = match self.store.find_mfa(user.id).await? {
            Some(record) if record.enabled => StepUpState::Pending(record.kind),
            _ => StepUpState::NoMfa,
        };
        Ok(state)
    }

    /// Check `code` against the user's active factor and, on success, issue
    /// the full token set for the grant recorded in the pending token.
    #[tracing::instrument(skip(self, tenant, application, user, claims, code), fields(user_id = user.id, tenant_id = tenant.id))]
    pub async fn validate_step_up(
        &self,
        tenant: &Tenant,
        application: &Application,
        user: &User,
        claims: &MfaClaims,
        code: &str,
    ) -> Result<TokenResponse, ServiceError> {
        let record = self
            .store
            .find_mfa(user.id)
            .await?
            .filter(|record| record.enabled)
            .ok_or(ServiceError::MfaDisabled)?;

        match &record.kind {
            MfaKind::Totp => {
                let factor = self
                    .store
                    .find_totp(user.id, tenant.id)
                    .await?
                    .ok_or(ServiceError::MfaDisabled)?;
                if !code_matches(&factor.secret, code)? {
                    tracing::warn!("MFA code mismatch");
                    return Err(ServiceError::MfaInvalid);
                }
            }
            MfaKind::Unsupported(kind) => {
                tracing::error!(factor = %kind, "Unsupported MFA factor on record");
                return Err(ServiceError::UnsupportedMfaFactor(kind.clone()));
            }
        }

        let scope = claims.claims.scope.join(" ");
        let subject = Subject::User(user.clone());
        self.tokens
            .issue(TokenGrant {
                subject: &subject,
                tenant,
                application,
                scope: &scope,
                issued_token_type: &claims.grant_type,
                step_up: None,
            })
            .await
    }

    /// Generate a fresh TOTP secret for (user, tenant) and make it the
    /// user's active factor, replacing any previous one.
    #[tracing::instrument(skip(self, tenant, application, user), fields(user_id = user.id, tenant_id = tenant.id))]
    pub async fn enroll_totp(
        &self,
        tenant: &Tenant,
        application: &Application,
        user: &User,
    ) -> Result<TotpEnrollment, ServiceError> {
        let bytes = Secret::generate_secret()
            .to_bytes()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("TOTP secret error: {:?}", e)))?;
        let totp = totp(
            bytes,
            Some(application.description.replace(':', " ")),
            user.username.replace(':', " "),
        );
        let secret = totp.get_secret_base32();
        let url = totp.get_url();

        self.store.enroll_totp(user.id, tenant.id, &secret).await?;
        tracing::info!("TOTP factor enrolled");

        Ok(TotpEnrollment { secret, url })
    }

    #[tracing::instrument(skip(self, user), fields(user_id = user.id))]
    pub async fn disable(&self, user: &User) -> Result<(), ServiceError> {
        if !self.store.delete_mfa(user.id).await? {
            return Err(ServiceError::NotFound("mfa"));
        }
        tracing::info!("MFA disabled");
        Ok(())
    }
}

fn totp(secret: Vec<u8>, issuer: Option<String>, account_name: String) -> TOTP {
    TOTP::new_unchecked(
        Algorithm::SHA1,
        TOTP_DIGITS,
        TOTP_SKEW,
        TOTP_STEP,
        secret,
        issuer,
        account_name,
    )
}

fn decode_secret(secret: &str) -> Result<TOTP, ServiceError> {
    let bytes = Secret::Encoded(secret.to_string())
        .to_bytes()
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Invalid TOTP secret: {:?}", e)))?;
    Ok(totp(bytes, None, String::new()))
}

fn unix_time() -> Result<u64, ServiceError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("System clock error: {}", e)))
}

/// Code for the current time step of a base32 secret.
#[cfg(test)]
fn current_code(secret: &str) -> Result<String, ServiceError> {
    Ok(decode_secret(secret)?.generate(unix_time()?))
}

/// Compare `code` with the code of the current time step only, in
/// constant time.
fn code_matches(secret: &str, code: &str) -> Result<bool, ServiceError> {
    let expected = decode_secret(secret)?.generate(unix_time()?);
    Ok(bool::from(expected.as_bytes().ct_eq(code.as_bytes())))
}
