//! Passkey registration and login ceremonies. Ceremony state lives in the
//! challenge broker between "begin" and "finish".

use std::sync::Arc;
use std::time::Duration;
use url::Url;
use uuid::Uuid;
use webauthn_rs::prelude::{
    CreationChallengeResponse, PasskeyAuthentication, PasskeyRegistration, PublicKeyCredential,
    RegisterPublicKeyCredential, RequestChallengeResponse, Webauthn, WebauthnBuilder,
};

use super::store::PasskeyStore;
use super::{ChallengeSessionBroker, IdentityStore, ServiceError};
use crate::models::{StoredPasskey, Tenant, User};

/// Server-side state of an in-flight ceremony.
#[derive(Clone)]
pub enum CeremonyState {
    Registration(PasskeyRegistration),
    Authentication(PasskeyAuthentication),
}

#[derive(Clone)]
pub struct PasskeyService {
    store: Arc<dyn IdentityStore>,
    sessions: ChallengeSessionBroker<CeremonyState>,
    ttl: Duration,
}

impl PasskeyService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        sessions: ChallengeSessionBroker<CeremonyState>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            sessions,
            ttl,
        }
    }

    pub fn sessions(&self) -> &ChallengeSessionBroker<CeremonyState> {
        &self.sessions
    }

    #[tracing::instrument(skip(self, tenant, user), fields(user_id = user.id, tenant_id = tenant.id))]
    pub async fn begin_registration(
        &self,
        tenant: &Tenant,
        user: &User,
    ) -> Result<CreationChallengeResponse, ServiceError> {
        let webauthn = relying_party(tenant)?;
        let existing = self
            .store
            .list_passkeys(user.id)
            .await?
            .into_iter()
            .map(|stored| stored.passkey.cred_id().clone())
            .collect::<Vec<_>>();

        let (challenge, state) = webauthn.start_passkey_registration(
            user_handle(user),
            &user.username,
            &user.username,
            (!existing.is_empty()).then_some(existing),
        )?;

        self.sessions
            .put(user.id, CeremonyState::Registration(state), self.ttl);
        Ok(challenge)
    }

    /// Finish a registration with the raw credential body. The session is
    /// consumed before the body is parsed, so a malformed body also ends it.
    #[tracing::instrument(skip(self, tenant, user, body), fields(user_id = user.id, tenant_id = tenant.id))]
    pub async fn finish_registration(
        &self,
        tenant: &Tenant,
        user: &User,
        body: &[u8],
    ) -> Result<(), ServiceError> {
        let CeremonyState::Registration(state) = self.take_session(user.id)? else {
            return Err(ServiceError::NotFound("session"));
        };
        let credential: RegisterPublicKeyCredential = parse_credential(body)?;

        let webauthn = relying_party(tenant)?;
        let passkey = webauthn.finish_passkey_registration(&credential, &state)?;
        self.store
            .save_passkey(&StoredPasskey::new(user.id, user.application_id, passkey))
            .await?;

        tracing::info!("Passkey registered");
        Ok(())
    }

    #[tracing::instrument(skip(self, tenant, user), fields(user_id = user.id, tenant_id = tenant.id))]
    pub async fn begin_login(
        &self,
        tenant: &Tenant,
        user: &User,
    ) -> Result<RequestChallengeResponse, ServiceError> {
        let passkeys = self
            .store
            .list_passkeys(user.id)
            .await?
            .into_iter()
            .map(|stored| stored.passkey)
            .collect::<Vec<_>>();
        if passkeys.is_empty() {
            return Err(ServiceError::Validation("no passkeys registered".to_string()));
        }

        let webauthn = relying_party(tenant)?;
        let (challenge, state) = webauthn.start_passkey_authentication(&passkeys)?;

        self.sessions
            .put(user.id, CeremonyState::Authentication(state), self.ttl);
        Ok(challenge)
    }

    /// Finish a login with the raw assertion body. Like registration, the
    /// session is gone whatever the outcome.
    #[tracing::instrument(skip(self, tenant, user, body), fields(user_id = user.id, tenant_id = tenant.id))]
    pub async fn finish_login(
        &self,
        tenant: &Tenant,
        user: &User,
        body: &[u8],
    ) -> Result<(), ServiceError> {
        let CeremonyState::Authentication(state) = self.take_session(user.id)? else {
            return Err(ServiceError::NotFound("session"));
        };
        let credential: PublicKeyCredential = parse_credential(body)?;

        let webauthn = relying_party(tenant)?;
        let result = webauthn.finish_passkey_authentication(&credential, &state)?;

        for mut stored in self.store.list_passkeys(user.id).await? {
            if stored.passkey.update_credential(&result) == Some(true) {
                self.store.save_passkey(&stored).await?;
            }
        }

        tracing::info!(user_verified = result.user_verified(), "Passkey login verified");
        Ok(())
    }

    /// Consume the subject's session. Whatever the ceremony outcome, the
    /// session cannot be used again.
    fn take_session(&self, user_id: i32) -> Result<CeremonyState, ServiceError> {
        self.sessions
            .take(user_id)
            .ok_or(ServiceError::NotFound("session"))
    }
}

fn parse_credential<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ServiceError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "Malformed passkey credential");
        ServiceError::Validation("passkey credential malformed".to_string())
    })
}

/// Stable WebAuthn user handle derived from (application, user).
fn user_handle(user: &User) -> Uuid {
    Uuid::from_u64_pair(user.application_id as u64, user.id as u64)
}

/// Relying party for a tenant: its public URI (or base URI) as origin and
/// that URI's host as the RP id.
fn relying_party(tenant: &Tenant) -> Result<Webauthn, ServiceError> {
    let origin = Url::parse(tenant.public_uri_or_base()).map_err(|e| {
        ServiceError::Internal(anyhow::anyhow!("Invalid tenant URI for passkeys: {}", e))
    })?;
    let rp_id = origin
        .host_str()
        .ok_or_else(|| ServiceError::Internal(anyhow::anyhow!("Tenant URI has no host")))?
        .to_string();

    WebauthnBuilder::new(&rp_id, &origin)
        .and_then(|builder| builder.rp_name(&tenant.description).build())
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("WebAuthn configuration error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::services::MemoryStore;

    fn service() -> PasskeyService {
        PasskeyService::new(
            Arc::new(MemoryStore::new()),
            ChallengeSessionBroker::new(),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_begin_registration_opens_session() {
        let service = service();
        let tenant = fixtures::hmac_tenant("s3cr3t");
        let user = fixtures::user("alice", "hunter2");

        service.begin_registration(&tenant, &user).await.unwrap();

        assert!(matches!(
            service.sessions().get(user.id),
            Some(CeremonyState::Registration(_))
        ));
    }

    #[tokio::test]
    async fn test_session_is_single_use() {
        let service = service();
        let tenant = fixtures::hmac_tenant("s3cr3t");
        let user = fixtures::user("alice", "hunter2");
        service.begin_registration(&tenant, &user).await.unwrap();

        assert!(service.take_session(user.id).is_ok());
        assert!(matches!(
            service.take_session(user.id),
            Err(ServiceError::NotFound("session"))
        ));
    }

    #[tokio::test]
    async fn test_malformed_finish_still_ends_session() {
        let service = service();
        let tenant = fixtures::hmac_tenant("s3cr3t");
        let user = fixtures::user("alice", "hunter2");
        service.begin_registration(&tenant, &user).await.unwrap();

        let first = service.finish_registration(&tenant, &user, b"{}").await;
        let second = service.finish_registration(&tenant, &user, b"{}").await;

        assert!(matches!(first, Err(ServiceError::Validation(_))));
        assert!(matches!(second, Err(ServiceError::NotFound("session"))));
        assert!(service.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_finish_login_consumes_registration_session() {
        let service = service();
        let tenant = fixtures::hmac_tenant("s3cr3t");
        let user = fixtures::user("alice", "hunter2");
        service.begin_registration(&tenant, &user).await.unwrap();

        let result = service.finish_login(&tenant, &user, b"not json").await;

        assert!(matches!(result, Err(ServiceError::NotFound("session"))));
        assert!(service.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_login_requires_registered_passkey() {
        let service = service();
        let tenant = fixtures::hmac_tenant("s3cr3t");
        let user = fixtures::user("alice", "hunter2");

        let result = service.begin_login(&tenant, &user).await;

        assert!(matches!(result, Err(ServiceError::Validation(_))));
        assert!(service.sessions().is_empty());
    }

    #[test]
    fn test_user_handle_is_stable_per_application() {
        let user = fixtures::user("alice", "hunter2");
        let mut other_app = user.clone();
        other_app.application_id += 1;

        assert_eq!(user_handle(&user), user_handle(&user.clone()));
        assert_ne!(user_handle(&user), user_handle(&other_app));
    }

    #[test]
    fn test_relying_party_rejects_bad_uri() {
        let mut tenant = fixtures::hmac_tenant("s3cr3t");
        tenant.uri = "not a uri".to_string();
        tenant.public_uri = None;

        assert!(matches!(
            relying_party(&tenant),
            Err(ServiceError::Internal(_))
        ));
    }
}
