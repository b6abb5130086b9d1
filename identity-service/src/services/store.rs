//! Persistence seams. `Database` backs them with Postgres, `MemoryStore`
//! keeps everything in process for tests and local runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::ServiceError;
use crate::models::{
    Application, MfaRecord, PermissionRow, ServiceAccount, StoredPasskey, Tenant, TotpFactor,
    User, UserProfile,
};

#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Reachability of the backing store.
    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn find_tenant_by_client_id(&self, client_id: Uuid)
        -> Result<Option<Tenant>, ServiceError>;

    async fn find_tenant_by_id(&self, tenant_id: i32) -> Result<Option<Tenant>, ServiceError>;

    async fn find_application_by_id(
        &self,
        application_id: i32,
    ) -> Result<Option<Application>, ServiceError>;
}

#[async_trait]
pub trait SubjectStore: Send + Sync {
    /// Match `login` against the username or any email of users in the application.
    async fn find_user_by_username_or_email(
        &self,
        application_id: i32,
        login: &str,
    ) -> Result<Option<User>, ServiceError>;

    async fn find_user_by_email(
        &self,
        application_id: i32,
        email: &str,
    ) -> Result<Option<User>, ServiceError>;

    async fn find_user_by_id(
        &self,
        application_id: i32,
        user_id: i32,
    ) -> Result<Option<User>, ServiceError>;

    async fn find_user_profile(&self, user_id: i32) -> Result<UserProfile, ServiceError>;

    async fn update_user_password(
        &self,
        user_id: i32,
        encrypted_password: &str,
    ) -> Result<(), ServiceError>;

    /// Fails with `Conflict("username")` when the application already has
    /// a user by that name.
    async fn create_user(
        &self,
        application_id: i32,
        username: &str,
        encrypted_password: &str,
    ) -> Result<User, ServiceError>;

    /// Record a password-reset token id as spent. Returns false when it
    /// was already redeemed.
    async fn redeem_password_reset(
        &self,
        jti: Uuid,
        user_id: i32,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, ServiceError>;

    async fn find_service_account_by_key(
        &self,
        application_id: i32,
        key: Uuid,
    ) -> Result<Option<ServiceAccount>, ServiceError>;

    async fn find_service_account_by_id(
        &self,
        application_id: i32,
        service_account_id: i32,
    ) -> Result<Option<ServiceAccount>, ServiceError>;
}

#[async_trait]
pub trait MfaStore: Send + Sync {
    async fn find_mfa(&self, user_id: i32) -> Result<Option<MfaRecord>, ServiceError>;

    async fn find_totp(
        &self,
        user_id: i32,
        tenant_id: i32,
    ) -> Result<Option<TotpFactor>, ServiceError>;

    /// Store a TOTP secret for (user, tenant) and make it the user's active factor.
    async fn enroll_totp(
        &self,
        user_id: i32,
        tenant_id: i32,
        secret: &str,
    ) -> Result<(TotpFactor, MfaRecord), ServiceError>;

    /// Returns false when the user had no MFA record.
    async fn delete_mfa(&self, user_id: i32) -> Result<bool, ServiceError>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn user_permission_rows(
        &self,
        application_id: i32,
        user_id: i32,
    ) -> Result<Vec<PermissionRow>, ServiceError>;

    async fn service_account_permission_rows(
        &self,
        application_id: i32,
        service_account_id: i32,
    ) -> Result<Vec<PermissionRow>, ServiceError>;
}

#[async_trait]
pub trait PasskeyStore: Send + Sync {
    async fn list_passkeys(&self, user_id: i32) -> Result<Vec<StoredPasskey>, ServiceError>;

    /// Insert or replace by credential id.
    async fn save_passkey(&self, passkey: &StoredPasskey) -> Result<(), ServiceError>;
}

/// Everything the identity engine reads or writes.
pub trait IdentityStore:
    TenantDirectory + SubjectStore + MfaStore + PermissionStore + PasskeyStore
{
}

impl<T> IdentityStore for T where
    T: TenantDirectory + SubjectStore + MfaStore + PermissionStore + PasskeyStore
{
}
