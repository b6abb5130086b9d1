use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use super::store::{MfaStore, PasskeyStore, PermissionStore, SubjectStore, TenantDirectory};
use super::ServiceError;
use crate::models::{
    Application, MfaKind, MfaRecord, PermissionRow, ServiceAccount, StoredPasskey, Tenant,
    TotpFactor, User, UserProfile,
};

#[derive(Default)]
struct MemoryData {
    next_id: i32,
    applications: Vec<Application>,
    tenants: Vec<Tenant>,
    users: Vec<User>,
    profiles: HashMap<i32, UserProfile>,
    service_accounts: Vec<ServiceAccount>,
    mfa: HashMap<i32, MfaRecord>,
    totps: Vec<TotpFactor>,
    user_permissions: Vec<(i32, i32, PermissionRow)>,
    service_account_permissions: Vec<(i32, i32, PermissionRow)>,
    passkeys: Vec<StoredPasskey>,
    redeemed_resets: HashSet<Uuid>,
}

impl MemoryData {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process identity store used by tests and local runs.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<MemoryData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryData> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryData> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate an id unique across every entity in this store.
    pub fn next_id(&self) -> i32 {
        self.write().next_id()
    }

    pub fn insert_application(&self, application: Application) {
        self.write().applications.push(application);
    }

    pub fn insert_tenant(&self, tenant: Tenant) {
        self.write().tenants.push(tenant);
    }

    pub fn insert_user(&self, user: User, profile: UserProfile) {
        let mut data = self.write();
        data.profiles.insert(user.id, profile);
        data.users.push(user);
    }

    pub fn insert_service_account(&self, service_account: ServiceAccount) {
        self.write().service_accounts.push(service_account);
    }

    pub fn insert_mfa(&self, record: MfaRecord) {
        self.write().mfa.insert(record.user_id, record);
    }

    pub fn grant_user_permission(&self, application_id: i32, user_id: i32, row: PermissionRow) {
        self.write()
            .user_permissions
            .push((application_id, user_id, row));
    }

    pub fn grant_service_account_permission(
        &self,
        application_id: i32,
        service_account_id: i32,
        row: PermissionRow,
    ) {
        self.write()
            .service_account_permissions
            .push((application_id, service_account_id, row));
    }

    pub fn user(&self, user_id: i32) -> Option<User> {
        self.read().users.iter().find(|u| u.id == user_id).cloned()
    }
}

#[async_trait]
impl TenantDirectory for MemoryStore {
    async fn find_tenant_by_client_id(
        &self,
        client_id: Uuid,
    ) -> Result<Option<Tenant>, ServiceError> {
        Ok(self
            .read()
            .tenants
            .iter()
            .find(|t| t.client_id == client_id)
            .cloned())
    }

    async fn find_tenant_by_id(&self, tenant_id: i32) -> Result<Option<Tenant>, ServiceError> {
        Ok(self.read().tenants.iter().find(|t| t.id == tenant_id).cloned())
    }

    async fn find_application_by_id(
        &self,
        application_id: i32,
    ) -> Result<Option<Application>, ServiceError> {
        Ok(self
            .read()
            .applications
            .iter()
            .find(|a| a.id == application_id)
            .cloned())
    }
}

#[async_trait]
impl SubjectStore for MemoryStore {
    async fn find_user_by_username_or_email(
        &self,
        application_id: i32,
        login: &str,
    ) -> Result<Option<User>, ServiceError> {
        let data = self.read();
        Ok(data
            .users
            .iter()
            .filter(|u| u.application_id == application_id)
            .find(|u| {
                u.username == login
                    || data
                        .profiles
                        .get(&u.id)
                        .and_then(|p| p.email.as_deref())
                        .is_some_and(|email| email == login)
            })
            .cloned())
    }

    async fn find_user_by_email(
        &self,
        application_id: i32,
        email: &str,
    ) -> Result<Option<User>, ServiceError> {
        let data = self.read();
        Ok(data
            .users
            .iter()
            .filter(|u| u.application_id == application_id)
            .find(|u| {
                data.profiles
                    .get(&u.id)
                    .and_then(|p| p.email.as_deref())
                    .is_some_and(|e| e == email)
            })
            .cloned())
    }

    async fn find_user_by_id(
        &self,
        application_id: i32,
        user_id: i32,
    ) -> Result<Option<User>, ServiceError> {
        Ok(self
            .read()
            .users
            .iter()
            .find(|u| u.application_id == application_id && u.id == user_id)
            .cloned())
    }

    async fn find_user_profile(&self, user_id: i32) -> Result<UserProfile, ServiceError> {
        Ok(self
            .read()
            .profiles
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_user_password(
        &self,
        user_id: i32,
        encrypted_password: &str,
    ) -> Result<(), ServiceError> {
        let mut data = self.write();
        let user = data
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(ServiceError::NotFound("user"))?;
        user.encrypted_password = encrypted_password.to_string();
        Ok(())
    }

    async fn create_user(
        &self,
        application_id: i32,
        username: &str,
        encrypted_password: &str,
    ) -> Result<User, ServiceError> {
        let mut data = self.write();
        if data
            .users
            .iter()
            .any(|u| u.application_id == application_id && u.username == username)
        {
            return Err(ServiceError::Conflict("username"));
        }

        let user = User {
            id: data.next_id(),
            application_id,
            username: username.to_string(),
            encrypted_password: encrypted_password.to_string(),
        };
        data.profiles.insert(user.id, UserProfile::default());
        data.users.push(user.clone());
        Ok(user)
    }

    async fn redeem_password_reset(
        &self,
        jti: Uuid,
        _user_id: i32,
        _expires_at: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        Ok(self.write().redeemed_resets.insert(jti))
    }

    async fn find_service_account_by_key(
        &self,
        application_id: i32,
        key: Uuid,
    ) -> Result<Option<ServiceAccount>, ServiceError> {
        Ok(self
            .read()
            .service_accounts
            .iter()
            .find(|s| s.application_id == application_id && s.key == key)
            .cloned())
    }

    async fn find_service_account_by_id(
        &self,
        application_id: i32,
        service_account_id: i32,
    ) -> Result<Option<ServiceAccount>, ServiceError> {
        Ok(self
            .read()
            .service_accounts
            .iter()
            .find(|s| s.application_id == application_id && s.id == service_account_id)
            .cloned())
    }
}

#[async_trait]
impl MfaStore for MemoryStore {
    async fn find_mfa(&self, user_id: i32) -> Result<Option<MfaRecord>, ServiceError> {
        Ok(self.read().mfa.get(&user_id).cloned())
    }

    async fn find_totp(
        &self,
        user_id: i32,
        tenant_id: i32,
    ) -> Result<Option<TotpFactor>, ServiceError> {
        Ok(self
            .read()
            .totps
            .iter()
            .find(|t| t.user_id == user_id && t.tenant_id == tenant_id)
            .cloned())
    }

    async fn enroll_totp(
        &self,
        user_id: i32,
        tenant_id: i32,
        secret: &str,
    ) -> Result<(TotpFactor, MfaRecord), ServiceError> {
        let mut data = self.write();
        data.totps
            .retain(|t| !(t.user_id == user_id && t.tenant_id == tenant_id));
        let factor = TotpFactor {
            id: data.next_id(),
            tenant_id,
            user_id,
            secret: secret.to_string(),
        };
        let record = MfaRecord {
            user_id,
            factor_id: factor.id,
            kind: MfaKind::Totp,
            enabled: true,
        };
        data.totps.push(factor.clone());
        data.mfa.insert(user_id, record.clone());
        Ok((factor, record))
    }

    async fn delete_mfa(&self, user_id: i32) -> Result<bool, ServiceError> {
        Ok(self.write().mfa.remove(&user_id).is_some())
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn user_permission_rows(
        &self,
        application_id: i32,
        user_id: i32,
    ) -> Result<Vec<PermissionRow>, ServiceError> {
        Ok(self
            .read()
            .user_permissions
            .iter()
            .filter(|(app, user, _)| *app == application_id && *user == user_id)
            .map(|(_, _, row)| row.clone())
            .collect())
    }

    async fn service_account_permission_rows(
        &self,
        application_id: i32,
        service_account_id: i32,
    ) -> Result<Vec<PermissionRow>, ServiceError> {
        Ok(self
            .read()
            .service_account_permissions
            .iter()
            .filter(|(app, account, _)| *app == application_id && *account == service_account_id)
            .map(|(_, _, row)| row.clone())
            .collect())
    }
}

#[async_trait]
impl PasskeyStore for MemoryStore {
    async fn list_passkeys(&self, user_id: i32) -> Result<Vec<StoredPasskey>, ServiceError> {
        Ok(self
            .read()
            .passkeys
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn save_passkey(&self, passkey: &StoredPasskey) -> Result<(), ServiceError> {
        let mut data = self.write();
        data.passkeys
            .retain(|p| p.credential_id != passkey.credential_id);
        data.passkeys.push(passkey.clone());
        Ok(())
    }
}
