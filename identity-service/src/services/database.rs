//! PostgreSQL implementation of the identity store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPool, types::Json, FromRow};
use uuid::Uuid;
use webauthn_rs::prelude::Passkey;

use super::store::{MfaStore, PasskeyStore, PermissionStore, SubjectStore, TenantDirectory};
use super::ServiceError;
use crate::models::{
    Application, MfaRecord, PermissionRow, ServiceAccount, StoredPasskey, Tenant, TotpFactor,
    User, UserProfile,
};

const TENANT_COLUMNS: &str = "id, application_id, description, uri, public_uri, client_id, \
    client_secret, algorithm, public_key, private_key, expires_in_seconds, \
    refresh_expires_in_seconds, reset_expires_in_seconds";

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database wrapper from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TenantDirectory for Database {
    /// Ping the database.
    async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(|e| {
            tracing::error!("Database health check failed: {}", e);
            ServiceError::Database(e)
        })?;
        Ok(())
    }

    async fn find_tenant_by_client_id(
        &self,
        client_id: Uuid,
    ) -> Result<Option<Tenant>, ServiceError> {
        let query = format!("SELECT {} FROM tenants WHERE client_id = $1", TENANT_COLUMNS);
        Ok(sqlx::query_as::<_, Tenant>(&query)
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_tenant_by_id(&self, tenant_id: i32) -> Result<Option<Tenant>, ServiceError> {
        let query = format!("SELECT {} FROM tenants WHERE id = $1", TENANT_COLUMNS);
        Ok(sqlx::query_as::<_, Tenant>(&query)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_application_by_id(
        &self,
        application_id: i32,
    ) -> Result<Option<Application>, ServiceError> {
        Ok(sqlx::query_as::<_, Application>(
            r#"
            SELECT id, description, uri, website, is_admin, signup_enabled, signup_password_enabled
            FROM applications
            WHERE id = $1
            "#,
        )
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await?)
    }
}

#[async_trait]
impl SubjectStore for Database {
    async fn find_user_by_username_or_email(
        &self,
        application_id: i32,
        login: &str,
    ) -> Result<Option<User>, ServiceError> {
        Ok(sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.application_id, u.username, u.encrypted_password
            FROM users u
            WHERE u.application_id = $1
              AND (
                u.username = $2
                OR EXISTS (SELECT 1 FROM user_emails e WHERE e.user_id = u.id AND e.email = $2)
              )
            LIMIT 1
            "#,
        )
        .bind(application_id)
        .bind(login)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_user_by_email(
        &self,
        application_id: i32,
        email: &str,
    ) -> Result<Option<User>, ServiceError> {
        Ok(sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.application_id, u.username, u.encrypted_password
            FROM users u
            JOIN user_emails e ON e.user_id = u.id
            WHERE u.application_id = $1 AND e.email = $2
            LIMIT 1
            "#,
        )
        .bind(application_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_user_by_id(
        &self,
        application_id: i32,
        user_id: i32,
    ) -> Result<Option<User>, ServiceError> {
        Ok(sqlx::query_as::<_, User>(
            r#"
            SELECT id, application_id, username, encrypted_password
            FROM users
            WHERE application_id = $1 AND id = $2
            "#,
        )
        .bind(application_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_user_profile(&self, user_id: i32) -> Result<UserProfile, ServiceError> {
        let profile = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT
                e.email,
                COALESCE(e.verified, false) AS email_verified,
                p.phone_number,
                COALESCE(p.verified, false) AS phone_number_verified,
                i.name, i.given_name, i.family_name, i.middle_name, i.nickname,
                i.profile, i.picture, i.website, i.gender, i.birthdate,
                i.zoneinfo, i.locale,
                i.street_address, i.locality, i.region, i.postal_code, i.country
            FROM users u
            LEFT JOIN user_emails e ON e.user_id = u.id AND e.is_primary
            LEFT JOIN user_phone_numbers p ON p.user_id = u.id AND p.is_primary
            LEFT JOIN user_infos i ON i.user_id = u.id
            WHERE u.id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile.unwrap_or_default())
    }

    async fn update_user_password(
        &self,
        user_id: i32,
        encrypted_password: &str,
    ) -> Result<(), ServiceError> {
        let result = sqlx::query(
            "UPDATE users SET encrypted_password = $2, updated_at = now() WHERE id = $1",
        )
        .bind(user_id)
        .bind(encrypted_password)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("user"));
        }
        Ok(())
    }

    async fn create_user(
        &self,
        application_id: i32,
        username: &str,
        encrypted_password: &str,
    ) -> Result<User, ServiceError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (application_id, username, encrypted_password)
            VALUES ($1, $2, $3)
            RETURNING id, application_id, username, encrypted_password
            "#,
        )
        .bind(application_id)
        .bind(username)
        .bind(encrypted_password)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                ServiceError::Conflict("username")
            }
            other => ServiceError::Database(other),
        })
    }

    async fn redeem_password_reset(
        &self,
        jti: Uuid,
        user_id: i32,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            r#"
            INSERT INTO password_resets (jti, user_id, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (jti) DO NOTHING
            "#,
        )
        .bind(jti)
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_service_account_by_key(
        &self,
        application_id: i32,
        key: Uuid,
    ) -> Result<Option<ServiceAccount>, ServiceError> {
        Ok(sqlx::query_as::<_, ServiceAccount>(
            r#"
            SELECT id, application_id, name, key, encrypted_secret
            FROM service_accounts
            WHERE application_id = $1 AND key = $2
            "#,
        )
        .bind(application_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_service_account_by_id(
        &self,
        application_id: i32,
        service_account_id: i32,
    ) -> Result<Option<ServiceAccount>, ServiceError> {
        Ok(sqlx::query_as::<_, ServiceAccount>(
            r#"
            SELECT id, application_id, name, key, encrypted_secret
            FROM service_accounts
            WHERE application_id = $1 AND id = $2
            "#,
        )
        .bind(application_id)
        .bind(service_account_id)
        .fetch_optional(&self.pool)
        .await?)
    }
}

#[async_trait]
impl MfaStore for Database {
    async fn find_mfa(&self, user_id: i32) -> Result<Option<MfaRecord>, ServiceError> {
        Ok(sqlx::query_as::<_, MfaRecord>(
            "SELECT user_id, factor_id, type, enabled FROM mfas WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_totp(
        &self,
        user_id: i32,
        tenant_id: i32,
    ) -> Result<Option<TotpFactor>, ServiceError> {
        Ok(sqlx::query_as::<_, TotpFactor>(
            "SELECT id, tenant_id, user_id, secret FROM totps WHERE user_id = $1 AND tenant_id = $2",
        )
        .bind(user_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn enroll_totp(
        &self,
        user_id: i32,
        tenant_id: i32,
        secret: &str,
    ) -> Result<(TotpFactor, MfaRecord), ServiceError> {
        let mut tx = self.pool.begin().await?;

        let factor = sqlx::query_as::<_, TotpFactor>(
            r#"
            INSERT INTO totps (tenant_id, user_id, secret)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, tenant_id)
            DO UPDATE SET secret = EXCLUDED.secret, updated_at = now()
            RETURNING id, tenant_id, user_id, secret
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(secret)
        .fetch_one(&mut *tx)
        .await?;

        let record = sqlx::query_as::<_, MfaRecord>(
            r#"
            INSERT INTO mfas (user_id, factor_id, type, enabled)
            VALUES ($1, $2, 'totp', true)
            ON CONFLICT (user_id)
            DO UPDATE SET factor_id = EXCLUDED.factor_id, type = EXCLUDED.type,
                          enabled = true, updated_at = now()
            RETURNING user_id, factor_id, type, enabled
            "#,
        )
        .bind(user_id)
        .bind(factor.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((factor, record))
    }

    async fn delete_mfa(&self, user_id: i32) -> Result<bool, ServiceError> {
        let result = sqlx::query("DELETE FROM mfas WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl PermissionStore for Database {
    async fn user_permission_rows(
        &self,
        application_id: i32,
        user_id: i32,
    ) -> Result<Vec<PermissionRow>, ServiceError> {
        Ok(sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT r.uri AS resource, rrp.actions
            FROM user_roles ur
            JOIN role_resource_permissions rrp ON rrp.role_id = ur.role_id
            JOIN resources r ON r.id = rrp.resource_id
            WHERE r.application_id = $1 AND ur.user_id = $2
            "#,
        )
        .bind(application_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn service_account_permission_rows(
        &self,
        application_id: i32,
        service_account_id: i32,
    ) -> Result<Vec<PermissionRow>, ServiceError> {
        Ok(sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT r.uri AS resource, rrp.actions
            FROM service_account_roles sr
            JOIN role_resource_permissions rrp ON rrp.role_id = sr.role_id
            JOIN resources r ON r.id = rrp.resource_id
            WHERE r.application_id = $1 AND sr.service_account_id = $2
            "#,
        )
        .bind(application_id)
        .bind(service_account_id)
        .fetch_all(&self.pool)
        .await?)
    }
}

#[derive(FromRow)]
struct PasskeyRow {
    user_id: i32,
    application_id: i32,
    credential_id: Vec<u8>,
    passkey: Json<Passkey>,
}

impl From<PasskeyRow> for StoredPasskey {
    fn from(row: PasskeyRow) -> Self {
        Self {
            user_id: row.user_id,
            application_id: row.application_id,
            credential_id: row.credential_id,
            passkey: row.passkey.0,
        }
    }
}

#[async_trait]
impl PasskeyStore for Database {
    async fn list_passkeys(&self, user_id: i32) -> Result<Vec<StoredPasskey>, ServiceError> {
        let rows = sqlx::query_as::<_, PasskeyRow>(
            r#"
            SELECT user_id, application_id, credential_id, passkey
            FROM passkeys
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(StoredPasskey::from).collect())
    }

    async fn save_passkey(&self, passkey: &StoredPasskey) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO passkeys (credential_id, user_id, application_id, passkey)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (credential_id)
            DO UPDATE SET passkey = EXCLUDED.passkey, updated_at = now()
            "#,
        )
        .bind(&passkey.credential_id)
        .bind(passkey.user_id)
        .bind(passkey.application_id)
        .bind(Json(&passkey.passkey))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
