//! Test helpers for identity-service integration tests.
//!
//! Builds the full router over an in-memory store and drives it with
//! `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use identity_service::{
    build_router,
    config::{
        DatabaseConfig, Environment, IdentityConfig, RateLimitConfig, SecurityConfig,
        SwaggerConfig, SwaggerMode,
    },
    models::{Address, Application, ServiceAccount, Tenant, User, UserProfile},
    services::{MemoryStore, MockNotifier, Settings, SettingsService},
    utils::{hash_password, Password},
    AppState,
};
use serde_json::Value;
use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};
use tower::ServiceExt;
use uuid::Uuid;

pub const ISSUER: &str = "https://id.example.test";
pub const HMAC_SECRET: &str = "s3cr3t";
pub const USERNAME: &str = "alice";
pub const PASSWORD: &str = "hunter2";
pub const EMAIL: &str = "alice@example.com";
pub const SERVICE_ACCOUNT_SECRET: &str = "ci-secret";

pub const RSA_PRIVATE_KEY: &str = include_str!("../fixtures/rsa_private.pem");
pub const RSA_PUBLIC_KEY: &str = include_str!("../fixtures/rsa_public.pem");

pub fn test_config() -> IdentityConfig {
    IdentityConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "identity-service".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://localhost/identity_test".to_string(),
            max_connections: 5,
            min_connections: 1,
        },
        public_url: ISSUER.to_string(),
        security: SecurityConfig {
            allowed_origins: vec!["https://shop.example.test".to_string()],
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Public,
        },
        rate_limit: RateLimitConfig {
            token_attempts: 100,
            token_window_seconds: 60,
            trusted_proxy_hops: 0,
        },
        challenge_ttl_seconds: 60,
    }
}

/// Router plus handles on the seeded data.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub notifier: MockNotifier,
    pub settings: SettingsService,
    pub application: Application,
    pub tenant: Tenant,
    pub rsa_tenant: Tenant,
    pub user: User,
    pub service_account: ServiceAccount,
}

impl TestApp {
    /// One application with an HS256 tenant (secret `s3cr3t`), an RS256
    /// tenant, user `alice`/`hunter2` and one service account.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: IdentityConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let notifier = MockNotifier::new();
        let settings = SettingsService::fixed(Settings::new(ISSUER));

        let application = Application {
            id: store.next_id(),
            description: "Shop".to_string(),
            uri: "https://api.shop.example.test".to_string(),
            website: Some("https://shop.example.test".to_string()),
            is_admin: false,
            signup_enabled: true,
            signup_password_enabled: true,
        };
        store.insert_application(application.clone());

        let tenant = Tenant {
            id: store.next_id(),
            application_id: application.id,
            description: "Shop web".to_string(),
            uri: "https://shop.example.test".to_string(),
            public_uri: None,
            client_id: Uuid::new_v4(),
            client_secret: "client-secret".to_string(),
            algorithm: "HS256".to_string(),
            public_key: None,
            private_key: HMAC_SECRET.to_string(),
            expires_in_seconds: 3600,
            refresh_expires_in_seconds: 86_400,
            reset_expires_in_seconds: 900,
        };
        store.insert_tenant(tenant.clone());

        let rsa_tenant = Tenant {
            id: store.next_id(),
            client_id: Uuid::new_v4(),
            description: "Shop mobile".to_string(),
            algorithm: "RS256".to_string(),
            public_key: Some(RSA_PUBLIC_KEY.to_string()),
            private_key: RSA_PRIVATE_KEY.to_string(),
            ..tenant.clone()
        };
        store.insert_tenant(rsa_tenant.clone());

        let user = User {
            id: store.next_id(),
            application_id: application.id,
            username: USERNAME.to_string(),
            encrypted_password: hash(PASSWORD),
        };
        store.insert_user(user.clone(), profile());

        let service_account = ServiceAccount {
            id: store.next_id(),
            application_id: application.id,
            name: "ci".to_string(),
            key: Uuid::new_v4(),
            encrypted_secret: hash(SERVICE_ACCOUNT_SECRET),
        };
        store.insert_service_account(service_account.clone());

        let state = AppState::new(
            config,
            store.clone(),
            settings.clone(),
            Arc::new(notifier.clone()),
        );
        let router = build_router(state.clone()).expect("router builds");

        Self {
            router,
            state,
            store,
            notifier,
            settings,
            application,
            tenant,
            rsa_tenant,
            user,
            service_account,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// POST as a tenant-scoped, unauthenticated caller.
    pub async fn post_tenant(&self, tenant: &Tenant, uri: &str, body: Value) -> (StatusCode, Value) {
        let client_id = tenant.client_id.to_string();
        self.request(Method::POST, uri, &[("Tenent-Id", client_id.as_str())], Some(body))
            .await
    }

    pub async fn get_tenant(&self, tenant: &Tenant, uri: &str) -> (StatusCode, Value) {
        let client_id = tenant.client_id.to_string();
        self.request(Method::GET, uri, &[("Tenent-Id", client_id.as_str())], None)
            .await
    }

    pub async fn with_bearer(
        &self,
        method: Method,
        uri: &str,
        token: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let authorization = format!("Bearer {}", token);
        self.request(method, uri, &[("Authorization", authorization.as_str())], body)
            .await
    }

    /// Password grant for the seeded user against the HS256 tenant.
    pub async fn password_grant(&self, scope: &str) -> (StatusCode, Value) {
        self.post_tenant(
            &self.tenant,
            "/token",
            serde_json::json!({
                "grant_type": "password",
                "username": USERNAME,
                "password": PASSWORD,
                "scope": scope,
            }),
        )
        .await
    }

    /// Access token for the seeded user.
    pub async fn user_token(&self, scope: &str) -> String {
        let (status, body) = self.password_grant(scope).await;
        assert_eq!(status, StatusCode::OK, "password grant failed: {}", body);
        body["access_token"].as_str().unwrap().to_string()
    }

    pub async fn service_account_token(&self) -> String {
        let (status, body) = self
            .post_tenant(
                &self.tenant,
                "/token",
                serde_json::json!({
                    "grant_type": "service-account",
                    "key": self.service_account.key.to_string(),
                    "secret": SERVICE_ACCOUNT_SECRET,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "service-account grant failed: {}", body);
        body["access_token"].as_str().unwrap().to_string()
    }
}

pub fn profile() -> UserProfile {
    UserProfile {
        email: Some(EMAIL.to_string()),
        email_verified: true,
        given_name: Some("Alice".to_string()),
        family_name: Some("Liddell".to_string()),
        address: Address {
            locality: Some("Oxford".to_string()),
            country: Some("GB".to_string()),
            ..Address::default()
        },
        ..UserProfile::default()
    }
}

pub fn hash(secret: &str) -> String {
    hash_password(&Password::new(secret.to_string()))
        .unwrap()
        .into_string()
}

/// Current code for a base32 TOTP secret, with the service's parameters.
pub fn totp_code(secret: &str) -> String {
    let bytes = Secret::Encoded(secret.to_string()).to_bytes().unwrap();
    TOTP::new_unchecked(Algorithm::SHA1, 6, 0, 30, bytes, None, String::new())
        .generate_current()
        .unwrap()
}
