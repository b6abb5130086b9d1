//! Test data shared by unit tests.

use uuid::Uuid;

use crate::models::{Application, ServiceAccount, Tenant, User};
use crate::utils::{hash_password, Password};

pub const APPLICATION_ID: i32 = 1;

pub const RSA_PRIVATE_KEY: &str = include_str!("../tests/fixtures/rsa_private.pem");
pub const RSA_PUBLIC_KEY: &str = include_str!("../tests/fixtures/rsa_public.pem");

const SERVICE_ACCOUNT_KEY: Uuid = Uuid::from_u128(0x6f1c_2b2e_8d4a_4c1e_9f3b_5a7d_0c2e_4b19);

/// HS256 tenant using `secret` as the shared key. Each call gets a fresh
/// client id.
pub fn hmac_tenant(secret: &str) -> Tenant {
    Tenant {
        id: 1,
        application_id: APPLICATION_ID,
        description: "Shop web".to_string(),
        uri: "https://shop.example.test".to_string(),
        public_uri: None,
        client_id: Uuid::new_v4(),
        client_secret: "client-secret".to_string(),
        algorithm: "HS256".to_string(),
        public_key: None,
        private_key: secret.to_string(),
        expires_in_seconds: 3600,
        refresh_expires_in_seconds: 86_400,
        reset_expires_in_seconds: 900,
    }
}

pub fn rsa_tenant() -> Tenant {
    Tenant {
        id: 2,
        algorithm: "RS256".to_string(),
        public_key: Some(RSA_PUBLIC_KEY.to_string()),
        private_key: RSA_PRIVATE_KEY.to_string(),
        ..hmac_tenant("")
    }
}

pub fn application() -> Application {
    Application {
        id: APPLICATION_ID,
        description: "Shop".to_string(),
        uri: "https://api.shop.example.test".to_string(),
        website: Some("https://shop.example.test".to_string()),
        is_admin: false,
        signup_enabled: true,
        signup_password_enabled: true,
    }
}

/// User whose id is derived from the username, so repeated calls agree.
pub fn user(username: &str, password: &str) -> User {
    User {
        id: stable_id(username),
        application_id: APPLICATION_ID,
        username: username.to_string(),
        encrypted_password: hash(password),
    }
}

pub fn service_account(name: &str, secret: &str) -> ServiceAccount {
    ServiceAccount {
        id: stable_id(name),
        application_id: APPLICATION_ID,
        name: name.to_string(),
        key: SERVICE_ACCOUNT_KEY,
        encrypted_secret: hash(secret),
    }
}

fn hash(secret: &str) -> String {
    hash_password(&Password::new(secret.to_string()))
        .unwrap()
        .into_string()
}

fn stable_id(name: &str) -> i32 {
    name.bytes()
        .fold(7i32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as i32))
        .rem_euclid(100_000)
        + 1
}
