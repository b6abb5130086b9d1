use serde::Serialize;
use sqlx::FromRow;

/// User entity. The password hash never leaves the service.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i32,
    pub application_id: i32,
    pub username: String,
    #[serde(skip_serializing)]
    pub encrypted_password: String,
}

/// Profile and verified contact data published through OpenID claims.
#[derive(Debug, Clone, Default, FromRow)]
pub struct UserProfile {
    pub email: Option<String>,
    pub email_verified: bool,
    pub phone_number: Option<String>,
    pub phone_number_verified: bool,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub middle_name: Option<String>,
    pub nickname: Option<String>,
    pub profile: Option<String>,
    pub picture: Option<String>,
    pub website: Option<String>,
    pub gender: Option<String>,
    pub birthdate: Option<String>,
    pub zoneinfo: Option<String>,
    pub locale: Option<String>,
    #[sqlx(flatten)]
    pub address: Address,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow)]
pub struct Address {
    pub street_address: Option<String>,
    pub locality: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        self == &Address::default()
    }
}
