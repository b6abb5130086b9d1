use serde::Deserialize;
use std::fmt;
use utoipa::ToSchema;
use validator::Validate;

/// Body of `POST /token`. Which optional fields are required depends on
/// `grant_type`.
#[derive(Default, Deserialize, Validate, ToSchema)]
pub struct TokenRequest {
    #[validate(length(min = 1, message = "grant_type is required"))]
    #[schema(example = "password")]
    pub grant_type: String,

    #[schema(example = "alice")]
    pub username: Option<String>,

    #[schema(example = "hunter2")]
    pub password: Option<String>,

    /// Service-account key
    #[schema(example = "6f1c2b2e-8d4a-4c1e-9f3b-5a7d0c2e4b19")]
    pub key: Option<String>,

    /// Service-account secret
    pub secret: Option<String>,

    pub refresh_token: Option<String>,

    /// Space-separated scopes
    #[schema(example = "openid profile")]
    pub scope: Option<String>,
}

impl fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRequest")
            .field("grant_type", &self.grant_type)
            .field("username", &self.username)
            .field("key", &self.key)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ValidateMfaRequest {
    #[validate(length(min = 1, message = "code is required"))]
    #[schema(example = "123456")]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "alice@example.com")]
    pub email: String,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct PasswordResetConfirm {
    #[validate(length(min = 1, message = "token is required"))]
    pub token: String,

    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,

    pub password_confirmation: String,
}

/// Body of `POST /registration`. Fields are trimmed before use.
#[derive(Deserialize, Validate, ToSchema)]
pub struct RegistrationRequest {
    #[validate(length(min = 1, message = "username is required"))]
    #[schema(example = "alice")]
    pub username: String,

    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,

    pub password_confirmation: String,
}
