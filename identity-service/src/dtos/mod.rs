pub mod token;
pub mod user;
pub mod well_known;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use token::{
    PasswordResetConfirm, PasswordResetRequest, RegistrationRequest, TokenRequest,
    ValidateMfaRequest,
};
pub use user::{CurrentUserResponse, TotpEnrollmentResponse, UserInfoResponse};
pub use well_known::{Jwk, Jwks, OpenIdConfiguration};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "invalid username or password")]
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
