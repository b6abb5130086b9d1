use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{Permissions, Subject};
use crate::services::claims::OpenIdProfile;
use crate::services::SubjectType;

/// The authenticated caller as seen by this service.
#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentUserResponse {
    pub id: i32,
    pub application_id: i32,
    pub subject_type: SubjectType,
    /// Username for users, display name for service accounts
    pub name: String,
    pub scope: Vec<String>,
    #[schema(value_type = Object, example = json!({"invoices": ["read", "write"]}))]
    pub permissions: Permissions,
}

impl CurrentUserResponse {
    pub fn new(subject: &Subject, scope: &[String], permissions: &Permissions) -> Self {
        let name = match subject {
            Subject::User(user) => user.username.clone(),
            Subject::ServiceAccount(account) => account.name.clone(),
        };
        Self {
            id: subject.id(),
            application_id: subject.application_id(),
            subject_type: subject.subject_type(),
            name,
            scope: scope.to_vec(),
            permissions: permissions.clone(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserInfoResponse {
    pub sub: i32,
    #[serde(flatten)]
    pub profile: OpenIdProfile,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TotpEnrollmentResponse {
    /// Base32 shared secret
    #[schema(example = "JBSWY3DPEHPK3PXP")]
    pub secret: String,
    /// Provisioning URL for authenticator apps
    pub url: String,
}
