use serde::Serialize;
use sqlx::FromRow;
use std::fmt;

/// Second-factor kinds a subject can enroll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MfaKind {
    Totp,
    /// A factor type present in storage that this service cannot verify.
    Unsupported(String),
}

impl MfaKind {
    pub fn as_str(&self) -> &str {
        match self {
            MfaKind::Totp => "totp",
            MfaKind::Unsupported(kind) => kind,
        }
    }
}

impl From<String> for MfaKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "totp" => MfaKind::Totp,
            _ => MfaKind::Unsupported(value),
        }
    }
}

impl fmt::Display for MfaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single active second factor of a user.
#[derive(Debug, Clone, FromRow)]
pub struct MfaRecord {
    pub user_id: i32,
    pub factor_id: i32,
    #[sqlx(rename = "type", try_from = "String")]
    pub kind: MfaKind,
    pub enabled: bool,
}

/// Shared TOTP secret of a user within one tenant.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TotpFactor {
    pub id: i32,
    pub tenant_id: i32,
    pub user_id: i32,
    #[serde(skip_serializing)]
    pub secret: String,
}
