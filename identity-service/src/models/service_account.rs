use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Machine identity authenticated with a key/secret pair.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ServiceAccount {
    pub id: i32,
    pub application_id: i32,
    pub name: String,
    pub key: Uuid,
    #[serde(skip_serializing)]
    pub encrypted_secret: String,
}
