use super::{ServiceAccount, User};
use crate::services::claims::SubjectType;

/// The authenticated principal behind a token.
#[derive(Debug, Clone)]
pub enum Subject {
    User(User),
    ServiceAccount(ServiceAccount),
}

impl Subject {
    pub fn id(&self) -> i32 {
        match self {
            Subject::User(user) => user.id,
            Subject::ServiceAccount(account) => account.id,
        }
    }

    pub fn application_id(&self) -> i32 {
        match self {
            Subject::User(user) => user.application_id,
            Subject::ServiceAccount(account) => account.application_id,
        }
    }

    pub fn subject_type(&self) -> SubjectType {
        match self {
            Subject::User(_) => SubjectType::User,
            Subject::ServiceAccount(_) => SubjectType::ServiceAccount,
        }
    }

    pub fn as_user(&self) -> Option<&User> {
        match self {
            Subject::User(user) => Some(user),
            Subject::ServiceAccount(_) => None,
        }
    }
}
