use std::sync::Arc;

use super::store::PermissionStore;
use super::{IdentityStore, ServiceError};
use crate::models::{Permissions, Subject};

/// Aggregates the resource/action grants held by a subject within its
/// application.
#[derive(Clone)]
pub struct PermissionResolver {
    store: Arc<dyn IdentityStore>,
}

impl PermissionResolver {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, subject), fields(subject_id = subject.id(), subject_type = %subject.subject_type()))]
    pub async fn resolve(&self, subject: &Subject) -> Result<Permissions, ServiceError> {
        let rows = match subject {
            Subject::User(user) => {
                self.store
                    .user_permission_rows(user.application_id, user.id)
                    .await?
            }
            Subject::ServiceAccount(account) => {
                self.store
                    .service_account_permission_rows(account.application_id, account.id)
                    .await?
            }
        };

        Ok(Permissions::from_rows(rows))
    }
}
