use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::ServiceError;

/// A password-reset token ready to be delivered to a user.
#[derive(Debug, Clone)]
pub struct PasswordResetMessage {
    pub user_id: i32,
    pub email: String,
    pub token: String,
    /// Base URL the user should be sent back to.
    pub base_url: String,
}

/// Outbound delivery of user-facing messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_password_reset(&self, message: PasswordResetMessage) -> Result<(), ServiceError>;
}

/// Logs deliveries instead of sending them.
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_password_reset(&self, message: PasswordResetMessage) -> Result<(), ServiceError> {
        tracing::info!(
            user_id = message.user_id,
            base_url = %message.base_url,
            "Password reset requested; delivery is not configured"
        );
        Ok(())
    }
}

/// Records deliveries for assertions in tests.
#[derive(Clone, Default)]
pub struct MockNotifier {
    sent: Arc<Mutex<Vec<PasswordResetMessage>>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<PasswordResetMessage> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send_password_reset(&self, message: PasswordResetMessage) -> Result<(), ServiceError> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message);
        Ok(())
    }
}
