//! Runtime settings held as an immutable snapshot and swapped atomically
//! when the `configs` table changes.

use arc_swap::ArcSwap;
use serde::Deserialize;
use serde_json::Value;
use sqlx::postgres::{PgListener, PgPool};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::ServiceError;

pub const CONFIGS_CHANNEL: &str = "configs_channel";

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Public base URL of this service; used as the token issuer.
    pub url: String,
    pub openapi_enabled: bool,
}

impl Settings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            openapi_enabled: true,
        }
    }

    /// Apply one dotted config key. Unknown keys and mistyped values are
    /// rejected without touching the snapshot.
    pub fn set(&mut self, key: &str, value: &Value) -> Result<(), String> {
        match key {
            "url" => match value.as_str() {
                Some(url) if !url.trim().is_empty() => {
                    self.url = url.trim_end_matches('/').to_string();
                    Ok(())
                }
                _ => Err(format!("{} must be a non-empty string", key)),
            },
            "openapi.enabled" => match value.as_bool() {
                Some(enabled) => {
                    self.openapi_enabled = enabled;
                    Ok(())
                }
                None => Err(format!("{} must be a boolean", key)),
            },
            _ => Err(format!("unknown config key {}", key)),
        }
    }

    fn reset(&mut self, key: &str, fallback: &Settings) -> Result<(), String> {
        match key {
            "url" => self.url = fallback.url.clone(),
            "openapi.enabled" => self.openapi_enabled = fallback.openapi_enabled,
            _ => return Err(format!("unknown config key {}", key)),
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ConfigNotification {
    #[serde(default)]
    table: String,
    key: String,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    action_type: String,
}

#[derive(sqlx::FromRow)]
struct ConfigRow {
    key: String,
    value: Value,
}

/// Owner of the current [`Settings`] snapshot.
///
/// Readers call [`SettingsService::current`] and always observe a complete
/// snapshot. When started against Postgres, a supervised task listens on
/// `configs_channel` and swaps in updated snapshots until [`SettingsService::stop`].
#[derive(Clone)]
pub struct SettingsService {
    current: Arc<ArcSwap<Settings>>,
    fallback: Arc<Settings>,
    shutdown: CancellationToken,
    listener: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SettingsService {
    /// A service whose snapshot only changes through `apply_notification`.
    pub fn fixed(settings: Settings) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(settings.clone())),
            fallback: Arc::new(settings),
            shutdown: CancellationToken::new(),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Load the `configs` table over `fallback` and start listening for changes.
    pub async fn start(pool: PgPool, fallback: Settings) -> Result<Self, ServiceError> {
        let service = Self::fixed(fallback);
        service.reload(&pool).await?;

        let handle = tokio::spawn(run_listener(
            pool,
            Arc::clone(&service.current),
            Arc::clone(&service.fallback),
            service.shutdown.clone(),
        ));
        *service
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);

        tracing::info!(url = %service.current().url, "Settings loaded");
        Ok(service)
    }

    pub fn current(&self) -> Arc<Settings> {
        self.current.load_full()
    }

    /// Apply a `configs_channel` payload. Malformed payloads and unknown keys
    /// are logged and ignored.
    pub fn apply_notification(&self, payload: &str) {
        apply_payload(&self.current, &self.fallback, payload);
    }

    /// Cancel the listener and wait for it to exit.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let handle = self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Settings listener task failed");
            }
        }
    }

    async fn reload(&self, pool: &PgPool) -> Result<(), ServiceError> {
        let rows = sqlx::query_as::<_, ConfigRow>("SELECT key, value FROM configs")
            .fetch_all(pool)
            .await?;

        let mut settings = (*self.fallback).clone();
        for row in rows {
            if let Err(reason) = settings.set(&row.key, &row.value) {
                tracing::warn!(key = %row.key, reason = %reason, "Ignoring config row");
            }
        }
        self.current.store(Arc::new(settings));
        Ok(())
    }
}

fn apply_payload(current: &ArcSwap<Settings>, fallback: &Settings, payload: &str) {
    let notification: ConfigNotification = match serde_json::from_str(payload) {
        Ok(notification) => notification,
        Err(e) => {
            tracing::warn!(error = %e, "Invalid config notification payload");
            return;
        }
    };

    let mut next = (*current.load_full()).clone();
    let result = if notification.action_type.eq_ignore_ascii_case("delete") {
        next.reset(&notification.key, fallback)
    } else {
        next.set(&notification.key, &notification.value)
    };

    match result {
        Ok(()) => {
            tracing::info!(
                table = %notification.table,
                key = %notification.key,
                action = %notification.action_type,
                "Config updated"
            );
            current.store(Arc::new(next));
        }
        Err(reason) => {
            tracing::warn!(key = %notification.key, reason = %reason, "Ignoring config notification");
        }
    }
}

async fn run_listener(
    pool: PgPool,
    current: Arc<ArcSwap<Settings>>,
    fallback: Arc<Settings>,
    shutdown: CancellationToken,
) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match listen(&pool, &current, &fallback, &shutdown, &mut backoff).await {
            Ok(()) => break,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    retry_in_ms = backoff.as_millis() as u64,
                    "Config listener failed, restarting"
                );
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
    tracing::info!("Config listener stopped");
}

/// Returns Ok only when cancelled.
async fn listen(
    pool: &PgPool,
    current: &ArcSwap<Settings>,
    fallback: &Settings,
    shutdown: &CancellationToken,
    backoff: &mut Duration,
) -> Result<(), sqlx::Error> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(CONFIGS_CHANNEL).await?;
    *backoff = INITIAL_BACKOFF;
    tracing::debug!(channel = CONFIGS_CHANNEL, "Listening for config changes");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            notification = listener.recv() => {
                let notification = notification?;
                apply_payload(current, fallback, notification.payload());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> SettingsService {
        SettingsService::fixed(Settings::new("https://id.example.test"))
    }

    #[test]
    fn test_notification_swaps_snapshot() {
        let settings = service();
        let before = settings.current();

        settings.apply_notification(
            r#"{"table":"configs","key":"url","value":"https://auth.example.test/","action_type":"UPDATE"}"#,
        );

        assert_eq!(before.url, "https://id.example.test");
        assert_eq!(settings.current().url, "https://auth.example.test");
    }

    #[test]
    fn test_nested_boolean_key() {
        let settings = service();
        settings.apply_notification(
            r#"{"table":"configs","key":"openapi.enabled","value":false,"action_type":"INSERT"}"#,
        );
        assert!(!settings.current().openapi_enabled);
    }

    #[test]
    fn test_invalid_notifications_are_ignored() {
        let settings = service();
        settings.apply_notification("not json");
        settings.apply_notification(r#"{"key":"dashboard.enabled","value":true}"#);
        settings.apply_notification(r#"{"key":"url","value":42}"#);

        assert_eq!(*settings.current(), Settings::new("https://id.example.test"));
    }

    #[test]
    fn test_delete_restores_fallback() {
        let settings = service();
        settings.apply_notification(r#"{"key":"url","value":"https://other.test"}"#);
        settings.apply_notification(r#"{"key":"url","action_type":"DELETE"}"#);

        assert_eq!(settings.current().url, "https://id.example.test");
    }

    #[tokio::test]
    async fn test_stop_without_listener() {
        let settings = service();
        settings.stop().await;
        assert_eq!(settings.current().url, "https://id.example.test");
    }
}
