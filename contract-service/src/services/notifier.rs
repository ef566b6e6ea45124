//! Notification Dispatcher seam.
//!
//! Delivery is fire-and-forget from the engines' point of view: [`dispatch`]
//! logs and counts failures and never returns them.

use crate::services::metrics::NOTIFICATION_FAILURES_TOTAL;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Recipient {
    Role(String),
    User(Uuid),
}

impl Recipient {
    pub fn role(role: &str) -> Self {
        Self::Role(role.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: Recipient,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub action_url: Option<String>,
    pub data: serde_json::Value,
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Send a notification, swallowing any failure.
pub async fn dispatch(notifier: &dyn NotificationDispatcher, notification: Notification) {
    if let Err(e) = notifier.notify(&notification).await {
        NOTIFICATION_FAILURES_TOTAL.inc();
        tracing::warn!(
            error = %e,
            title = %notification.title,
            recipient = ?notification.recipient,
            "Failed to dispatch notification"
        );
    }
}

/// Dispatcher that only writes the notification to the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationDispatcher for LogNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        tracing::info!(
            recipient = ?notification.recipient,
            title = %notification.title,
            priority = ?notification.priority,
            "Notification"
        );
        Ok(())
    }
}

/// Dispatcher that posts notifications to the notification service.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpNotifier {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Failed to build HTTP client: {}", e))
            })?;

        tracing::info!(base_url = %base_url, "Notification HTTP dispatcher configured");

        Ok(Self {
            client,
            endpoint: format!("{}/notifications", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl NotificationDispatcher for HttpNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        self.client
            .post(&self.endpoint)
            .json(notification)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Failing;

    #[async_trait]
    impl NotificationDispatcher for Failing {
        async fn notify(&self, _notification: &Notification) -> anyhow::Result<()> {
            anyhow::bail!("notification service down")
        }
    }

    fn sample() -> Notification {
        Notification {
            recipient: Recipient::role("admin"),
            title: "Contract voided".to_string(),
            message: "CTS-2024-ABC".to_string(),
            priority: Priority::High,
            action_url: None,
            data: json!({}),
        }
    }

    #[tokio::test]
    async fn dispatch_swallows_failures() {
        let before = NOTIFICATION_FAILURES_TOTAL.get();
        dispatch(&Failing, sample()).await;
        assert!(NOTIFICATION_FAILURES_TOTAL.get() >= before + 1.0);
    }

    #[test]
    fn recipient_serializes_tagged() {
        let value = serde_json::to_value(Recipient::role("admin")).unwrap();
        assert_eq!(value, json!({"type": "role", "value": "admin"}));
    }
}
