//! Outbound customer notifications.
//!
//! Delivery is best-effort: the payment flow never fails because a message
//! could not be sent.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::NotificationConfig;

#[derive(Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    CashOtp {
        user_id: String,
        booking_id: String,
        code: String,
        amount: i64,
    },
    PaymentConfirmed {
        user_id: String,
        booking_id: String,
        amount: i64,
        method: String,
    },
    RefundProcessed {
        user_id: String,
        booking_id: String,
        amount: i64,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CashOtp { .. } => "cash_otp",
            Self::PaymentConfirmed { .. } => "payment_confirmed",
            Self::RefundProcessed { .. } => "refund_processed",
        }
    }

    pub fn booking_id(&self) -> &str {
        match self {
            Self::CashOtp { booking_id, .. }
            | Self::PaymentConfirmed { booking_id, .. }
            | Self::RefundProcessed { booking_id, .. } => booking_id,
        }
    }
}

// Hand-written so the OTP never lands in a log line.
impl std::fmt::Debug for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notification")
            .field("kind", &self.kind())
            .field("booking_id", &self.booking_id())
            .finish()
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Used when no notification endpoint is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        tracing::info!(
            kind = notification.kind(),
            booking_id = %notification.booking_id(),
            "Notification endpoint not configured, message dropped"
        );
        Ok(())
    }
}

/// Posts notifications to the notification service.
pub struct HttpNotifier {
    client: Client,
    endpoint: String,
}

impl HttpNotifier {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        let response = self
            .client
            .post(format!("{}/notifications", self.endpoint))
            .json(notification)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("notification service returned {}", response.status());
        }
        Ok(())
    }
}

/// Wraps a [`Notifier`] with a deadline and swallows failures.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        Self { notifier, timeout }
    }

    pub fn from_config(config: &NotificationConfig) -> anyhow::Result<Self> {
        let notifier: Arc<dyn Notifier> = match config.endpoint.as_deref() {
            Some(endpoint) if !endpoint.is_empty() => {
                Arc::new(HttpNotifier::new(endpoint, config.timeout())?)
            }
            _ => Arc::new(LogNotifier),
        };
        Ok(Self::new(notifier, config.timeout()))
    }

    pub async fn dispatch(&self, notification: Notification) {
        match tokio::time::timeout(self.timeout, self.notifier.send(&notification)).await {
            Ok(Ok(())) => {
                tracing::debug!(
                    kind = notification.kind(),
                    booking_id = %notification.booking_id(),
                    "Notification sent"
                );
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    error = ?e,
                    kind = notification.kind(),
                    booking_id = %notification.booking_id(),
                    "Notification delivery failed"
                );
            }
            Err(_) => {
                tracing::warn!(
                    kind = notification.kind(),
                    booking_id = %notification.booking_id(),
                    "Notification delivery timed out"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send(&self, _notification: &Notification) -> anyhow::Result<()> {
            anyhow::bail!("smtp down")
        }
    }

    struct SlowNotifier;

    #[async_trait]
    impl Notifier for SlowNotifier {
        async fn send(&self, _notification: &Notification) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    fn otp() -> Notification {
        Notification::CashOtp {
            user_id: "user_1".to_string(),
            booking_id: "bk_1".to_string(),
            code: "0427".to_string(),
            amount: 95_000,
        }
    }

    #[test]
    fn debug_output_hides_code() {
        let rendered = format!("{:?}", otp());
        assert!(!rendered.contains("0427"));
        assert!(rendered.contains("cash_otp"));
    }

    #[tokio::test]
    async fn dispatch_swallows_failures() {
        let dispatcher =
            NotificationDispatcher::new(Arc::new(FailingNotifier), Duration::from_millis(100));
        dispatcher.dispatch(otp()).await;
    }

    #[tokio::test]
    async fn dispatch_gives_up_after_timeout() {
        let dispatcher =
            NotificationDispatcher::new(Arc::new(SlowNotifier), Duration::from_millis(20));
        let started = std::time::Instant::now();
        dispatcher.dispatch(otp()).await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(Notification::RefundProcessed {
            user_id: "user_1".to_string(),
            booking_id: "bk_1".to_string(),
            amount: 500,
        })
        .unwrap();
        assert_eq!(json["type"], "refund_processed");
        assert_eq!(json["amount"], 500);
    }
}
