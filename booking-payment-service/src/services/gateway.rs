//! Payment gateway adapter.
//!
//! `PaymentGateway` is the seam the payment engine talks to; `RazorpayGateway`
//! implements it against Razorpay's Orders and Refunds APIs. Credentials come
//! from an injected `GatewayConfig`, never from process-wide state.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::utils::{sign_hex, verify_hex};

use crate::config::GatewayConfig;
use crate::error::PaymentError;

/// Order to open with the gateway. Amount in minor units.
#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
    pub amount: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<serde_json::Value>,
}

/// Order as acknowledged by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOrder {
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundReceipt {
    pub refund_id: String,
    pub payment_id: String,
    pub amount: i64,
    pub status: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key id handed to checkout clients.
    fn key_id(&self) -> &str;

    fn is_configured(&self) -> bool;

    async fn create_order(&self, request: CreateOrderRequest) -> Result<GatewayOrder, PaymentError>;

    /// `hex(HMAC-SHA256(secret, "{order_id}|{payment_id}"))`, compared in constant time.
    fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool, PaymentError>;

    /// `hex(HMAC-SHA256(webhook_secret, body))`, compared in constant time.
    fn verify_webhook_signature(&self, body: &str, signature: &str) -> Result<bool, PaymentError>;

    /// Refund a captured payment; `None` refunds it in full.
    async fn refund(
        &self,
        payment_id: &str,
        amount: Option<i64>,
        notes: Option<serde_json::Value>,
    ) -> Result<RefundReceipt, PaymentError>;
}

/// Razorpay order entity (subset).
#[derive(Debug, Deserialize)]
struct RazorpayOrder {
    id: String,
    amount: i64,
    currency: String,
    receipt: Option<String>,
    status: String,
}

/// Razorpay refund entity (subset).
#[derive(Debug, Deserialize)]
struct RazorpayRefund {
    id: String,
    payment_id: String,
    amount: i64,
    status: String,
}

#[derive(Debug, Serialize)]
struct RazorpayRefundRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RazorpayError {
    error: RazorpayErrorDetail,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorDetail {
    code: String,
    description: String,
}

/// Razorpay webhook event.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub payload: WebhookPayload,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub payment: Option<WebhookPaymentEntity>,
    pub order: Option<WebhookOrderEntity>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPaymentEntity {
    pub entity: WebhookPayment,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPayment {
    pub id: String,
    pub amount: i64,
    pub status: String,
    pub order_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookOrderEntity {
    pub entity: WebhookOrder,
}

#[derive(Debug, Deserialize)]
pub struct WebhookOrder {
    pub id: String,
    pub amount: i64,
}

impl WebhookEvent {
    pub fn parse(body: &str) -> Result<Self, PaymentError> {
        serde_json::from_str(body)
            .map_err(|e| PaymentError::Validation(format!("Invalid webhook payload: {}", e)))
    }
}

#[derive(Clone)]
pub struct RazorpayGateway {
    client: Client,
    config: GatewayConfig,
}

impl RazorpayGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, PaymentError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| PaymentError::Gateway(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn ensure_configured(&self) -> Result<(), PaymentError> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(PaymentError::GatewayUnavailable)
        }
    }

    fn provider_error(body: &str) -> String {
        match serde_json::from_str::<RazorpayError>(body) {
            Ok(error) => format!("{} - {}", error.error.code, error.error.description),
            Err(_) => body.to_string(),
        }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn key_id(&self) -> &str {
        &self.config.key_id
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    async fn create_order(&self, request: CreateOrderRequest) -> Result<GatewayOrder, PaymentError> {
        self.ensure_configured()?;

        let url = format!("{}/orders", self.config.api_base_url);

        let response = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Razorpay create_order request failed");
                PaymentError::Gateway(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PaymentError::Gateway(e.to_string()))?;

        tracing::debug!(status = %status, "Razorpay create_order response");

        if !status.is_success() {
            let message = Self::provider_error(&body);
            tracing::error!(status = %status, error = %message, "Razorpay order creation failed");
            return Err(PaymentError::Gateway(message));
        }

        let order: RazorpayOrder = serde_json::from_str(&body)
            .map_err(|e| PaymentError::Gateway(format!("Unexpected order response: {}", e)))?;

        tracing::info!(
            order_id = %order.id,
            amount = order.amount,
            currency = %order.currency,
            status = %order.status,
            "Razorpay order created"
        );

        Ok(GatewayOrder {
            order_id: order.id,
            amount: order.amount,
            currency: order.currency,
            receipt: order.receipt,
        })
    }

    fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool, PaymentError> {
        self.ensure_configured()?;
        let payload = format!("{}|{}", order_id, payment_id);
        let is_valid = verify_hex(self.config.key_secret.expose_secret(), &payload, signature)
            .map_err(|e| PaymentError::Gateway(e.to_string()))?;

        if !is_valid {
            tracing::warn!(
                order_id = %order_id,
                payment_id = %payment_id,
                "Payment signature verification failed"
            );
        }
        Ok(is_valid)
    }

    fn verify_webhook_signature(&self, body: &str, signature: &str) -> Result<bool, PaymentError> {
        let secret = self.config.webhook_secret.expose_secret();
        if secret.is_empty() {
            return Err(PaymentError::GatewayUnavailable);
        }
        let is_valid =
            verify_hex(secret, body, signature).map_err(|e| PaymentError::Gateway(e.to_string()))?;

        if !is_valid {
            tracing::warn!("Webhook signature verification failed");
        }
        Ok(is_valid)
    }

    async fn refund(
        &self,
        payment_id: &str,
        amount: Option<i64>,
        notes: Option<serde_json::Value>,
    ) -> Result<RefundReceipt, PaymentError> {
        self.ensure_configured()?;

        let url = format!("{}/payments/{}/refund", self.config.api_base_url, payment_id);

        let response = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .json(&RazorpayRefundRequest { amount, notes })
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, payment_id = %payment_id, "Razorpay refund request failed");
                PaymentError::Refund(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PaymentError::Refund(e.to_string()))?;

        if !status.is_success() {
            let message = Self::provider_error(&body);
            tracing::error!(status = %status, payment_id = %payment_id, error = %message, "Razorpay refund failed");
            return Err(PaymentError::Refund(message));
        }

        let refund: RazorpayRefund = serde_json::from_str(&body)
            .map_err(|e| PaymentError::Refund(format!("Unexpected refund response: {}", e)))?;

        tracing::info!(
            refund_id = %refund.id,
            payment_id = %refund.payment_id,
            amount = refund.amount,
            "Razorpay refund created"
        );

        Ok(RefundReceipt {
            refund_id: refund.id,
            payment_id: refund.payment_id,
            amount: refund.amount,
            status: refund.status,
        })
    }
}

/// Sign `"{order_id}|{payment_id}"` the way checkout does; used for fixtures and tooling.
pub fn payment_signature(secret: &str, order_id: &str, payment_id: &str) -> Result<String, PaymentError> {
    sign_hex(secret, &format!("{}|{}", order_id, payment_id))
        .map_err(|e| PaymentError::Gateway(e.to_string()))
}
