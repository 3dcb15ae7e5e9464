#![allow(dead_code)]

use async_trait::async_trait;
use booking_payment_service::config::{
    CashCollectionConfig, Config, DatabaseConfig, GatewayConfig, NotificationConfig,
    ObservabilityConfig, PricingConfig, ServerConfig, StorageBackend,
};
use booking_payment_service::error::PaymentError;
use booking_payment_service::models::WalletReason;
use booking_payment_service::services::gateway::{
    payment_signature, CreateOrderRequest, GatewayOrder, RefundReceipt,
};
use booking_payment_service::services::notifier::Notification;
use booking_payment_service::services::{
    InMemoryPaymentStore, NotificationDispatcher, Notifier, PaymentGateway, PaymentStore,
};
use booking_payment_service::{AppState, Application};
use reqwest::{Client, Response};
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::utils::sign_hex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEST_KEY_ID: &str = "rzp_test_key";
pub const TEST_KEY_SECRET: &str = "test_key_secret";
pub const TEST_WEBHOOK_SECRET: &str = "test_webhook_secret";

pub const TEST_USER_ID: &str = "user_1";
pub const TEST_VENDOR_ID: &str = "vendor_1";

/// Gateway double: sequential order ids, checkout-compatible signatures and
/// recorded refunds.
#[derive(Default)]
pub struct FakeGateway {
    next_order: AtomicU64,
    fail_refunds: AtomicBool,
    pub orders: Mutex<Vec<CreateOrderRequest>>,
    pub refunds: Mutex<Vec<(String, Option<i64>)>>,
}

impl FakeGateway {
    pub fn fail_refunds(&self, fail: bool) {
        self.fail_refunds.store(fail, Ordering::SeqCst);
    }

    pub fn refund_calls(&self) -> Vec<(String, Option<i64>)> {
        self.refunds.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn key_id(&self) -> &str {
        TEST_KEY_ID
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn create_order(&self, request: CreateOrderRequest) -> Result<GatewayOrder, PaymentError> {
        let n = self.next_order.fetch_add(1, Ordering::SeqCst) + 1;
        let order = GatewayOrder {
            order_id: format!("order_test_{}", n),
            amount: request.amount,
            currency: request.currency.clone(),
            receipt: request.receipt.clone(),
        };
        self.orders.lock().unwrap().push(request);
        Ok(order)
    }

    fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool, PaymentError> {
        Ok(payment_signature(TEST_KEY_SECRET, order_id, payment_id)? == signature)
    }

    fn verify_webhook_signature(&self, body: &str, signature: &str) -> Result<bool, PaymentError> {
        Ok(webhook_signature(body) == signature)
    }

    async fn refund(
        &self,
        payment_id: &str,
        amount: Option<i64>,
        _notes: Option<Value>,
    ) -> Result<RefundReceipt, PaymentError> {
        if self.fail_refunds.load(Ordering::SeqCst) {
            return Err(PaymentError::Refund("gateway declined the refund".to_string()));
        }
        let mut refunds = self.refunds.lock().unwrap();
        refunds.push((payment_id.to_string(), amount));
        Ok(RefundReceipt {
            refund_id: format!("rfnd_test_{}", refunds.len()),
            payment_id: payment_id.to_string(),
            amount: amount.unwrap_or_default(),
            status: "processed".to_string(),
        })
    }
}

/// Captures every notification so tests can read the OTP the customer got.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn last_otp(&self, booking: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|n| match n {
                Notification::CashOtp {
                    booking_id, code, ..
                } if booking_id == booking => Some(code.clone()),
                _ => None,
            })
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.sent.lock().unwrap().iter().map(|n| n.kind()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: DatabaseConfig {
            backend: StorageBackend::Memory,
            ..DatabaseConfig::default()
        },
        gateway: GatewayConfig {
            key_id: TEST_KEY_ID.to_string(),
            key_secret: Secret::new(TEST_KEY_SECRET.to_string()),
            webhook_secret: Secret::new(TEST_WEBHOOK_SECRET.to_string()),
            ..GatewayConfig::default()
        },
        cash: CashCollectionConfig::default(),
        pricing: PricingConfig::default(),
        notification: NotificationConfig::default(),
        observability: ObservabilityConfig::default(),
        service_name: "booking-payment-service-test".to_string(),
    }
}

pub fn signature_for(order_id: &str, payment_id: &str) -> String {
    payment_signature(TEST_KEY_SECRET, order_id, payment_id).unwrap()
}

pub fn webhook_signature(body: &str) -> String {
    sign_hex(TEST_WEBHOOK_SECRET, body).unwrap()
}

pub struct TestApp {
    pub address: String,
    pub client: Client,
    pub state: AppState,
    pub store: Arc<InMemoryPaymentStore>,
    pub gateway: Arc<FakeGateway>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config()).await
    }

    pub async fn spawn_with(config: Config) -> Self {
        let store = Arc::new(InMemoryPaymentStore::new());
        let gateway = Arc::new(FakeGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let store_port: Arc<dyn PaymentStore> = store.clone();
        let gateway_port: Arc<dyn PaymentGateway> = gateway.clone();
        let dispatcher = NotificationDispatcher::new(notifier.clone(), Duration::from_secs(1));

        let state = AppState::new(config, store_port, gateway_port, dispatcher, None);
        let app = Application::with_state(state.clone())
            .await
            .expect("Failed to build test application");
        let address = format!("http://127.0.0.1:{}", app.port());

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = Client::new();
        for _ in 0..50 {
            if client.get(format!("{}/health", address)).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        TestApp {
            address,
            client,
            state,
            store,
            gateway,
            notifier,
        }
    }

    pub async fn register_booking(&self, body: Value) -> Response {
        self.client
            .post(format!("{}/bookings", self.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Register a booking for `TEST_USER_ID` / `TEST_VENDOR_ID` and assert success.
    pub async fn seed_booking(&self, id: &str, method: &str, base_price: u64, status: &str) {
        let response = self
            .register_booking(json!({
                "id": id,
                "user_id": TEST_USER_ID,
                "vendor_id": TEST_VENDOR_ID,
                "worker_id": null,
                "status": status,
                "payment_method": method,
                "base_price": base_price,
            }))
            .await;
        assert_eq!(response.status().as_u16(), 201, "seeding booking {}", id);
    }

    pub async fn fund_wallet(&self, user_id: &str, amount_minor: i64) {
        self.state
            .services
            .wallet
            .credit(user_id, amount_minor, WalletReason::TopUp, None)
            .await
            .expect("Failed to fund wallet");
    }

    pub async fn set_status(&self, booking_id: &str, status: &str) -> Response {
        self.client
            .patch(format!("{}/bookings/{}/status", self.address, booking_id))
            .json(&json!({ "status": status }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get_as_user(&self, path: &str, user_id: &str) -> Response {
        self.client
            .get(format!("{}{}", self.address, path))
            .header("x-user-id", user_id)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get_as_vendor(&self, path: &str, vendor_id: &str) -> Response {
        self.client
            .get(format!("{}{}", self.address, path))
            .header("x-vendor-id", vendor_id)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_as_user(&self, path: &str, user_id: &str, body: Value) -> Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .header("x-user-id", user_id)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_as_vendor(&self, path: &str, vendor_id: &str, body: Value) -> Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .header("x-vendor-id", vendor_id)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post(&self, path: &str, body: Value) -> Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_webhook(&self, body: &str, signature: &str) -> Response {
        self.client
            .post(format!("{}/webhooks/gateway", self.address))
            .header("content-type", "application/json")
            .header("x-razorpay-signature", signature)
            .body(body.to_string())
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Open a gateway order for the booking and return its order id.
    pub async fn create_order(&self, booking_id: &str) -> String {
        let response = self
            .post_as_user(
                &format!("/bookings/{}/payment/order", booking_id),
                TEST_USER_ID,
                json!({}),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.unwrap();
        body["order_id"].as_str().unwrap().to_string()
    }

    pub async fn verify(&self, order_id: &str, payment_id: &str, signature: &str) -> Response {
        self.post(
            "/payments/verify",
            json!({
                "order_id": order_id,
                "payment_id": payment_id,
                "signature": signature,
            }),
        )
        .await
    }

    pub async fn booking(&self, booking_id: &str) -> Value {
        self.get_as_user(&format!("/bookings/{}", booking_id), TEST_USER_ID)
            .await
            .json()
            .await
            .unwrap()
    }

    pub async fn wallet_balance(&self, user_id: &str) -> i64 {
        self.state.services.wallet.balance(user_id).await.unwrap()
    }
}
