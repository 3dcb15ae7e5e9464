use booking_payment_service::config::GatewayConfig;
use booking_payment_service::error::PaymentError;
use booking_payment_service::services::gateway::CreateOrderRequest;
use booking_payment_service::services::{PaymentGateway, RazorpayGateway};
use secrecy::Secret;
use serde_json::json;
use wiremock::matchers::{body_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway_for(server: &MockServer) -> RazorpayGateway {
    RazorpayGateway::new(GatewayConfig {
        key_id: "rzp_test_key".to_string(),
        key_secret: Secret::new("secret".to_string()),
        webhook_secret: Secret::new("hook".to_string()),
        api_base_url: server.uri(),
        ..GatewayConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn create_order_posts_minor_units() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(header_exists("authorization"))
        .and(body_json(json!({
            "amount": 50_000,
            "currency": "INR",
            "receipt": "bk_1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "order_abc",
            "amount": 50_000,
            "currency": "INR",
            "receipt": "bk_1",
            "status": "created"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let order = gateway_for(&server)
        .create_order(CreateOrderRequest {
            amount: 50_000,
            currency: "INR".to_string(),
            receipt: Some("bk_1".to_string()),
            notes: None,
        })
        .await
        .unwrap();

    assert_eq!(order.order_id, "order_abc");
    assert_eq!(order.amount, 50_000);
}

#[tokio::test]
async fn provider_errors_surface_as_gateway_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": "BAD_REQUEST_ERROR", "description": "amount too small"}
        })))
        .mount(&server)
        .await;

    let err = gateway_for(&server)
        .create_order(CreateOrderRequest {
            amount: 1,
            currency: "INR".to_string(),
            receipt: None,
            notes: None,
        })
        .await
        .unwrap_err();

    match err {
        PaymentError::Gateway(message) => {
            assert_eq!(message, "BAD_REQUEST_ERROR - amount too small")
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn partial_refund_sends_amount() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payments/pay_1/refund"))
        .and(body_json(json!({ "amount": 20_000 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "rfnd_1",
            "payment_id": "pay_1",
            "amount": 20_000,
            "status": "processed"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = gateway_for(&server)
        .refund("pay_1", Some(20_000), None)
        .await
        .unwrap();

    assert_eq!(receipt.refund_id, "rfnd_1");
    assert_eq!(receipt.amount, 20_000);
}

#[tokio::test]
async fn declined_refund_is_a_refund_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payments/pay_1/refund"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": "BAD_REQUEST_ERROR", "description": "fully refunded already"}
        })))
        .mount(&server)
        .await;

    let err = gateway_for(&server)
        .refund("pay_1", None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::Refund(_)));
}
