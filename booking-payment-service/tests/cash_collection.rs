mod common;

use common::{test_config, TestApp, TEST_VENDOR_ID};
use serde_json::{json, Value};

fn pipe() -> Value {
    json!([{ "name": "Pipe", "price": 100, "qty": 2 }])
}

fn wrong_code(code: &str) -> &'static str {
    if code == "0000" {
        "1111"
    } else {
        "0000"
    }
}

async fn initiate(app: &TestApp, booking_id: &str, total: u64, extras: Value) -> reqwest::Response {
    app.post_as_vendor(
        &format!("/bookings/{}/cash/initiate", booking_id),
        TEST_VENDOR_ID,
        json!({ "total": total, "extra_items": extras }),
    )
    .await
}

async fn confirm(
    app: &TestApp,
    booking_id: &str,
    code: &str,
    total: u64,
    extras: Value,
) -> reqwest::Response {
    app.post_as_vendor(
        &format!("/bookings/{}/cash/confirm", booking_id),
        TEST_VENDOR_ID,
        json!({ "code": code, "total": total, "extra_items": extras }),
    )
    .await
}

#[tokio::test]
async fn cash_collection_with_extras_records_bill_and_dues() {
    let app = TestApp::spawn().await;
    app.seed_booking("bk_cash", "cash", 750, "ARRIVED").await;

    let response = initiate(&app, "bk_cash", 950, pipe()).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["otp_sent"], true);
    assert_eq!(body["total"], "950.00");
    assert!(body.get("code").is_none());

    let code = app.notifier.last_otp("bk_cash").expect("OTP was not sent");
    let response = confirm(&app, "bk_cash", &code, 950, pipe()).await;
    assert_eq!(response.status().as_u16(), 200);

    let booking: Value = response.json().await.unwrap();
    assert_eq!(booking["payment_status"], "COLLECTED_BY_VENDOR");
    assert_eq!(booking["final_amount"], "950.00");
    assert_eq!(booking["admin_commission"], "95.00");
    let extras = booking["extra_charges"].as_array().unwrap();
    assert_eq!(extras.len(), 1);
    assert_eq!(extras[0]["name"], "Pipe");
    assert_eq!(extras[0]["unit_price"], "100.00");
    assert_eq!(extras[0]["qty"], 2);
    assert_eq!(extras[0]["line_total"], "200.00");

    let ledger: Value = app
        .get_as_vendor(&format!("/vendors/{}/ledger", TEST_VENDOR_ID), TEST_VENDOR_ID)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(ledger["dues"], "95.00");
    assert_eq!(ledger["suspended"], false);
}

#[tokio::test]
async fn otp_is_single_use() {
    let app = TestApp::spawn().await;
    app.seed_booking("bk_once", "cash", 750, "ARRIVED").await;
    initiate(&app, "bk_once", 750, json!([])).await;
    let code = app.notifier.last_otp("bk_once").unwrap();

    let first = confirm(&app, "bk_once", &code, 750, json!([])).await;
    assert_eq!(first.status().as_u16(), 200);

    let second = confirm(&app, "bk_once", &code, 750, json!([])).await;
    assert_eq!(second.status().as_u16(), 400);

    let ledger = app
        .state
        .services
        .wallet
        .vendor_ledger(TEST_VENDOR_ID)
        .await
        .unwrap();
    assert_eq!(ledger.dues, 7_500);
}

#[tokio::test]
async fn expired_otp_is_rejected() {
    let mut config = test_config();
    config.cash.otp_ttl_secs = 0;
    let app = TestApp::spawn_with(config).await;
    app.seed_booking("bk_late", "cash", 750, "ARRIVED").await;
    initiate(&app, "bk_late", 750, json!([])).await;
    let code = app.notifier.last_otp("bk_late").unwrap();

    let response = confirm(&app, "bk_late", &code, 750, json!([])).await;
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "OTP has expired, request a new one");
    assert_eq!(app.booking("bk_late").await["payment_status"], "NONE");
}

#[tokio::test]
async fn repeated_wrong_codes_lock_the_challenge() {
    let app = TestApp::spawn().await;
    app.seed_booking("bk_lock", "cash", 750, "ARRIVED").await;
    initiate(&app, "bk_lock", 750, json!([])).await;
    let code = app.notifier.last_otp("bk_lock").unwrap();

    for _ in 0..5 {
        let response = confirm(&app, "bk_lock", wrong_code(&code), 750, json!([])).await;
        assert_eq!(response.status().as_u16(), 400);
    }

    let response = confirm(&app, "bk_lock", &code, 750, json!([])).await;
    assert_eq!(response.status().as_u16(), 400);
    assert!(app.booking("bk_lock").await["otp_challenge"].is_null());

    // A fresh challenge starts over.
    initiate(&app, "bk_lock", 750, json!([])).await;
    let code = app.notifier.last_otp("bk_lock").unwrap();
    let response = confirm(&app, "bk_lock", &code, 750, json!([])).await;
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn a_few_wrong_codes_still_allow_the_right_one() {
    let app = TestApp::spawn().await;
    app.seed_booking("bk_typo", "cash", 750, "ARRIVED").await;
    initiate(&app, "bk_typo", 750, json!([])).await;
    let code = app.notifier.last_otp("bk_typo").unwrap();

    confirm(&app, "bk_typo", wrong_code(&code), 750, json!([])).await;
    confirm(&app, "bk_typo", wrong_code(&code), 750, json!([])).await;
    assert_eq!(app.booking("bk_typo").await["otp_challenge"]["attempts"], 2);

    let response = confirm(&app, "bk_typo", &code, 750, json!([])).await;
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn attempts_up_to_the_ceiling_keep_the_challenge_open() {
    let mut config = test_config();
    config.cash.otp_max_attempts = 3;
    let app = TestApp::spawn_with(config).await;
    app.seed_booking("bk_edge", "cash", 750, "ARRIVED").await;
    initiate(&app, "bk_edge", 750, json!([])).await;
    let code = app.notifier.last_otp("bk_edge").unwrap();

    confirm(&app, "bk_edge", wrong_code(&code), 750, json!([])).await;
    confirm(&app, "bk_edge", wrong_code(&code), 750, json!([])).await;
    assert_eq!(app.booking("bk_edge").await["otp_challenge"]["attempts"], 2);

    // The third wrong code spends the challenge; a fourth attempt exceeds the ceiling.
    confirm(&app, "bk_edge", wrong_code(&code), 750, json!([])).await;
    assert!(app.booking("bk_edge").await["otp_challenge"].is_null());
    let response = confirm(&app, "bk_edge", &code, 750, json!([])).await;
    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(app.booking("bk_edge").await["payment_status"], "NONE");
}

#[tokio::test]
async fn reinitiation_supersedes_the_previous_code() {
    let app = TestApp::spawn().await;
    app.seed_booking("bk_again", "cash", 750, "ARRIVED").await;
    initiate(&app, "bk_again", 750, json!([])).await;
    let first = app.notifier.last_otp("bk_again").unwrap();
    let first_issue = app.booking("bk_again").await["otp_challenge"]["issued_at"].clone();

    initiate(&app, "bk_again", 950, pipe()).await;
    let second = app.notifier.last_otp("bk_again").unwrap();
    let challenge = app.booking("bk_again").await["otp_challenge"].clone();
    assert_ne!(challenge["issued_at"], first_issue);
    assert_eq!(challenge["total"], "950.00");
    assert_eq!(challenge["attempts"], 0);

    // The old code against the bill it was issued for no longer matches anything.
    let response = confirm(&app, "bk_again", &first, 750, json!([])).await;
    assert_eq!(response.status().as_u16(), 400);
    let challenge = app.booking("bk_again").await["otp_challenge"].clone();
    assert_eq!(challenge["attempts"], 1);
    assert_eq!(app.booking("bk_again").await["payment_status"], "NONE");

    let response = confirm(&app, "bk_again", &second, 950, pipe()).await;
    assert_eq!(response.status().as_u16(), 200);
    let booking: Value = response.json().await.unwrap();
    assert_eq!(booking["final_amount"], "950.00");
}

#[tokio::test]
async fn confirmation_must_match_the_bill_the_customer_approved() {
    let app = TestApp::spawn().await;
    app.seed_booking("bk_bill", "cash", 750, "ARRIVED").await;
    initiate(&app, "bk_bill", 950, pipe()).await;
    let code = app.notifier.last_otp("bk_bill").unwrap();

    let response = confirm(&app, "bk_bill", &code, 750, json!([])).await;
    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(app.booking("bk_bill").await["payment_status"], "NONE");
}

#[tokio::test]
async fn initiation_validates_total_status_and_rail() {
    let app = TestApp::spawn().await;
    app.seed_booking("bk_early", "cash", 750, "CONFIRMED").await;
    app.seed_booking("bk_online", "wallet", 750, "ARRIVED").await;

    let response = initiate(&app, "bk_early", 750, json!([])).await;
    assert_eq!(response.status().as_u16(), 400);

    app.set_status("bk_early", "ARRIVED").await;
    let response = initiate(&app, "bk_early", 900, json!([])).await;
    assert_eq!(response.status().as_u16(), 400);
    let response = initiate(&app, "bk_early", 750, json!([])).await;
    assert_eq!(response.status().as_u16(), 200);

    let response = initiate(&app, "bk_online", 750, json!([])).await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn only_the_booking_vendor_can_collect() {
    let app = TestApp::spawn().await;
    app.seed_booking("bk_vendor", "cash", 750, "ARRIVED").await;

    let response = app
        .post_as_vendor(
            "/bookings/bk_vendor/cash/initiate",
            "vendor_other",
            json!({ "total": 750 }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 404);

    let response = app
        .post(
            "/bookings/bk_vendor/cash/initiate",
            json!({ "total": 750 }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 401);
    assert!(app.notifier.last_otp("bk_vendor").is_none());
}

#[tokio::test]
async fn plan_benefit_collects_only_the_extras() {
    let app = TestApp::spawn().await;
    app.seed_booking("bk_plan", "plan_benefit", 500, "IN_PROGRESS").await;

    let response = initiate(&app, "bk_plan", 700, pipe()).await;
    assert_eq!(response.status().as_u16(), 400);

    let response = initiate(&app, "bk_plan", 200, pipe()).await;
    assert_eq!(response.status().as_u16(), 200);
    let code = app.notifier.last_otp("bk_plan").unwrap();

    let response = confirm(&app, "bk_plan", &code, 200, pipe()).await;
    assert_eq!(response.status().as_u16(), 200);
    let booking: Value = response.json().await.unwrap();
    assert_eq!(booking["final_amount"], "200.00");
    assert_eq!(booking["payment_status"], "COLLECTED_BY_VENDOR");
    assert_eq!(booking["admin_commission"], "20.00");

    // Commission on the collected extras only; the covered base owes nothing.
    let ledger = app
        .state
        .services
        .wallet
        .vendor_ledger(TEST_VENDOR_ID)
        .await
        .unwrap();
    assert_eq!(ledger.dues, 2_000);
}

#[tokio::test]
async fn dues_over_the_limit_suspend_until_settled() {
    let mut config = test_config();
    config.cash.default_cash_limit = 5_000;
    let app = TestApp::spawn_with(config).await;
    app.seed_booking("bk_dues", "cash", 750, "ARRIVED").await;
    initiate(&app, "bk_dues", 950, pipe()).await;
    let code = app.notifier.last_otp("bk_dues").unwrap();
    confirm(&app, "bk_dues", &code, 950, pipe()).await;

    let path = format!("/vendors/{}/ledger", TEST_VENDOR_ID);
    let ledger: Value = app
        .get_as_vendor(&path, TEST_VENDOR_ID)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(ledger["dues"], "95.00");
    assert_eq!(ledger["suspended"], true);

    let settlements = format!("/vendors/{}/settlements", TEST_VENDOR_ID);
    let response = app
        .post(&settlements, json!({ "amount": 100, "proof": "UTR-1" }))
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app
        .post(&settlements, json!({ "amount": 95, "proof": "UTR-2" }))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let ledger: Value = response.json().await.unwrap();
    assert_eq!(ledger["dues"], "0.00");
    assert_eq!(ledger["suspended"], false);
    assert_eq!(ledger["settlement_history"][0]["proof"], "UTR-2");
}

#[tokio::test]
async fn vendor_ledger_is_private() {
    let app = TestApp::spawn().await;

    let response = app
        .get_as_vendor(&format!("/vendors/{}/ledger", TEST_VENDOR_ID), "vendor_other")
        .await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn confirmation_racing_reinitiation_never_collects_a_superseded_bill() {
    let app = TestApp::spawn().await;

    for n in 0..8 {
        let id = format!("bk_race_{}", n);
        app.seed_booking(&id, "cash", 750, "ARRIVED").await;
        initiate(&app, &id, 750, json!([])).await;
        let code = app.notifier.last_otp(&id).unwrap();

        let (confirmed, reissued) = tokio::join!(
            confirm(&app, &id, &code, 750, json!([])),
            initiate(&app, &id, 950, pipe()),
        );
        let confirmed = confirmed.status().is_success();
        let reissued = reissued.status().is_success();
        assert!(confirmed != reissued, "{}: confirm={} initiate={}", id, confirmed, reissued);

        let booking = app.booking(&id).await;
        if confirmed {
            assert_eq!(booking["payment_status"], "COLLECTED_BY_VENDOR");
            assert_eq!(booking["final_amount"], "750.00");
        } else {
            assert_eq!(booking["payment_status"], "NONE");
            assert_eq!(booking["otp_challenge"]["total"], "950.00");
        }
    }

    let ledger = app
        .state
        .services
        .wallet
        .vendor_ledger(TEST_VENDOR_ID)
        .await
        .unwrap();
    assert_eq!(ledger.dues % 7_500, 0);
}

#[tokio::test]
async fn oversized_bills_are_rejected_without_touching_the_booking() {
    let app = TestApp::spawn().await;
    app.seed_booking("bk_huge", "cash", 750, "ARRIVED").await;

    let bills = [
        json!([{ "name": "Gold tap", "price": "79228162514264337593543950335", "qty": 1 }]),
        json!([{ "name": "Gold tap", "price": "9000000000", "qty": 1_000 }]),
    ];
    for extras in bills {
        let response = initiate(&app, "bk_huge", 950, extras.clone()).await;
        assert_eq!(response.status().as_u16(), 400, "extras {}", extras);
    }

    let booking = app.booking("bk_huge").await;
    assert!(booking["otp_challenge"].is_null());
    assert!(app.notifier.last_otp("bk_huge").is_none());
}
