//! Contract Factory integration tests.

mod common;

use common::{body, dec, TestApp};
use contract_service::error::ContractError;
use contract_service::models::PaymentFrequency;
use contract_service::services::{ContractStore, CreateContract, FaultPoint};
use rust_decimal::Decimal;
use serde_json::json;

#[tokio::test]
async fn monthly_contract_has_twelve_equal_installments() {
    let app = TestApp::spawn().await;
    let reservation = app.seed_reservation(900_000, 0).await;

    let data = app
        .create_contract(reservation.reservation_id, 12, "monthly")
        .await;

    let contract = &data["contract"];
    let year = chrono::Utc::now().format("%Y").to_string();
    assert_eq!(
        contract["contract_number"],
        format!("CTS-{}-7F3A9C21", year)
    );
    assert_eq!(dec(&contract["downpayment_total"]), Decimal::from(90_000));
    assert_eq!(dec(&contract["bank_financing_amount"]), Decimal::from(810_000));
    assert_eq!(dec(&contract["remaining_balance"]), Decimal::from(90_000));
    assert_eq!(contract["contract_status"], "active");
    assert_eq!(contract["downpayment_status"], "in_progress");

    let schedules = data["schedules"].as_array().unwrap();
    assert_eq!(schedules.len(), 12);
    for (i, row) in schedules.iter().enumerate() {
        assert_eq!(row["installment_number"], i as i64 + 1);
        assert_eq!(dec(&row["scheduled_amount"]), Decimal::from(7_500));
        assert_eq!(row["payment_status"], "pending");
    }
    assert_eq!(
        contract["final_installment_date"],
        schedules[11]["due_date"]
    );

    let titles = app.notifier.titles().await;
    assert!(titles.iter().any(|t| t == "Contract created"));
}

#[tokio::test]
async fn weekly_contract_uses_fifty_two_installments() {
    let app = TestApp::spawn().await;
    let reservation = app.seed_reservation(900_000, 0).await;

    let data = app
        .create_contract(reservation.reservation_id, 12, "weekly")
        .await;

    let schedules = data["schedules"].as_array().unwrap();
    assert_eq!(schedules.len(), 52);
    assert_eq!(dec(&schedules[0]["scheduled_amount"]), Decimal::new(173_077, 2));
    assert_eq!(dec(&data["contract"]["monthly_installment"]), Decimal::from(7_500));
}

#[tokio::test]
async fn second_create_returns_existing_contract() {
    let app = TestApp::spawn().await;
    let reservation = app.seed_reservation(900_000, 0).await;
    let first = app
        .create_contract(reservation.reservation_id, 12, "monthly")
        .await;

    let response = app
        .post(
            "/contracts",
            json!({
                "reservation_id": reservation.reservation_id,
                "payment_plan_months": 6,
                "payment_frequency": "daily",
            }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 409);
    let body = body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "CONTRACT_ALREADY_EXISTS");
    assert_eq!(body["data"]["contract_id"], first["contract"]["contract_id"]);
    assert_eq!(app.store.contract_count().await, 1);
}

#[tokio::test]
async fn unapproved_reservation_is_not_found() {
    let app = TestApp::spawn().await;
    let reservation = app
        .seed_reservation_with(900_000, 0, "pending", None)
        .await;

    let response = app
        .post(
            "/contracts",
            json!({
                "reservation_id": reservation.reservation_id,
                "payment_plan_months": 12,
                "payment_frequency": "monthly",
            }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 404);
    assert_eq!(body(response).await["error"], "RESERVATION_NOT_FOUND");
}

#[tokio::test]
async fn rejects_bad_plan_inputs() {
    let app = TestApp::spawn().await;
    let reservation = app.seed_reservation(900_000, 0).await;

    let cases = [
        (json!(12), "quarterly", "INVALID_FREQUENCY"),
        (json!(0), "monthly", "INVALID_PLAN_RANGE"),
        (json!(61), "weekly", "INVALID_PLAN_RANGE"),
    ];
    for (months, frequency, code) in cases {
        let response = app
            .post(
                "/contracts",
                json!({
                    "reservation_id": reservation.reservation_id,
                    "payment_plan_months": months,
                    "payment_frequency": frequency,
                }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 422, "{}", code);
        assert_eq!(body(response).await["error"], code);
    }
    assert_eq!(app.store.contract_count().await, 0);
}

#[tokio::test]
async fn malformed_body_uses_error_envelope() {
    let app = TestApp::spawn().await;

    let response = app
        .post("/contracts", json!({ "reservation_id": "not-a-uuid" }))
        .await;

    assert_eq!(response.status().as_u16(), 422);
    let body = body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "VALIDATION_ERROR");
    assert!(body["message"].as_str().is_some());
}

#[tokio::test]
async fn failed_schedule_insert_leaves_no_contract() {
    let app = TestApp::spawn().await;
    let reservation = app.seed_reservation(900_000, 0).await;
    app.store.fail_on(FaultPoint::InsertSchedules).await;

    let result = app
        .state
        .contracts
        .create(CreateContract {
            reservation_id: reservation.reservation_id,
            payment_plan_months: 12,
            payment_frequency: PaymentFrequency::Monthly,
            allow_partial_payments: false,
        })
        .await;

    assert!(matches!(result, Err(ContractError::Persistence(_))));
    assert_eq!(app.store.contract_count().await, 0);
    assert!(app
        .store
        .find_contract_by_reservation(reservation.reservation_id)
        .await
        .unwrap()
        .is_none());

    // The reservation can still be converted once the store recovers.
    app.store.clear_faults().await;
    let data = app
        .create_contract(reservation.reservation_id, 12, "monthly")
        .await;
    assert_eq!(data["schedules"].as_array().unwrap().len(), 12);
}

#[tokio::test]
async fn fee_covering_downpayment_creates_completed_contract() {
    let app = TestApp::spawn().await;
    let reservation = app.seed_reservation(100_000, 12_000).await;

    let data = app
        .create_contract(reservation.reservation_id, 12, "monthly")
        .await;

    assert_eq!(data["schedules"].as_array().unwrap().len(), 0);
    assert_eq!(data["contract"]["downpayment_status"], "completed");
    assert_eq!(dec(&data["contract"]["remaining_balance"]), Decimal::ZERO);
    assert!(data["contract"]["final_installment_date"].is_null());
}

#[tokio::test]
async fn get_contract_returns_schedules() {
    let app = TestApp::spawn().await;
    let reservation = app.seed_reservation(900_000, 0).await;
    let data = app
        .create_contract(reservation.reservation_id, 3, "monthly")
        .await;
    let contract_id = data["contract"]["contract_id"].as_str().unwrap();

    let response = app.get(&format!("/contracts/{}", contract_id)).await;
    assert_eq!(response.status().as_u16(), 200);
    let body = body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["schedules"].as_array().unwrap().len(), 3);

    let response = app
        .get(&format!("/contracts/{}", uuid::Uuid::new_v4()))
        .await;
    assert_eq!(response.status().as_u16(), 404);

    let response = app.get("/contracts/not-a-uuid").await;
    assert_eq!(response.status().as_u16(), 422);
}

#[tokio::test]
async fn plan_range_is_checked_before_the_reservation() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/contracts",
            json!({
                "reservation_id": uuid::Uuid::new_v4(),
                "payment_plan_months": 0,
                "payment_frequency": "monthly",
            }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 422);
    assert_eq!(body(response).await["error"], "INVALID_PLAN_RANGE");
}
