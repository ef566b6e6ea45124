//! Void Controller integration tests.

mod common;

use common::{body, TestApp};
use contract_service::models::PropertyAvailability;
use contract_service::services::{ContractStore, FaultPoint};
use serde_json::{json, Value};
use uuid::Uuid;

struct Voidable {
    contract_id: String,
    property_id: Uuid,
    data: Value,
}

async fn voidable_contract(app: &TestApp) -> Voidable {
    let reservation = app.seed_reservation(900_000, 0).await;
    let data = app
        .create_contract(reservation.reservation_id, 12, "monthly")
        .await;
    Voidable {
        contract_id: data["contract"]["contract_id"].as_str().unwrap().to_string(),
        property_id: reservation.property_id.unwrap(),
        data,
    }
}

#[tokio::test]
async fn void_releases_property_and_removes_schedules() {
    let app = TestApp::spawn().await;
    let c = voidable_contract(&app).await;

    let response = app
        .post_empty(&format!("/contracts/{}/void", c.contract_id))
        .await;

    assert_eq!(response.status().as_u16(), 200);
    let outcome = body(response).await["data"].clone();
    assert_eq!(outcome["contract"]["contract_status"], "voided");
    assert_eq!(
        outcome["contract"]["void_reason"],
        "Non-payment for 3 consecutive months"
    );
    assert!(!outcome["contract"]["voided_at"].is_null());
    assert_eq!(outcome["schedules_removed"], 12);
    assert_eq!(outcome["property_released"], true);
    assert_eq!(outcome["cleanup_warnings"].as_array().unwrap().len(), 0);
    assert_eq!(
        app.store.property_availability(c.property_id).await,
        Some(PropertyAvailability::Available)
    );

    let titles = app.notifier.titles().await;
    assert!(titles.iter().any(|t| t == "Contract voided"));
}

#[tokio::test]
async fn void_uses_the_given_reason() {
    let app = TestApp::spawn().await;
    let c = voidable_contract(&app).await;

    let response = app
        .post(
            &format!("/contracts/{}/void", c.contract_id),
            json!({ "reason": "Buyer withdrew" }),
        )
        .await;

    let outcome = body(response).await["data"].clone();
    assert_eq!(outcome["contract"]["void_reason"], "Buyer withdrew");
}

#[tokio::test]
async fn void_is_terminal() {
    let app = TestApp::spawn().await;
    let c = voidable_contract(&app).await;
    app.post_empty(&format!("/contracts/{}/void", c.contract_id))
        .await;

    let response = app
        .post_empty(&format!("/contracts/{}/void", c.contract_id))
        .await;
    assert_eq!(response.status().as_u16(), 409);
    assert_eq!(body(response).await["error"], "CONTRACT_ALREADY_VOIDED");

    let response = app
        .post_empty(&format!("/contracts/{}/void", Uuid::new_v4()))
        .await;
    assert_eq!(response.status().as_u16(), 404);
    assert_eq!(body(response).await["error"], "CONTRACT_NOT_FOUND");
}

#[tokio::test]
async fn property_is_released_even_when_purge_fails() {
    let app = TestApp::spawn().await;
    let c = voidable_contract(&app).await;
    app.store.fail_on(FaultPoint::PurgeBilling).await;

    let response = app
        .post_empty(&format!("/contracts/{}/void", c.contract_id))
        .await;

    assert_eq!(response.status().as_u16(), 200);
    let outcome = body(response).await["data"].clone();
    assert_eq!(outcome["contract"]["contract_status"], "voided");
    assert_eq!(outcome["schedules_removed"], 0);
    assert_eq!(outcome["property_released"], true);
    let warnings = outcome["cleanup_warnings"].as_array().unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0]["step"], "purge_billing");
    assert_eq!(warnings[0]["kind"], "PARTIAL_FAILURE");
    assert_eq!(
        app.store.property_availability(c.property_id).await,
        Some(PropertyAvailability::Available)
    );
}

#[tokio::test]
async fn failed_status_update_is_reported() {
    let app = TestApp::spawn().await;
    let c = voidable_contract(&app).await;
    app.store.fail_on(FaultPoint::MarkVoided).await;

    let response = app
        .post_empty(&format!("/contracts/{}/void", c.contract_id))
        .await;

    assert_eq!(response.status().as_u16(), 500);
    assert_eq!(body(response).await["error"], "VOID_UPDATE_FAILED");
    assert_eq!(
        app.store.property_availability(c.property_id).await,
        Some(PropertyAvailability::Reserved)
    );
}

#[tokio::test]
async fn transactions_survive_a_void() {
    let app = TestApp::spawn().await;
    let c = voidable_contract(&app).await;
    let schedule_id = c.data["schedules"][0]["schedule_id"].as_str().unwrap();
    app.pay(schedule_id, "7500", None).await;

    app.post_empty(&format!("/contracts/{}/void", c.contract_id))
        .await;

    let schedule_id: Uuid = schedule_id.parse().unwrap();
    let kept = app.store.list_transactions(schedule_id).await.unwrap();
    assert_eq!(kept.len(), 1);
    assert!(app.store.find_schedule(schedule_id).await.unwrap().is_none());
}

#[tokio::test]
async fn voided_contract_rejects_transfers() {
    let app = TestApp::spawn().await;
    let c = voidable_contract(&app).await;
    app.post_empty(&format!("/contracts/{}/void", c.contract_id))
        .await;

    let response = app
        .post(
            &format!("/contracts/{}/transfers", c.contract_id),
            json!({
                "new_client_name": "Ben Reyes",
                "new_client_email": "ben@example.com",
                "new_client_phone": "555-0199",
                "new_client_address": "Lot 9, Block 1",
                "relationship": "Sibling",
                "transfer_reason": "Relocation",
                "requested_by_name": "Ana Cruz",
            }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 409);
    assert_eq!(body(response).await["error"], "CONTRACT_VOIDED");
}

#[tokio::test]
async fn malformed_void_body_is_rejected_before_voiding() {
    let app = TestApp::spawn().await;
    let c = voidable_contract(&app).await;

    let bodies = [json!({ "reason": 42 }), json!({ "reason": "x".repeat(600) })];
    for payload in bodies {
        let response = app
            .post(&format!("/contracts/{}/void", c.contract_id), payload)
            .await;
        assert_eq!(response.status().as_u16(), 422);
        assert_eq!(body(response).await["error"], "VALIDATION_ERROR");
    }

    let contract = body(app.get(&format!("/contracts/{}", c.contract_id)).await).await["data"]
        ["contract"]
        .clone();
    assert_eq!(contract["contract_status"], "active");
    assert!(contract["void_reason"].is_null());
    assert_eq!(
        app.store.property_availability(c.property_id).await,
        Some(PropertyAvailability::Reserved)
    );
}

#[tokio::test]
async fn empty_object_body_uses_default_reason() {
    let app = TestApp::spawn().await;
    let c = voidable_contract(&app).await;

    let response = app
        .post(&format!("/contracts/{}/void", c.contract_id), json!({}))
        .await;

    assert_eq!(response.status().as_u16(), 200);
    let outcome = body(response).await["data"].clone();
    assert_eq!(
        outcome["contract"]["void_reason"],
        "Non-payment for 3 consecutive months"
    );
}
