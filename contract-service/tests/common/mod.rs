//! Test helper module for contract-service integration tests.
//!
//! Spawns the application on a random port with the in-memory backend and a
//! notifier that records what would have been sent.

#![allow(dead_code)]

use async_trait::async_trait;
use contract_service::config::ContractConfig;
use contract_service::models::{PropertyAvailability, Reservation};
use contract_service::services::{MemoryStore, Notification, NotificationDispatcher};
use contract_service::startup::{AppState, Application, Backends};
use reqwest::{Client, Response};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Dispatcher that keeps every notification in memory.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }

    pub async fn titles(&self) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .map(|n| n.title.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        self.sent.lock().await.push(notification.clone());
        Ok(())
    }
}

/// Test application wrapper for integration tests.
pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub store: MemoryStore,
    pub notifier: Arc<RecordingNotifier>,
    pub state: AppState,
    client: Client,
}

impl TestApp {
    /// Spawn a new test application on a random port.
    pub async fn spawn() -> Self {
        let store = MemoryStore::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let backends = Backends::memory(store.clone(), notifier.clone());

        let app = Application::build_with(ContractConfig::in_memory(), backends)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let state = app.state().clone();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = Client::new();
        for _ in 0..50 {
            if client
                .get(format!("{}/health", address))
                .send()
                .await
                .is_ok()
            {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        Self {
            address,
            port,
            store,
            notifier,
            state,
            client,
        }
    }

    /// Seed an approved reservation on a reserved property.
    pub async fn seed_reservation(&self, price: i64, fee: i64) -> Reservation {
        self.seed_reservation_with(price, fee, "approved", Some("RES-7F3A9C21"))
            .await
    }

    pub async fn seed_reservation_with(
        &self,
        price: i64,
        fee: i64,
        status: &str,
        tracking_number: Option<&str>,
    ) -> Reservation {
        let property_id = Uuid::new_v4();
        let reservation = Reservation {
            reservation_id: Uuid::new_v4(),
            tracking_number: tracking_number.map(str::to_string),
            property_id: Some(property_id),
            user_id: Some(Uuid::new_v4()),
            client_name: "Ana Cruz".to_string(),
            client_email: "ana@example.com".to_string(),
            client_phone: "555-0100".to_string(),
            client_address: "Lot 4, Block 2".to_string(),
            total_contract_price: Decimal::from(price),
            reservation_fee_paid: Decimal::from(fee),
            status: status.to_string(),
        };
        self.store
            .seed_property(property_id, PropertyAvailability::Reserved)
            .await;
        self.store.seed_reservation(reservation.clone()).await;
        reservation
    }

    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(format!("{}{}", self.address, path))
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

    /// POST with no body at all.
    pub async fn post_empty(&self, path: &str) -> Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Create a contract over HTTP and return the `data` payload.
    pub async fn create_contract(&self, reservation_id: Uuid, months: i32, frequency: &str) -> Value {
        let response = self
            .post(
                "/contracts",
                json!({
                    "reservation_id": reservation_id,
                    "payment_plan_months": months,
                    "payment_frequency": frequency,
                }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.expect("Failed to parse JSON");
        body["data"].clone()
    }

    /// Record a payment over HTTP and return the `data` payload.
    pub async fn pay(&self, schedule_id: &str, amount: &str, penalty: Option<&str>) -> Value {
        let response = self
            .post(
                &format!("/schedules/{}/payments", schedule_id),
                json!({ "amount": amount, "penalty_amount": penalty, "processed_by_name": "Cashier" }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.expect("Failed to parse JSON");
        body["data"].clone()
    }
}

/// Money fields serialize as decimal strings.
pub fn dec(value: &Value) -> Decimal {
    value
        .as_str()
        .unwrap_or_else(|| panic!("expected a decimal string, got {}", value))
        .parse()
        .expect("Failed to parse decimal")
}

pub async fn body(response: Response) -> Value {
    response.json().await.expect("Failed to parse JSON")
}
