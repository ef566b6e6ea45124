//! PostgreSQL implementation of the persistence seams.

use crate::error::{ContractError, Result};
use crate::models::{
    Contract, ContractStatus, PaymentSchedule, PaymentTransaction, PropertyAvailability, Reservation,
    TransferRequest,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::payments::{PaymentPosting, RevertPlan};
use crate::services::store::{
    ContractBalance, ContractStore, PropertyRegistry, ReservationSource, TransferDecision,
    VoidTransition,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Transaction};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> ContractError {
    move |e| ContractError::Persistence(anyhow::anyhow!("{}: {}", context, e))
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "contract-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))
    }

    /// Lock a schedule row and check it still looks the way the engine saw it.
    async fn guard_schedule(
        tx: &mut Transaction<'static, Postgres>,
        contract_id: Uuid,
        schedule_id: Uuid,
        expected_paid_amount: Decimal,
    ) -> Result<()> {
        let row = sqlx::query_as::<_, (Decimal, String)>(
            r#"
            SELECT s.paid_amount, c.contract_status
            FROM payment_schedules s
            JOIN contracts c ON c.contract_id = s.contract_id
            WHERE s.schedule_id = $1 AND s.contract_id = $2
            FOR UPDATE OF s, c
            "#,
        )
        .bind(schedule_id)
        .bind(contract_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_error("Failed to lock payment schedule"))?;

        match row {
            None => Err(ContractError::ScheduleNotFound(schedule_id)),
            Some((_, status)) if status == "voided" => Err(ContractError::ContractVoided(contract_id)),
            Some((paid, _)) if paid != expected_paid_amount => {
                Err(ContractError::ConcurrentUpdate(schedule_id))
            }
            Some(_) => Ok(()),
        }
    }

    async fn write_schedule(
        tx: &mut Transaction<'static, Postgres>,
        schedule: &PaymentSchedule,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE payment_schedules
            SET paid_amount = $2, remaining_amount = $3, penalty_amount = $4,
                payment_status = $5, paid_date = $6, processed_by_name = $7
            WHERE schedule_id = $1
            "#,
        )
        .bind(schedule.schedule_id)
        .bind(schedule.paid_amount)
        .bind(schedule.remaining_amount)
        .bind(schedule.penalty_amount)
        .bind(schedule.payment_status.as_str())
        .bind(schedule.paid_date)
        .bind(&schedule.processed_by_name)
        .execute(&mut **tx)
        .await
        .map_err(db_error("Failed to update payment schedule"))?;
        Ok(())
    }

    /// Recompute `remaining_balance` from every schedule row of the contract.
    async fn rebalance(
        tx: &mut Transaction<'static, Postgres>,
        contract_id: Uuid,
    ) -> Result<ContractBalance> {
        let (remaining_balance, total_paid) = sqlx::query_as::<_, (Decimal, Decimal)>(
            r#"
            UPDATE contracts c
            SET remaining_balance =
                    GREATEST(0, c.downpayment_total - c.reservation_fee_paid - p.total),
                remaining_downpayment =
                    GREATEST(0, c.downpayment_total - c.reservation_fee_paid - p.total),
                downpayment_status = CASE
                    WHEN c.downpayment_total - c.reservation_fee_paid - p.total > 0
                        THEN 'in_progress'
                    ELSE 'completed'
                END,
                updated_utc = NOW()
            FROM (
                SELECT COALESCE(SUM(paid_amount), 0) AS total
                FROM payment_schedules
                WHERE contract_id = $1
            ) p
            WHERE c.contract_id = $1
            RETURNING c.remaining_balance, p.total
            "#,
        )
        .bind(contract_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_error("Failed to update contract balance"))?
        .ok_or(ContractError::ContractNotFound(contract_id))?;

        Ok(ContractBalance {
            remaining_balance,
            total_paid,
        })
    }
}

#[async_trait]
impl ReservationSource for Database {
    #[instrument(skip(self), fields(reservation_id = %reservation_id))]
    async fn find_reservation(&self, reservation_id: Uuid) -> Result<Option<Reservation>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_reservation"])
            .start_timer();

        let reservation = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT reservation_id, tracking_number, property_id, user_id, client_name,
                   client_email, client_phone, client_address, total_contract_price,
                   reservation_fee_paid, status
            FROM reservations
            WHERE reservation_id = $1
            "#,
        )
        .bind(reservation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get reservation"))?;

        timer.observe_duration();
        Ok(reservation)
    }
}

#[async_trait]
impl PropertyRegistry for Database {
    #[instrument(skip(self), fields(property_id = %property_id))]
    async fn set_availability(
        &self,
        property_id: Uuid,
        availability: PropertyAvailability,
    ) -> Result<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_availability"])
            .start_timer();

        let result = sqlx::query(
            "UPDATE properties SET availability = $2, updated_utc = NOW() WHERE property_id = $1",
        )
        .bind(property_id)
        .bind(availability.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to update property availability"))?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(ContractError::Persistence(anyhow::anyhow!(
                "Property {} not found in registry",
                property_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ContractStore for Database {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error("Health check failed"))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self), fields(contract_id = %contract_id))]
    async fn find_contract(&self, contract_id: Uuid) -> Result<Option<Contract>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_contract"])
            .start_timer();

        let contract = sqlx::query_as::<_, Contract>("SELECT * FROM contracts WHERE contract_id = $1")
            .bind(contract_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get contract"))?;

        timer.observe_duration();
        Ok(contract)
    }

    #[instrument(skip(self), fields(reservation_id = %reservation_id))]
    async fn find_contract_by_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<Option<Contract>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_contract_by_reservation"])
            .start_timer();

        let contract =
            sqlx::query_as::<_, Contract>("SELECT * FROM contracts WHERE reservation_id = $1")
                .bind(reservation_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("Failed to get contract by reservation"))?;

        timer.observe_duration();
        Ok(contract)
    }

    #[instrument(skip(self, contract), fields(contract_id = %contract.contract_id))]
    async fn insert_contract(&self, contract: &Contract) -> Result<bool> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_contract"])
            .start_timer();

        let result = sqlx::query(
            r#"
            INSERT INTO contracts (
                contract_id, contract_number, reservation_id, property_id, user_id,
                client_name, client_email, client_phone, client_address,
                total_contract_price, downpayment_total, reservation_fee_paid,
                remaining_downpayment, remaining_balance, bank_financing_amount,
                payment_plan_months, payment_frequency, monthly_installment,
                allow_partial_payments, contract_status, downpayment_status,
                contract_signed_date, first_installment_date, final_installment_date,
                created_utc, updated_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23, $24, $25, $26)
            "#,
        )
        .bind(contract.contract_id)
        .bind(&contract.contract_number)
        .bind(contract.reservation_id)
        .bind(contract.property_id)
        .bind(contract.user_id)
        .bind(&contract.client_name)
        .bind(&contract.client_email)
        .bind(&contract.client_phone)
        .bind(&contract.client_address)
        .bind(contract.total_contract_price)
        .bind(contract.downpayment_total)
        .bind(contract.reservation_fee_paid)
        .bind(contract.remaining_downpayment)
        .bind(contract.remaining_balance)
        .bind(contract.bank_financing_amount)
        .bind(contract.payment_plan_months)
        .bind(contract.payment_frequency.as_str())
        .bind(contract.monthly_installment)
        .bind(contract.allow_partial_payments)
        .bind(contract.contract_status.as_str())
        .bind(contract.downpayment_status.as_str())
        .bind(contract.contract_signed_date)
        .bind(contract.first_installment_date)
        .bind(contract.final_installment_date)
        .bind(contract.created_utc)
        .bind(contract.updated_utc)
        .execute(&self.pool)
        .await;

        timer.observe_duration();

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                // Another request created the contract for this reservation
                Ok(false)
            }
            Err(e) => Err(db_error("Failed to insert contract")(e)),
        }
    }

    #[instrument(skip(self), fields(contract_id = %contract_id))]
    async fn delete_contract(&self, contract_id: Uuid) -> Result<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_contract"])
            .start_timer();

        // Schedules go with the contract (ON DELETE CASCADE).
        sqlx::query("DELETE FROM contracts WHERE contract_id = $1")
            .bind(contract_id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete contract"))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, schedules), fields(count = schedules.len()))]
    async fn insert_schedules(&self, schedules: &[PaymentSchedule]) -> Result<()> {
        if schedules.is_empty() {
            return Ok(());
        }
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_schedules"])
            .start_timer();

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO payment_schedules (schedule_id, contract_id, installment_number, \
             installment_description, scheduled_amount, paid_amount, remaining_amount, \
             penalty_amount, due_date, grace_period_end, payment_status, is_overdue, \
             days_overdue) ",
        );
        builder.push_values(schedules, |mut row, s| {
            row.push_bind(s.schedule_id)
                .push_bind(s.contract_id)
                .push_bind(s.installment_number)
                .push_bind(&s.installment_description)
                .push_bind(s.scheduled_amount)
                .push_bind(s.paid_amount)
                .push_bind(s.remaining_amount)
                .push_bind(s.penalty_amount)
                .push_bind(s.due_date)
                .push_bind(s.grace_period_end)
                .push_bind(s.payment_status.as_str())
                .push_bind(s.is_overdue)
                .push_bind(s.days_overdue);
        });
        builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to insert payment schedules"))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self), fields(contract_id = %contract_id))]
    async fn list_schedules(&self, contract_id: Uuid) -> Result<Vec<PaymentSchedule>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_schedules"])
            .start_timer();

        let schedules = sqlx::query_as::<_, PaymentSchedule>(
            "SELECT * FROM payment_schedules WHERE contract_id = $1 ORDER BY installment_number",
        )
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list payment schedules"))?;

        timer.observe_duration();
        Ok(schedules)
    }

    #[instrument(skip(self), fields(schedule_id = %schedule_id))]
    async fn find_schedule(&self, schedule_id: Uuid) -> Result<Option<PaymentSchedule>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_schedule"])
            .start_timer();

        let schedule = sqlx::query_as::<_, PaymentSchedule>(
            "SELECT * FROM payment_schedules WHERE schedule_id = $1",
        )
        .bind(schedule_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get payment schedule"))?;

        timer.observe_duration();
        Ok(schedule)
    }

    #[instrument(skip(self), fields(schedule_id = %schedule_id))]
    async fn list_transactions(&self, schedule_id: Uuid) -> Result<Vec<PaymentTransaction>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_transactions"])
            .start_timer();

        let transactions = sqlx::query_as::<_, PaymentTransaction>(
            r#"
            SELECT * FROM payment_transactions
            WHERE schedule_id = $1
            ORDER BY transaction_date DESC
            "#,
        )
        .bind(schedule_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list payment transactions"))?;

        timer.observe_duration();
        Ok(transactions)
    }

    #[instrument(skip(self, posting), fields(schedule_id = %posting.schedule.schedule_id))]
    async fn apply_payment(&self, posting: &PaymentPosting) -> Result<ContractBalance> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_payment"])
            .start_timer();

        let mut tx = self.begin().await?;
        Self::guard_schedule(
            &mut tx,
            posting.contract_id,
            posting.schedule.schedule_id,
            posting.expected_paid_amount,
        )
        .await?;
        Self::write_schedule(&mut tx, &posting.schedule).await?;

        let transaction = &posting.transaction;
        sqlx::query(
            r#"
            INSERT INTO payment_transactions (transaction_id, schedule_id, amount, transaction_date, transaction_status, receipt_number, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(transaction.transaction_id)
        .bind(transaction.schedule_id)
        .bind(transaction.amount)
        .bind(transaction.transaction_date)
        .bind(transaction.transaction_status.as_str())
        .bind(&transaction.receipt_number)
        .bind(&transaction.notes)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to insert payment transaction"))?;

        let balance = Self::rebalance(&mut tx, posting.contract_id).await?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit payment"))?;

        timer.observe_duration();
        Ok(balance)
    }

    #[instrument(skip(self, plan), fields(schedule_id = %plan.schedule.schedule_id))]
    async fn apply_revert(&self, plan: &RevertPlan) -> Result<ContractBalance> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_revert"])
            .start_timer();

        let mut tx = self.begin().await?;
        Self::guard_schedule(
            &mut tx,
            plan.contract_id,
            plan.schedule.schedule_id,
            plan.expected_paid_amount,
        )
        .await?;
        Self::write_schedule(&mut tx, &plan.schedule).await?;

        if !plan.transaction_ids.is_empty() {
            sqlx::query(
                r#"
                UPDATE payment_transactions
                SET transaction_status = 'reverted',
                    notes = CASE
                        WHEN notes IS NULL OR notes = '' THEN $2
                        ELSE notes || E'\n' || $2
                    END
                WHERE transaction_id = ANY($1) AND transaction_status = 'completed'
                "#,
            )
            .bind(&plan.transaction_ids)
            .bind(&plan.audit_note)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to mark transactions reverted"))?;
        }

        let balance = Self::rebalance(&mut tx, plan.contract_id).await?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit revert"))?;

        timer.observe_duration();
        Ok(balance)
    }

    #[instrument(skip(self, reason), fields(contract_id = %contract_id))]
    async fn mark_voided(
        &self,
        contract_id: Uuid,
        reason: &str,
        voided_at: DateTime<Utc>,
    ) -> Result<VoidTransition> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_voided"])
            .start_timer();

        let voided = sqlx::query_as::<_, Contract>(
            r#"
            UPDATE contracts
            SET contract_status = 'voided', voided_at = $2, void_reason = $3, updated_utc = $2
            WHERE contract_id = $1 AND contract_status = 'active'
            RETURNING *
            "#,
        )
        .bind(contract_id)
        .bind(voided_at)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to void contract"))?;

        if let Some(contract) = voided {
            timer.observe_duration();
            return Ok(VoidTransition::Voided(Box::new(contract)));
        }

        let exists = sqlx::query_scalar::<_, Uuid>(
            "SELECT contract_id FROM contracts WHERE contract_id = $1",
        )
        .bind(contract_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get contract"))?;

        timer.observe_duration();
        Ok(match exists {
            Some(_) => VoidTransition::AlreadyVoided,
            None => VoidTransition::NotFound,
        })
    }

    #[instrument(skip(self), fields(contract_id = %contract_id))]
    async fn purge_billing(&self, contract_id: Uuid) -> Result<u64> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["purge_billing"])
            .start_timer();

        let result = sqlx::query("DELETE FROM payment_schedules WHERE contract_id = $1")
            .bind(contract_id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete payment schedules"))?;

        timer.observe_duration();
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(contract_id = %contract_id))]
    async fn find_pending_transfer(&self, contract_id: Uuid) -> Result<Option<TransferRequest>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_pending_transfer"])
            .start_timer();

        let request = sqlx::query_as::<_, TransferRequest>(
            "SELECT * FROM transfer_requests WHERE contract_id = $1 AND request_status = 'pending'",
        )
        .bind(contract_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get pending transfer request"))?;

        timer.observe_duration();
        Ok(request)
    }

    #[instrument(skip(self, request), fields(request_id = %request.id))]
    async fn insert_transfer(&self, request: &TransferRequest) -> Result<bool> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_transfer"])
            .start_timer();

        let result = sqlx::query(
            r#"
            INSERT INTO transfer_requests (
                id, contract_id, original_client_name, original_client_email,
                original_client_phone, original_client_address, new_client_name,
                new_client_email, new_client_phone, new_client_address, relationship,
                transfer_reason, request_status, requested_by_id, requested_by_name, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(request.id)
        .bind(request.contract_id)
        .bind(&request.original_client_name)
        .bind(&request.original_client_email)
        .bind(&request.original_client_phone)
        .bind(&request.original_client_address)
        .bind(&request.new_client_name)
        .bind(&request.new_client_email)
        .bind(&request.new_client_phone)
        .bind(&request.new_client_address)
        .bind(&request.relationship)
        .bind(&request.transfer_reason)
        .bind(request.request_status.as_str())
        .bind(request.requested_by_id)
        .bind(&request.requested_by_name)
        .bind(request.created_utc)
        .execute(&self.pool)
        .await;

        timer.observe_duration();

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                // transfer_requests_one_pending_idx
                Ok(false)
            }
            Err(e) => Err(db_error("Failed to insert transfer request")(e)),
        }
    }

    #[instrument(skip(self), fields(request_id = %request_id))]
    async fn find_transfer(&self, request_id: Uuid) -> Result<Option<TransferRequest>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_transfer"])
            .start_timer();

        let request =
            sqlx::query_as::<_, TransferRequest>("SELECT * FROM transfer_requests WHERE id = $1")
                .bind(request_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("Failed to get transfer request"))?;

        timer.observe_duration();
        Ok(request)
    }

    #[instrument(skip(self), fields(contract_id = %contract_id))]
    async fn list_transfers(&self, contract_id: Uuid) -> Result<Vec<TransferRequest>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_transfers"])
            .start_timer();

        let requests = sqlx::query_as::<_, TransferRequest>(
            "SELECT * FROM transfer_requests WHERE contract_id = $1 ORDER BY created_utc DESC",
        )
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list transfer requests"))?;

        timer.observe_duration();
        Ok(requests)
    }

    #[instrument(skip(self, decision), fields(request_id = %decision.request_id))]
    async fn apply_transfer_decision(
        &self,
        decision: &TransferDecision,
    ) -> Result<TransferRequest> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_transfer_decision"])
            .start_timer();

        let mut tx = self.begin().await?;

        let current = sqlx::query_as::<_, TransferRequest>(
            "SELECT * FROM transfer_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(decision.request_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("Failed to lock transfer request"))?
        .ok_or(ContractError::TransferRequestNotFound(decision.request_id))?;
        if !current.is_pending() {
            return Err(ContractError::TransferAlreadyDecided(decision.request_id));
        }

        if let Some(client) = &decision.new_client {
            let contract_status = sqlx::query_scalar::<_, String>(
                "SELECT contract_status FROM contracts WHERE contract_id = $1 FOR UPDATE",
            )
            .bind(decision.contract_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error("Failed to lock contract"))?
            .ok_or(ContractError::ContractNotFound(decision.contract_id))?;
            if contract_status != ContractStatus::Active.as_str() {
                return Err(ContractError::ContractVoided(decision.contract_id));
            }

            let updated = sqlx::query(
                r#"
                UPDATE contracts
                SET client_name = $2, client_email = $3, client_phone = $4,
                    client_address = $5, updated_utc = $6
                WHERE contract_id = $1 AND contract_status = 'active'
                "#,
            )
            .bind(decision.contract_id)
            .bind(&client.name)
            .bind(&client.email)
            .bind(&client.phone)
            .bind(&client.address)
            .bind(decision.approved_at)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to update contract client"))?;
            if updated.rows_affected() == 0 {
                return Err(ContractError::ContractVoided(decision.contract_id));
            }
        }

        let status = if decision.is_approval() { "approved" } else { "rejected" };
        let request = sqlx::query_as::<_, TransferRequest>(
            r#"
            UPDATE transfer_requests
            SET request_status = $2, approved_by = $3, approved_at = $4, approval_notes = $5
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(decision.request_id)
        .bind(status)
        .bind(&decision.approved_by)
        .bind(decision.approved_at)
        .bind(&decision.approval_notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("Failed to update transfer request"))?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit transfer decision"))?;

        timer.observe_duration();
        info!(status = status, "Transfer decision stored");
        Ok(request)
    }
}
