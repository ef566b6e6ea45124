//! Ledger Generator: derives the installment schedule for a contract.
//!
//! Pure computation; persistence happens in the contract factory.

use crate::error::{ContractError, Result};
use crate::models::{PaymentFrequency, PaymentSchedule};
use chrono::{Days, Months, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

pub const MIN_PLAN_MONTHS: i32 = 1;
pub const MAX_PLAN_MONTHS: i32 = 60;

/// Weeks per month in hundredths (4.33).
const WEEKS_PER_MONTH_CENTI: i64 = 433;
const DAYS_PER_MONTH: i64 = 30;

/// Inputs for one schedule.
#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    pub contract_id: Uuid,
    pub remaining_downpayment: Decimal,
    pub payment_plan_months: i32,
    pub payment_frequency: PaymentFrequency,
    pub first_installment_date: NaiveDate,
}

pub fn validate_plan_months(months: i32) -> Result<()> {
    if (MIN_PLAN_MONTHS..=MAX_PLAN_MONTHS).contains(&months) {
        Ok(())
    } else {
        Err(ContractError::InvalidPlanRange(months))
    }
}

/// Number of installments for a plan.
///
/// monthly: `months`; weekly: `ceil(months × 4.33)`; daily: `months × 30`.
pub fn installment_count(months: i32, frequency: PaymentFrequency) -> Result<i32> {
    validate_plan_months(months)?;
    let months = i64::from(months);
    let count = match frequency {
        PaymentFrequency::Monthly => months,
        PaymentFrequency::Weekly => (months * WEEKS_PER_MONTH_CENTI + 99) / 100,
        PaymentFrequency::Daily => months * DAYS_PER_MONTH,
    };
    // Bounded by 60 × 30.
    Ok(count as i32)
}

pub fn grace_period_days(frequency: PaymentFrequency) -> u64 {
    match frequency {
        PaymentFrequency::Monthly => 3,
        PaymentFrequency::Weekly => 1,
        PaymentFrequency::Daily => 0,
    }
}

/// Shift `start` forward by `periods` whole periods.
///
/// Month arithmetic clamps to the last valid day of the target month
/// (Jan 31 + 1 month = Feb 28/29). Each due date is computed from the first
/// date, so a clamped February does not drag March back to the 28th.
pub fn shift_by_periods(
    start: NaiveDate,
    frequency: PaymentFrequency,
    periods: u32,
) -> Option<NaiveDate> {
    match frequency {
        PaymentFrequency::Monthly => start.checked_add_months(Months::new(periods)),
        PaymentFrequency::Weekly => start.checked_add_days(Days::new(u64::from(periods) * 7)),
        PaymentFrequency::Daily => start.checked_add_days(Days::new(u64::from(periods))),
    }
}

pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Per-installment amount: `remaining / count`, rounded to cents.
pub fn installment_amount(remaining_downpayment: Decimal, count: i32) -> Decimal {
    if count <= 0 {
        return Decimal::ZERO;
    }
    round_money(remaining_downpayment / Decimal::from(count))
}

/// Month-equivalent installment, whatever the actual frequency.
pub fn monthly_equivalent(remaining_downpayment: Decimal, months: i32) -> Decimal {
    if remaining_downpayment <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    installment_amount(remaining_downpayment, months)
}

/// Due date of the last installment, or `None` when nothing is owed.
pub fn final_due_date(request: &ScheduleRequest) -> Result<Option<NaiveDate>> {
    if request.remaining_downpayment <= Decimal::ZERO {
        return Ok(None);
    }
    let count = installment_count(request.payment_plan_months, request.payment_frequency)?;
    let last = shift_by_periods(
        request.first_installment_date,
        request.payment_frequency,
        (count - 1) as u32,
    )
    .ok_or_else(|| ContractError::Validation("Installment due date out of range".to_string()))?;
    Ok(Some(last))
}

/// Build the full, contiguous installment set for a contract.
///
/// A non-positive remaining downpayment yields no rows: the reservation fee
/// already covers the downpayment.
pub fn generate_schedule(request: &ScheduleRequest) -> Result<Vec<PaymentSchedule>> {
    let count = installment_count(request.payment_plan_months, request.payment_frequency)?;
    if request.remaining_downpayment <= Decimal::ZERO {
        return Ok(Vec::new());
    }

    let amount = installment_amount(request.remaining_downpayment, count);
    let grace_days = Days::new(grace_period_days(request.payment_frequency));

    (1..=count)
        .map(|number| {
            let due_date = shift_by_periods(
                request.first_installment_date,
                request.payment_frequency,
                (number - 1) as u32,
            )
            .ok_or_else(|| {
                ContractError::Validation(format!(
                    "Due date of installment {} is out of range",
                    number
                ))
            })?;
            let grace_period_end = due_date.checked_add_days(grace_days);

            Ok(PaymentSchedule::pending(
                request.contract_id,
                number,
                count,
                amount,
                due_date,
                grace_period_end,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentStatus;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn request(amount: i64, months: i32, frequency: PaymentFrequency) -> ScheduleRequest {
        ScheduleRequest {
            contract_id: Uuid::new_v4(),
            remaining_downpayment: Decimal::from(amount),
            payment_plan_months: months,
            payment_frequency: frequency,
            first_installment_date: date(2024, 1, 31),
        }
    }

    #[test]
    fn monthly_plan_splits_evenly() {
        let rows = generate_schedule(&request(90_000, 12, PaymentFrequency::Monthly)).unwrap();

        assert_eq!(rows.len(), 12);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row.installment_number, i as i32 + 1);
            assert_eq!(row.scheduled_amount, Decimal::from(7_500));
            assert_eq!(row.remaining_amount, row.scheduled_amount);
            assert_eq!(row.paid_amount, Decimal::ZERO);
            assert_eq!(row.penalty_amount, Decimal::ZERO);
            assert_eq!(row.payment_status, PaymentStatus::Pending);
        }
    }

    #[test]
    fn weekly_plan_uses_433_weeks_per_month() {
        let rows = generate_schedule(&request(90_000, 12, PaymentFrequency::Weekly)).unwrap();

        assert_eq!(rows.len(), 52);
        assert!(rows
            .iter()
            .all(|r| r.scheduled_amount == Decimal::new(173_077, 2)));
        assert_eq!(rows[1].due_date, date(2024, 2, 7));
    }

    #[test]
    fn daily_plan_has_thirty_rows_per_month() {
        let rows = generate_schedule(&request(9_000, 2, PaymentFrequency::Daily)).unwrap();

        assert_eq!(rows.len(), 60);
        assert_eq!(rows[59].due_date, date(2024, 3, 30));
        assert!(rows.iter().all(|r| r.grace_period_end == Some(r.due_date)));
    }

    #[test]
    fn counts_for_every_plan_length() {
        for months in MIN_PLAN_MONTHS..=MAX_PLAN_MONTHS {
            assert_eq!(installment_count(months, PaymentFrequency::Monthly).unwrap(), months);
            let weekly = installment_count(months, PaymentFrequency::Weekly).unwrap();
            assert_eq!(weekly, (f64::from(months) * 4.33).ceil() as i32);
            assert_eq!(
                installment_count(months, PaymentFrequency::Daily).unwrap(),
                months * 30
            );
        }
    }

    #[test]
    fn schedule_is_complete_and_sums_within_rounding() {
        let remaining = Decimal::new(12_345_67, 2);
        for frequency in [
            PaymentFrequency::Monthly,
            PaymentFrequency::Weekly,
            PaymentFrequency::Daily,
        ] {
            for months in [1, 5, 7, 24, 60] {
                let req = ScheduleRequest {
                    remaining_downpayment: remaining,
                    ..request(0, months, frequency)
                };
                let rows = generate_schedule(&req).unwrap();
                let n = installment_count(months, frequency).unwrap();

                assert_eq!(rows.len(), n as usize);
                let numbers: Vec<i32> = rows.iter().map(|r| r.installment_number).collect();
                assert_eq!(numbers, (1..=n).collect::<Vec<_>>());

                let total: Decimal = rows.iter().map(|r| r.scheduled_amount).sum();
                let tolerance = Decimal::new(5, 3) * Decimal::from(n);
                assert!(
                    (total - remaining).abs() <= tolerance,
                    "{frequency} x {months}: {total} vs {remaining}"
                );
            }
        }
    }

    #[test]
    fn month_end_dates_clamp_without_drifting() {
        let rows = generate_schedule(&request(3_000, 3, PaymentFrequency::Monthly)).unwrap();
        let dates: Vec<NaiveDate> = rows.iter().map(|r| r.due_date).collect();

        assert_eq!(dates, vec![date(2024, 1, 31), date(2024, 2, 29), date(2024, 3, 31)]);
        assert_eq!(rows[0].grace_period_end, Some(date(2024, 2, 3)));
    }

    #[test]
    fn rejects_out_of_range_plans() {
        for months in [0, -3, 61] {
            assert!(matches!(
                generate_schedule(&request(1_000, months, PaymentFrequency::Monthly)),
                Err(ContractError::InvalidPlanRange(m)) if m == months
            ));
        }
    }

    #[test]
    fn covered_downpayment_yields_no_rows() {
        let rows = generate_schedule(&request(0, 12, PaymentFrequency::Monthly)).unwrap();
        assert!(rows.is_empty());
        assert_eq!(final_due_date(&request(-50, 12, PaymentFrequency::Monthly)).unwrap(), None);
    }

    #[test]
    fn final_due_date_matches_last_row() {
        let req = request(90_000, 12, PaymentFrequency::Weekly);
        let rows = generate_schedule(&req).unwrap();
        assert_eq!(final_due_date(&req).unwrap(), rows.last().map(|r| r.due_date));
    }
}
