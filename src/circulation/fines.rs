//! Fine ledger rules.
//!
//! Fines are append-only: issuing adds a pending entry, paying or waiving
//! resolves it exactly once, nothing is ever removed. The outstanding balance
//! is always recomputed from the entries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    error::{AppError, AppResult, Refusal},
    models::fine::{Fine, FineKind, FineStatus, NewFine},
};

/// How a pending fine is settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Paid { paid_to: i32 },
    Waived,
}

/// Build a pending fine; negative amounts are rejected
pub fn issue_fine(
    kind: FineKind,
    amount: Decimal,
    description: impl Into<String>,
    issued_by: i32,
    now: DateTime<Utc>,
) -> AppResult<NewFine> {
    if amount < Decimal::ZERO {
        return Err(AppError::Validation(format!(
            "Fine amount must not be negative (got {})",
            amount
        )));
    }
    Ok(NewFine {
        kind,
        amount,
        description: description.into(),
        date_issued: now,
        issued_by,
    })
}

/// Settle a pending fine in place
pub fn resolve_fine(fine: &mut Fine, resolution: Resolution, now: DateTime<Utc>) -> Result<(), Refusal> {
    if !fine.is_pending() {
        return Err(Refusal::FineAlreadyResolved);
    }
    match resolution {
        Resolution::Paid { paid_to } => {
            fine.status = FineStatus::Paid;
            fine.date_paid = Some(now);
            fine.paid_to = Some(paid_to);
        }
        Resolution::Waived => {
            fine.status = FineStatus::Waived;
        }
    }
    Ok(())
}

/// Outstanding balance: sum of pending amounts
pub fn total_pending(fines: &[Fine]) -> Decimal {
    fines
        .iter()
        .filter(|f| f.is_pending())
        .map(|f| f.amount)
        .sum()
}
