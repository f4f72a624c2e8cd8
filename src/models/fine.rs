//! Fine entries attached to a borrow record

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::text_enum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FineKind {
    LateReturn,
    Damage,
    Lost,
    Other,
}

text_enum!(FineKind {
    LateReturn => "late_return",
    Damage => "damage",
    Lost => "lost",
    Other => "other",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FineStatus {
    Pending,
    Paid,
    Waived,
}

text_enum!(FineStatus {
    Pending => "pending",
    Paid => "paid",
    Waived => "waived",
});

/// Persisted fine
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Fine {
    pub id: i32,
    pub borrow_id: i32,
    #[serde(rename = "type")]
    pub kind: FineKind,
    pub amount: Decimal,
    pub description: String,
    pub date_issued: DateTime<Utc>,
    pub date_paid: Option<DateTime<Utc>>,
    pub status: FineStatus,
    pub issued_by: i32,
    pub paid_to: Option<i32>,
}

impl Fine {
    pub fn is_pending(&self) -> bool {
        self.status == FineStatus::Pending
    }
}

/// Fine about to be appended to a borrow's ledger
#[derive(Debug, Clone, PartialEq)]
pub struct NewFine {
    pub kind: FineKind,
    pub amount: Decimal,
    pub description: String,
    pub date_issued: DateTime<Utc>,
    pub issued_by: i32,
}

/// Issue fine request (staff-reported damage or other charges)
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct IssueFineRequest {
    #[serde(rename = "type")]
    pub kind: FineKind,
    #[schema(value_type = String, example = "4.50")]
    pub amount: Decimal,
    #[validate(length(min = 1, max = 1000, message = "Description must be 1-1000 characters"))]
    pub description: String,
}
