//! Borrow record (circulation transaction) model and related types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::{fine::Fine, text_enum};
use crate::circulation::{fines, policy};

/// Borrow lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BorrowStatus {
    Active,
    Overdue,
    Returned,
    Lost,
    Damaged,
}

text_enum!(BorrowStatus {
    Active => "active",
    Overdue => "overdue",
    Returned => "returned",
    Lost => "lost",
    Damaged => "damaged",
});

impl BorrowStatus {
    /// Active or overdue: the copy is still out
    pub fn is_open(&self) -> bool {
        matches!(self, BorrowStatus::Active | BorrowStatus::Overdue)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }
}

/// One renewal in a borrow's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct RenewalEntry {
    pub renewed_date: DateTime<Utc>,
    pub previous_due_date: DateTime<Utc>,
    pub new_due_date: DateTime<Utc>,
    pub renewed_by: i32,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum NoteType {
    General,
    Damage,
    Renewal,
    Return,
    System,
}

text_enum!(NoteType {
    General => "general",
    Damage => "damage",
    Renewal => "renewal",
    Return => "return",
    System => "system",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BorrowNote {
    pub text: String,
    pub added_by: i32,
    pub added_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub note_type: NoteType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    DueSoon,
    Overdue,
    FinalNotice,
}

text_enum!(ReminderKind {
    DueSoon => "due_soon",
    Overdue => "overdue",
    FinalNotice => "final_notice",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReminderMethod {
    Email,
    Sms,
    InPerson,
    Log,
}

text_enum!(ReminderMethod {
    Email => "email",
    Sms => "sms",
    InPerson => "in_person",
    Log => "log",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ReminderSent {
    #[serde(rename = "type")]
    pub kind: ReminderKind,
    pub sent_date: DateTime<Utc>,
    pub method: ReminderMethod,
}

/// Digital access granted with a checkout of a digital edition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DigitalAccess {
    pub access_granted: bool,
    pub access_expiry: DateTime<Utc>,
    pub download_count: i32,
    pub max_downloads: i32,
}

/// Flat `borrows` row
#[derive(Debug, Clone, FromRow)]
pub struct BorrowRow {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub actual_return_date: Option<DateTime<Utc>>,
    pub status: BorrowStatus,
    pub renewal_count: i32,
    pub issued_by: i32,
    pub returned_to: Option<i32>,
    pub digital_access_granted: Option<bool>,
    pub digital_access_expiry: Option<DateTime<Utc>>,
    pub download_count: Option<i32>,
    pub max_downloads: Option<i32>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BorrowRow {
    /// Assemble the full record from the row and its append-only collections
    pub fn into_record(
        self,
        renewal_history: Vec<RenewalEntry>,
        fines: Vec<Fine>,
        notes: Vec<BorrowNote>,
        reminders_sent: Vec<ReminderSent>,
    ) -> BorrowRecord {
        let digital_access = match (self.digital_access_granted, self.digital_access_expiry) {
            (Some(access_granted), Some(access_expiry)) => Some(DigitalAccess {
                access_granted,
                access_expiry,
                download_count: self.download_count.unwrap_or(0),
                max_downloads: self.max_downloads.unwrap_or(0),
            }),
            _ => None,
        };

        BorrowRecord {
            id: self.id,
            user_id: self.user_id,
            book_id: self.book_id,
            borrow_date: self.borrow_date,
            due_date: self.due_date,
            return_date: self.return_date,
            actual_return_date: self.actual_return_date,
            status: self.status,
            renewal_count: self.renewal_count,
            issued_by: self.issued_by,
            returned_to: self.returned_to,
            digital_access,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            renewal_history,
            fines,
            notes,
            reminders_sent,
        }
    }
}

/// Borrow record with its renewal history, fines, notes and reminders
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BorrowRecord {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    /// When the return was registered
    pub return_date: Option<DateTime<Utc>>,
    /// When the copy actually came back (may be backdated by staff)
    pub actual_return_date: Option<DateTime<Utc>>,
    pub status: BorrowStatus,
    pub renewal_count: i32,
    pub issued_by: i32,
    pub returned_to: Option<i32>,
    pub digital_access: Option<DigitalAccess>,
    /// Optimistic concurrency token, bumped by every lifecycle write
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub renewal_history: Vec<RenewalEntry>,
    pub fines: Vec<Fine>,
    pub notes: Vec<BorrowNote>,
    pub reminders_sent: Vec<ReminderSent>,
}

/// Borrow about to be created by a checkout
#[derive(Debug, Clone, PartialEq)]
pub struct NewBorrow {
    pub user_id: i32,
    pub book_id: i32,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub issued_by: i32,
    pub digital_access: Option<DigitalAccess>,
    /// Open borrows the member may hold, re-checked by the store under lock
    pub borrow_limit: i64,
}

/// Borrow record plus values derived at read time
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BorrowDetails {
    #[serde(flatten)]
    pub record: BorrowRecord,
    pub is_overdue: bool,
    pub days_borrowed: i64,
    pub days_overdue: i64,
    /// Sum of pending fines
    #[schema(value_type = String)]
    pub total_fines: Decimal,
}

impl BorrowDetails {
    pub fn at(record: BorrowRecord, now: DateTime<Utc>) -> Self {
        Self {
            is_overdue: policy::is_overdue(&record, now),
            days_borrowed: policy::days_borrowed(&record, now),
            days_overdue: policy::days_overdue(&record, now),
            total_fines: fines::total_pending(&record.fines),
            record,
        }
    }
}

/// Checkout request
#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub user_id: i32,
    pub book_id: i32,
}

/// Renewal request
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct RenewRequest {
    #[validate(length(max = 500, message = "Reason must be at most 500 characters"))]
    pub reason: Option<String>,
}

/// Return request
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ReturnRequest {
    /// When the copy came back; defaults to now
    pub returned_at: Option<DateTime<Utc>>,
}

/// How a copy left circulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum WriteOffOutcome {
    Lost,
    Damaged,
}

/// Loss/damage write-off request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct WriteOffRequest {
    pub outcome: WriteOffOutcome,
    /// Replacement or repair charge
    #[schema(value_type = String, example = "25.00")]
    pub amount: Decimal,
    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: Option<String>,
}

/// Add note request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddNoteRequest {
    #[validate(length(min = 1, max = 2000, message = "Note must be 1-2000 characters"))]
    pub text: String,
    #[serde(rename = "type")]
    pub note_type: Option<NoteType>,
}
