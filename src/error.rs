//! Error types for the circulation server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Expected business-rule rejections, surfaced to callers with a stable code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Refusal {
    NoCopiesAvailable,
    RestrictedBook,
    MemberBlocked,
    MaxBorrowsReached,
    AlreadyOverdue,
    RenewalLimitReached,
    OutstandingFine,
    NotActive,
    FineAlreadyResolved,
    DownloadLimitReached,
    DigitalAccessUnavailable,
    ReminderAlreadySent,
}

impl Refusal {
    pub fn code(&self) -> &'static str {
        match self {
            Refusal::NoCopiesAvailable => "NO_COPIES_AVAILABLE",
            Refusal::RestrictedBook => "RESTRICTED_BOOK",
            Refusal::MemberBlocked => "MEMBER_BLOCKED",
            Refusal::MaxBorrowsReached => "MAX_BORROWS_REACHED",
            Refusal::AlreadyOverdue => "ALREADY_OVERDUE",
            Refusal::RenewalLimitReached => "RENEWAL_LIMIT_REACHED",
            Refusal::OutstandingFine => "OUTSTANDING_FINE",
            Refusal::NotActive => "NOT_ACTIVE",
            Refusal::FineAlreadyResolved => "FINE_ALREADY_RESOLVED",
            Refusal::DownloadLimitReached => "DOWNLOAD_LIMIT_REACHED",
            Refusal::DigitalAccessUnavailable => "DIGITAL_ACCESS_UNAVAILABLE",
            Refusal::ReminderAlreadySent => "REMINDER_ALREADY_SENT",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Refusal::NoCopiesAvailable => "No copies of this book are available",
            Refusal::RestrictedBook => "This book is restricted for this member",
            Refusal::MemberBlocked => "Member account is blocked",
            Refusal::MaxBorrowsReached => "Member has reached the maximum number of borrows",
            Refusal::AlreadyOverdue => "Borrow is overdue and cannot be renewed",
            Refusal::RenewalLimitReached => "Renewal limit reached",
            Refusal::OutstandingFine => "Outstanding fines must be cleared before renewal",
            Refusal::NotActive => "Borrow is no longer active",
            Refusal::FineAlreadyResolved => "Fine has already been paid or waived",
            Refusal::DownloadLimitReached => "Download limit reached",
            Refusal::DigitalAccessUnavailable => "No digital access for this borrow",
            Refusal::ReminderAlreadySent => "Reminder of this kind was already sent",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Refusal::NoCopiesAvailable | Refusal::FineAlreadyResolved | Refusal::ReminderAlreadySent => {
                StatusCode::CONFLICT
            }
            Refusal::RestrictedBook | Refusal::MemberBlocked => StatusCode::FORBIDDEN,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl std::fmt::Display for Refusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Refused: {0}")]
    Refused(Refusal),

    /// Optimistic-concurrency failure; retry the whole operation with fresh state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A store write would have broken an inventory or status invariant
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<Refusal> for AppError {
    fn from(refusal: Refusal) -> Self {
        AppError::Refused(refusal)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl AppError {
    /// The refusal carried by this error, if it is a policy refusal
    pub fn refusal(&self) -> Option<Refusal> {
        match self {
            AppError::Refused(r) => Some(*r),
            _ => None,
        }
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// `fail` for caller errors, `error` for server faults
    pub status: String,
    pub code: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Authentication(msg) => {
                (StatusCode::UNAUTHORIZED, "NOT_AUTHENTICATED", msg.clone())
            }
            AppError::Authorization(msg) => (StatusCode::FORBIDDEN, "NOT_AUTHORIZED", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION", msg.clone()),
            AppError::Refused(refusal) => {
                (refusal.status(), refusal.code(), refusal.message().to_string())
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::InvariantViolation(msg) => {
                tracing::error!("Invariant violation: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INVARIANT_VIOLATION",
                    "Operation aborted".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DB_FAILURE",
                    "Database error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "FAILURE",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            status: if status.is_server_error() { "error" } else { "fail" }.to_string(),
            code: code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
