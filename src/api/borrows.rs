//! Borrow circulation endpoints: checkout, renewal, return, write-off,
//! fines, notes, digital downloads and reminders

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        borrow::{
            AddNoteRequest, CheckoutRequest, DigitalAccess, NoteType, ReminderKind,
            ReminderMethod, ReminderSent, RenewRequest, ReturnRequest, WriteOffRequest,
        },
        fine::IssueFineRequest,
        BorrowDetails, Fine, UserClaims,
    },
};

use super::{success, ApiResponse, AuthenticatedUser, OptionalJson};

/// Member borrow list filters
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct UserBorrowsQuery {
    /// Only active and overdue borrows
    pub open: Option<bool>,
}

/// Reminder due for a borrow
#[derive(Serialize, ToSchema)]
pub struct PendingReminder {
    pub borrow_id: i32,
    /// `null` when nothing is due
    #[serde(rename = "type")]
    pub kind: Option<ReminderKind>,
}

/// Reminder delivered outside the sweep (phone call, desk notice)
#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordReminderRequest {
    #[serde(rename = "type")]
    pub kind: ReminderKind,
    pub method: ReminderMethod,
}

/// Let the borrower through, or anyone passing `staff_check`.
///
/// Only reads the record, so an unauthorized call changes nothing, and a
/// caller without staff rights gets the same 403 whether or not the borrow
/// exists.
async fn require_owner_or(
    state: &crate::AppState,
    claims: &UserClaims,
    id: i32,
    staff_check: fn(&UserClaims) -> AppResult<()>,
) -> AppResult<()> {
    if staff_check(claims).is_ok() {
        return Ok(());
    }
    match state.services.borrows.owner_of(id).await {
        Ok(owner) if owner == claims.user_id => Ok(()),
        Ok(_) | Err(AppError::NotFound(_)) => staff_check(claims),
        Err(e) => Err(e),
    }
}

/// Check a book out to a member
#[utoipa::path(
    post,
    path = "/borrow",
    tag = "borrows",
    security(("bearer_auth" = [])),
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Borrow created", body = BorrowDetails),
        (status = 403, description = "Restricted book or blocked member", body = crate::error::ErrorResponse),
        (status = 404, description = "Book or member not found"),
        (status = 409, description = "No copies available", body = crate::error::ErrorResponse),
        (status = 422, description = "Borrow limit reached", body = crate::error::ErrorResponse)
    )
)]
pub async fn checkout(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CheckoutRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<BorrowDetails>>)> {
    claims.require_write_borrows()?;

    let details = state
        .services
        .borrows
        .checkout(request.user_id, request.book_id, claims.user_id, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, success(details)))
}

/// Get a borrow record with its derived values
#[utoipa::path(
    get,
    path = "/borrow/{id}",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrow ID")),
    responses(
        (status = 200, description = "Borrow details", body = BorrowDetails),
        (status = 403, description = "Not the borrower and no read rights"),
        (status = 404, description = "Borrow not found")
    )
)]
pub async fn get_borrow(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<BorrowDetails>>> {
    require_owner_or(&state, &claims, id, UserClaims::require_read_borrows).await?;

    let details = state.services.borrows.get(id, Utc::now()).await?;
    Ok(success(details))
}

/// Borrows of a member, newest first
#[utoipa::path(
    get,
    path = "/users/{id}/borrows",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Member ID"), UserBorrowsQuery),
    responses(
        (status = 200, description = "Member's borrows", body = Vec<BorrowDetails>),
        (status = 404, description = "Member not found")
    )
)]
pub async fn get_user_borrows(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
    Query(query): Query<UserBorrowsQuery>,
) -> AppResult<Json<ApiResponse<Vec<BorrowDetails>>>> {
    claims.require_read_borrows_of(user_id)?;

    let borrows = state
        .services
        .borrows
        .user_borrows(user_id, query.open.unwrap_or(false), Utc::now())
        .await?;
    Ok(success(borrows))
}

/// Renew a borrow by one borrow period
#[utoipa::path(
    patch,
    path = "/borrow/{id}/renew",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrow ID")),
    request_body(content = RenewRequest, description = "Optional renewal reason; the body may be omitted"),
    responses(
        (status = 200, description = "Borrow renewed", body = BorrowDetails),
        (status = 400, description = "Malformed body"),
        (status = 404, description = "Borrow not found"),
        (status = 409, description = "Concurrent modification, retry"),
        (status = 422, description = "Renewal refused", body = crate::error::ErrorResponse)
    )
)]
pub async fn renew_borrow(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    OptionalJson(body): OptionalJson<RenewRequest>,
) -> AppResult<Json<ApiResponse<BorrowDetails>>> {
    claims.require_write_borrows()?;
    let request = body.unwrap_or_default();
    request.validate()?;

    let details = state
        .services
        .borrows
        .renew(id, claims.user_id, request.reason, Utc::now())
        .await?;
    Ok(success(details))
}

/// Register the return of a borrowed copy
#[utoipa::path(
    patch,
    path = "/borrow/{id}/return",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrow ID")),
    request_body(content = ReturnRequest, description = "Optional actual return date; the body may be omitted"),
    responses(
        (status = 200, description = "Book returned, late fine included if any", body = BorrowDetails),
        (status = 400, description = "Malformed body or return date outside the borrow period"),
        (status = 404, description = "Borrow not found"),
        (status = 409, description = "Concurrent modification, retry"),
        (status = 422, description = "Borrow already closed", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_borrow(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    OptionalJson(body): OptionalJson<ReturnRequest>,
) -> AppResult<Json<ApiResponse<BorrowDetails>>> {
    claims.require_write_borrows()?;
    let request = body.unwrap_or_default();

    let details = state
        .services
        .borrows
        .return_borrow(id, claims.user_id, request.returned_at, Utc::now())
        .await?;
    Ok(success(details))
}

/// Write a borrowed copy off as lost or damaged
#[utoipa::path(
    patch,
    path = "/borrow/{id}/write-off",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrow ID")),
    request_body = WriteOffRequest,
    responses(
        (status = 200, description = "Copy written off and charged", body = BorrowDetails),
        (status = 400, description = "Negative amount"),
        (status = 404, description = "Borrow not found"),
        (status = 422, description = "Borrow already closed", body = crate::error::ErrorResponse)
    )
)]
pub async fn write_off_borrow(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<WriteOffRequest>,
) -> AppResult<Json<ApiResponse<BorrowDetails>>> {
    claims.require_write_borrows()?;
    request.validate()?;

    let details = state
        .services
        .borrows
        .write_off(
            id,
            request.outcome,
            request.amount,
            request.description,
            claims.user_id,
            Utc::now(),
        )
        .await?;
    Ok(success(details))
}

/// Add a note to a borrow
#[utoipa::path(
    post,
    path = "/borrow/{id}/notes",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrow ID")),
    request_body = AddNoteRequest,
    responses(
        (status = 201, description = "Note added", body = BorrowDetails),
        (status = 400, description = "Empty note"),
        (status = 404, description = "Borrow not found")
    )
)]
pub async fn add_note(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<AddNoteRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<BorrowDetails>>)> {
    claims.require_write_borrows()?;
    request.validate()?;

    let details = state
        .services
        .borrows
        .add_note(
            id,
            request.text,
            request.note_type.unwrap_or(NoteType::General),
            claims.user_id,
            Utc::now(),
        )
        .await?;
    Ok((StatusCode::CREATED, success(details)))
}

/// Charge a fine on a borrow
#[utoipa::path(
    post,
    path = "/borrow/{id}/fines",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrow ID")),
    request_body = IssueFineRequest,
    responses(
        (status = 201, description = "Fine issued", body = Fine),
        (status = 400, description = "Invalid amount or description"),
        (status = 404, description = "Borrow not found")
    )
)]
pub async fn issue_fine(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<IssueFineRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Fine>>)> {
    claims.require_write_borrows()?;
    request.validate()?;

    let fine = state
        .services
        .borrows
        .issue_fine(
            id,
            request.kind,
            request.amount,
            request.description,
            claims.user_id,
            Utc::now(),
        )
        .await?;
    Ok((StatusCode::CREATED, success(fine)))
}

/// Record payment of a pending fine
#[utoipa::path(
    patch,
    path = "/borrow/{id}/fines/{fine_id}/pay",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Borrow ID"),
        ("fine_id" = i32, Path, description = "Fine ID")
    ),
    responses(
        (status = 200, description = "Fine paid", body = Fine),
        (status = 404, description = "Borrow or fine not found"),
        (status = 409, description = "Fine already paid or waived", body = crate::error::ErrorResponse)
    )
)]
pub async fn pay_fine(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((id, fine_id)): Path<(i32, i32)>,
) -> AppResult<Json<ApiResponse<Fine>>> {
    claims.require_write_borrows()?;

    let fine = state
        .services
        .borrows
        .pay_fine(id, fine_id, claims.user_id, Utc::now())
        .await?;
    Ok(success(fine))
}

/// Waive a pending fine
#[utoipa::path(
    patch,
    path = "/borrow/{id}/fines/{fine_id}/waive",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Borrow ID"),
        ("fine_id" = i32, Path, description = "Fine ID")
    ),
    responses(
        (status = 200, description = "Fine waived", body = Fine),
        (status = 404, description = "Borrow or fine not found"),
        (status = 409, description = "Fine already paid or waived", body = crate::error::ErrorResponse)
    )
)]
pub async fn waive_fine(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((id, fine_id)): Path<(i32, i32)>,
) -> AppResult<Json<ApiResponse<Fine>>> {
    claims.require_write_borrows()?;

    let fine = state.services.borrows.waive_fine(id, fine_id, Utc::now()).await?;
    Ok(success(fine))
}

/// Count a download of the digital edition
#[utoipa::path(
    post,
    path = "/borrow/{id}/download",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrow ID")),
    responses(
        (status = 200, description = "Download recorded", body = DigitalAccess),
        (status = 403, description = "Not the borrower and no write rights"),
        (status = 404, description = "Borrow not found"),
        (status = 422, description = "No digital access or limit reached", body = crate::error::ErrorResponse)
    )
)]
pub async fn record_download(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<DigitalAccess>>> {
    require_owner_or(&state, &claims, id, UserClaims::require_write_borrows).await?;

    let access = state.services.borrows.record_download(id, Utc::now()).await?;
    Ok(success(access))
}

/// Reminder kind due for a borrow right now
#[utoipa::path(
    get,
    path = "/borrow/{id}/reminder",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrow ID")),
    responses(
        (status = 200, description = "Pending reminder, if any", body = PendingReminder),
        (status = 404, description = "Borrow not found")
    )
)]
pub async fn pending_reminder(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<PendingReminder>>> {
    claims.require_write_borrows()?;

    let kind = state.services.borrows.pending_reminder(id, Utc::now()).await?;
    Ok(success(PendingReminder { borrow_id: id, kind }))
}

/// Record a reminder delivered by staff
#[utoipa::path(
    post,
    path = "/borrow/{id}/reminders",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrow ID")),
    request_body = RecordReminderRequest,
    responses(
        (status = 201, description = "Reminder recorded", body = ReminderSent),
        (status = 404, description = "Borrow not found"),
        (status = 409, description = "Reminder of this kind already sent", body = crate::error::ErrorResponse)
    )
)]
pub async fn record_reminder(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<RecordReminderRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<ReminderSent>>)> {
    claims.require_write_borrows()?;

    let entry = state
        .services
        .borrows
        .record_reminder(id, request.kind, request.method, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, success(entry)))
}
