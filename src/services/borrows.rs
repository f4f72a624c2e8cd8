//! Borrow circulation service.
//!
//! Each operation loads fresh state, applies the circulation rules and hands
//! the result to the store in one atomic write. Conflicts are returned to the
//! caller, never retried here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    circulation::{
        fines::{self, Resolution},
        lifecycle::{self, CheckoutContext},
        reminders, BorrowerEligibility, ReminderThresholds,
    },
    config::CirculationConfig,
    error::{AppError, AppResult},
    models::{
        borrow::{DigitalAccess, NoteType, ReminderKind, ReminderMethod, ReminderSent, WriteOffOutcome},
        fine::{Fine, FineKind},
        BorrowDetails, BorrowRecord,
    },
    repository::CirculationStore,
};

fn log_refusal(operation: &'static str, borrow_id: Option<i32>, err: &AppError) {
    if let Some(refusal) = err.refusal() {
        tracing::debug!(operation, borrow_id, code = refusal.code(), "Circulation request refused");
    }
}

#[derive(Clone)]
pub struct BorrowsService {
    store: Arc<dyn CirculationStore>,
    settings: Arc<CirculationConfig>,
    eligibility: Arc<dyn BorrowerEligibility>,
}

impl BorrowsService {
    pub fn new(
        store: Arc<dyn CirculationStore>,
        settings: Arc<CirculationConfig>,
        eligibility: Arc<dyn BorrowerEligibility>,
    ) -> Self {
        Self {
            store,
            settings,
            eligibility,
        }
    }

    /// Load a borrow, persisting the overdue status if it became due
    async fn load(&self, id: i32, now: DateTime<Utc>) -> AppResult<BorrowRecord> {
        let mut record = self.store.get_borrow(id).await?;
        if lifecycle::refresh_status(&mut record, now) {
            self.store.mark_overdue(id, now).await?;
            tracing::debug!(borrow_id = id, "Borrow marked overdue on read");
        }
        Ok(record)
    }

    /// Check a book out to a member
    pub async fn checkout(
        &self,
        user_id: i32,
        book_id: i32,
        issued_by: i32,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowDetails> {
        let book = self.store.get_book(book_id).await?;
        let member = self.store.get_member(user_id).await?;
        // Early refusal only; the store re-counts under the member lock.
        let open_borrows = self.store.count_open_borrows(user_id).await?;

        let plan = lifecycle::plan_checkout(&CheckoutContext {
            book: &book,
            member: &member,
            open_borrows,
            issued_by,
            now,
            settings: &self.settings,
            eligibility: self.eligibility.as_ref(),
        })
        .inspect_err(|e| log_refusal("checkout", None, e))?;

        let record = self
            .store
            .checkout(&plan)
            .await
            .inspect_err(|e| log_refusal("checkout", None, e))?;

        tracing::info!(
            borrow_id = record.id,
            book_id,
            user_id,
            issued_by,
            due_date = %record.due_date,
            "Book checked out"
        );
        Ok(BorrowDetails::at(record, now))
    }

    /// Member holding a borrow. Read only, nothing is persisted.
    pub async fn owner_of(&self, id: i32) -> AppResult<i32> {
        Ok(self.store.get_borrow(id).await?.user_id)
    }

    pub async fn get(&self, id: i32, now: DateTime<Utc>) -> AppResult<BorrowDetails> {
        let record = self.load(id, now).await?;
        Ok(BorrowDetails::at(record, now))
    }

    /// Borrows of a member, newest first
    pub async fn user_borrows(
        &self,
        user_id: i32,
        open_only: bool,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<BorrowDetails>> {
        self.store.get_member(user_id).await?;

        let records = self.store.list_user_borrows(user_id, open_only).await?;
        let mut details = Vec::with_capacity(records.len());
        for mut record in records {
            if lifecycle::refresh_status(&mut record, now) {
                self.store.mark_overdue(record.id, now).await?;
            }
            details.push(BorrowDetails::at(record, now));
        }
        Ok(details)
    }

    pub async fn renew(
        &self,
        id: i32,
        renewed_by: i32,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowDetails> {
        let mut record = self.load(id, now).await?;
        let book = self.store.get_book(record.book_id).await?;

        let entry = lifecycle::renew(&mut record, &book, renewed_by, reason, now, &self.settings)
            .inspect_err(|e| log_refusal("renew", Some(id), e))?;
        self.store.save_renewal(&record, &entry).await?;
        record.version += 1;

        tracing::info!(
            borrow_id = id,
            renewed_by,
            renewal_count = record.renewal_count,
            due_date = %record.due_date,
            "Borrow renewed"
        );
        Ok(BorrowDetails::at(record, now))
    }

    /// Register a return; a late return is charged at the configured daily rate
    pub async fn return_borrow(
        &self,
        id: i32,
        returned_to: i32,
        returned_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowDetails> {
        let mut record = self.load(id, now).await?;

        let late_fine = lifecycle::return_copy(&mut record, returned_to, returned_at, now, &self.settings)
            .inspect_err(|e| log_refusal("return", Some(id), e))?;
        self.store.save_return(&record, late_fine.as_ref()).await?;

        tracing::info!(
            borrow_id = id,
            book_id = record.book_id,
            returned_to,
            late_fine = %late_fine.as_ref().map_or(Decimal::ZERO, |f| f.amount),
            "Book returned"
        );

        let record = self.store.get_borrow(id).await?;
        Ok(BorrowDetails::at(record, now))
    }

    /// Write a copy off as lost or damaged and charge for it
    pub async fn write_off(
        &self,
        id: i32,
        outcome: WriteOffOutcome,
        amount: Decimal,
        description: Option<String>,
        issued_by: i32,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowDetails> {
        let mut record = self.load(id, now).await?;

        let fine = lifecycle::write_off(&mut record, outcome, amount, description, issued_by, now)
            .inspect_err(|e| log_refusal("write_off", Some(id), e))?;
        self.store.save_write_off(&record, &fine).await?;

        tracing::info!(
            borrow_id = id,
            book_id = record.book_id,
            status = %record.status,
            amount = %fine.amount,
            issued_by,
            "Copy written off"
        );

        let record = self.store.get_borrow(id).await?;
        Ok(BorrowDetails::at(record, now))
    }

    pub async fn add_note(
        &self,
        id: i32,
        text: String,
        note_type: NoteType,
        added_by: i32,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowDetails> {
        let mut record = self.load(id, now).await?;
        let note = lifecycle::add_note(&mut record, text, added_by, note_type, now)?;
        self.store.append_note(id, &note).await?;
        Ok(BorrowDetails::at(record, now))
    }

    /// Charge a staff-reported fine on a borrow
    pub async fn issue_fine(
        &self,
        id: i32,
        kind: FineKind,
        amount: Decimal,
        description: String,
        issued_by: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Fine> {
        self.store.get_borrow(id).await?;

        let new_fine = fines::issue_fine(kind, amount, description, issued_by, now)?;
        let fine = self.store.append_fine(id, &new_fine).await?;

        tracing::info!(borrow_id = id, fine_id = fine.id, kind = %fine.kind, amount = %fine.amount, "Fine issued");
        Ok(fine)
    }

    pub async fn pay_fine(&self, id: i32, fine_id: i32, paid_to: i32, now: DateTime<Utc>) -> AppResult<Fine> {
        self.resolve_fine(id, fine_id, Resolution::Paid { paid_to }, now).await
    }

    pub async fn waive_fine(&self, id: i32, fine_id: i32, now: DateTime<Utc>) -> AppResult<Fine> {
        self.resolve_fine(id, fine_id, Resolution::Waived, now).await
    }

    async fn resolve_fine(
        &self,
        id: i32,
        fine_id: i32,
        resolution: Resolution,
        now: DateTime<Utc>,
    ) -> AppResult<Fine> {
        let record = self.store.get_borrow(id).await?;
        let mut fine = record
            .fines
            .into_iter()
            .find(|f| f.id == fine_id)
            .ok_or_else(|| AppError::NotFound(format!("Fine {} not found on borrow {}", fine_id, id)))?;

        fines::resolve_fine(&mut fine, resolution, now)
            .map_err(AppError::from)
            .inspect_err(|e| log_refusal("resolve_fine", Some(id), e))?;
        self.store.save_fine_resolution(&fine).await?;

        tracing::info!(borrow_id = id, fine_id, status = %fine.status, "Fine resolved");
        Ok(fine)
    }

    /// Count a download of the digital edition
    pub async fn record_download(&self, id: i32, now: DateTime<Utc>) -> AppResult<DigitalAccess> {
        let mut record = self.load(id, now).await?;

        lifecycle::record_download(&mut record, now)
            .map_err(AppError::from)
            .inspect_err(|e| log_refusal("download", Some(id), e))?;
        self.store.save_download(&record).await?;

        record
            .digital_access
            .ok_or_else(|| AppError::Internal(format!("Borrow {} lost its digital access", id)))
    }

    /// The reminder kind due for a borrow right now, if any
    pub async fn pending_reminder(&self, id: i32, now: DateTime<Utc>) -> AppResult<Option<ReminderKind>> {
        let record = self.load(id, now).await?;
        Ok(reminders::reminder_due(&record, now, &ReminderThresholds::from(self.settings.as_ref())))
    }

    /// Record that a reminder was delivered
    pub async fn record_reminder(
        &self,
        id: i32,
        kind: ReminderKind,
        method: ReminderMethod,
        now: DateTime<Utc>,
    ) -> AppResult<ReminderSent> {
        let mut record = self.store.get_borrow(id).await?;
        let entry = reminders::record_reminder(&mut record, kind, method, now)?;
        self.store.append_reminder(id, &entry).await?;
        Ok(entry)
    }
}
