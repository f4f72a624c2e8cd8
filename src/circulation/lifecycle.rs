//! Borrow record state machine.
//!
//! ```text
//!            renew
//!           ┌──────┐
//!           ▼      │
//! checkout ─► active ──(past due)──► overdue
//!             │  │                    │  │
//!             │  └──────► returned ◄──┘  │
//!             └─────► lost / damaged ◄───┘
//! ```
//!
//! Every transition validates first and mutates only on success, so a refused
//! call leaves the record untouched. Persisting the result atomically with
//! the inventory change is the store's job.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::{eligibility::BorrowerEligibility, fines, policy};
use crate::{
    config::CirculationConfig,
    error::{AppError, AppResult, Refusal},
    models::{
        borrow::{
            BorrowNote, DigitalAccess, NewBorrow, NoteType, RenewalEntry, WriteOffOutcome,
        },
        fine::{FineKind, NewFine},
        member::MemberStatus,
        Book, BorrowRecord, BorrowStatus, Member,
    },
};

/// Everything a checkout decision depends on
pub struct CheckoutContext<'a> {
    pub book: &'a Book,
    pub member: &'a Member,
    /// Active or overdue borrows the member already holds
    pub open_borrows: i64,
    pub issued_by: i32,
    pub now: DateTime<Utc>,
    pub settings: &'a CirculationConfig,
    pub eligibility: &'a dyn BorrowerEligibility,
}

/// Validate a checkout and build the record to insert
pub fn plan_checkout(ctx: &CheckoutContext<'_>) -> AppResult<NewBorrow> {
    let book = ctx.book;
    if !book.is_borrowable() {
        return Err(Refusal::NoCopiesAvailable.into());
    }
    if ctx.member.status == MemberStatus::Blocked {
        return Err(Refusal::MemberBlocked.into());
    }
    if book.is_restricted
        && !ctx
            .eligibility
            .may_borrow_restricted(ctx.member, ctx.now.date_naive())
    {
        return Err(Refusal::RestrictedBook.into());
    }
    if ctx.open_borrows >= ctx.settings.max_active_borrows {
        return Err(Refusal::MaxBorrowsReached.into());
    }

    let due_date = policy::compute_due_date(ctx.now, book);
    if due_date <= ctx.now {
        return Err(AppError::Validation(format!(
            "Book {} has a non-positive borrow period ({} days)",
            book.id, book.max_borrow_days
        )));
    }

    let digital_access = book.format.has_digital().then(|| DigitalAccess {
        access_granted: true,
        access_expiry: due_date,
        download_count: 0,
        max_downloads: ctx.settings.max_downloads,
    });

    Ok(NewBorrow {
        user_id: ctx.member.id,
        book_id: book.id,
        borrow_date: ctx.now,
        due_date,
        issued_by: ctx.issued_by,
        digital_access,
        borrow_limit: ctx.settings.max_active_borrows,
    })
}

/// Lazy `active → overdue` correction. Returns whether the status changed.
pub fn refresh_status(record: &mut BorrowRecord, now: DateTime<Utc>) -> bool {
    if record.status == BorrowStatus::Active && policy::is_overdue(record, now) {
        record.status = BorrowStatus::Overdue;
        true
    } else {
        false
    }
}

/// Extend the due date by one borrow period from the current due date
pub fn renew(
    record: &mut BorrowRecord,
    book: &Book,
    renewed_by: i32,
    reason: Option<String>,
    now: DateTime<Utc>,
    settings: &CirculationConfig,
) -> AppResult<RenewalEntry> {
    policy::can_renew(record, book, now, settings)?;

    let new_due_date = policy::compute_due_date(record.due_date, book);
    let entry = RenewalEntry {
        renewed_date: now,
        previous_due_date: record.due_date,
        new_due_date,
        renewed_by,
        reason,
    };

    record.due_date = new_due_date;
    record.renewal_count += 1;
    if let Some(access) = record.digital_access.as_mut() {
        access.access_expiry = new_due_date;
    }
    record.updated_at = now;
    record.renewal_history.push(entry.clone());
    Ok(entry)
}

/// Close the borrow as returned; returns the late fine to issue, if any
pub fn return_copy(
    record: &mut BorrowRecord,
    returned_to: i32,
    returned_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    settings: &CirculationConfig,
) -> AppResult<Option<NewFine>> {
    if record.status.is_terminal() {
        return Err(Refusal::NotActive.into());
    }

    let actual = returned_at.unwrap_or(now);
    if actual < record.borrow_date {
        return Err(AppError::Validation(
            "Return date cannot precede the borrow date".to_string(),
        ));
    }
    if actual > now {
        return Err(AppError::Validation("Return date cannot be in the future".to_string()));
    }

    let late_fine = if policy::is_overdue(record, actual) {
        let days = policy::days_overdue(record, actual);
        let amount = policy::compute_late_fine(record, actual, settings.daily_fine_rate);
        Some(fines::issue_fine(
            FineKind::LateReturn,
            amount,
            format!("Returned {} day(s) late", days),
            returned_to,
            now,
        )?)
    } else {
        None
    };

    record.status = BorrowStatus::Returned;
    record.actual_return_date = Some(actual);
    record.return_date = Some(now);
    record.returned_to = Some(returned_to);
    if let Some(access) = record.digital_access.as_mut() {
        access.access_granted = false;
    }
    record.updated_at = now;
    Ok(late_fine)
}

/// Record a loss or damage; returns the fine charged for it
pub fn write_off(
    record: &mut BorrowRecord,
    outcome: WriteOffOutcome,
    amount: Decimal,
    description: Option<String>,
    issued_by: i32,
    now: DateTime<Utc>,
) -> AppResult<NewFine> {
    if record.status.is_terminal() {
        return Err(Refusal::NotActive.into());
    }

    let (status, kind, default_description) = match outcome {
        WriteOffOutcome::Lost => (BorrowStatus::Lost, FineKind::Lost, "Copy reported lost"),
        WriteOffOutcome::Damaged => (BorrowStatus::Damaged, FineKind::Damage, "Copy returned damaged"),
    };
    let fine = fines::issue_fine(
        kind,
        amount,
        description.unwrap_or_else(|| default_description.to_string()),
        issued_by,
        now,
    )?;

    record.status = status;
    if let Some(access) = record.digital_access.as_mut() {
        access.access_granted = false;
    }
    record.updated_at = now;
    Ok(fine)
}

/// Count one download against the digital access allowance
pub fn record_download(record: &mut BorrowRecord, now: DateTime<Utc>) -> Result<i32, Refusal> {
    let open = record.status.is_open();
    let access = record
        .digital_access
        .as_mut()
        .filter(|a| open && a.access_granted && now <= a.access_expiry)
        .ok_or(Refusal::DigitalAccessUnavailable)?;

    if access.download_count >= access.max_downloads {
        return Err(Refusal::DownloadLimitReached);
    }
    access.download_count += 1;
    let count = access.download_count;
    record.updated_at = now;
    Ok(count)
}

/// Append a note; allowed in any status
pub fn add_note(
    record: &mut BorrowRecord,
    text: String,
    added_by: i32,
    note_type: NoteType,
    now: DateTime<Utc>,
) -> AppResult<BorrowNote> {
    if text.trim().is_empty() {
        return Err(AppError::Validation("Note text cannot be empty".to_string()));
    }
    let note = BorrowNote {
        text,
        added_by,
        added_at: now,
        note_type,
    };
    record.notes.push(note.clone());
    Ok(note)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circulation::{
        eligibility::AgeAndRoleEligibility,
        testing::{book, day, member, record},
    };
    use crate::models::BookFormat;
    use chrono::{Duration, NaiveDate};

    const ELIGIBILITY: AgeAndRoleEligibility = AgeAndRoleEligibility { min_age: 18 };

    fn ctx<'a>(
        book: &'a Book,
        member: &'a Member,
        settings: &'a CirculationConfig,
        now: DateTime<Utc>,
    ) -> CheckoutContext<'a> {
        CheckoutContext {
            book,
            member,
            open_borrows: 0,
            issued_by: 99,
            now,
            settings,
            eligibility: &ELIGIBILITY,
        }
    }

    #[test]
    fn checkout_sets_due_date_from_borrow_date() {
        let settings = CirculationConfig::default();
        let b = book(1, 1);
        let m = member(5);

        let new = plan_checkout(&ctx(&b, &m, &settings, day(0))).unwrap();
        assert_eq!(new.due_date, day(14));
        assert!(new.due_date > new.borrow_date);
        assert_eq!(new.user_id, 5);
        assert_eq!(new.issued_by, 99);
        assert!(new.digital_access.is_none());
    }

    #[test]
    fn checkout_needs_a_due_date_after_the_borrow_date() {
        let settings = CirculationConfig::default();
        let m = member(5);
        let mut b = book(1, 1);
        b.max_borrow_days = 0;

        let err = plan_checkout(&ctx(&b, &m, &settings, day(0))).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(err.refusal(), None);

        b.max_borrow_days = -3;
        assert!(matches!(
            plan_checkout(&ctx(&b, &m, &settings, day(0))),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn checkout_refusals() {
        let settings = CirculationConfig::default();
        let m = member(5);

        let empty = book(1, 0);
        let err = plan_checkout(&ctx(&empty, &m, &settings, day(0))).unwrap_err();
        assert_eq!(err.refusal(), Some(Refusal::NoCopiesAvailable));

        let mut inactive = book(2, 2);
        inactive.is_active = false;
        let err = plan_checkout(&ctx(&inactive, &m, &settings, day(0))).unwrap_err();
        assert_eq!(err.refusal(), Some(Refusal::NoCopiesAvailable));

        let mut restricted = book(2, 2);
        restricted.is_restricted = true;
        let err = plan_checkout(&ctx(&restricted, &m, &settings, day(0))).unwrap_err();
        assert_eq!(err.refusal(), Some(Refusal::RestrictedBook));

        let mut adult = member(6);
        adult.birthdate = NaiveDate::from_ymd_opt(1980, 5, 1);
        assert!(plan_checkout(&ctx(&restricted, &adult, &settings, day(0))).is_ok());

        let mut blocked = member(7);
        blocked.status = MemberStatus::Blocked;
        let err = plan_checkout(&ctx(&book(1, 1), &blocked, &settings, day(0))).unwrap_err();
        assert_eq!(err.refusal(), Some(Refusal::MemberBlocked));

        let b = book(1, 1);
        let mut busy = ctx(&b, &m, &settings, day(0));
        busy.open_borrows = settings.max_active_borrows;
        assert_eq!(
            plan_checkout(&busy).unwrap_err().refusal(),
            Some(Refusal::MaxBorrowsReached)
        );
    }

    #[test]
    fn digital_checkout_grants_access_until_due() {
        let settings = CirculationConfig::default();
        let mut b = book(3, 3);
        b.format = BookFormat::Both;
        let new = plan_checkout(&ctx(&b, &member(5), &settings, day(0))).unwrap();

        let access = new.digital_access.unwrap();
        assert!(access.access_granted);
        assert_eq!(access.access_expiry, day(14));
        assert_eq!(access.max_downloads, settings.max_downloads);
    }

    #[test]
    fn renewal_extends_from_the_current_due_date() {
        let settings = CirculationConfig::default();
        let b = book(1, 0);
        let mut r = record(day(0), day(14));

        let entry = renew(&mut r, &b, 99, Some("exam week".into()), day(10), &settings).unwrap();
        assert_eq!(entry.previous_due_date, day(14));
        assert_eq!(entry.new_due_date, day(28));
        assert_eq!(r.due_date, day(28));
        assert_eq!(r.renewal_count, 1);
        assert_eq!(r.renewal_history, vec![entry]);
    }

    #[test]
    fn renewal_limit_leaves_the_record_untouched() {
        let settings = CirculationConfig::default();
        let b = book(1, 0);
        let mut r = record(day(0), day(14));

        renew(&mut r, &b, 99, None, day(1), &settings).unwrap();
        renew(&mut r, &b, 99, None, day(2), &settings).unwrap();
        let before = r.clone();

        let err = renew(&mut r, &b, 99, None, day(3), &settings).unwrap_err();
        assert_eq!(err.refusal(), Some(Refusal::RenewalLimitReached));
        assert_eq!(r.due_date, before.due_date);
        assert_eq!(r.renewal_count, 2);
        assert_eq!(r.renewal_history.len(), 2);
    }

    #[test]
    fn late_return_issues_one_late_fine() {
        let settings = CirculationConfig::default();
        let mut r = record(day(0), day(28));

        let fine = return_copy(&mut r, 42, None, day(30), &settings).unwrap().unwrap();
        assert_eq!(fine.kind, FineKind::LateReturn);
        assert_eq!(fine.amount, Decimal::from(2) * settings.daily_fine_rate);
        assert_eq!(r.status, BorrowStatus::Returned);
        assert_eq!(r.actual_return_date, Some(day(30)));
        assert_eq!(r.returned_to, Some(42));
    }

    #[test]
    fn on_time_return_issues_no_fine() {
        let settings = CirculationConfig::default();
        let mut r = record(day(0), day(14));
        assert_eq!(return_copy(&mut r, 42, None, day(14), &settings).unwrap(), None);
        assert_eq!(r.status, BorrowStatus::Returned);
    }

    #[test]
    fn backdated_return_is_judged_at_the_actual_date() {
        let settings = CirculationConfig::default();
        let mut r = record(day(0), day(14));
        let fine = return_copy(&mut r, 42, Some(day(13)), day(20), &settings).unwrap();
        assert_eq!(fine, None);
        assert_eq!(r.return_date, Some(day(20)));

        let mut r = record(day(5), day(19));
        let err = return_copy(&mut r, 42, Some(day(4)), day(20), &settings).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(r.status, BorrowStatus::Active);
    }

    #[test]
    fn terminal_records_cannot_transition_again() {
        let settings = CirculationConfig::default();
        let mut r = record(day(0), day(14));
        return_copy(&mut r, 42, None, day(3), &settings).unwrap();

        let err = return_copy(&mut r, 42, None, day(4), &settings).unwrap_err();
        assert_eq!(err.refusal(), Some(Refusal::NotActive));
        let err = write_off(&mut r, WriteOffOutcome::Lost, Decimal::TEN, None, 42, day(4)).unwrap_err();
        assert_eq!(err.refusal(), Some(Refusal::NotActive));
        assert_eq!(r.status, BorrowStatus::Returned);
    }

    #[test]
    fn write_off_charges_the_matching_fine() {
        let mut r = record(day(0), day(14));
        r.status = BorrowStatus::Overdue;
        let fine = write_off(&mut r, WriteOffOutcome::Damaged, Decimal::TEN, None, 42, day(20)).unwrap();
        assert_eq!(fine.kind, FineKind::Damage);
        assert_eq!(fine.amount, Decimal::TEN);
        assert_eq!(r.status, BorrowStatus::Damaged);
        assert_eq!(r.actual_return_date, None);

        let mut r = record(day(0), day(14));
        let err = write_off(&mut r, WriteOffOutcome::Lost, Decimal::NEGATIVE_ONE, None, 42, day(2)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(r.status, BorrowStatus::Active);
    }

    #[test]
    fn overdue_refresh_is_idempotent() {
        let mut r = record(day(0), day(14));
        assert!(!refresh_status(&mut r, day(14)));
        assert!(refresh_status(&mut r, day(15)));
        assert!(!refresh_status(&mut r, day(16)));
        assert_eq!(r.status, BorrowStatus::Overdue);
    }

    #[test]
    fn downloads_are_capped() {
        let mut r = record(day(0), day(14));
        assert_eq!(record_download(&mut r, day(1)), Err(Refusal::DigitalAccessUnavailable));

        r.digital_access = Some(DigitalAccess {
            access_granted: true,
            access_expiry: day(14),
            download_count: 0,
            max_downloads: 2,
        });
        assert_eq!(record_download(&mut r, day(1)), Ok(1));
        assert_eq!(record_download(&mut r, day(2)), Ok(2));
        assert_eq!(record_download(&mut r, day(3)), Err(Refusal::DownloadLimitReached));
        assert_eq!(
            record_download(&mut r, day(14) + Duration::hours(1)),
            Err(Refusal::DigitalAccessUnavailable)
        );
    }

    #[test]
    fn notes_are_appended() {
        let mut r = record(day(0), day(14));
        let note = add_note(&mut r, "Spine cracked".into(), 42, NoteType::Damage, day(1)).unwrap();
        assert_eq!(r.notes, vec![note]);
        assert!(add_note(&mut r, "  ".into(), 42, NoteType::General, day(1)).is_err());
    }
}
