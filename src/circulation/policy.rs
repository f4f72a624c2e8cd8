//! Circulation policy: due dates, renewal eligibility, overdue and late fines.
//!
//! Everything here is a pure function of a book, a borrow snapshot and a
//! reference instant. Day counts are whole calendar days, rounded up.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::{
    config::CirculationConfig,
    error::Refusal,
    models::{Book, BorrowRecord, BorrowStatus},
};

const SECONDS_PER_DAY: i64 = 86_400;

/// Whole days in `span`, rounded up; non-positive spans count as 0
pub fn ceil_days(span: Duration) -> i64 {
    let secs = span.num_seconds();
    if secs <= 0 {
        0
    } else {
        (secs + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
    }
}

/// `from + book.max_borrow_days`.
///
/// Checkout passes the borrow date; renewal passes the current due date, so a
/// renewal extends the existing period instead of restarting it.
pub fn compute_due_date(from: DateTime<Utc>, book: &Book) -> DateTime<Utc> {
    from + Duration::days(i64::from(book.max_borrow_days))
}

pub fn is_overdue(record: &BorrowRecord, as_of: DateTime<Utc>) -> bool {
    record.status.is_open() && as_of > record.due_date
}

/// Days past the due date; 0 unless the borrow is open and late
pub fn days_overdue(record: &BorrowRecord, as_of: DateTime<Utc>) -> i64 {
    if is_overdue(record, as_of) {
        ceil_days(as_of - record.due_date)
    } else {
        0
    }
}

/// Days between checkout and the actual return (or `now` while still out)
pub fn days_borrowed(record: &BorrowRecord, now: DateTime<Utc>) -> i64 {
    let end = record.actual_return_date.unwrap_or(now);
    ceil_days(end - record.borrow_date)
}

/// `days_overdue * daily_rate`, never negative
pub fn compute_late_fine(record: &BorrowRecord, as_of: DateTime<Utc>, daily_rate: Decimal) -> Decimal {
    let fine = Decimal::from(days_overdue(record, as_of)) * daily_rate;
    fine.max(Decimal::ZERO)
}

/// Check whether `record` may be renewed at `as_of`
pub fn can_renew(
    record: &BorrowRecord,
    book: &Book,
    as_of: DateTime<Utc>,
    settings: &CirculationConfig,
) -> Result<(), Refusal> {
    if record.status.is_terminal() {
        return Err(Refusal::NotActive);
    }
    if record.status == BorrowStatus::Overdue || is_overdue(record, as_of) {
        return Err(Refusal::AlreadyOverdue);
    }
    if record.renewal_count >= book.renewal_limit {
        return Err(Refusal::RenewalLimitReached);
    }
    if settings.block_renewal_on_outstanding_fines && record.fines.iter().any(|f| f.is_pending()) {
        return Err(Refusal::OutstandingFine);
    }
    Ok(())
}
