//! Reminder selection. Delivery belongs to the notifier; this only decides.

use chrono::{DateTime, Duration, Utc};

use super::policy;
use crate::{
    config::CirculationConfig,
    error::Refusal,
    models::borrow::{BorrowRecord, ReminderKind, ReminderMethod, ReminderSent},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderThresholds {
    /// `due_soon` fires within this many days before the due date
    pub due_soon_days: i64,
    /// `final_notice` fires once the borrow is this many days overdue
    pub final_notice_days: i64,
}

impl From<&CirculationConfig> for ReminderThresholds {
    fn from(config: &CirculationConfig) -> Self {
        Self {
            due_soon_days: config.due_soon_days,
            final_notice_days: config.final_notice_days,
        }
    }
}

fn already_sent(record: &BorrowRecord, kind: ReminderKind) -> bool {
    record.reminders_sent.iter().any(|r| r.kind == kind)
}

/// The reminder kind to send now, if any.
///
/// Picks the most severe applicable kind. A kind already recorded in
/// `reminders_sent` is never selected again, so repeated calls are harmless.
pub fn reminder_due(
    record: &BorrowRecord,
    as_of: DateTime<Utc>,
    thresholds: &ReminderThresholds,
) -> Option<ReminderKind> {
    if record.status.is_terminal() {
        return None;
    }

    let candidate = if policy::is_overdue(record, as_of) {
        if policy::days_overdue(record, as_of) >= thresholds.final_notice_days {
            ReminderKind::FinalNotice
        } else {
            ReminderKind::Overdue
        }
    } else if record.due_date - as_of <= Duration::days(thresholds.due_soon_days) {
        ReminderKind::DueSoon
    } else {
        return None;
    };

    // A late reminder supersedes the ones it skipped over.
    match candidate {
        ReminderKind::FinalNotice if already_sent(record, ReminderKind::FinalNotice) => None,
        ReminderKind::Overdue
            if already_sent(record, ReminderKind::Overdue)
                || already_sent(record, ReminderKind::FinalNotice) =>
        {
            None
        }
        ReminderKind::DueSoon
            if already_sent(record, ReminderKind::DueSoon)
                || already_sent(record, ReminderKind::Overdue)
                || already_sent(record, ReminderKind::FinalNotice) =>
        {
            None
        }
        kind => Some(kind),
    }
}

/// Append a delivered reminder; a kind is recorded at most once
pub fn record_reminder(
    record: &mut BorrowRecord,
    kind: ReminderKind,
    method: ReminderMethod,
    sent_date: DateTime<Utc>,
) -> Result<ReminderSent, Refusal> {
    if already_sent(record, kind) {
        return Err(Refusal::ReminderAlreadySent);
    }
    let entry = ReminderSent {
        kind,
        sent_date,
        method,
    };
    record.reminders_sent.push(entry.clone());
    Ok(entry)
}
