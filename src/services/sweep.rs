//! Periodic reconciliation: persist overdue statuses and deliver reminders

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::{task::JoinHandle, time};

use super::notifications::{Notifier, ReminderMessage};
use crate::{
    circulation::{fines, policy, reminders, ReminderThresholds},
    error::AppResult,
    models::{
        borrow::{ReminderKind, ReminderSent},
        BorrowRecord,
    },
    repository::CirculationStore,
};

/// Outcome of one sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub marked_overdue: u64,
    pub reminders_sent: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct ReconciliationSweep {
    store: Arc<dyn CirculationStore>,
    notifier: Arc<dyn Notifier>,
    thresholds: ReminderThresholds,
}

impl ReconciliationSweep {
    pub fn new(
        store: Arc<dyn CirculationStore>,
        notifier: Arc<dyn Notifier>,
        thresholds: ReminderThresholds,
    ) -> Self {
        Self {
            store,
            notifier,
            thresholds,
        }
    }

    /// Run one pass. A failed delivery is not recorded, so the next pass
    /// tries again.
    pub async fn run_once(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let mut report = SweepReport {
            marked_overdue: self.store.mark_all_overdue(now).await?,
            ..Default::default()
        };

        for record in self.store.list_open_borrows().await? {
            let Some(kind) = reminders::reminder_due(&record, now, &self.thresholds) else {
                continue;
            };
            match self.deliver(&record, kind, now).await {
                Ok(()) => report.reminders_sent += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(borrow_id = record.id, %kind, "Reminder not delivered: {}", e);
                }
            }
        }

        Ok(report)
    }

    async fn deliver(
        &self,
        record: &BorrowRecord,
        kind: ReminderKind,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let member = self.store.get_member(record.user_id).await?;
        let book = self.store.get_book(record.book_id).await?;

        let message = ReminderMessage {
            borrow_id: record.id,
            kind,
            member_name: member.display_name,
            member_email: member.email,
            book_title: book.title,
            due_date: record.due_date,
            days_overdue: policy::days_overdue(record, now),
            total_fines: fines::total_pending(&record.fines),
        };
        self.notifier.send_reminder(&message).await?;

        let entry = ReminderSent {
            kind,
            sent_date: now,
            method: self.notifier.method(),
        };
        self.store.append_reminder(record.id, &entry).await
    }

    /// Run the sweep every `period` until the task is aborted
    pub fn spawn(self, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                match self.run_once(Utc::now()).await {
                    Ok(report) => tracing::info!(
                        marked_overdue = report.marked_overdue,
                        reminders_sent = report.reminders_sent,
                        failed = report.failed,
                        "Circulation sweep finished"
                    ),
                    Err(e) => tracing::error!("Circulation sweep failed: {}", e),
                }
            }
        })
    }
}
