//! Borrows repository: borrow rows plus their append-only collections
//! (renewals, fines, notes, reminders).
//!
//! Lifecycle writes compare the caller's `version` against the row and bump
//! it; a mismatch means someone else changed the record first.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, FromRow, PgExecutor, Pool, Postgres, Row};

use super::books::BooksRepository;
use crate::{
    error::{AppError, AppResult, Refusal},
    models::{
        borrow::{BorrowNote, BorrowRow, NewBorrow, RenewalEntry, ReminderSent},
        fine::{Fine, NewFine},
        BorrowRecord, BorrowStatus,
    },
};

const RENEWALS_SQL: &str = r#"
    SELECT borrow_id, renewed_date, previous_due_date, new_due_date, renewed_by, reason
    FROM borrow_renewals WHERE borrow_id = ANY($1) ORDER BY id
"#;
const FINES_SQL: &str = "SELECT * FROM borrow_fines WHERE borrow_id = ANY($1) ORDER BY id";
const NOTES_SQL: &str = r#"
    SELECT borrow_id, text, added_by, added_at, note_type
    FROM borrow_notes WHERE borrow_id = ANY($1) ORDER BY id
"#;
const REMINDERS_SQL: &str = r#"
    SELECT borrow_id, kind, sent_date, method
    FROM borrow_reminders WHERE borrow_id = ANY($1) ORDER BY id
"#;

#[derive(Clone)]
pub struct BorrowsRepository {
    pool: Pool<Postgres>,
}

impl BorrowsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get a borrow with all its collections
    pub async fn get_by_id(&self, id: i32) -> AppResult<BorrowRecord> {
        let row = sqlx::query_as::<_, BorrowRow>("SELECT * FROM borrows WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrow with id {} not found", id)))?;

        let mut records = self.assemble(vec![row]).await?;
        records
            .pop()
            .ok_or_else(|| AppError::Internal(format!("Borrow {} vanished while loading", id)))
    }

    /// Borrows of a member, newest first
    pub async fn list_for_user(&self, user_id: i32, open_only: bool) -> AppResult<Vec<BorrowRecord>> {
        let rows = sqlx::query_as::<_, BorrowRow>(
            r#"
            SELECT * FROM borrows
            WHERE user_id = $1 AND (NOT $2 OR status IN ('active', 'overdue'))
            ORDER BY borrow_date DESC, id DESC
            "#,
        )
        .bind(user_id)
        .bind(open_only)
        .fetch_all(&self.pool)
        .await?;

        self.assemble(rows).await
    }

    /// Every active or overdue borrow, oldest due date first
    pub async fn list_open(&self) -> AppResult<Vec<BorrowRecord>> {
        let rows = sqlx::query_as::<_, BorrowRow>(
            "SELECT * FROM borrows WHERE status IN ('active', 'overdue') ORDER BY due_date, id",
        )
        .fetch_all(&self.pool)
        .await?;

        self.assemble(rows).await
    }

    pub async fn count_open_for_user(&self, user_id: i32) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM borrows WHERE user_id = $1 AND status IN ('active', 'overdue')",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Take a copy and create the borrow in one transaction.
    ///
    /// The member row is locked so concurrent checkouts for the same member
    /// see each other's borrows when the limit is counted.
    pub async fn checkout(&self, borrow: &NewBorrow) -> AppResult<BorrowRecord> {
        if borrow.due_date <= borrow.borrow_date {
            return Err(AppError::InvariantViolation(format!(
                "Due date {} is not after borrow date {}",
                borrow.due_date, borrow.borrow_date
            )));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query_scalar::<_, i32>("SELECT id FROM members WHERE id = $1 FOR UPDATE")
            .bind(borrow.user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Member with id {} not found", borrow.user_id)))?;

        let open = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM borrows WHERE user_id = $1 AND status IN ('active', 'overdue')",
        )
        .bind(borrow.user_id)
        .fetch_one(&mut *tx)
        .await?;
        if open >= borrow.borrow_limit {
            return Err(Refusal::MaxBorrowsReached.into());
        }

        BooksRepository::take_copy(&mut *tx, borrow.book_id, borrow.borrow_date).await?;

        let access = borrow.digital_access.as_ref();
        let row = sqlx::query_as::<_, BorrowRow>(
            r#"
            INSERT INTO borrows (
                user_id, book_id, borrow_date, due_date, status, renewal_count, issued_by,
                digital_access_granted, digital_access_expiry, download_count, max_downloads,
                version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, 'active', 0, $5, $6, $7, $8, $9, 1, $3, $3)
            RETURNING *
            "#,
        )
        .bind(borrow.user_id)
        .bind(borrow.book_id)
        .bind(borrow.borrow_date)
        .bind(borrow.due_date)
        .bind(borrow.issued_by)
        .bind(access.map(|a| a.access_granted))
        .bind(access.map(|a| a.access_expiry))
        .bind(access.map(|a| a.download_count))
        .bind(access.map(|a| a.max_downloads))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into_record(Vec::new(), Vec::new(), Vec::new(), Vec::new()))
    }

    /// Persist a renewal: new due date, counter, history entry
    pub async fn save_renewal(&self, record: &BorrowRecord, entry: &RenewalEntry) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE borrows SET
                due_date = $3,
                renewal_count = $4,
                digital_access_expiry = $5,
                version = version + 1,
                updated_at = $6
            WHERE id = $1 AND version = $2 AND status = 'active'
            "#,
        )
        .bind(record.id)
        .bind(record.version)
        .bind(record.due_date)
        .bind(record.renewal_count)
        .bind(record.digital_access.as_ref().map(|a| a.access_expiry))
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(stale(record.id));
        }

        sqlx::query(
            r#"
            INSERT INTO borrow_renewals
                (borrow_id, renewed_date, previous_due_date, new_due_date, renewed_by, reason)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id)
        .bind(entry.renewed_date)
        .bind(entry.previous_due_date)
        .bind(entry.new_due_date)
        .bind(entry.renewed_by)
        .bind(&entry.reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Close the borrow as returned, restore the copy and charge any late fine
    pub async fn save_return(&self, record: &BorrowRecord, late_fine: Option<&NewFine>) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE borrows SET
                status = $3,
                return_date = $4,
                actual_return_date = $5,
                returned_to = $6,
                digital_access_granted = $7,
                version = version + 1,
                updated_at = $8
            WHERE id = $1 AND version = $2 AND status IN ('active', 'overdue')
            "#,
        )
        .bind(record.id)
        .bind(record.version)
        .bind(BorrowStatus::Returned)
        .bind(record.return_date)
        .bind(record.actual_return_date)
        .bind(record.returned_to)
        .bind(record.digital_access.as_ref().map(|a| a.access_granted))
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(stale(record.id));
        }

        BooksRepository::restore_copy(&mut *tx, record.book_id, record.updated_at).await?;

        if let Some(fine) = late_fine {
            Self::insert_fine(&mut *tx, record.id, fine).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Close the borrow as lost or damaged, retire the copy and charge for it
    pub async fn save_write_off(&self, record: &BorrowRecord, fine: &NewFine) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE borrows SET
                status = $3,
                digital_access_granted = $4,
                version = version + 1,
                updated_at = $5
            WHERE id = $1 AND version = $2 AND status IN ('active', 'overdue')
            "#,
        )
        .bind(record.id)
        .bind(record.version)
        .bind(record.status)
        .bind(record.digital_access.as_ref().map(|a| a.access_granted))
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(stale(record.id));
        }

        BooksRepository::retire_copy(&mut *tx, record.book_id, record.updated_at).await?;
        Self::insert_fine(&mut *tx, record.id, fine).await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn save_download(&self, record: &BorrowRecord) -> AppResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE borrows SET
                download_count = $3,
                version = version + 1,
                updated_at = $4
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(record.id)
        .bind(record.version)
        .bind(record.digital_access.as_ref().map(|a| a.download_count))
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(stale(record.id));
        }
        Ok(())
    }

    /// Flip one active borrow to overdue. Idempotent; the version is untouched.
    pub async fn mark_overdue(&self, id: i32, now: DateTime<Utc>) -> AppResult<bool> {
        let updated = sqlx::query(
            "UPDATE borrows SET status = 'overdue', updated_at = $2 WHERE id = $1 AND status = 'active' AND due_date < $2",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    /// Flip every active borrow past its due date to overdue
    pub async fn mark_all_overdue(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let updated = sqlx::query(
            "UPDATE borrows SET status = 'overdue', updated_at = $1 WHERE status = 'active' AND due_date < $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated)
    }

    pub async fn append_fine(&self, borrow_id: i32, fine: &NewFine) -> AppResult<Fine> {
        Self::insert_fine(&self.pool, borrow_id, fine).await
    }

    /// Store a payment or waiver; only a pending fine can be resolved
    pub async fn save_fine_resolution(&self, fine: &Fine) -> AppResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE borrow_fines SET status = $3, date_paid = $4, paid_to = $5
            WHERE id = $1 AND borrow_id = $2 AND status = 'pending'
            "#,
        )
        .bind(fine.id)
        .bind(fine.borrow_id)
        .bind(fine.status)
        .bind(fine.date_paid)
        .bind(fine.paid_to)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(Refusal::FineAlreadyResolved.into());
        }
        Ok(())
    }

    pub async fn append_note(&self, borrow_id: i32, note: &BorrowNote) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO borrow_notes (borrow_id, text, added_by, added_at, note_type) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(borrow_id)
        .bind(&note.text)
        .bind(note.added_by)
        .bind(note.added_at)
        .bind(note.note_type)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a delivered reminder; `(borrow_id, kind)` is unique
    pub async fn append_reminder(&self, borrow_id: i32, reminder: &ReminderSent) -> AppResult<()> {
        let inserted = sqlx::query(
            "INSERT INTO borrow_reminders (borrow_id, kind, sent_date, method) VALUES ($1, $2, $3, $4)",
        )
        .bind(borrow_id)
        .bind(reminder.kind)
        .bind(reminder.sent_date)
        .bind(reminder.method)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(Refusal::ReminderAlreadySent.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_fine<'e, E: PgExecutor<'e>>(executor: E, borrow_id: i32, fine: &NewFine) -> AppResult<Fine> {
        let fine = sqlx::query_as::<_, Fine>(
            r#"
            INSERT INTO borrow_fines (borrow_id, kind, amount, description, date_issued, status, issued_by)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6)
            RETURNING *
            "#,
        )
        .bind(borrow_id)
        .bind(fine.kind)
        .bind(fine.amount)
        .bind(&fine.description)
        .bind(fine.date_issued)
        .bind(fine.issued_by)
        .fetch_one(executor)
        .await?;
        Ok(fine)
    }

    /// Attach the child collections to a batch of rows
    async fn assemble(&self, rows: Vec<BorrowRow>) -> AppResult<Vec<BorrowRecord>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i32> = rows.iter().map(|r| r.id).collect();

        let mut renewals = self.load_children::<RenewalEntry>(RENEWALS_SQL, &ids).await?;
        let mut fines = self.load_children::<Fine>(FINES_SQL, &ids).await?;
        let mut notes = self.load_children::<BorrowNote>(NOTES_SQL, &ids).await?;
        let mut reminders = self.load_children::<ReminderSent>(REMINDERS_SQL, &ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let id = row.id;
                row.into_record(
                    renewals.remove(&id).unwrap_or_default(),
                    fines.remove(&id).unwrap_or_default(),
                    notes.remove(&id).unwrap_or_default(),
                    reminders.remove(&id).unwrap_or_default(),
                )
            })
            .collect())
    }

    async fn load_children<T>(&self, sql: &str, ids: &[i32]) -> AppResult<HashMap<i32, Vec<T>>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let rows = sqlx::query(sql).bind(ids).fetch_all(&self.pool).await?;

        let mut grouped: HashMap<i32, Vec<T>> = HashMap::new();
        for row in rows {
            let borrow_id: i32 = row.try_get("borrow_id")?;
            grouped.entry(borrow_id).or_default().push(T::from_row(&row)?);
        }
        Ok(grouped)
    }
}

fn stale(id: i32) -> AppError {
    AppError::Conflict(format!("Borrow {} was modified concurrently", id))
}
