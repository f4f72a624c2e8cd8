//! Repository layer for database operations

pub mod books;
pub mod borrows;
pub mod members;

#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        book::{BookQuery, CreateBook, UpdateBook},
        borrow::{BorrowNote, NewBorrow, RenewalEntry, ReminderSent},
        fine::{Fine, NewFine},
        Book, BorrowRecord, Member,
    },
};

/// Persistence seam of the circulation core.
///
/// Lifecycle writes (`save_*`) receive the record already mutated by the
/// domain rules, still carrying the version it was loaded with. They fail
/// with `Conflict` when the stored version moved on, and apply the matching
/// copy-ledger change in the same atomic unit.
#[async_trait]
pub trait CirculationStore: Send + Sync {
    async fn get_book(&self, id: i32) -> AppResult<Book>;
    async fn list_books(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)>;
    async fn create_book(&self, book: &CreateBook, now: DateTime<Utc>) -> AppResult<Book>;
    async fn update_book(&self, id: i32, update: &UpdateBook, now: DateTime<Utc>) -> AppResult<Book>;
    async fn set_total_copies(&self, id: i32, total_copies: i32, now: DateTime<Utc>) -> AppResult<Book>;

    async fn get_member(&self, id: i32) -> AppResult<Member>;

    async fn get_borrow(&self, id: i32) -> AppResult<BorrowRecord>;
    async fn list_user_borrows(&self, user_id: i32, open_only: bool) -> AppResult<Vec<BorrowRecord>>;
    async fn list_open_borrows(&self) -> AppResult<Vec<BorrowRecord>>;
    async fn count_open_borrows(&self, user_id: i32) -> AppResult<i64>;

    /// Take a copy and insert the borrow. Refuses with `NoCopiesAvailable` if
    /// none is left and `MaxBorrowsReached` if the member already holds
    /// `borrow_limit` open borrows, both checked atomically with the insert.
    async fn checkout(&self, borrow: &NewBorrow) -> AppResult<BorrowRecord>;
    async fn save_renewal(&self, record: &BorrowRecord, entry: &RenewalEntry) -> AppResult<()>;
    async fn save_return(&self, record: &BorrowRecord, late_fine: Option<&NewFine>) -> AppResult<()>;
    async fn save_write_off(&self, record: &BorrowRecord, fine: &NewFine) -> AppResult<()>;
    async fn save_download(&self, record: &BorrowRecord) -> AppResult<()>;
    async fn mark_overdue(&self, borrow_id: i32, now: DateTime<Utc>) -> AppResult<bool>;
    async fn mark_all_overdue(&self, now: DateTime<Utc>) -> AppResult<u64>;

    async fn append_fine(&self, borrow_id: i32, fine: &NewFine) -> AppResult<Fine>;
    /// `FineAlreadyResolved` if the stored fine is no longer pending
    async fn save_fine_resolution(&self, fine: &Fine) -> AppResult<()>;
    async fn append_note(&self, borrow_id: i32, note: &BorrowNote) -> AppResult<()>;
    /// `ReminderAlreadySent` if this kind is already recorded
    async fn append_reminder(&self, borrow_id: i32, reminder: &ReminderSent) -> AppResult<()>;
}

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub books: books::BooksRepository,
    pub borrows: borrows::BorrowsRepository,
    pub members: members::MembersRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: books::BooksRepository::new(pool.clone()),
            borrows: borrows::BorrowsRepository::new(pool.clone()),
            members: members::MembersRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl CirculationStore for Repository {
    async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.books.get_by_id(id).await
    }

    async fn list_books(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        self.books.list(query).await
    }

    async fn create_book(&self, book: &CreateBook, now: DateTime<Utc>) -> AppResult<Book> {
        self.books.create(book, now).await
    }

    async fn update_book(&self, id: i32, update: &UpdateBook, now: DateTime<Utc>) -> AppResult<Book> {
        self.books.update(id, update, now).await
    }

    async fn set_total_copies(&self, id: i32, total_copies: i32, now: DateTime<Utc>) -> AppResult<Book> {
        self.books.set_total_copies(id, total_copies, now).await
    }

    async fn get_member(&self, id: i32) -> AppResult<Member> {
        self.members.get_by_id(id).await
    }

    async fn get_borrow(&self, id: i32) -> AppResult<BorrowRecord> {
        self.borrows.get_by_id(id).await
    }

    async fn list_user_borrows(&self, user_id: i32, open_only: bool) -> AppResult<Vec<BorrowRecord>> {
        self.borrows.list_for_user(user_id, open_only).await
    }

    async fn list_open_borrows(&self) -> AppResult<Vec<BorrowRecord>> {
        self.borrows.list_open().await
    }

    async fn count_open_borrows(&self, user_id: i32) -> AppResult<i64> {
        self.borrows.count_open_for_user(user_id).await
    }

    async fn checkout(&self, borrow: &NewBorrow) -> AppResult<BorrowRecord> {
        self.borrows.checkout(borrow).await
    }

    async fn save_renewal(&self, record: &BorrowRecord, entry: &RenewalEntry) -> AppResult<()> {
        self.borrows.save_renewal(record, entry).await
    }

    async fn save_return(&self, record: &BorrowRecord, late_fine: Option<&NewFine>) -> AppResult<()> {
        self.borrows.save_return(record, late_fine).await
    }

    async fn save_write_off(&self, record: &BorrowRecord, fine: &NewFine) -> AppResult<()> {
        self.borrows.save_write_off(record, fine).await
    }

    async fn save_download(&self, record: &BorrowRecord) -> AppResult<()> {
        self.borrows.save_download(record).await
    }

    async fn mark_overdue(&self, borrow_id: i32, now: DateTime<Utc>) -> AppResult<bool> {
        self.borrows.mark_overdue(borrow_id, now).await
    }

    async fn mark_all_overdue(&self, now: DateTime<Utc>) -> AppResult<u64> {
        self.borrows.mark_all_overdue(now).await
    }

    async fn append_fine(&self, borrow_id: i32, fine: &NewFine) -> AppResult<Fine> {
        self.borrows.append_fine(borrow_id, fine).await
    }

    async fn save_fine_resolution(&self, fine: &Fine) -> AppResult<()> {
        self.borrows.save_fine_resolution(fine).await
    }

    async fn append_note(&self, borrow_id: i32, note: &BorrowNote) -> AppResult<()> {
        self.borrows.append_note(borrow_id, note).await
    }

    async fn append_reminder(&self, borrow_id: i32, reminder: &ReminderSent) -> AppResult<()> {
        self.borrows.append_reminder(borrow_id, reminder).await
    }
}
