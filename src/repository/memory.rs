//! In-memory store for service tests. Each operation runs under one lock and
//! checks every condition before mutating, mirroring the SQL guards.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::CirculationStore;
use crate::{
    error::{AppError, AppResult, Refusal},
    models::{
        book::{BookQuery, CreateBook, UpdateBook, DEFAULT_MAX_BORROW_DAYS, DEFAULT_RENEWAL_LIMIT},
        borrow::{BorrowNote, NewBorrow, RenewalEntry, ReminderSent},
        fine::{Fine, FineStatus, NewFine},
        Book, BorrowRecord, BorrowStatus, Member,
    },
};

#[derive(Default)]
struct State {
    books: HashMap<i32, Book>,
    members: HashMap<i32, Member>,
    borrows: HashMap<i32, BorrowRecord>,
    next_id: i32,
}

impl State {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn book_mut(&mut self, id: i32) -> AppResult<&mut Book> {
        self.books
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Stored record if its version still matches and it is open
    fn open_borrow_mut(&mut self, record: &BorrowRecord) -> AppResult<&mut BorrowRecord> {
        self.borrows
            .get_mut(&record.id)
            .filter(|stored| stored.version == record.version && stored.status.is_open())
            .ok_or_else(|| AppError::Conflict(format!("Borrow {} was modified concurrently", record.id)))
    }

    fn new_fine(&mut self, borrow_id: i32, fine: &NewFine) -> Fine {
        Fine {
            id: self.next_id(),
            borrow_id,
            kind: fine.kind,
            amount: fine.amount,
            description: fine.description.clone(),
            date_issued: fine.date_issued,
            date_paid: None,
            status: FineStatus::Pending,
            issued_by: fine.issued_by,
            paid_to: None,
        }
    }
}

/// Copy the mutable scalar fields of `from` and bump the version
fn apply(stored: &mut BorrowRecord, from: &BorrowRecord) {
    stored.due_date = from.due_date;
    stored.return_date = from.return_date;
    stored.actual_return_date = from.actual_return_date;
    stored.status = from.status;
    stored.renewal_count = from.renewal_count;
    stored.returned_to = from.returned_to;
    stored.digital_access = from.digital_access.clone();
    stored.updated_at = from.updated_at;
    stored.version += 1;
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_book(&self, book: Book) {
        let mut state = self.state.lock().await;
        state.next_id = state.next_id.max(book.id);
        state.books.insert(book.id, book);
    }

    pub async fn put_member(&self, member: Member) {
        let mut state = self.state.lock().await;
        state.next_id = state.next_id.max(member.id);
        state.members.insert(member.id, member);
    }

    pub async fn put_borrow(&self, record: BorrowRecord) {
        let mut state = self.state.lock().await;
        state.next_id = state.next_id.max(record.id);
        state.borrows.insert(record.id, record);
    }

    pub async fn book(&self, id: i32) -> Book {
        self.state.lock().await.books[&id].clone()
    }

    pub async fn borrow(&self, id: i32) -> BorrowRecord {
        self.state.lock().await.borrows[&id].clone()
    }
}

#[async_trait]
impl CirculationStore for MemoryStore {
    async fn get_book(&self, id: i32) -> AppResult<Book> {
        let mut state = self.state.lock().await;
        let book = state.book_mut(id)?.clone();
        Ok(book)
    }

    async fn list_books(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        let state = self.state.lock().await;
        let needle = query.search.as_ref().map(|s| s.to_lowercase());
        let mut books: Vec<Book> = state
            .books
            .values()
            .filter(|b| query.active.map_or(true, |active| b.is_active == active))
            .filter(|b| {
                needle.as_ref().map_or(true, |n| {
                    b.title.to_lowercase().contains(n)
                        || b.author.as_ref().is_some_and(|a| a.to_lowercase().contains(n))
                })
            })
            .cloned()
            .collect();
        books.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));

        let total = books.len() as i64;
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query.per_page.unwrap_or(20).clamp(1, 200);
        let page_items = books
            .into_iter()
            .skip(((page - 1) * per_page) as usize)
            .take(per_page as usize)
            .collect();
        Ok((page_items, total))
    }

    async fn create_book(&self, data: &CreateBook, now: DateTime<Utc>) -> AppResult<Book> {
        let mut state = self.state.lock().await;
        let book = Book {
            id: state.next_id(),
            title: data.title.clone(),
            author: data.author.clone(),
            isbn: data.isbn.clone(),
            publisher: data.publisher.clone(),
            category: data.category.clone(),
            total_copies: data.total_copies,
            available_copies: data.total_copies,
            format: data.format.unwrap_or_default(),
            max_borrow_days: data.max_borrow_days.unwrap_or(DEFAULT_MAX_BORROW_DAYS),
            renewal_limit: data.renewal_limit.unwrap_or(DEFAULT_RENEWAL_LIMIT),
            is_active: true,
            is_restricted: data.is_restricted.unwrap_or(false),
            created_at: now,
            updated_at: now,
        };
        state.books.insert(book.id, book.clone());
        Ok(book)
    }

    async fn update_book(&self, id: i32, data: &UpdateBook, now: DateTime<Utc>) -> AppResult<Book> {
        let mut state = self.state.lock().await;
        let book = state.book_mut(id)?;
        if let Some(title) = &data.title { book.title = title.clone(); }
        if let Some(author) = &data.author { book.author = Some(author.clone()); }
        if let Some(isbn) = &data.isbn { book.isbn = Some(isbn.clone()); }
        if let Some(publisher) = &data.publisher { book.publisher = Some(publisher.clone()); }
        if let Some(category) = &data.category { book.category = Some(category.clone()); }
        if let Some(format) = data.format { book.format = format; }
        if let Some(days) = data.max_borrow_days { book.max_borrow_days = days; }
        if let Some(limit) = data.renewal_limit { book.renewal_limit = limit; }
        if let Some(active) = data.is_active { book.is_active = active; }
        if let Some(restricted) = data.is_restricted { book.is_restricted = restricted; }
        book.updated_at = now;
        Ok(book.clone())
    }

    async fn set_total_copies(&self, id: i32, total_copies: i32, now: DateTime<Utc>) -> AppResult<Book> {
        let mut state = self.state.lock().await;
        let book = state.book_mut(id)?;
        let available = book.available_copies + (total_copies - book.total_copies);
        if total_copies < 1 || available < 0 {
            return Err(AppError::Validation(format!(
                "Cannot set {} copies: {} are checked out",
                total_copies,
                book.copies_out()
            )));
        }
        book.total_copies = total_copies;
        book.available_copies = available;
        book.updated_at = now;
        Ok(book.clone())
    }

    async fn get_member(&self, id: i32) -> AppResult<Member> {
        self.state
            .lock()
            .await
            .members
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Member with id {} not found", id)))
    }

    async fn get_borrow(&self, id: i32) -> AppResult<BorrowRecord> {
        self.state
            .lock()
            .await
            .borrows
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Borrow with id {} not found", id)))
    }

    async fn list_user_borrows(&self, user_id: i32, open_only: bool) -> AppResult<Vec<BorrowRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<BorrowRecord> = state
            .borrows
            .values()
            .filter(|r| r.user_id == user_id && (!open_only || r.status.is_open()))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.borrow_date.cmp(&a.borrow_date).then(b.id.cmp(&a.id)));
        Ok(records)
    }

    async fn list_open_borrows(&self) -> AppResult<Vec<BorrowRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<BorrowRecord> =
            state.borrows.values().filter(|r| r.status.is_open()).cloned().collect();
        records.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn count_open_borrows(&self, user_id: i32) -> AppResult<i64> {
        let state = self.state.lock().await;
        Ok(state
            .borrows
            .values()
            .filter(|r| r.user_id == user_id && r.status.is_open())
            .count() as i64)
    }

    async fn checkout(&self, borrow: &NewBorrow) -> AppResult<BorrowRecord> {
        let mut state = self.state.lock().await;
        if borrow.due_date <= borrow.borrow_date {
            return Err(AppError::InvariantViolation(format!(
                "Due date {} is not after borrow date {}",
                borrow.due_date, borrow.borrow_date
            )));
        }
        if !state.members.contains_key(&borrow.user_id) {
            return Err(AppError::NotFound(format!("Member with id {} not found", borrow.user_id)));
        }
        let open = state
            .borrows
            .values()
            .filter(|r| r.user_id == borrow.user_id && r.status.is_open())
            .count() as i64;
        if open >= borrow.borrow_limit {
            return Err(Refusal::MaxBorrowsReached.into());
        }

        let book = state.book_mut(borrow.book_id)?;
        if !book.is_active || book.available_copies == 0 {
            return Err(Refusal::NoCopiesAvailable.into());
        }
        book.available_copies -= 1;
        book.updated_at = borrow.borrow_date;

        let record = BorrowRecord {
            id: state.next_id(),
            user_id: borrow.user_id,
            book_id: borrow.book_id,
            borrow_date: borrow.borrow_date,
            due_date: borrow.due_date,
            return_date: None,
            actual_return_date: None,
            status: BorrowStatus::Active,
            renewal_count: 0,
            issued_by: borrow.issued_by,
            returned_to: None,
            digital_access: borrow.digital_access.clone(),
            version: 1,
            created_at: borrow.borrow_date,
            updated_at: borrow.borrow_date,
            renewal_history: Vec::new(),
            fines: Vec::new(),
            notes: Vec::new(),
            reminders_sent: Vec::new(),
        };
        state.borrows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn save_renewal(&self, record: &BorrowRecord, entry: &RenewalEntry) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let stored = state.open_borrow_mut(record)?;
        if stored.status != BorrowStatus::Active {
            return Err(AppError::Conflict(format!("Borrow {} was modified concurrently", record.id)));
        }
        apply(stored, record);
        stored.renewal_history.push(entry.clone());
        Ok(())
    }

    async fn save_return(&self, record: &BorrowRecord, late_fine: Option<&NewFine>) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.open_borrow_mut(record)?;
        let book = state.book_mut(record.book_id)?;
        if book.available_copies >= book.total_copies {
            return Err(AppError::InvariantViolation(format!(
                "Book {} has no checked-out copy to restore",
                record.book_id
            )));
        }
        book.available_copies += 1;
        book.updated_at = record.updated_at;

        let fine = late_fine.map(|f| state.new_fine(record.id, f));
        let stored = state.open_borrow_mut(record)?;
        apply(stored, record);
        stored.fines.extend(fine);
        Ok(())
    }

    async fn save_write_off(&self, record: &BorrowRecord, fine: &NewFine) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.open_borrow_mut(record)?;
        let book = state.book_mut(record.book_id)?;
        if book.total_copies < 1 || book.available_copies > book.total_copies - 1 {
            return Err(AppError::InvariantViolation(format!(
                "Book {} has no checked-out copy to write off",
                record.book_id
            )));
        }
        book.total_copies -= 1;
        if book.total_copies == 0 {
            book.is_active = false;
        }
        book.updated_at = record.updated_at;

        let fine = state.new_fine(record.id, fine);
        let stored = state.open_borrow_mut(record)?;
        apply(stored, record);
        stored.fines.push(fine);
        Ok(())
    }

    async fn save_download(&self, record: &BorrowRecord) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let stored = state.open_borrow_mut(record)?;
        apply(stored, record);
        Ok(())
    }

    async fn mark_overdue(&self, borrow_id: i32, now: DateTime<Utc>) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        match state.borrows.get_mut(&borrow_id) {
            Some(r) if r.status == BorrowStatus::Active && r.due_date < now => {
                r.status = BorrowStatus::Overdue;
                r.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_all_overdue(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        let mut flipped = 0;
        for r in state.borrows.values_mut() {
            if r.status == BorrowStatus::Active && r.due_date < now {
                r.status = BorrowStatus::Overdue;
                r.updated_at = now;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn append_fine(&self, borrow_id: i32, fine: &NewFine) -> AppResult<Fine> {
        let mut state = self.state.lock().await;
        if !state.borrows.contains_key(&borrow_id) {
            return Err(AppError::NotFound(format!("Borrow with id {} not found", borrow_id)));
        }
        let fine = state.new_fine(borrow_id, fine);
        if let Some(r) = state.borrows.get_mut(&borrow_id) {
            r.fines.push(fine.clone());
        }
        Ok(fine)
    }

    async fn save_fine_resolution(&self, fine: &Fine) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let stored = state
            .borrows
            .get_mut(&fine.borrow_id)
            .and_then(|r| r.fines.iter_mut().find(|f| f.id == fine.id))
            .ok_or_else(|| AppError::NotFound(format!("Fine with id {} not found", fine.id)))?;
        if !stored.is_pending() {
            return Err(Refusal::FineAlreadyResolved.into());
        }
        *stored = fine.clone();
        Ok(())
    }

    async fn append_note(&self, borrow_id: i32, note: &BorrowNote) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let r = state
            .borrows
            .get_mut(&borrow_id)
            .ok_or_else(|| AppError::NotFound(format!("Borrow with id {} not found", borrow_id)))?;
        r.notes.push(note.clone());
        Ok(())
    }

    async fn append_reminder(&self, borrow_id: i32, reminder: &ReminderSent) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let r = state
            .borrows
            .get_mut(&borrow_id)
            .ok_or_else(|| AppError::NotFound(format!("Borrow with id {} not found", borrow_id)))?;
        if r.reminders_sent.iter().any(|s| s.kind == reminder.kind) {
            return Err(Refusal::ReminderAlreadySent.into());
        }
        r.reminders_sent.push(reminder.clone());
        Ok(())
    }
}
