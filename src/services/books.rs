//! Book administration: catalog fields and the copy ledger

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    error::AppResult,
    models::{
        book::{BookQuery, CreateBook, UpdateBook},
        Book,
    },
    repository::CirculationStore,
};

#[derive(Clone)]
pub struct BooksService {
    store: Arc<dyn CirculationStore>,
}

impl BooksService {
    pub fn new(store: Arc<dyn CirculationStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, id: i32) -> AppResult<Book> {
        self.store.get_book(id).await
    }

    pub async fn list(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        self.store.list_books(query).await
    }

    pub async fn create(&self, book: CreateBook, now: DateTime<Utc>) -> AppResult<Book> {
        let created = self.store.create_book(&book, now).await?;
        tracing::info!(book_id = created.id, copies = created.total_copies, "Book created");
        Ok(created)
    }

    pub async fn update(&self, id: i32, update: UpdateBook, now: DateTime<Utc>) -> AppResult<Book> {
        let updated = self.store.update_book(id, &update, now).await?;
        tracing::info!(book_id = id, active = updated.is_active, "Book updated");
        Ok(updated)
    }

    /// Set the owned copy count; copies on loan stay counted as out
    pub async fn set_total_copies(&self, id: i32, total_copies: i32, now: DateTime<Utc>) -> AppResult<Book> {
        let book = self.store.set_total_copies(id, total_copies, now).await?;
        tracing::info!(
            book_id = id,
            total_copies = book.total_copies,
            available_copies = book.available_copies,
            "Book copies adjusted"
        );
        Ok(book)
    }
}
