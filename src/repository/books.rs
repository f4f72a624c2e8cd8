//! Books repository: catalog rows and the copy ledger

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult, Refusal},
    models::book::{Book, BookQuery, CreateBook, UpdateBook, DEFAULT_MAX_BORROW_DAYS, DEFAULT_RENEWAL_LIMIT},
};

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// List books with optional filters and pagination
    pub async fn list(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query.per_page.unwrap_or(20).clamp(1, 200);
        let offset = (page - 1) * per_page;

        let mut conditions = Vec::new();
        let mut idx = 1;

        if query.search.is_some() {
            conditions.push(format!("(title ILIKE ${0} OR author ILIKE ${0})", idx));
            idx += 1;
        }
        if query.active.is_some() {
            conditions.push(format!("is_active = ${}", idx));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let pattern = query.search.as_ref().map(|s| format!("%{}%", s));

        let count_q = format!("SELECT COUNT(*) FROM books {}", where_clause);
        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_q);
        if let Some(ref p) = pattern { count_builder = count_builder.bind(p); }
        if let Some(active) = query.active { count_builder = count_builder.bind(active); }
        let total = count_builder.fetch_one(&self.pool).await?;

        let select_q = format!(
            "SELECT * FROM books {} ORDER BY title, id LIMIT {} OFFSET {}",
            where_clause, per_page, offset
        );
        let mut builder = sqlx::query_as::<_, Book>(&select_q);
        if let Some(ref p) = pattern { builder = builder.bind(p); }
        if let Some(active) = query.active { builder = builder.bind(active); }

        let rows = builder.fetch_all(&self.pool).await?;
        Ok((rows, total))
    }

    /// Create a book; every copy starts available
    pub async fn create(&self, data: &CreateBook, now: DateTime<Utc>) -> AppResult<Book> {
        let book = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (
                title, author, isbn, publisher, category,
                total_copies, available_copies, format,
                max_borrow_days, renewal_limit, is_active, is_restricted,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $6, $7, $8, $9, TRUE, $10, $11, $11)
            RETURNING *
            "#,
        )
        .bind(&data.title)
        .bind(&data.author)
        .bind(&data.isbn)
        .bind(&data.publisher)
        .bind(&data.category)
        .bind(data.total_copies)
        .bind(data.format.unwrap_or_default())
        .bind(data.max_borrow_days.unwrap_or(DEFAULT_MAX_BORROW_DAYS))
        .bind(data.renewal_limit.unwrap_or(DEFAULT_RENEWAL_LIMIT))
        .bind(data.is_restricted.unwrap_or(false))
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(book)
    }

    /// Update bibliographic and policy fields
    pub async fn update(&self, id: i32, data: &UpdateBook, now: DateTime<Utc>) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            r#"
            UPDATE books SET
                title = COALESCE($2, title),
                author = COALESCE($3, author),
                isbn = COALESCE($4, isbn),
                publisher = COALESCE($5, publisher),
                category = COALESCE($6, category),
                format = COALESCE($7, format),
                max_borrow_days = COALESCE($8, max_borrow_days),
                renewal_limit = COALESCE($9, renewal_limit),
                is_active = COALESCE($10, is_active),
                is_restricted = COALESCE($11, is_restricted),
                updated_at = $12
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&data.title)
        .bind(&data.author)
        .bind(&data.isbn)
        .bind(&data.publisher)
        .bind(&data.category)
        .bind(data.format)
        .bind(data.max_borrow_days)
        .bind(data.renewal_limit)
        .bind(data.is_active)
        .bind(data.is_restricted)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Change the owned copy count, shifting available copies by the same delta.
    ///
    /// Refused when the new total is below 1 or below the copies currently out.
    pub async fn set_total_copies(&self, id: i32, total_copies: i32, now: DateTime<Utc>) -> AppResult<Book> {
        let updated = sqlx::query_as::<_, Book>(
            r#"
            UPDATE books SET
                available_copies = available_copies + ($2 - total_copies),
                total_copies = $2,
                updated_at = $3
            WHERE id = $1
              AND $2 >= 1
              AND available_copies + ($2 - total_copies) >= 0
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(total_copies)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(book) => Ok(book),
            None => {
                let book = self.get_by_id(id).await?;
                Err(AppError::Validation(format!(
                    "Cannot set {} copies: {} are checked out",
                    total_copies,
                    book.copies_out()
                )))
            }
        }
    }

    /// Take one copy for a checkout, inside the caller's transaction.
    ///
    /// The decrement only happens while a copy is left, so concurrent
    /// checkouts of the last copy cannot both succeed.
    pub async fn take_copy(conn: &mut PgConnection, id: i32, now: DateTime<Utc>) -> AppResult<()> {
        let taken = sqlx::query(
            r#"
            UPDATE books
            SET available_copies = available_copies - 1, updated_at = $2
            WHERE id = $1 AND is_active AND available_copies > 0
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if taken == 0 {
            return Err(Refusal::NoCopiesAvailable.into());
        }
        Ok(())
    }

    /// Put a returned copy back on the shelf, inside the caller's transaction
    pub async fn restore_copy(conn: &mut PgConnection, id: i32, now: DateTime<Utc>) -> AppResult<()> {
        let restored = sqlx::query(
            r#"
            UPDATE books
            SET available_copies = available_copies + 1, updated_at = $2
            WHERE id = $1 AND available_copies < total_copies
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if restored == 0 {
            return Err(AppError::InvariantViolation(format!(
                "Book {} has no checked-out copy to restore",
                id
            )));
        }
        Ok(())
    }

    /// Retire a lost or damaged copy that was checked out.
    ///
    /// The copy is owned but not available, so only the total shrinks. A book
    /// whose last copy is retired is deactivated.
    pub async fn retire_copy(conn: &mut PgConnection, id: i32, now: DateTime<Utc>) -> AppResult<()> {
        let retired = sqlx::query(
            r#"
            UPDATE books
            SET total_copies = total_copies - 1,
                is_active = is_active AND total_copies - 1 > 0,
                updated_at = $2
            WHERE id = $1 AND total_copies >= 1 AND available_copies <= total_copies - 1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if retired == 0 {
            return Err(AppError::InvariantViolation(format!(
                "Book {} has no checked-out copy to write off",
                id
            )));
        }
        Ok(())
    }
}
