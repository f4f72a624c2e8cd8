//! Book model: bibliographic data and the copy inventory ledger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::text_enum;

/// How a book can be consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    Physical,
    Digital,
    Both,
}

text_enum!(BookFormat {
    Physical => "physical",
    Digital => "digital",
    Both => "both",
});

impl BookFormat {
    /// Whether a checkout of this format grants digital access
    pub fn has_digital(&self) -> bool {
        matches!(self, BookFormat::Digital | BookFormat::Both)
    }
}

impl Default for BookFormat {
    fn default() -> Self {
        BookFormat::Physical
    }
}

pub const DEFAULT_MAX_BORROW_DAYS: i32 = 14;
pub const DEFAULT_RENEWAL_LIMIT: i32 = 2;

/// Full book model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    pub category: Option<String>,
    pub total_copies: i32,
    pub available_copies: i32,
    pub format: BookFormat,
    pub max_borrow_days: i32,
    pub renewal_limit: i32,
    pub is_active: bool,
    pub is_restricted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// Copies currently checked out
    pub fn copies_out(&self) -> i32 {
        self.total_copies - self.available_copies
    }

    /// `0 <= available_copies <= total_copies`
    pub fn ledger_is_consistent(&self) -> bool {
        self.available_copies >= 0 && self.available_copies <= self.total_copies
    }

    /// Whether a checkout could take a copy right now
    pub fn is_borrowable(&self) -> bool {
        self.is_active && self.available_copies > 0
    }
}

/// Book list filters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct BookQuery {
    /// Case-insensitive match on title or author
    pub search: Option<String>,
    pub active: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 500, message = "Title must be 1-500 characters"))]
    pub title: String,
    pub author: Option<String>,
    #[validate(length(min = 10, max = 17, message = "ISBN must be 10-17 characters"))]
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    pub category: Option<String>,
    #[validate(range(min = 1, message = "A book needs at least one copy"))]
    pub total_copies: i32,
    pub format: Option<BookFormat>,
    #[validate(range(min = 1, max = 365, message = "Borrow period must be 1-365 days"))]
    pub max_borrow_days: Option<i32>,
    #[validate(range(min = 0, max = 50, message = "Renewal limit must be 0-50"))]
    pub renewal_limit: Option<i32>,
    pub is_restricted: Option<bool>,
}

/// Update book request; copies are adjusted through [`AdjustCopies`]
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 500, message = "Title must be 1-500 characters"))]
    pub title: Option<String>,
    pub author: Option<String>,
    #[validate(length(min = 10, max = 17, message = "ISBN must be 10-17 characters"))]
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    pub category: Option<String>,
    pub format: Option<BookFormat>,
    #[validate(range(min = 1, max = 365, message = "Borrow period must be 1-365 days"))]
    pub max_borrow_days: Option<i32>,
    #[validate(range(min = 0, max = 50, message = "Renewal limit must be 0-50"))]
    pub renewal_limit: Option<i32>,
    pub is_active: Option<bool>,
    pub is_restricted: Option<bool>,
}

/// Set the total number of owned copies
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AdjustCopies {
    #[validate(range(min = 1, message = "A book needs at least one copy"))]
    pub total_copies: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_round_trips_through_its_label() {
        assert_eq!("both".parse::<BookFormat>().unwrap(), BookFormat::Both);
        assert_eq!(BookFormat::Digital.as_str(), "digital");
        assert!("paperback".parse::<BookFormat>().is_err());
        assert!(!BookFormat::Physical.has_digital());
        assert!(BookFormat::Both.has_digital());
    }

    #[test]
    fn create_book_requires_a_copy() {
        let request = CreateBook {
            title: "Dune".into(),
            author: None,
            isbn: None,
            publisher: None,
            category: None,
            total_copies: 0,
            format: None,
            max_borrow_days: None,
            renewal_limit: None,
            is_restricted: None,
        };
        assert!(request.validate().is_err());
    }
}
