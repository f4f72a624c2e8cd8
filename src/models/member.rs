//! Member (borrower) projection and authenticated-actor claims

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::text_enum;
use crate::error::AppError;

/// Account type slug
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Guest,
    Reader,
    Librarian,
    Admin,
}

text_enum!(AccountType {
    Guest => "guest",
    Reader => "reader",
    Librarian => "librarian",
    Admin => "admin",
});

impl AccountType {
    pub fn is_staff(&self) -> bool {
        matches!(self, AccountType::Librarian | AccountType::Admin)
    }
}

/// Member status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Blocked,
}

text_enum!(MemberStatus {
    Active => "active",
    Blocked => "blocked",
});

/// Member as seen by the circulation core (owned by the identity service)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Member {
    pub id: i32,
    pub display_name: String,
    pub email: Option<String>,
    pub account_type: AccountType,
    pub birthdate: Option<NaiveDate>,
    pub status: MemberStatus,
    pub created_at: DateTime<Utc>,
}

impl Member {
    /// Age in whole years on `on`, if the birthdate is known
    pub fn age_on(&self, on: NaiveDate) -> Option<u32> {
        let birth = self.birthdate?;
        let mut years = on.year() - birth.year();
        if (on.month(), on.day()) < (birth.month(), birth.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }
}

/// User rights levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rights {
    None = 0,
    Read = 1,
    Write = 2,
}

impl Default for Rights {
    fn default() -> Self {
        Rights::None
    }
}

/// User rights structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserRights {
    #[serde(default)]
    pub books_rights: Rights,
    #[serde(default)]
    pub borrows_rights: Rights,
}

/// JWT claims issued by the identity service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub user_id: i32,
    pub account_type: AccountType,
    #[serde(default)]
    pub rights: UserRights,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    /// Create a signed token (used by tests and tooling; the server never issues tokens)
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse and verify a token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn require_read_books(&self) -> Result<(), AppError> {
        if self.rights.books_rights >= Rights::Read {
            Ok(())
        } else {
            Err(AppError::Authorization("Insufficient rights to read books".to_string()))
        }
    }

    pub fn require_write_books(&self) -> Result<(), AppError> {
        if self.rights.books_rights >= Rights::Write {
            Ok(())
        } else {
            Err(AppError::Authorization("Insufficient rights to write books".to_string()))
        }
    }

    pub fn require_write_borrows(&self) -> Result<(), AppError> {
        if self.rights.borrows_rights >= Rights::Write {
            Ok(())
        } else {
            Err(AppError::Authorization("Insufficient rights to manage borrows".to_string()))
        }
    }

    pub fn require_read_borrows(&self) -> Result<(), AppError> {
        if self.rights.borrows_rights >= Rights::Read {
            Ok(())
        } else {
            Err(AppError::Authorization("Insufficient rights to read borrows".to_string()))
        }
    }

    /// Staff with borrow read rights, or the member the data belongs to
    pub fn require_read_borrows_of(&self, user_id: i32) -> Result<(), AppError> {
        if self.user_id == user_id {
            Ok(())
        } else {
            self.require_read_borrows()
        }
    }
}
