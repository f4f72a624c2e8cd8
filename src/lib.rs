//! Elidune Circulation Server
//!
//! Lending side of the Elidune library system: book inventory, borrow
//! lifecycle (checkout, renewal, return, write-off), fines, digital
//! access and overdue reminders, exposed as a REST JSON API.

use std::sync::Arc;

use sqlx::{Pool, Postgres};

pub mod api;
pub mod circulation;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
    pub db: Pool<Postgres>,
}
