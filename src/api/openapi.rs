//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{books, borrows, health};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Elidune Circulation API",
        version = "1.0.0",
        description = "Library circulation REST API: checkout, renewal, return, fines and reminders",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html"),
        contact(name = "Elidune Team", email = "contact@elidune.org")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::adjust_copies,
        // Borrows
        borrows::checkout,
        borrows::get_borrow,
        borrows::get_user_borrows,
        borrows::renew_borrow,
        borrows::return_borrow,
        borrows::write_off_borrow,
        borrows::add_note,
        borrows::record_download,
        borrows::pending_reminder,
        borrows::record_reminder,
        // Fines
        borrows::issue_fine,
        borrows::pay_fine,
        borrows::waive_fine,
    ),
    components(
        schemas(
            // Books
            crate::models::book::Book,
            crate::models::book::BookFormat,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            crate::models::book::AdjustCopies,
            // Borrows
            crate::models::borrow::BorrowStatus,
            crate::models::borrow::BorrowRecord,
            crate::models::borrow::BorrowDetails,
            crate::models::borrow::RenewalEntry,
            crate::models::borrow::BorrowNote,
            crate::models::borrow::NoteType,
            crate::models::borrow::ReminderKind,
            crate::models::borrow::ReminderMethod,
            crate::models::borrow::ReminderSent,
            crate::models::borrow::DigitalAccess,
            crate::models::borrow::CheckoutRequest,
            crate::models::borrow::RenewRequest,
            crate::models::borrow::ReturnRequest,
            crate::models::borrow::WriteOffOutcome,
            crate::models::borrow::WriteOffRequest,
            crate::models::borrow::AddNoteRequest,
            borrows::PendingReminder,
            borrows::RecordReminderRequest,
            // Fines
            crate::models::fine::Fine,
            crate::models::fine::FineKind,
            crate::models::fine::FineStatus,
            crate::models::fine::IssueFineRequest,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::Refusal,
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "books", description = "Book inventory administration"),
        (name = "borrows", description = "Borrow lifecycle"),
        (name = "fines", description = "Fine issuance and resolution")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
