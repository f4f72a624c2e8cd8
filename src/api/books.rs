//! Book administration endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        book::{AdjustCopies, BookQuery, CreateBook, UpdateBook},
        Book,
    },
};

use super::{success, ApiResponse, AuthenticatedUser, PaginatedResponse};

/// List books
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    params(BookQuery),
    responses(
        (status = 200, description = "Page of books", body = PaginatedResponse<Book>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_books(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<ApiResponse<PaginatedResponse<Book>>>> {
    claims.require_read_books()?;

    let (items, total) = state.services.books.list(&query).await?;

    Ok(success(PaginatedResponse {
        items,
        total,
        page: query.page.unwrap_or(1),
        per_page: query.per_page.unwrap_or(20),
    }))
}

/// Get book by ID
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book with its copy counts", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<Book>>> {
    claims.require_read_books()?;

    let book = state.services.books.get(id).await?;
    Ok(success(book))
}

/// Add a book to the catalog
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Invalid request")
    )
)]
pub async fn create_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateBook>,
) -> AppResult<(StatusCode, Json<ApiResponse<Book>>)> {
    claims.require_write_books()?;
    request.validate()?;

    let book = state.services.books.create(request, Utc::now()).await?;
    Ok((StatusCode::CREATED, success(book)))
}

/// Update bibliographic and policy fields
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn update_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<UpdateBook>,
) -> AppResult<Json<ApiResponse<Book>>> {
    claims.require_write_books()?;
    request.validate()?;

    let book = state.services.books.update(id, request, Utc::now()).await?;
    Ok(success(book))
}

/// Set the number of owned copies
#[utoipa::path(
    put,
    path = "/books/{id}/copies",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    request_body = AdjustCopies,
    responses(
        (status = 200, description = "Copies adjusted", body = Book),
        (status = 400, description = "Fewer copies than are checked out"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn adjust_copies(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<AdjustCopies>,
) -> AppResult<Json<ApiResponse<Book>>> {
    claims.require_write_books()?;
    request.validate()?;

    let book = state
        .services
        .books
        .set_total_copies(id, request.total_copies, Utc::now())
        .await?;
    Ok(success(book))
}
