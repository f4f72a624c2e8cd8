//! API handlers for the circulation REST endpoints

pub mod books;
pub mod borrows;
pub mod health;
pub mod openapi;

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Request},
    http::{header::AUTHORIZATION, request::Parts},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use utoipa::ToSchema;

use crate::{error::AppError, models::UserClaims, AppState};

/// Extractor for authenticated user from JWT token
pub struct AuthenticatedUser(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        // Tokens are issued by the identity service; only verify them here
        let claims = UserClaims::from_token(token, &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(AuthenticatedUser(claims))
    }
}

/// JSON body the caller may leave out.
///
/// An empty body yields `None`. A body that is present but does not parse is
/// rejected with a validation error instead of being treated as absent.
pub struct OptionalJson<T>(pub Option<T>);

#[async_trait]
impl<T, S> FromRequest<S> for OptionalJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(OptionalJson(None));
        }

        let Json(value) = Json::<T>::from_bytes(&bytes).map_err(|e| AppError::Validation(e.body_text()))?;
        Ok(OptionalJson(Some(value)))
    }
}

/// Success envelope: `{"status": "success", "data": ...}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    pub data: T,
}

/// Wrap a payload in the success envelope
pub fn success<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        status: "success",
        data,
    })
}

/// Paginated response wrapper
#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T>
where
    T: for<'a> ToSchema<'a>,
{
    /// List of items
    pub items: Vec<T>,
    /// Total number of items
    pub total: i64,
    /// Current page number
    pub page: i64,
    /// Items per page
    pub per_page: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use chrono::{DateTime, Utc};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Stamp {
        at: Option<DateTime<Utc>>,
    }

    async fn extract(body: &'static str) -> Result<Option<Stamp>, AppError> {
        let req = axum::http::Request::builder().body(Body::from(body)).unwrap();
        OptionalJson::<Stamp>::from_request(req, &()).await.map(|OptionalJson(v)| v)
    }

    #[tokio::test]
    async fn optional_json_accepts_a_missing_body() {
        assert!(extract("").await.unwrap().is_none());
        assert!(extract("  \n").await.unwrap().is_none());
        assert!(extract(r#"{"at": null}"#).await.unwrap().unwrap().at.is_none());
    }

    #[tokio::test]
    async fn optional_json_rejects_a_malformed_body() {
        let err = extract(r#"{"at": "last tuesday"}"#).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        assert!(matches!(extract("{").await, Err(AppError::Validation(_))));
        assert!(matches!(extract(r#"{"at": 42}"#).await, Err(AppError::Validation(_))));
    }

    #[test]
    fn success_envelope_shape() {
        let Json(body) = success(vec![1, 2]);
        let json = serde_json::to_value(body).unwrap();
        assert_eq!(json, serde_json::json!({"status": "success", "data": [1, 2]}));
    }
}
