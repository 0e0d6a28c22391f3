//! Crate-wide error type mapped onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};

use crate::html;

/// Navigation-type failures become status codes; action-type failures
/// (upload, delete, create-folder) never reach this type because they are
/// rendered into 200 result pages by the router.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Internal(String),
    /// Missing or expired session; renders the login form with the original
    /// destination embedded as `next`.
    Unauthorized { next: String },
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
            AppError::Unauthorized { next } => (
                StatusCode::UNAUTHORIZED,
                Html(html::login_page(&next, None)),
            )
                .into_response(),
        }
    }
}
