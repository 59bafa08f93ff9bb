use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// API error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    DatabaseError(fivewatch_db::DbError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::DatabaseError(db_err) => {
                // Don't expose internal database errors
                tracing::error!(?db_err, "Database error occurred");
                let error_response = ErrorResponse::new("Failed to fetch player history.");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(error_response)).into_response()
            }
        }
    }
}

impl From<fivewatch_db::DbError> for AppError {
    fn from(err: fivewatch_db::DbError) -> Self {
        AppError::DatabaseError(err)
    }
}
