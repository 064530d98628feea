use crate::error::ServiceError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

/// Error returned by page handlers. Domain failures keep their message;
/// anything else is logged and reported as a 500.
pub struct AppError(anyhow::Error);

impl AppError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self.0.downcast_ref::<ServiceError>() {
            Some(e) => {
                let status = match e {
                    ServiceError::Invalid(_) => StatusCode::BAD_REQUEST,
                    ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
                    ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
                    ServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
                };
                (status, e.to_string())
            }
            None => {
                tracing::error!("Application error: {:?}", self.0);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.status_and_message().into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Same mapping as [`AppError`], rendered as `{"error": "..."}`.
pub struct ApiError(AppError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.0.status_and_message();
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(AppError(err.into()))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
