use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

pub type Result<T> = std::result::Result<T, AppError>;

/// API错误类型
pub enum AppError {
    Unauthorized,
    NotFound(String),
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "invalid token".to_owned()),
            Self::NotFound(what) => (StatusCode::NOT_FOUND, format!("not found: {what}")),
            Self::Internal(err) => {
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Something went wrong: {err}"))
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        match err.downcast_ref::<crate::Error>() {
            Some(crate::Error::NotFound(what)) => Self::NotFound(what.clone()),
            _ => Self::Internal(err),
        }
    }
}
