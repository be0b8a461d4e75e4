//! API error type and its JSON rendering.
//!
//! Every failure is rendered as `{"error": "<message>", "code": "<CODE>"}`
//! with a status that reflects the kind of failure.

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::crypto::CryptoError;
use crate::db::DatabaseError;
use crate::storage::StorageError;

pub const INTERNAL_MESSAGE: &str = "An internal error occurred";

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

/// Underlying cause of a 500, attached to the response so a middleware can
/// reveal it outside production.
#[derive(Debug, Clone)]
pub struct InternalDetail(pub String);

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Authentication required")]
    MissingToken,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("User no longer exists")]
    UserNotFound,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Forbidden")]
    Forbidden,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("Rate limit exceeded")]
    RateLimited { retry_after: u64 },
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::MissingToken
            | ApiError::InvalidToken
            | ApiError::TokenExpired
            | ApiError::UserNotFound
            | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::MissingToken => "AUTH_REQUIRED",
            ApiError::InvalidToken => "INVALID_TOKEN",
            ApiError::TokenExpired => "TOKEN_EXPIRED",
            ApiError::UserNotFound => "USER_NOT_FOUND",
            ApiError::InvalidCredentials => "INVALID_CREDENTIALS",
            ApiError::Forbidden => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::RateLimited { .. } => "RATE_LIMITED",
            ApiError::Internal(_) => "INTERNAL",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::BadRequest(detail)
            | ApiError::NotFound(detail)
            | ApiError::Conflict(detail)
            | ApiError::PayloadTooLarge(detail) => detail.clone(),
            ApiError::MissingToken => "Authentication required".into(),
            ApiError::InvalidToken => "Invalid token".into(),
            ApiError::TokenExpired => "Token expired, please log in again".into(),
            ApiError::UserNotFound => "User no longer exists".into(),
            ApiError::InvalidCredentials => "Invalid email or password".into(),
            ApiError::Forbidden => "You do not have permission to perform this action".into(),
            ApiError::RateLimited { retry_after } => {
                format!("Rate limit exceeded. Retry after {retry_after}s")
            }
            ApiError::Internal(_) => INTERNAL_MESSAGE.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.message(),
            code: self.code(),
        };
        let mut response = (status, Json(body)).into_response();

        match &self {
            ApiError::RateLimited { retry_after } => {
                if let Ok(val) = HeaderValue::from_str(&retry_after.to_string()) {
                    response.headers_mut().insert("Retry-After", val);
                }
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                response
                    .extensions_mut()
                    .insert(InternalDetail(detail.clone()));
            }
            _ => {}
        }
        response
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, .. } => {
                ApiError::NotFound(format!("{entity_type} not found"))
            }
            DatabaseError::Conflict(msg) => ApiError::Conflict(msg),
            DatabaseError::InvalidReference(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<CryptoError> for ApiError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::TokenExpired => ApiError::TokenExpired,
            CryptoError::MalformedToken | CryptoError::BadSignature => ApiError::InvalidToken,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Internal(format!("report store: {err}"))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge("Report exceeds the upload size limit".into())
        } else {
            ApiError::BadRequest(err.body_text())
        }
    }
}
