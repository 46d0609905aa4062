use crate::api::models::envelope::{ErrorBody, ErrorEnvelope, Meta};
use crate::db::errors::DbError;
use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use utoipa::ToSchema;

/// Header carrying the caller's preferred language for error messages.
pub const APP_LANG_HEADER: &str = "x-app-lang";

#[derive(ThisError, Debug)]
pub enum Error {
    /// Invalid request data (body, query string or path)
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Conflict with existing state
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Rate limit exceeded
    #[error("{message}")]
    TooManyRequests { message: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Stable, machine-readable error codes returned in `meta.error.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    ValidationError,
    InvalidReference,
    Conflict,
    RateLimited,
    MethodNotAllowed,
    Timeout,
    QueryBuildError,
    StoreError,
    InternalError,
}

/// Language for user-facing error messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Lang {
    #[default]
    En,
    Id,
}

impl Lang {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        match headers.get(APP_LANG_HEADER).and_then(|v| v.to_str().ok()) {
            Some(v) if v.trim().eq_ignore_ascii_case("id") => Lang::Id,
            _ => Lang::En,
        }
    }
}

/// Everything needed to render an error envelope once the request is known.
///
/// Attached to error responses as an extension so the envelope middleware can rebuild the
/// body with the request path and the caller's language.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub message_en: String,
    pub message_id: String,
}

impl ErrorReport {
    /// Report for an error response produced outside the handlers (method mismatch, request
    /// timeout) that carries no report of its own.
    pub fn for_status(status: StatusCode) -> Self {
        let reason = status.canonical_reason().unwrap_or("Error");
        let (code, message_id) = match status {
            StatusCode::NOT_FOUND => (ErrorCode::NotFound, "Data tidak ditemukan"),
            StatusCode::METHOD_NOT_ALLOWED => (ErrorCode::MethodNotAllowed, "Metode tidak diizinkan"),
            StatusCode::REQUEST_TIMEOUT => (ErrorCode::Timeout, "Waktu permintaan habis"),
            StatusCode::TOO_MANY_REQUESTS => (ErrorCode::RateLimited, "Terlalu banyak permintaan, coba lagi nanti"),
            s if s.is_server_error() => (ErrorCode::InternalError, "Terjadi kesalahan pada server"),
            _ => (ErrorCode::ValidationError, "Permintaan tidak valid"),
        };
        Self {
            code,
            message_en: reason.to_string(),
            message_id: message_id.to_string(),
        }
    }

    pub fn message(&self, lang: Lang) -> &str {
        match lang {
            Lang::En => &self.message_en,
            Lang::Id => &self.message_id,
        }
    }
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::QueryBuild(_) | DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Error::BadRequest { .. } => ErrorCode::ValidationError,
            Error::NotFound { .. } => ErrorCode::NotFound,
            Error::Conflict { .. } => ErrorCode::Conflict,
            Error::TooManyRequests { .. } => ErrorCode::RateLimited,
            Error::Internal { .. } | Error::Other(_) => ErrorCode::InternalError,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => ErrorCode::NotFound,
                DbError::UniqueViolation { .. } => ErrorCode::Conflict,
                DbError::ForeignKeyViolation { .. } => ErrorCode::InvalidReference,
                DbError::CheckViolation { .. } => ErrorCode::ValidationError,
                DbError::QueryBuild(_) => ErrorCode::QueryBuildError,
                DbError::Other(_) => ErrorCode::StoreError,
            },
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self, lang: Lang) -> String {
        let (en, id) = match self {
            Error::BadRequest { message } => (message.clone(), format!("Permintaan tidak valid: {message}")),
            Error::NotFound { resource, id } => (
                format!("{resource} with ID {id} not found"),
                format!("{resource} dengan ID {id} tidak ditemukan"),
            ),
            Error::Conflict { message } => (message.clone(), "Data sudah ada".to_string()),
            Error::TooManyRequests { message } => (message.clone(), "Terlalu banyak permintaan, coba lagi nanti".to_string()),
            Error::Internal { .. } | Error::Other(_) => {
                ("Internal server error".to_string(), "Terjadi kesalahan pada server".to_string())
            }
            Error::Database(db_err) => match db_err {
                DbError::NotFound => ("Resource not found".to_string(), "Data tidak ditemukan".to_string()),
                DbError::UniqueViolation { constraint, table, .. } => match (table.as_deref(), constraint.as_deref()) {
                    (Some("users"), Some(c)) if c.contains("email") => (
                        "An account with this email address already exists".to_string(),
                        "Email sudah terdaftar".to_string(),
                    ),
                    (Some("cars"), Some(c)) if c.contains("license_plate") => (
                        "A car with this license plate already exists".to_string(),
                        "Plat nomor sudah terdaftar".to_string(),
                    ),
                    _ => ("Resource already exists".to_string(), "Data sudah ada".to_string()),
                },
                DbError::ForeignKeyViolation { .. } => (
                    "Invalid reference to related resource".to_string(),
                    "Referensi data tidak valid".to_string(),
                ),
                DbError::CheckViolation { .. } => ("Invalid data provided".to_string(), "Data tidak valid".to_string()),
                DbError::QueryBuild(_) => ("Failed to build query".to_string(), "Gagal menyusun query".to_string()),
                DbError::Other(_) => ("Database error occurred".to_string(), "Terjadi kesalahan basis data".to_string()),
            },
        };
        match lang {
            Lang::En => en,
            Lang::Id => id,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code(),
            message_en: self.user_message(Lang::En),
            message_id: self.user_message(Lang::Id),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_)) | Error::Database(DbError::QueryBuild(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(DbError::NotFound) => {
                tracing::debug!("Client error: {}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Conflict { .. } | Error::TooManyRequests { .. } => {
                tracing::warn!("Request rejected: {}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let report = self.report();

        // Path and method are filled in by the envelope middleware
        let body = ErrorEnvelope {
            meta: Meta::new("", "", "", status, Some(ErrorBody::from_report(&report, Lang::En))),
        };

        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(report);
        response
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::BadRequest {
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Error::BadRequest {
            message: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        Error::BadRequest {
            message: rejection.body_text(),
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::queries::QueryError;
    use axum::http::HeaderValue;

    #[test]
    fn test_status_and_code_mapping() {
        let cases: Vec<(Error, StatusCode, ErrorCode)> = vec![
            (
                Error::BadRequest { message: "bad".into() },
                StatusCode::BAD_REQUEST,
                ErrorCode::ValidationError,
            ),
            (DbError::NotFound.into(), StatusCode::NOT_FOUND, ErrorCode::NotFound),
            (
                DbError::QueryBuild(QueryError::TemplateNotFound("X".into())).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::QueryBuildError,
            ),
            (
                DbError::Other(anyhow::anyhow!("connection reset")).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::StoreError,
            ),
            (
                Error::TooManyRequests { message: "slow".into() },
                StatusCode::TOO_MANY_REQUESTS,
                ErrorCode::RateLimited,
            ),
        ];

        for (err, status, code) in cases {
            assert_eq!(err.status_code(), status, "{err:?}");
            assert_eq!(err.code(), code, "{err:?}");
        }
    }

    #[test]
    fn test_internal_details_are_not_leaked() {
        let err = Error::Database(DbError::Other(anyhow::anyhow!("password=hunter2")));
        assert!(!err.user_message(Lang::En).contains("hunter2"));
    }

    #[test]
    fn test_unique_violation_messages() {
        let err = Error::Database(DbError::UniqueViolation {
            constraint: Some("users_email_unique".into()),
            table: Some("users".into()),
            message: "duplicate key".into(),
        });
        assert_eq!(err.user_message(Lang::En), "An account with this email address already exists");
        assert_eq!(err.user_message(Lang::Id), "Email sudah terdaftar");
    }

    #[test]
    fn test_lang_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(Lang::from_headers(&headers), Lang::En);

        headers.insert(APP_LANG_HEADER, HeaderValue::from_static("ID"));
        assert_eq!(Lang::from_headers(&headers), Lang::Id);

        headers.insert(APP_LANG_HEADER, HeaderValue::from_static("fr"));
        assert_eq!(Lang::from_headers(&headers), Lang::En);
    }

    #[test]
    fn test_error_response_carries_report() {
        let response = Error::NotFound {
            resource: "User".into(),
            id: "abc".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let report = response.extensions().get::<ErrorReport>().unwrap();
        assert_eq!(report.code, ErrorCode::NotFound);
        assert_eq!(report.message(Lang::Id), "User dengan ID abc tidak ditemukan");
    }

    #[test]
    fn test_report_for_bare_status() {
        let report = ErrorReport::for_status(StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(report.code, ErrorCode::MethodNotAllowed);
        assert_eq!(report.message(Lang::En), "Method Not Allowed");
        assert_eq!(report.message(Lang::Id), "Metode tidak diizinkan");

        assert_eq!(ErrorReport::for_status(StatusCode::REQUEST_TIMEOUT).code, ErrorCode::Timeout);
        assert_eq!(ErrorReport::for_status(StatusCode::BAD_GATEWAY).code, ErrorCode::InternalError);
        assert_eq!(
            ErrorReport::for_status(StatusCode::UNSUPPORTED_MEDIA_TYPE).code,
            ErrorCode::ValidationError
        );
    }
}
