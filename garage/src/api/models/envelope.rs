//! Response envelope shared by every API endpoint.
//!
//! ```json
//! {
//!   "meta": {
//!     "path": "/api/v1/users",
//!     "status_code": 200,
//!     "status": "OK",
//!     "message": "GET /api/v1/users?page=1 [200] OK",
//!     "error": null,
//!     "timestamp": "2025-01-01T00:00:00Z"
//!   },
//!   "data": [],
//!   "pagination": { "current_page": 1, "...": "..." }
//! }
//! ```

use std::convert::Infallible;

use axum::{
    Json,
    extract::{FromRequestParts, OriginalUri, Request},
    http::{Method, StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::pagination::Pagination;
use crate::errors::{ErrorCode, ErrorReport, Lang};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorBody {
    pub fn from_report(report: &ErrorReport, lang: Lang) -> Self {
        Self {
            code: report.code,
            message: report.message(lang).to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Meta {
    pub path: String,
    pub status_code: u16,
    pub status: String,
    pub message: String,
    pub error: Option<ErrorBody>,
    /// RFC 3339
    pub timestamp: String,
}

impl Meta {
    pub fn new(path: &str, method: &str, uri: &str, status: StatusCode, error: Option<ErrorBody>) -> Self {
        let reason = status.canonical_reason().unwrap_or_default();
        Self {
            path: path.to_string(),
            status_code: status.as_u16(),
            status: reason.to_string(),
            message: format!("{method} {uri} [{}] {reason}", status.as_u16()),
            error,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Success envelope.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub meta: Meta,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pagination: Option<Pagination>,
}

/// `data` for operations with nothing else to return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Error envelope; carries no `data`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorEnvelope {
    pub meta: Meta,
}

/// Method, URI and path of the current request, for building [`Meta`].
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub method: Method,
    pub path: String,
    pub uri: String,
}

impl RequestMeta {
    fn from_parts(parts: &Parts) -> Self {
        // Inside a nested router `parts.uri` has the nest prefix stripped
        let uri = parts
            .extensions
            .get::<OriginalUri>()
            .map(|OriginalUri(uri)| uri)
            .unwrap_or(&parts.uri);
        Self {
            method: parts.method.clone(),
            path: uri.path().to_string(),
            uri: uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| uri.path().to_string()),
        }
    }

    pub fn meta(&self, status: StatusCode, error: Option<ErrorBody>) -> Meta {
        Meta::new(&self.path, self.method.as_str(), &self.uri, status, error)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

/// Handler return type that renders as an [`ApiResponse`].
pub struct Envelope<T> {
    request: RequestMeta,
    status: StatusCode,
    data: T,
    pagination: Option<Pagination>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(request: RequestMeta, data: T) -> Self {
        Self::with_status(request, StatusCode::OK, data)
    }

    pub fn created(request: RequestMeta, data: T) -> Self {
        Self::with_status(request, StatusCode::CREATED, data)
    }

    pub fn with_status(request: RequestMeta, status: StatusCode, data: T) -> Self {
        Self {
            request,
            status,
            data,
            pagination: None,
        }
    }

    pub fn paginated(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        let body = ApiResponse {
            meta: self.request.meta(self.status, None),
            data: self.data,
            pagination: self.pagination,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Rewrites error responses into the full envelope for the current request.
///
/// Errors are produced far from the request (inside services and extractors); they carry an
/// [`ErrorReport`] extension which is rendered here with the request path and the language
/// selected by the `x-app-lang` header. Error statuses without a report (axum's 405, the
/// timeout layer's 408) get a generic one.
pub async fn error_envelope(request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let request_meta = RequestMeta::from_parts(&parts);
    let lang = Lang::from_headers(&parts.headers);

    let response = next.run(Request::from_parts(parts, body)).await;

    let status = response.status();
    let report = match response.extensions().get::<ErrorReport>() {
        Some(report) => report.clone(),
        None if status.is_client_error() || status.is_server_error() => ErrorReport::for_status(status),
        None => return response,
    };

    let envelope = ErrorEnvelope {
        meta: request_meta.meta(status, Some(ErrorBody::from_report(&report, lang))),
    };

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.remove(header::CONTENT_TYPE);
    (parts, Json(envelope)).into_response()
}
