//! HTTP request handlers, one module per resource.
//!
//! Handlers extract and validate input, call the matching service and wrap the result in
//! the response [`Envelope`](crate::api::models::envelope::Envelope). Extractor rejections
//! are converted into [`Error`](crate::errors::Error) so they render as envelopes too.

pub mod cars;
pub mod users;
