//! Engine error types.
//!
//! [`EngineError`] covers everything a test step can run into. [`PeerError`]
//! is what the simulated actor endpoints return; it serialises to the
//! [`ErrorResponse`] JSON body.

use apconform::SigningError;
use apconform_session_api::{error::codes, ErrorResponse};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Errors raised while driving the server under test.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The request could not be sent or the response could not be read.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A fetch returned a non-2xx status.
    #[error("{url} returned status {status}")]
    BadStatus { url: String, status: u16 },

    /// The response body was not a JSON object.
    #[error("malformed document from {url}: {reason}")]
    Malformed { url: String, reason: String },

    /// An outgoing request could not be signed.
    #[error("request signing failed: {0}")]
    Signing(#[from] SigningError),

    /// A document lacked a property the step depends on.
    #[error("document has no usable {0:?} property")]
    MissingProperty(String),

    #[error("invalid URL {0:?}")]
    InvalidUrl(String),

    /// The operator went away. Never recorded as a verdict.
    #[error("operator session closed")]
    SessionClosed,
}

impl EngineError {
    pub fn missing(prop: apconform::Prop) -> Self {
        EngineError::MissingProperty(prop.key().to_string())
    }

    pub fn is_session_closed(&self) -> bool {
        matches!(self, EngineError::SessionClosed)
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, EngineError::Malformed { .. })
    }
}

/// An error from a simulated actor endpoint.
#[derive(Debug)]
pub enum PeerError {
    NotFound(String),
    BadRequest(String),
}

impl IntoResponse for PeerError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            PeerError::NotFound(msg) => (StatusCode::NOT_FOUND, codes::NOT_FOUND, msg),
            PeerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, codes::INVALID_JSON, msg),
        };
        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}
