//! Error body returned by the simulated actor endpoints.

use serde::{Deserialize, Serialize};

/// The JSON body returned for all error responses.
///
/// ```json
/// { "error": "no actor abc in session 42", "code": "not_found" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Human-readable description of the problem.
    pub error: String,

    /// Machine-readable error code, one of [`codes`].
    pub code: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            error: error.into(),
        }
    }
}

/// Error codes used by the actor endpoints.
pub mod codes {
    pub const NOT_FOUND: &str = "not_found";
    pub const INVALID_JSON: &str = "invalid_json";
}
