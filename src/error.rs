//! Error types shared across the request pipeline.

use thiserror::Error;

/// Result alias used by every networked operation in this crate.
pub type ApiResult<T> = Result<T, ApiError>;

/// Server error code for a rejected clientId/clientSecret pair.
pub const ERROR_INVALID_CREDENTIALS: i64 = 11000;

/// Server error code for an expired or revoked access token.
pub const ERROR_INVALID_ACCESS_TOKEN: i64 = 11003;

/// Failure taxonomy for API calls.
///
/// Variants carry plain strings rather than source errors so that a single
/// outcome can be cloned to every caller parked on an in-flight token fetch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// The request never produced an HTTP response.
    #[error("network error: {0}")]
    Transport(String),

    /// The server answered with an error status. `code` is the numeric
    /// application error code from the response body, `0` when the body
    /// carried none.
    #[error("server error (http {status}, code {code}): {message}")]
    Server { status: u16, code: i64, message: String },

    /// The request could not be signed and was never sent.
    #[error("signing error: {0}")]
    Signing(String),

    /// A response arrived but did not have the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ApiError {
    /// Numeric application error code, when the server supplied one.
    pub fn error_code(&self) -> Option<i64> {
        match self {
            ApiError::Server { code, .. } if *code != 0 => Some(*code),
            _ => None,
        }
    }

    /// True when the server rejected the access token attached to the request.
    pub fn is_invalid_access_token(&self) -> bool {
        self.error_code() == Some(ERROR_INVALID_ACCESS_TOKEN)
    }

    /// True when the server rejected the client credentials themselves.
    pub fn is_invalid_credentials(&self) -> bool {
        self.error_code() == Some(ERROR_INVALID_CREDENTIALS)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Transport(e.to_string())
    }
}
