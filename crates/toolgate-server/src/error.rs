//! Server error types
//!
//! [`ServerError`] covers startup; [`AuthRejection`] turns an authentication
//! or authorization failure into an HTTP response.

use axum::Json;
use axum::response::{IntoResponse, Response};
use toolgate_auth::{Challenge, ConfigError, KeyError, Rejection, error_response_body};

/// Startup failures
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Invalid authentication configuration
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The key resolver could not be built
    #[error("key resolver: {0}")]
    Keys(#[from] KeyError),
}

/// Result type for server setup
pub type ServerResult<T> = Result<T, ServerError>;

/// HTTP response for a [`Rejection`]
///
/// 401 carries `WWW-Authenticate` and an `invalid_token` body, 403 an
/// `insufficient_scope` body, 500 neither.
#[derive(Debug)]
pub struct AuthRejection(pub Rejection);

impl From<Rejection> for AuthRejection {
    fn from(rejection: Rejection) -> Self {
        Self(rejection)
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let Challenge { status, headers } = self.0.challenge();
        match error_response_body(&self.0.error) {
            Some(body) => (status, headers, Json(body)).into_response(),
            None => (status, headers).into_response(),
        }
    }
}
