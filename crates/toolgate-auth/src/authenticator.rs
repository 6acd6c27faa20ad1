//! Authentication entry point
//!
//! [`Authenticator::authenticate`] runs the whole pipeline for one request:
//! base URL → bearer extraction → token verification → session. It never
//! writes a response. Failures come back as a [`Rejection`] which carries the
//! discovery URL the transport needs to build the challenge.
//!
//! This is the only place in the crate that logs authentication failures.

use std::sync::Arc;

use http::HeaderMap;
use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::context::AuthenticatedSession;
use crate::error::{AuthError, FailureKind, KeyError};
use crate::jwt::{KeyResolver, TokenVerifier};
use crate::server::{Challenge, build_challenge, discovery_url, resolve_base_url};

/// A failed authentication or authorization decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// What went wrong
    pub error: AuthError,
    /// Effective base URL of the request
    pub base_url: String,
}

impl Rejection {
    /// Pair an error with the request's base URL
    pub fn new(error: AuthError, base_url: impl Into<String>) -> Self {
        Self {
            error,
            base_url: base_url.into(),
        }
    }

    /// Client-facing classification
    pub fn kind(&self) -> FailureKind {
        self.error.failure_kind()
    }

    /// Protected-resource metadata URL advertised in the challenge
    pub fn resource_metadata_url(&self) -> String {
        discovery_url(&self.base_url)
    }

    /// Status and headers for the response
    pub fn challenge(&self) -> Challenge {
        build_challenge(&self.base_url, self.kind(), &self.error.client_description())
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.error, f)
    }
}

impl std::error::Error for Rejection {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Per-request authentication against one issuer
///
/// Cheap to clone; the key cache is shared between clones.
#[derive(Debug, Clone)]
pub struct Authenticator {
    config: Arc<AuthConfig>,
    verifier: TokenVerifier,
}

impl Authenticator {
    /// Build an authenticator over an existing key resolver
    pub fn new(config: AuthConfig, keys: Arc<KeyResolver>) -> Self {
        let verifier = TokenVerifier::new(&config, keys);
        Self {
            config: Arc::new(config),
            verifier,
        }
    }

    /// Build an authenticator that fetches keys from `config.jwks_uri`
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Resolution`] if the HTTP client cannot be built.
    pub fn from_config(config: AuthConfig) -> Result<Self, KeyError> {
        let keys = Arc::new(KeyResolver::from_config(&config)?);
        Ok(Self::new(config, keys))
    }

    /// The configuration this authenticator enforces
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// The shared key resolver
    pub fn keys(&self) -> &Arc<KeyResolver> {
        self.verifier.keys()
    }

    /// Effective base URL for a request
    pub fn base_url(&self, headers: &HeaderMap) -> String {
        resolve_base_url(
            self.config.server_url.as_deref(),
            headers,
            &self.config.default_scheme,
        )
    }

    /// Authenticate a request from its headers
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] for a missing credential, a token that fails
    /// verification, or claims that cannot form a session.
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
    ) -> Result<AuthenticatedSession, Rejection> {
        let base_url = self.base_url(headers);

        let result = match crate::server::extract_bearer(headers) {
            Ok(token) => self.authenticate_token(token).await,
            Err(err) => Err(err),
        };

        result.map_err(|error| {
            log_rejection(&error);
            Rejection::new(error, base_url)
        })
    }

    /// Verify a raw bearer token and build its session
    ///
    /// Does not log; [`authenticate`](Self::authenticate) does.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Verification`] or [`AuthError::Session`].
    pub async fn authenticate_token(&self, token: &str) -> Result<AuthenticatedSession, AuthError> {
        let claims = self.verifier.verify(token).await?;
        let session = AuthenticatedSession::from_claims(&claims, token)?;

        debug!(
            client_id = %session.client_id(),
            scopes = session.scopes().len(),
            "Request authenticated"
        );
        Ok(session)
    }
}

fn log_rejection(error: &AuthError) {
    match error {
        AuthError::NoCredential => debug!("No bearer credential on request"),
        error => warn!(reason = error.label(), error = %error, "Authentication rejected"),
    }
}
