//! Error taxonomy for the authentication pipeline
//!
//! Every layer returns its own tagged error; the [`Authenticator`] is the only
//! place that turns them into a client-visible decision via [`FailureKind`].
//!
//! [`Authenticator`]: crate::Authenticator

use jsonwebtoken::Algorithm;

/// Result alias used across the crate
pub type AuthResult<T> = Result<T, AuthError>;

/// Key resolution failures
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum KeyError {
    /// The key set was fetched but does not contain the requested key ID
    #[error("signing key '{kid}' not found in key set")]
    NotFound {
        /// The key ID that was requested
        kid: String,
    },

    /// The key set could not be fetched or decoded (network, status, timeout, JSON)
    #[error("key set could not be resolved: {0}")]
    Resolution(String),
}

/// Token verification failures, in the order the verifier checks them
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum VerificationError {
    /// Not syntactically a signed JWT
    #[error("malformed token: {0}")]
    Malformed(String),

    /// Header algorithm is not an allow-listed asymmetric algorithm
    #[error("algorithm {0:?} is not allowed")]
    AlgorithmNotAllowed(Algorithm),

    /// Header carries no key ID, so no key can be selected
    #[error("token header has no key id")]
    MissingKeyId,

    /// The signing key could not be resolved
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Signature bytes do not match the resolved key
    #[error("signature is invalid")]
    SignatureInvalid,

    /// A standard or required claim failed validation
    #[error("claim '{claim}' is invalid: {reason}")]
    ClaimInvalid {
        /// Claim name (`iss`, `aud`, `exp`, ...)
        claim: String,
        /// Human-readable reason, safe to return to clients
        reason: String,
    },
}

impl VerificationError {
    pub(crate) fn claim(claim: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ClaimInvalid {
            claim: claim.into(),
            reason: reason.into(),
        }
    }
}

/// Failures turning verified claims into a session
#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    /// `sub` absent or empty
    #[error("token has no subject")]
    MissingSubject,

    /// Neither `client_id` nor `azp` present and non-empty
    #[error("token has no client identity")]
    MissingClientIdentity,
}

/// Configuration errors, fatal at startup
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting is missing or empty
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    /// A setting is present but unusable
    #[error("invalid setting {name}: {reason}")]
    Invalid {
        /// Setting name
        name: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Umbrella error returned by the entry point and the scope gate
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    /// No bearer credential on the request (normal on first contact)
    #[error("bearer token required")]
    NoCredential,

    /// Credential failed verification
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// Verified claims could not be normalized into a session
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Authenticated, but the operation demands scopes the session lacks
    #[error("insufficient scope, missing: {}", missing.join(" "))]
    ScopeDenied {
        /// Required scopes absent from the session, sorted
        missing: Vec<String>,
    },

    /// Unexpected fault; the message is for logs only
    #[error("internal authentication error: {0}")]
    Internal(String),
}

/// Client-facing classification of an [`AuthError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// 401 with a discovery challenge
    Unauthenticated,
    /// 403, re-authenticating will not help
    Forbidden,
    /// 500, no detail leaves the process
    Internal,
}

impl AuthError {
    /// Classify this error for the challenge responder
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::NoCredential | Self::Verification(_) | Self::Session(_) => {
                FailureKind::Unauthenticated
            }
            Self::ScopeDenied { .. } => FailureKind::Forbidden,
            Self::Internal(_) => FailureKind::Internal,
        }
    }

    /// Short stable label, used as a structured log field
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoCredential => "no_credential",
            Self::Verification(VerificationError::Malformed(_)) => "malformed_token",
            Self::Verification(VerificationError::AlgorithmNotAllowed(_)) => "algorithm_not_allowed",
            Self::Verification(VerificationError::MissingKeyId) => "missing_key_id",
            Self::Verification(VerificationError::Key(KeyError::NotFound { .. })) => "key_not_found",
            Self::Verification(VerificationError::Key(KeyError::Resolution(_))) => {
                "key_resolution_error"
            }
            Self::Verification(VerificationError::SignatureInvalid) => "signature_invalid",
            Self::Verification(VerificationError::ClaimInvalid { .. }) => "claim_invalid",
            Self::Session(SessionError::MissingSubject) => "missing_subject",
            Self::Session(SessionError::MissingClientIdentity) => "missing_client_identity",
            Self::ScopeDenied { .. } => "scope_denied",
            Self::Internal(_) => "internal",
        }
    }

    /// Description safe to send to the client
    ///
    /// Key set fetch failures and internal faults carry transport details
    /// (upstream URLs, status codes, timeouts) that stay in the logs.
    pub fn client_description(&self) -> String {
        match self {
            Self::Verification(VerificationError::Key(KeyError::Resolution(_))) => {
                "signing key could not be resolved".to_string()
            }
            Self::Internal(_) => "internal authentication error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<KeyError> for AuthError {
    fn from(err: KeyError) -> Self {
        Self::Verification(VerificationError::Key(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds() {
        assert_eq!(AuthError::NoCredential.failure_kind(), FailureKind::Unauthenticated);
        assert_eq!(
            AuthError::from(KeyError::Resolution("timeout".into())).failure_kind(),
            FailureKind::Unauthenticated
        );
        assert_eq!(
            AuthError::from(SessionError::MissingSubject).failure_kind(),
            FailureKind::Unauthenticated
        );
        assert_eq!(
            AuthError::ScopeDenied { missing: vec!["tool:greet".into()] }.failure_kind(),
            FailureKind::Forbidden
        );
        assert_eq!(
            AuthError::Internal("boom".into()).failure_kind(),
            FailureKind::Internal
        );
    }

    #[test]
    fn test_client_description_hides_fetch_details() {
        let err = AuthError::from(KeyError::Resolution(
            "GET https://idp.internal:8443/jwks returned 503".into(),
        ));
        assert_eq!(err.client_description(), "signing key could not be resolved");
        assert!(err.to_string().contains("idp.internal"));

        let err = AuthError::Internal("lock poisoned".into());
        assert!(!err.client_description().contains("poisoned"));

        let err = AuthError::from(KeyError::NotFound { kid: "k1".into() });
        assert_eq!(err.client_description(), err.to_string());
    }

    #[test]
    fn test_error_display() {
        let err = AuthError::ScopeDenied {
            missing: vec!["tool:greet".into(), "tool:whoami".into()],
        };
        assert_eq!(err.to_string(), "insufficient scope, missing: tool:greet tool:whoami");

        let err = AuthError::from(KeyError::NotFound { kid: "k1".into() });
        assert_eq!(err.to_string(), "signing key 'k1' not found in key set");
        assert_eq!(err.label(), "key_not_found");

        let err = VerificationError::claim("exp", "token has expired");
        assert_eq!(err.to_string(), "claim 'exp' is invalid: token has expired");
    }
}
