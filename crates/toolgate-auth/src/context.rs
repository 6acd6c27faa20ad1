//! Authenticated session
//!
//! [`AuthenticatedSession`] is the normalized identity handed to operation
//! handlers. It is built once per request from [`VerifiedClaims`] and never
//! mutated afterwards.

use std::collections::{BTreeMap, BTreeSet};

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::error::SessionError;
use crate::jwt::VerifiedClaims;

/// Extra attribute keys copied from the claims, when present and non-empty
pub const EXTRA_SUBJECT: &str = "sub";
/// Client identifier attribute
pub const EXTRA_CLIENT_ID: &str = "client_id";
/// Authorized party attribute
pub const EXTRA_AZP: &str = "azp";
/// Display name attribute
pub const EXTRA_NAME: &str = "name";
/// Email attribute
pub const EXTRA_EMAIL: &str = "email";

/// Identity of an authenticated caller
///
/// The raw token is kept as a [`SecretString`] so it never shows up in
/// `Debug` output or logs.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    token: SecretString,
    subject: String,
    client_id: String,
    scopes: BTreeSet<String>,
    expires_at: Option<u64>,
    extra: BTreeMap<String, String>,
}

impl AuthenticatedSession {
    /// Normalize verified claims into a session
    ///
    /// # Errors
    ///
    /// - [`SessionError::MissingSubject`] if `sub` is absent or blank
    /// - [`SessionError::MissingClientIdentity`] if neither `client_id` nor
    ///   `azp` is present and non-empty
    pub fn from_claims(claims: &VerifiedClaims, token: &str) -> Result<Self, SessionError> {
        let subject = non_empty(claims.sub.as_deref()).ok_or(SessionError::MissingSubject)?;

        let client_id = non_empty(claims.client_id.as_deref())
            .or_else(|| non_empty(claims.azp.as_deref()))
            .ok_or(SessionError::MissingClientIdentity)?;

        let scopes = claims
            .scope
            .as_deref()
            .map(parse_scopes)
            .unwrap_or_default();

        let extra = [
            (EXTRA_SUBJECT, claims.sub.as_deref()),
            (EXTRA_CLIENT_ID, claims.client_id.as_deref()),
            (EXTRA_AZP, claims.azp.as_deref()),
            (EXTRA_NAME, claims.name.as_deref()),
            (EXTRA_EMAIL, claims.email.as_deref()),
        ]
        .into_iter()
        .filter_map(|(key, value)| non_empty(value).map(|v| (key.to_string(), v.to_string())))
        .collect();

        Ok(Self {
            token: SecretString::new(token.to_string()),
            subject: subject.to_string(),
            client_id: client_id.to_string(),
            scopes,
            expires_at: claims.exp,
            extra,
        })
    }

    /// The raw bearer token, for forwarding to downstream services
    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }

    /// Subject (`sub`)
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Client identity (`client_id`, else `azp`)
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Granted scopes
    pub fn scopes(&self) -> &BTreeSet<String> {
        &self.scopes
    }

    /// Whether `scope` was granted
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    /// Expiry in seconds since the epoch, if the token carried one
    pub fn expires_at(&self) -> Option<u64> {
        self.expires_at
    }

    /// Identity attributes copied from the token
    pub fn extra(&self) -> &BTreeMap<String, String> {
        &self.extra
    }

    /// One identity attribute, e.g. [`EXTRA_NAME`]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }

    /// Token-free view of the session, safe to serialize into responses
    pub fn summary(&self) -> SessionSummary<'_> {
        SessionSummary {
            client_id: &self.client_id,
            scopes: &self.scopes,
            expires_at: self.expires_at,
            extra: &self.extra,
        }
    }
}

/// Serializable session fields, without the token
#[derive(Debug, Serialize)]
pub struct SessionSummary<'a> {
    /// Client identity
    pub client_id: &'a str,
    /// Granted scopes
    pub scopes: &'a BTreeSet<String>,
    /// Expiry in seconds since the epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    /// Identity attributes
    pub extra: &'a BTreeMap<String, String>,
}

/// Build a session from verified claims; see [`AuthenticatedSession::from_claims`]
///
/// # Errors
///
/// Returns [`SessionError`] when the subject or client identity is missing.
pub fn build_session(
    claims: &VerifiedClaims,
    token: &str,
) -> Result<AuthenticatedSession, SessionError> {
    AuthenticatedSession::from_claims(claims, token)
}

/// Split a space-delimited scope string into a set, ignoring extra whitespace
pub fn parse_scopes(scope: &str) -> BTreeSet<String> {
    scope.split_whitespace().map(str::to_string).collect()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn claims() -> VerifiedClaims {
        VerifiedClaims {
            iss: Some("https://tenant.example.com/".into()),
            sub: Some("auth0|user-1".into()),
            exp: Some(1_800_000_000),
            azp: Some("client-azp".into()),
            scope: Some("tool:whoami tool:greet".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_session_from_claims() {
        let session = build_session(&claims(), "raw.jwt.token").unwrap();

        assert_eq!(session.subject(), "auth0|user-1");
        assert_eq!(session.client_id(), "client-azp");
        assert_eq!(session.expires_at(), Some(1_800_000_000));
        assert_eq!(session.token(), "raw.jwt.token");
        assert!(session.has_scope("tool:greet"));
        assert_eq!(
            session.extra().keys().collect::<Vec<_>>(),
            vec!["azp", "sub"]
        );
    }

    #[test]
    fn test_client_id_preferred_over_azp() {
        let mut c = claims();
        c.client_id = Some("client-explicit".into());
        let session = build_session(&c, "t").unwrap();
        assert_eq!(session.client_id(), "client-explicit");
        assert_eq!(session.attribute(EXTRA_CLIENT_ID), Some("client-explicit"));
        assert_eq!(session.attribute(EXTRA_AZP), Some("client-azp"));
    }

    #[test]
    fn test_empty_client_id_falls_back_to_azp() {
        let mut c = claims();
        c.client_id = Some("   ".into());
        let session = build_session(&c, "t").unwrap();
        assert_eq!(session.client_id(), "client-azp");
        assert_eq!(session.attribute(EXTRA_CLIENT_ID), None);
    }

    #[test]
    fn test_missing_subject() {
        for sub in [None, Some(String::new()), Some("  ".to_string())] {
            let mut c = claims();
            c.sub = sub;
            let err = build_session(&c, "t").unwrap_err();
            assert_eq!(err, SessionError::MissingSubject);
        }
    }

    #[test]
    fn test_missing_subject_wins_over_missing_client() {
        let c = VerifiedClaims::default();
        assert_eq!(build_session(&c, "t").unwrap_err(), SessionError::MissingSubject);
    }

    #[test]
    fn test_missing_client_identity() {
        let mut c = claims();
        c.azp = None;
        c.client_id = Some(String::new());
        assert_eq!(
            build_session(&c, "t").unwrap_err(),
            SessionError::MissingClientIdentity
        );
    }

    #[test]
    fn test_scope_parsing() {
        let expected: BTreeSet<String> =
            ["tool:greet", "tool:whoami"].iter().map(|s| s.to_string()).collect();
        assert_eq!(parse_scopes("tool:whoami tool:greet"), expected);
        assert_eq!(parse_scopes("  tool:greet\ttool:whoami  tool:greet "), expected);
        assert!(parse_scopes("").is_empty());
        assert!(parse_scopes("   ").is_empty());
    }

    #[test]
    fn test_absent_scope_is_empty_set() {
        let mut c = claims();
        c.scope = None;
        let session = build_session(&c, "t").unwrap();
        assert!(session.scopes().is_empty());
    }

    #[test]
    fn test_optional_attributes_omitted_when_empty() {
        let mut c = claims();
        c.name = Some(String::new());
        c.email = Some("user@example.com".into());
        let session = build_session(&c, "t").unwrap();
        assert_eq!(session.attribute(EXTRA_NAME), None);
        assert_eq!(session.attribute(EXTRA_EMAIL), Some("user@example.com"));
    }

    #[test]
    fn test_debug_redacts_token() {
        let session = build_session(&claims(), "super-secret-token").unwrap();
        let debug = format!("{session:?}");
        assert!(!debug.contains("super-secret-token"));
    }

    #[test]
    fn test_summary_serialization_has_no_token() {
        let session = build_session(&claims(), "super-secret-token").unwrap();
        let json = serde_json::to_value(session.summary()).unwrap();
        assert_eq!(json["client_id"], "client-azp");
        assert!(!json.to_string().contains("super-secret-token"));
    }
}
