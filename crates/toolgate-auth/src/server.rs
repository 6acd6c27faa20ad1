//! Server-side helpers: challenges, discovery documents, request inspection
//!
//! - Protected Resource Metadata (RFC 9728) and Authorization Server
//!   Metadata (RFC 8414) documents built from [`AuthConfig`]
//! - `WWW-Authenticate` challenges for 401 responses
//! - Bearer credential extraction and effective base URL resolution
//!
//! Nothing here writes a response; callers turn a [`Challenge`] into one.

use http::header::{AUTHORIZATION, HOST, WWW_AUTHENTICATE};
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::AuthConfig;
use crate::error::{AuthError, FailureKind};

/// Path of the protected-resource metadata document
pub const PROTECTED_RESOURCE_METADATA_PATH: &str = "/.well-known/oauth-protected-resource";

/// Path of the authorization-server metadata document
pub const AUTHORIZATION_SERVER_METADATA_PATH: &str = "/.well-known/oauth-authorization-server";

const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// RFC 9728 Protected Resource Metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// Resource identifier (the configured audience)
    pub resource: String,
    /// Trusted authorization server issuers
    pub authorization_servers: Vec<String>,
    /// Key-publishing endpoint
    pub jwks_uri: String,
    /// Scopes this resource understands
    pub scopes_supported: Vec<String>,
    /// How bearer tokens may be presented
    pub bearer_methods_supported: Vec<String>,
}

impl ProtectedResourceMetadata {
    /// Build the document from configuration
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            resource: config.audience.clone(),
            authorization_servers: vec![config.issuer.clone()],
            jwks_uri: config.jwks_uri.clone(),
            scopes_supported: config.scopes_supported.clone(),
            bearer_methods_supported: vec!["header".to_string()],
        }
    }
}

/// RFC 8414 Authorization Server Metadata, as advertised by this resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    /// Issuer identifier
    pub issuer: String,
    /// Authorization endpoint
    pub authorization_endpoint: String,
    /// Token endpoint
    pub token_endpoint: String,
    /// Key-publishing endpoint
    pub jwks_uri: String,
    /// Supported `response_type` values
    pub response_types_supported: Vec<String>,
    /// Supported grant types
    pub grant_types_supported: Vec<String>,
    /// Supported PKCE methods
    pub code_challenge_methods_supported: Vec<String>,
    /// Scopes this resource understands
    pub scopes_supported: Vec<String>,
}

impl AuthorizationServerMetadata {
    /// Build the document from configuration
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            issuer: config.issuer.clone(),
            authorization_endpoint: config.authorization_endpoint.clone(),
            token_endpoint: config.token_endpoint.clone(),
            jwks_uri: config.jwks_uri.clone(),
            response_types_supported: vec!["code".to_string()],
            grant_types_supported: vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
            ],
            code_challenge_methods_supported: vec!["S256".to_string()],
            scopes_supported: config.scopes_supported.clone(),
        }
    }
}

/// `WWW-Authenticate` header builder for 401 responses
///
/// Produces, in this order:
///
/// ```text
/// Bearer error="invalid_token", error_description="...", resource_metadata="https://host/.well-known/oauth-protected-resource"
/// ```
#[derive(Debug, Clone)]
pub struct WwwAuthenticateBuilder {
    metadata_uri: String,
    error: String,
    error_description: Option<String>,
}

impl WwwAuthenticateBuilder {
    /// Challenge pointing at `metadata_uri` with `error="invalid_token"`
    pub fn new(metadata_uri: impl Into<String>) -> Self {
        Self {
            metadata_uri: metadata_uri.into(),
            error: "invalid_token".to_string(),
            error_description: None,
        }
    }

    /// Set the error code
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = error.into();
        self
    }

    /// Set a human-readable description
    pub fn with_description(mut self, description: impl AsRef<str>) -> Self {
        self.error_description = Some(quote_escape(description.as_ref()));
        self
    }

    /// Build the header string
    pub fn build(&self) -> String {
        let mut parts = vec![format!("error=\"{}\"", quote_escape(&self.error))];

        if let Some(description) = &self.error_description {
            parts.push(format!("error_description=\"{description}\""));
        }

        parts.push(format!(
            "resource_metadata=\"{}\"",
            quote_escape(&self.metadata_uri)
        ));

        format!("Bearer {}", parts.join(", "))
    }

    /// Build a header value, dropping the description if it is not visible ASCII
    pub fn build_header_value(&self) -> Option<HeaderValue> {
        let full = self.build();
        if full.is_ascii()
            && let Ok(value) = HeaderValue::from_str(&full)
        {
            return Some(value);
        }

        let bare = Self {
            error_description: None,
            ..self.clone()
        };
        HeaderValue::from_str(&bare.build()).ok()
    }
}

/// Escape a value for an RFC 7230 quoted-string, dropping control characters
fn quote_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars().filter(|c| !c.is_control()) {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Status and headers a transport must send for a failure
#[derive(Debug, Clone)]
pub struct Challenge {
    /// Response status
    pub status: StatusCode,
    /// Extra response headers (only `WWW-Authenticate` on 401)
    pub headers: HeaderMap,
}

/// Map a failure to its status code and headers
///
/// | kind | status | headers |
/// |---|---|---|
/// | `Unauthenticated` | 401 | `WWW-Authenticate` with `resource_metadata` |
/// | `Forbidden` | 403 | none |
/// | `Internal` | 500 | none |
pub fn build_challenge(base_url: &str, kind: FailureKind, message: &str) -> Challenge {
    let mut headers = HeaderMap::new();

    let status = match kind {
        FailureKind::Unauthenticated => {
            let header = WwwAuthenticateBuilder::new(discovery_url(base_url))
                .with_description(message)
                .build_header_value();
            if let Some(value) = header {
                headers.insert(WWW_AUTHENTICATE, value);
            }
            StatusCode::UNAUTHORIZED
        }
        FailureKind::Forbidden => StatusCode::FORBIDDEN,
        FailureKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };

    Challenge { status, headers }
}

/// JSON body to accompany a failure response, if any
///
/// Internal failures get no body so no detail leaks.
pub fn error_response_body(error: &AuthError) -> Option<Value> {
    match error {
        AuthError::Internal(_) => None,
        AuthError::ScopeDenied { missing } => Some(json!({
            "error": "insufficient_scope",
            "error_description": error.client_description(),
            "missing_scopes": missing,
        })),
        _ => Some(json!({
            "error": "invalid_token",
            "error_description": error.client_description(),
        })),
    }
}

/// `<base>/.well-known/oauth-protected-resource`
pub fn discovery_url(base_url: &str) -> String {
    format!(
        "{}{PROTECTED_RESOURCE_METADATA_PATH}",
        base_url.trim_end_matches('/')
    )
}

/// Extract the bearer credential from request headers
///
/// The scheme is matched case-insensitively and the remainder trimmed.
///
/// # Errors
///
/// Returns [`AuthError::NoCredential`] when the header is missing, not UTF-8,
/// uses another scheme, or carries an empty token.
///
/// ```rust
/// use http::{HeaderMap, HeaderValue, header::AUTHORIZATION};
/// use toolgate_auth::extract_bearer;
///
/// let mut headers = HeaderMap::new();
/// headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer  abc.def.ghi "));
/// assert_eq!(extract_bearer(&headers).unwrap(), "abc.def.ghi");
/// ```
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::NoCredential)?
        .trim_start();

    let (scheme, rest) = value
        .split_at_checked(6)
        .ok_or(AuthError::NoCredential)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::NoCredential);
    }
    // "Bearer" must be followed by whitespace, not "Bearerabc"
    if !rest.starts_with(char::is_whitespace) {
        return Err(AuthError::NoCredential);
    }

    let token = rest.trim();
    if token.is_empty() {
        return Err(AuthError::NoCredential);
    }
    Ok(token)
}

/// Effective public base URL of this server, without a trailing slash
///
/// An explicit configured URL wins. Otherwise the host comes from the first
/// `X-Forwarded-Host` value, else `Host`, else `localhost`, and the scheme from
/// the first `X-Forwarded-Proto` value, else `default_scheme`.
pub fn resolve_base_url(explicit: Option<&str>, headers: &HeaderMap, default_scheme: &str) -> String {
    if let Some(url) = explicit.map(str::trim).filter(|url| !url.is_empty()) {
        return url.trim_end_matches('/').to_string();
    }

    let host = first_value(headers, X_FORWARDED_HOST)
        .or_else(|| first_value(headers, HOST.as_str()))
        .unwrap_or("localhost");

    let scheme = first_value(headers, X_FORWARDED_PROTO).unwrap_or(default_scheme);

    format!("{}://{host}", scheme.to_ascii_lowercase())
}

fn first_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{KeyError, SessionError, VerificationError};
    use pretty_assertions::assert_eq;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_www_authenticate_format() {
        let header = WwwAuthenticateBuilder::new(
            "https://api.example.com/.well-known/oauth-protected-resource",
        )
        .with_description("bearer token required")
        .build();

        assert_eq!(
            header,
            "Bearer error=\"invalid_token\", error_description=\"bearer token required\", \
             resource_metadata=\"https://api.example.com/.well-known/oauth-protected-resource\""
        );
    }

    #[test]
    fn test_description_escaping() {
        let header = WwwAuthenticateBuilder::new("https://a.example/x")
            .with_description("bad \"quote\" and \\ slash\r\n")
            .build();
        assert!(header.contains(r#"error_description="bad \"quote\" and \\ slash""#));
        assert!(HeaderValue::from_str(&header).is_ok());
    }

    #[test]
    fn test_non_ascii_description_is_dropped() {
        let value = WwwAuthenticateBuilder::new("https://a.example/x")
            .with_description("caf\u{e9}")
            .build_header_value()
            .unwrap();
        assert_eq!(
            value.to_str().unwrap(),
            "Bearer error=\"invalid_token\", resource_metadata=\"https://a.example/x\""
        );
    }

    #[test]
    fn test_challenge_by_failure_kind() {
        let c = build_challenge("https://mcp.example.com/", FailureKind::Unauthenticated, "expired");
        assert_eq!(c.status, StatusCode::UNAUTHORIZED);
        let header = c.headers.get(WWW_AUTHENTICATE).unwrap().to_str().unwrap();
        assert!(header.ends_with(
            "resource_metadata=\"https://mcp.example.com/.well-known/oauth-protected-resource\""
        ));

        let c = build_challenge("https://mcp.example.com", FailureKind::Forbidden, "missing scope");
        assert_eq!(c.status, StatusCode::FORBIDDEN);
        assert!(c.headers.is_empty());

        let c = build_challenge("https://mcp.example.com", FailureKind::Internal, "boom");
        assert_eq!(c.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(c.headers.is_empty());
    }

    #[test]
    fn test_error_bodies() {
        assert!(error_response_body(&AuthError::Internal("key material".into())).is_none());

        let body = error_response_body(&AuthError::ScopeDenied {
            missing: vec!["tool:greet".into()],
        })
        .unwrap();
        assert_eq!(body["error"], "insufficient_scope");
        assert_eq!(body["missing_scopes"][0], "tool:greet");

        let body = error_response_body(&SessionError::MissingSubject.into()).unwrap();
        assert_eq!(body["error"], "invalid_token");

        let body =
            error_response_body(&VerificationError::SignatureInvalid.into()).unwrap();
        assert_eq!(body["error_description"], "signature is invalid");

        let body = error_response_body(&AuthError::from(KeyError::Resolution(
            "JWKS endpoint https://idp.internal/jwks returned 503".into(),
        )))
        .unwrap();
        assert_eq!(body["error"], "invalid_token");
        assert_eq!(body["error_description"], "signing key could not be resolved");
        assert!(!body.to_string().contains("idp.internal"));
    }

    #[test]
    fn test_bearer_extraction() {
        assert_eq!(
            extract_bearer(&headers(&[("authorization", "Bearer abc.def.ghi")])).unwrap(),
            "abc.def.ghi"
        );
        assert_eq!(
            extract_bearer(&headers(&[("authorization", "BEARER   tok  ")])).unwrap(),
            "tok"
        );
    }

    #[test]
    fn test_bearer_extraction_failures() {
        for value in ["", "Bearer", "Bearer    ", "Basic dXNlcjpwYXNz", "Bearerabc", "tok"] {
            let err = extract_bearer(&headers(&[("authorization", value)])).unwrap_err();
            assert_eq!(err, AuthError::NoCredential, "{value:?}");
        }
        assert_eq!(extract_bearer(&HeaderMap::new()).unwrap_err(), AuthError::NoCredential);

        let mut map = HeaderMap::new();
        map.insert(AUTHORIZATION, HeaderValue::from_bytes(b"Bearer \xff\xfe").unwrap());
        assert_eq!(extract_bearer(&map).unwrap_err(), AuthError::NoCredential);
    }

    #[test]
    fn test_base_url_explicit_wins() {
        let h = headers(&[("host", "internal:3000"), ("x-forwarded-proto", "https")]);
        assert_eq!(
            resolve_base_url(Some("https://mcp.example.com/"), &h, "http"),
            "https://mcp.example.com"
        );
    }

    #[test]
    fn test_base_url_from_forwarding_headers() {
        let h = headers(&[
            ("host", "internal:3000"),
            ("x-forwarded-host", "mcp.example.com, proxy.internal"),
            ("x-forwarded-proto", "HTTPS, http"),
        ]);
        assert_eq!(resolve_base_url(None, &h, "http"), "https://mcp.example.com");
    }

    #[test]
    fn test_base_url_from_host_and_default_scheme() {
        let h = headers(&[("host", "localhost:3000")]);
        assert_eq!(resolve_base_url(None, &h, "http"), "http://localhost:3000");
        assert_eq!(resolve_base_url(None, &HeaderMap::new(), "https"), "https://localhost");
    }

    #[test]
    fn test_metadata_documents() {
        let config = AuthConfig::from_issuer_domain("tenant.example.com", "https://mcp.example.com")
            .with_scopes_supported(["tool:whoami", "tool:greet"]);

        let resource = serde_json::to_value(ProtectedResourceMetadata::from_config(&config)).unwrap();
        assert_eq!(resource["resource"], "https://mcp.example.com");
        assert_eq!(resource["authorization_servers"][0], "https://tenant.example.com/");
        assert_eq!(resource["jwks_uri"], "https://tenant.example.com/.well-known/jwks.json");
        assert_eq!(resource["bearer_methods_supported"], json!(["header"]));

        let server = AuthorizationServerMetadata::from_config(&config);
        assert_eq!(server.authorization_endpoint, "https://tenant.example.com/authorize");
        assert_eq!(server.token_endpoint, "https://tenant.example.com/oauth/token");
        assert_eq!(server.response_types_supported, vec!["code"]);
        assert_eq!(server.scopes_supported, vec!["tool:whoami", "tool:greet"]);
    }
}
