//! Authentication configuration
//!
//! [`AuthConfig`] is built once at startup, validated with
//! [`AuthConfig::validated`], and shared read-only afterwards. A missing issuer
//! or audience is a startup failure, never a per-request error.

use std::time::Duration;

use jsonwebtoken::Algorithm;

use crate::error::ConfigError;
use crate::resource::{is_loopback_host, validate_resource_uri};

/// Default JWKS cache TTL (10 minutes)
pub const DEFAULT_JWKS_CACHE_TTL: Duration = Duration::from_secs(600);

/// Default bound on a single JWKS fetch
pub const DEFAULT_JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Default clock skew tolerance for `exp`/`nbf`
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(5);

/// Asymmetric algorithms accepted by default
///
/// Symmetric (`HS*`) algorithms are never accepted: a public key must not be
/// usable as an HMAC secret.
pub const DEFAULT_ALLOWED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

/// Resource-server authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Expected `iss`, compared exactly
    pub issuer: String,
    /// Expected `aud` entry; also the advertised resource identifier
    pub audience: String,
    /// Key-publishing endpoint of the issuer
    pub jwks_uri: String,
    /// Advertised authorization endpoint
    pub authorization_endpoint: String,
    /// Advertised token endpoint
    pub token_endpoint: String,
    /// Explicit public base URL; when unset it is derived per request
    pub server_url: Option<String>,
    /// Scheme used when deriving the base URL without `X-Forwarded-Proto`
    pub default_scheme: String,
    /// Claims that must be present and non-empty beyond the standard ones
    pub required_claims: Vec<String>,
    /// Scopes advertised in the discovery documents
    pub scopes_supported: Vec<String>,
    /// Tolerance applied to `exp` and `nbf`
    pub clock_skew: Duration,
    /// How long a fetched key set is trusted before refetching
    pub jwks_cache_ttl: Duration,
    /// Upper bound for one key set fetch
    pub jwks_fetch_timeout: Duration,
    /// Minimum spacing between refetches triggered by unknown key IDs
    pub min_refresh_interval: Duration,
    /// Header algorithms accepted by the verifier
    pub allowed_algorithms: Vec<Algorithm>,
}

impl AuthConfig {
    /// Derive a configuration from an identity-provider domain
    ///
    /// A bare domain becomes `https://<domain>/`; a value that already carries
    /// a scheme is used as-is. The key set, authorization and token endpoints
    /// are derived from the issuer and can be overridden afterwards.
    ///
    /// ```rust
    /// use toolgate_auth::AuthConfig;
    ///
    /// let config = AuthConfig::from_issuer_domain("tenant.example.com", "https://mcp.example.com");
    /// assert_eq!(config.issuer, "https://tenant.example.com/");
    /// assert_eq!(config.jwks_uri, "https://tenant.example.com/.well-known/jwks.json");
    /// ```
    pub fn from_issuer_domain(domain: impl AsRef<str>, audience: impl Into<String>) -> Self {
        let issuer = normalize_issuer(domain.as_ref());
        Self {
            jwks_uri: format!("{issuer}.well-known/jwks.json"),
            authorization_endpoint: format!("{issuer}authorize"),
            token_endpoint: format!("{issuer}oauth/token"),
            issuer,
            audience: audience.into(),
            server_url: None,
            default_scheme: "http".to_string(),
            required_claims: Vec::new(),
            scopes_supported: Vec::new(),
            clock_skew: DEFAULT_CLOCK_SKEW,
            jwks_cache_ttl: DEFAULT_JWKS_CACHE_TTL,
            jwks_fetch_timeout: DEFAULT_JWKS_FETCH_TIMEOUT,
            min_refresh_interval: Duration::ZERO,
            allowed_algorithms: DEFAULT_ALLOWED_ALGORITHMS.to_vec(),
        }
    }

    /// Override the key set endpoint
    pub fn with_jwks_uri(mut self, uri: impl Into<String>) -> Self {
        self.jwks_uri = uri.into();
        self
    }

    /// Override the advertised authorization and token endpoints
    pub fn with_endpoints(
        mut self,
        authorization_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
    ) -> Self {
        self.authorization_endpoint = authorization_endpoint.into();
        self.token_endpoint = token_endpoint.into();
        self
    }

    /// Pin the public base URL instead of deriving it from request headers
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    /// Scheme for derived base URLs
    pub fn with_default_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.default_scheme = scheme.into();
        self
    }

    /// Claims that must be present and non-empty
    pub fn with_required_claims<I, S>(mut self, claims: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_claims = claims.into_iter().map(Into::into).collect();
        self
    }

    /// Scopes advertised by the discovery endpoints
    pub fn with_scopes_supported<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes_supported = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Clock skew tolerance
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// JWKS cache TTL
    pub fn with_jwks_cache_ttl(mut self, ttl: Duration) -> Self {
        self.jwks_cache_ttl = ttl;
        self
    }

    /// JWKS fetch timeout
    pub fn with_jwks_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.jwks_fetch_timeout = timeout;
        self
    }

    /// Minimum spacing between miss-triggered refetches
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Restrict the accepted algorithms
    ///
    /// Symmetric algorithms are filtered out.
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.allowed_algorithms = algorithms.into_iter().filter(|a| is_asymmetric(*a)).collect();
        self
    }

    /// Validate the configuration and canonicalise the server URL
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when issuer or audience is empty, the key set
    /// endpoint is not https (http is allowed for loopback hosts only), the
    /// server URL is not a valid resource URI, the fetch timeout is zero, or
    /// no algorithm is allowed.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::Missing("issuer"));
        }
        if self.audience.trim().is_empty() {
            return Err(ConfigError::Missing("audience"));
        }

        let jwks = url::Url::parse(&self.jwks_uri).map_err(|e| ConfigError::Invalid {
            name: "jwks_uri",
            reason: e.to_string(),
        })?;
        let loopback = jwks.host_str().is_some_and(is_loopback_host);
        if jwks.scheme() != "https" && !(jwks.scheme() == "http" && loopback) {
            return Err(ConfigError::Invalid {
                name: "jwks_uri",
                reason: "must use https (http only allowed for localhost)".to_string(),
            });
        }

        if let Some(url) = self.server_url.take() {
            self.server_url = Some(validate_resource_uri(&url)?);
        }

        if !matches!(self.default_scheme.as_str(), "http" | "https") {
            return Err(ConfigError::Invalid {
                name: "default_scheme",
                reason: format!("expected http or https, got '{}'", self.default_scheme),
            });
        }

        if self.jwks_fetch_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                name: "jwks_fetch_timeout",
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.allowed_algorithms.is_empty() {
            return Err(ConfigError::Invalid {
                name: "allowed_algorithms",
                reason: "at least one asymmetric algorithm is required".to_string(),
            });
        }

        Ok(self)
    }
}

fn normalize_issuer(domain: &str) -> String {
    let domain = domain.trim().trim_end_matches('/');
    if domain.is_empty() {
        return String::new();
    }
    if domain.starts_with("https://") || domain.starts_with("http://") {
        format!("{domain}/")
    } else {
        format!("https://{domain}/")
    }
}

pub(crate) fn is_asymmetric(algorithm: Algorithm) -> bool {
    !matches!(
        algorithm,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
    )
}
