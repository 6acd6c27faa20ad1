//! Command-line and environment configuration
//!
//! Every flag falls back to an environment variable so the server can be run
//! from a container with nothing but env vars set.

use std::time::Duration;

use clap::Parser;
use toolgate_auth::{AuthConfig, ConfigError};

use crate::logging::LoggingConfig;

/// Server configuration
#[derive(Debug, Clone, Parser)]
#[command(name = "toolgate-server", version, about = "Bearer-token gated tool server")]
pub struct ServerArgs {
    /// Identity provider domain, e.g. `tenant.example.com`
    #[arg(long, env = "AUTH_ISSUER_DOMAIN")]
    pub issuer_domain: String,

    /// Expected token audience (this server's resource identifier)
    #[arg(long, env = "AUTH_AUDIENCE")]
    pub audience: String,

    /// Public base URL; derived from request headers when unset
    #[arg(long, env = "SERVER_URL")]
    pub server_url: Option<String>,

    /// Address to bind; `HOST` is left alone since shells set it to the machine name
    #[arg(long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Scheme used for derived base URLs without `X-Forwarded-Proto`
    #[arg(long, env = "AUTH_DEFAULT_SCHEME", default_value = "http")]
    pub default_scheme: String,

    /// Claims that must be present and non-empty (comma-separated)
    #[arg(long, env = "AUTH_REQUIRED_CLAIMS", value_delimiter = ',')]
    pub required_claims: Vec<String>,

    /// Scopes advertised by the discovery endpoints (comma-separated)
    #[arg(
        long,
        env = "AUTH_SCOPES_SUPPORTED",
        value_delimiter = ',',
        default_value = "tool:whoami,tool:greet"
    )]
    pub scopes_supported: Vec<String>,

    /// JWKS cache TTL in seconds
    #[arg(long, env = "JWKS_CACHE_TTL_SECS", default_value_t = 600)]
    pub jwks_cache_ttl_secs: u64,

    /// Upper bound for one JWKS fetch in seconds
    #[arg(long, env = "JWKS_FETCH_TIMEOUT_SECS", default_value_t = 5)]
    pub jwks_fetch_timeout_secs: u64,

    /// Clock skew tolerance in seconds
    #[arg(long, env = "CLOCK_SKEW_SECS", default_value_t = 5)]
    pub clock_skew_secs: u64,

    /// Log level used when `RUST_LOG` is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit JSON logs
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

impl ServerArgs {
    /// Build and validate the authentication configuration
    ///
    /// Blank entries in the comma-separated lists are ignored, so an empty
    /// `AUTH_REQUIRED_CLAIMS` means no extra claims.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when [`AuthConfig::validated`] rejects the result.
    pub fn auth_config(&self) -> Result<AuthConfig, ConfigError> {
        let mut config = AuthConfig::from_issuer_domain(&self.issuer_domain, self.audience.trim())
            .with_default_scheme(self.default_scheme.trim().to_ascii_lowercase())
            .with_required_claims(non_blank(&self.required_claims))
            .with_scopes_supported(non_blank(&self.scopes_supported))
            .with_jwks_cache_ttl(Duration::from_secs(self.jwks_cache_ttl_secs))
            .with_jwks_fetch_timeout(Duration::from_secs(self.jwks_fetch_timeout_secs))
            .with_clock_skew(Duration::from_secs(self.clock_skew_secs));

        if let Some(url) = self.server_url.as_deref().filter(|url| !url.trim().is_empty()) {
            config = config.with_server_url(url.trim());
        }

        config.validated()
    }

    /// Logging settings
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            structured: self.log_json,
        }
    }

    /// `host:port` to bind
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_blank(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}
