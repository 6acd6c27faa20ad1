//! RFC 8707 resource identifiers
//!
//! The server's base URL doubles as its resource identifier, so a configured
//! URL is validated and canonicalised once at startup:
//! - absolute `http`/`https` URI with a host
//! - no fragment
//! - plain `http` only for loopback hosts
//! - lowercase scheme and host, default port dropped, query dropped
//! - trailing slash removed unless the path is just `/`

use url::Url;

use crate::error::ConfigError;

const SETTING: &str = "resource_uri";

/// Validate and normalize a resource URI per RFC 8707
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] if the URI is not absolute, uses a scheme
/// other than http/https, uses http on a non-loopback host, has no host, or
/// carries a fragment.
///
/// # Examples
///
/// ```rust
/// use toolgate_auth::validate_resource_uri;
///
/// assert_eq!(
///     validate_resource_uri("HTTPS://API.EXAMPLE.COM:443/mcp/").unwrap(),
///     "https://api.example.com/mcp"
/// );
/// assert!(validate_resource_uri("https://api.example.com#frag").is_err());
/// ```
pub fn validate_resource_uri(uri: &str) -> Result<String, ConfigError> {
    let url = Url::parse(uri).map_err(|e| invalid(format!("not an absolute URI: {e}")))?;

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| invalid("URI must have a host".to_string()))?;

    match url.scheme() {
        "https" => {}
        "http" if is_loopback_host(host) => {}
        "http" => {
            return Err(invalid(
                "must use https (http only allowed for localhost)".to_string(),
            ));
        }
        scheme => return Err(invalid(format!("unsupported scheme '{scheme}'"))),
    }

    if url.fragment().is_some() {
        return Err(invalid("must not contain a fragment".to_string()));
    }

    Ok(canonical_form(&url, host))
}

/// Whether a host names the local machine
pub fn is_loopback_host(host: &str) -> bool {
    matches!(
        host,
        "localhost" | "127.0.0.1" | "0.0.0.0" | "[::1]" | "::1"
    )
}

fn canonical_form(url: &Url, host: &str) -> String {
    let scheme = url.scheme().to_lowercase();
    let host = host.to_lowercase();

    // Url::port() is already None for the scheme's default port
    let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();

    let path = match url.path() {
        "/" => "/",
        other => other.trim_end_matches('/'),
    };

    format!("{scheme}://{host}{port}{path}")
}

fn invalid(reason: String) -> ConfigError {
    ConfigError::Invalid {
        name: SETTING,
        reason,
    }
}
