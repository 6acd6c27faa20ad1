//! # Toolgate Server
//!
//! HTTP surface around [`toolgate_auth`]: the discovery documents, a bearer
//! middleware that runs the authenticator on every request, and a JSON-RPC
//! tool endpoint whose tools each declare the scopes they need.
//!
//! ```rust,no_run
//! use toolgate_auth::{AuthConfig, Authenticator};
//! use toolgate_server::{AppState, ToolRegistry, router};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::from_issuer_domain("tenant.example.com", "https://mcp.example.com")
//!     .validated()?;
//! let app = router(AppState::new(Authenticator::from_config(config)?, ToolRegistry::builtin()));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod logging;
pub mod middleware;
pub mod routes;
pub mod tools;

pub use config::ServerArgs;
pub use error::{AuthRejection, ServerError, ServerResult};
pub use logging::LoggingConfig;
pub use routes::{AppState, MCP_PATH, router};
pub use tools::{Tool, ToolRegistry};

use tracing::{info, warn};

/// Build the application from parsed arguments
///
/// Warms the key cache; a failed warm-up is logged and the first request
/// fetches instead.
///
/// # Errors
///
/// Returns [`ServerError`] when the configuration is invalid or the JWKS HTTP
/// client cannot be built.
pub async fn build_app(args: &ServerArgs) -> ServerResult<axum::Router> {
    let config = args.auth_config()?;
    info!(
        issuer = %config.issuer,
        audience = %config.audience,
        jwks_uri = %config.jwks_uri,
        "Authentication configured"
    );

    let auth = toolgate_auth::Authenticator::from_config(config)?;
    match auth.keys().prefetch().await {
        Ok(count) => info!(keys = count, "Signing keys prefetched"),
        Err(e) => warn!(error = %e, "Signing key prefetch failed, will fetch on first request"),
    }

    Ok(router(AppState::new(auth, ToolRegistry::builtin())))
}

/// Resolve when Ctrl-C or SIGTERM arrives
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Ctrl+C received, initiating shutdown"),
        () = terminate => info!("SIGTERM received, initiating shutdown"),
    }
}
