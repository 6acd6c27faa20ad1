//! # Toolgate Auth - Resource-Server Token Gate
//!
//! Bearer-token authentication and scope-based authorization for
//! tool-invocation servers. Tokens are JWTs issued by an external OAuth 2.1 /
//! OpenID provider and verified against its published key set; this crate never
//! issues tokens.
//!
//! ## Pipeline
//!
//! ```text
//! request headers
//!   └─ extract_bearer ──────────── NoCredential
//!        └─ TokenVerifier ──────── Malformed / AlgorithmNotAllowed / MissingKeyId
//!             │  └─ KeyResolver ── KeyNotFound / KeyResolution
//!             │                    SignatureInvalid / ClaimInvalid
//!             └─ AuthenticatedSession::from_claims
//!                                  MissingSubject / MissingClientIdentity
//!   (per operation)
//!   └─ RequiredScopeSet::enforce ─ ScopeDenied
//! ```
//!
//! Every failure is an [`AuthError`]; [`AuthError::failure_kind`] decides
//! between 401 (with a `WWW-Authenticate` discovery challenge), 403 and 500.
//!
//! ## Architecture
//!
//! - [`config`] - [`AuthConfig`], derived from an issuer domain and validated at startup
//! - [`jwt`] - [`KeyResolver`] (JWKS cache) and [`TokenVerifier`]
//! - [`context`] - [`AuthenticatedSession`] built from verified claims
//! - [`scope`] - [`RequiredScopeSet`], the per-operation scope gate
//! - [`server`] - challenges, discovery documents, bearer extraction, base URL
//! - [`authenticator`] - [`Authenticator`], the per-request entry point
//! - [`resource`] - RFC 8707 resource URI validation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use http::HeaderMap;
//! use toolgate_auth::{AuthConfig, Authenticator, RequiredScopeSet};
//!
//! # async fn handle(headers: HeaderMap) -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::from_issuer_domain("tenant.example.com", "https://mcp.example.com")
//!     .validated()?;
//! let auth = Authenticator::from_config(config)?;
//!
//! match auth.authenticate(&headers).await {
//!     Ok(session) => {
//!         RequiredScopeSet::new(["tool:whoami"]).enforce(&session)?;
//!         println!("hello {}", session.client_id());
//!     }
//!     Err(rejection) => {
//!         let challenge = rejection.challenge();
//!         println!("{} {:?}", challenge.status, challenge.headers);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Standards
//!
//! - **RFC 7519** - JSON Web Token
//! - **RFC 7517** - JSON Web Key
//! - **RFC 6750** - Bearer token usage and `WWW-Authenticate`
//! - **RFC 8414** - Authorization Server Metadata
//! - **RFC 8707** - Resource Indicators
//! - **RFC 9728** - Protected Resource Metadata

pub mod authenticator;
pub mod config;
pub mod context;
pub mod error;
pub mod jwt;
pub mod resource;
pub mod scope;
pub mod server;

#[doc(inline)]
pub use authenticator::{Authenticator, Rejection};
#[doc(inline)]
pub use config::*;
#[doc(inline)]
pub use context::{AuthenticatedSession, SessionSummary, build_session, parse_scopes};
#[doc(inline)]
pub use error::{
    AuthError, AuthResult, ConfigError, FailureKind, KeyError, SessionError, VerificationError,
};
#[doc(inline)]
pub use jwt::{
    Audience, HttpKeySource, KeyResolver, KeySource, SigningKey, TokenVerifier, VerifiedClaims,
};
#[doc(inline)]
pub use resource::validate_resource_uri;
#[doc(inline)]
pub use scope::{RequiredScopeSet, authorize};
#[doc(inline)]
pub use server::{
    AUTHORIZATION_SERVER_METADATA_PATH, AuthorizationServerMetadata, Challenge,
    PROTECTED_RESOURCE_METADATA_PATH, ProtectedResourceMetadata, WwwAuthenticateBuilder,
    build_challenge, discovery_url, error_response_body, extract_bearer, resolve_base_url,
};
