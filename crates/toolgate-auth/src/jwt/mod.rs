//! JWT infrastructure - key resolution and token verification
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  KeyResolver (shared cache)  │  JWKS fetch, TTL, refresh-on-miss
//! └──────────────┬───────────────┘
//!                │ Arc<SigningKey>
//! ┌──────────────┴───────────────┐
//! │  TokenVerifier               │  alg allow-list, signature,
//! │                              │  iss/aud/exp/nbf, required claims
//! └──────────────┬───────────────┘
//!                │ VerifiedClaims
//!                ▼
//!          session builder
//! ```
//!
//! # Modules
//!
//! - `jwks` - key set fetching and snapshot caching
//! - `validator` - token verification against resolved keys

pub mod jwks;
pub mod validator;

pub use jwks::{HttpKeySource, KeyResolver, KeySource, SigningKey};
pub use validator::TokenVerifier;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The `aud` claim, which RFC 7519 allows as a string or an array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// Single audience
    Single(String),
    /// Several audiences
    Many(Vec<String>),
}

impl Audience {
    /// Whether `audience` is one of the token's audiences
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Self::Single(aud) => aud == audience,
            Self::Many(auds) => auds.iter().any(|aud| aud == audience),
        }
    }
}

/// Claims of a token whose signature and standard claims have been validated
///
/// Only produced by [`TokenVerifier`]. Known claims are typed; everything else
/// is kept in `additional`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifiedClaims {
    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Audience(s)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    /// Expiration time, seconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,

    /// Not before, seconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,

    /// Issued at, seconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,

    /// OAuth client identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Authorized party, the client identity fallback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,

    /// Space-delimited granted scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Email address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Claims not modelled above
    #[serde(flatten)]
    pub additional: HashMap<String, Value>,
}

/// Whether a claim value counts as present
///
/// `null`, blank strings, empty arrays and empty objects count as absent.
pub(crate) fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}
