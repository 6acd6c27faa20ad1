//! JWT verification against keys from the [`KeyResolver`]
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. Structure: three non-empty dot-separated segments with a decodable header
//! 2. Header: allow-listed asymmetric `alg`, a `kid`
//! 3. Key: resolved by `kid` (may refetch the key set once)
//! 4. Signature
//! 5. Claims: `iss` exact, `aud` contains, `exp` in the future, `nbf` not in the future
//! 6. Configured required claims present and non-empty
//!
//! `exp` and `nbf` are checked here rather than by `jsonwebtoken` so that the
//! verification instant can be injected.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use super::jwks::KeyResolver;
use super::{VerifiedClaims, is_non_empty};
use crate::config::{AuthConfig, is_asymmetric};
use crate::error::VerificationError;

/// Verifies bearer JWTs for one issuer and audience
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    issuer: String,
    audience: String,
    required_claims: Vec<String>,
    clock_skew: Duration,
    allowed_algorithms: Vec<Algorithm>,
    keys: Arc<KeyResolver>,
}

impl TokenVerifier {
    /// Create a verifier from validated configuration and a shared key resolver
    pub fn new(config: &AuthConfig, keys: Arc<KeyResolver>) -> Self {
        Self {
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            required_claims: config.required_claims.clone(),
            clock_skew: config.clock_skew,
            allowed_algorithms: config
                .allowed_algorithms
                .iter()
                .copied()
                .filter(|alg| is_asymmetric(*alg))
                .collect(),
            keys,
        }
    }

    /// The shared key resolver
    pub fn keys(&self) -> &Arc<KeyResolver> {
        &self.keys
    }

    /// Verify a token at the current wall-clock time
    ///
    /// # Errors
    ///
    /// Returns the first [`VerificationError`] encountered; see the module docs
    /// for the order.
    pub async fn verify(&self, token: &str) -> Result<VerifiedClaims, VerificationError> {
        self.verify_at(token, unix_now()).await
    }

    /// Verify a token as of `now` (seconds since the epoch)
    ///
    /// # Errors
    ///
    /// Returns the first [`VerificationError`] encountered.
    pub async fn verify_at(
        &self,
        token: &str,
        now: u64,
    ) -> Result<VerifiedClaims, VerificationError> {
        if token.split('.').count() != 3 || token.split('.').any(str::is_empty) {
            return Err(VerificationError::Malformed(
                "expected three non-empty segments".to_string(),
            ));
        }

        let header =
            decode_header(token).map_err(|e| VerificationError::Malformed(e.to_string()))?;

        if !self.allowed_algorithms.contains(&header.alg) {
            return Err(VerificationError::AlgorithmNotAllowed(header.alg));
        }

        let kid = header
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or(VerificationError::MissingKeyId)?;

        let key = self.keys.resolve(kid).await?;

        // A key pinned to one algorithm must not verify another
        if key.algorithm().is_some_and(|alg| alg != header.alg) {
            return Err(VerificationError::SignatureInvalid);
        }

        let mut validation = Validation::new(header.alg);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        validation.leeway = 0;

        let raw = decode::<Map<String, Value>>(token, key.decoding_key(), &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => VerificationError::Malformed(e.to_string()),
                _ => VerificationError::SignatureInvalid,
            })?
            .claims;

        let claims: VerifiedClaims = serde_json::from_value(Value::Object(raw.clone()))
            .map_err(|e| VerificationError::Malformed(format!("unexpected claim types: {e}")))?;

        self.check_standard_claims(&claims, now)?;
        self.check_required_claims(&raw)?;

        debug!(kid = %kid, algorithm = ?header.alg, "Token verified");
        Ok(claims)
    }

    fn check_standard_claims(
        &self,
        claims: &VerifiedClaims,
        now: u64,
    ) -> Result<(), VerificationError> {
        let skew = self.clock_skew.as_secs();

        if claims.iss.as_deref() != Some(self.issuer.as_str()) {
            return Err(VerificationError::claim("iss", "unexpected issuer"));
        }

        if !claims
            .aud
            .as_ref()
            .is_some_and(|aud| aud.contains(&self.audience))
        {
            return Err(VerificationError::claim("aud", "token not issued for this resource"));
        }

        let exp = claims
            .exp
            .ok_or_else(|| VerificationError::claim("exp", "missing expiry"))?;
        if exp.saturating_add(skew) <= now {
            return Err(VerificationError::claim("exp", "token has expired"));
        }

        if let Some(nbf) = claims.nbf
            && nbf > now.saturating_add(skew)
        {
            return Err(VerificationError::claim("nbf", "token not yet valid"));
        }

        Ok(())
    }

    fn check_required_claims(&self, raw: &Map<String, Value>) -> Result<(), VerificationError> {
        match self
            .required_claims
            .iter()
            .find(|name| !raw.get(name.as_str()).is_some_and(is_non_empty))
        {
            Some(name) => Err(VerificationError::claim(
                name.as_str(),
                "required claim missing or empty",
            )),
            None => Ok(()),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
