//! JWKS (JSON Web Key Set) fetching and caching
//!
//! The [`KeyResolver`] owns one immutable key snapshot behind an
//! [`ArcSwapOption`]. Lookups load the current snapshot without locking;
//! a refresh builds a complete new snapshot and swaps it in, so concurrent
//! readers see either the old key set or the new one, never a mix.
//!
//! - **TTL**: a snapshot older than the configured TTL is refetched on the next lookup
//! - **Fetch on miss**: an unknown `kid` triggers one refetch, then one retry of the lookup
//! - **Coalescing**: concurrent misses share a single in-flight fetch, and
//!   its failure too; callers that arrive after a failure fetch again
//! - **Bounded wait**: every fetch runs under a timeout and fails with
//!   [`KeyError::Resolution`] instead of hanging, so no caller waits much
//!   longer than one timeout
//!
//! The resolver never logs failures; it returns them to the caller.

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{AuthConfig, DEFAULT_JWKS_CACHE_TTL, DEFAULT_JWKS_FETCH_TIMEOUT};
use crate::error::KeyError;

/// Where key sets come from
///
/// [`HttpKeySource`] is the production implementation; tests inject their own.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Fetch the provider's complete key set
    async fn fetch_key_set(&self) -> Result<JwkSet, KeyError>;
}

/// Fetches a key set from a JWKS endpoint over HTTP
#[derive(Debug, Clone)]
pub struct HttpKeySource {
    jwks_uri: String,
    http_client: reqwest::Client,
}

impl HttpKeySource {
    /// Create a source for `jwks_uri` whose requests time out after `timeout`
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Resolution`] if the HTTP client cannot be built.
    pub fn new(jwks_uri: impl Into<String>, timeout: Duration) -> Result<Self, KeyError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KeyError::Resolution(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            jwks_uri: jwks_uri.into(),
            http_client,
        })
    }

    /// The JWKS endpoint this source reads
    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    async fn fetch_key_set(&self) -> Result<JwkSet, KeyError> {
        let response = self
            .http_client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| KeyError::Resolution(format!("JWKS fetch failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeyError::Resolution(format!(
                "JWKS endpoint returned status {status}"
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| KeyError::Resolution(format!("invalid JWKS document: {e}")))
    }
}

/// A public verification key taken from the provider's key set
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    algorithm: Option<Algorithm>,
    decoding_key: DecodingKey,
}

impl SigningKey {
    /// Convert one JWK, or `None` if it cannot verify signatures
    ///
    /// Keys without a `kid`, keys published for encryption, symmetric keys and
    /// keys `jsonwebtoken` cannot load are skipped.
    pub fn from_jwk(jwk: &Jwk) -> Option<Self> {
        let kid = jwk.common.key_id.clone().filter(|kid| !kid.is_empty())?;

        if !matches!(jwk.common.public_key_use, None | Some(PublicKeyUse::Signature)) {
            return None;
        }
        if matches!(jwk.algorithm, AlgorithmParameters::OctetKey(_)) {
            return None;
        }

        let decoding_key = DecodingKey::from_jwk(jwk).ok()?;

        Some(Self {
            kid,
            algorithm: jwk.common.key_algorithm.as_ref().and_then(signing_algorithm),
            decoding_key,
        })
    }

    /// Key identifier
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Algorithm the key is pinned to, when the JWK declares one
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    /// Key material for signature verification
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

fn signing_algorithm(alg: &KeyAlgorithm) -> Option<Algorithm> {
    match alg {
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}

/// One complete, immutable view of the provider's keys
#[derive(Debug)]
struct KeySnapshot {
    keys: HashMap<String, Arc<SigningKey>>,
    fetched_at: Instant,
    generation: u64,
}

impl KeySnapshot {
    fn build(set: &JwkSet, generation: u64) -> Self {
        let keys = set
            .keys
            .iter()
            .filter_map(SigningKey::from_jwk)
            .map(|key| (key.kid.clone(), Arc::new(key)))
            .collect();

        Self {
            keys,
            fetched_at: Instant::now(),
            generation,
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// The last fetch attempt failed
#[derive(Debug)]
struct FailedFetch {
    /// Value of the settled-attempt counter once this attempt finished
    attempt: u64,
    error: KeyError,
}

/// Caching key resolver for a single provider
///
/// Cheap to share behind an `Arc`; each instance owns its own cache, so tests
/// can construct isolated resolvers.
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use std::time::Duration;
/// # use toolgate_auth::jwt::{HttpKeySource, KeyResolver};
/// # async fn demo() -> Result<(), toolgate_auth::KeyError> {
/// let source = HttpKeySource::new(
///     "https://tenant.example.com/.well-known/jwks.json",
///     Duration::from_secs(5),
/// )?;
/// let resolver = KeyResolver::new(Arc::new(source)).with_ttl(Duration::from_secs(300));
///
/// let key = resolver.resolve("key-2024-01").await?;
/// println!("resolved {}", key.kid());
/// # Ok(())
/// # }
/// ```
pub struct KeyResolver {
    source: Arc<dyn KeySource>,
    snapshot: ArcSwapOption<KeySnapshot>,
    /// Held by whoever is fetching; waiters re-check the snapshot and the
    /// recorded failure afterwards
    refresh_lock: Mutex<Option<FailedFetch>>,
    ttl: Duration,
    fetch_timeout: Duration,
    min_refresh_interval: Duration,
    fetches: AtomicU64,
    settled: AtomicU64,
}

impl KeyResolver {
    /// Create a resolver with the default TTL and fetch timeout
    pub fn new(source: Arc<dyn KeySource>) -> Self {
        Self {
            source,
            snapshot: ArcSwapOption::empty(),
            refresh_lock: Mutex::new(None),
            ttl: DEFAULT_JWKS_CACHE_TTL,
            fetch_timeout: DEFAULT_JWKS_FETCH_TIMEOUT,
            min_refresh_interval: Duration::ZERO,
            fetches: AtomicU64::new(0),
            settled: AtomicU64::new(0),
        }
    }

    /// Create an HTTP-backed resolver from validated configuration
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Resolution`] if the HTTP client cannot be built.
    pub fn from_config(config: &AuthConfig) -> Result<Self, KeyError> {
        let source = HttpKeySource::new(&config.jwks_uri, config.jwks_fetch_timeout)?;

        Ok(Self::new(Arc::new(source))
            .with_ttl(config.jwks_cache_ttl)
            .with_fetch_timeout(config.jwks_fetch_timeout)
            .with_min_refresh_interval(config.min_refresh_interval))
    }

    /// Set how long a fetched key set stays fresh
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the upper bound on a single key set fetch
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Refuse to refetch for an unknown `kid` within `interval` of the last fetch
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Resolve a signing key by key identifier
    ///
    /// A fresh cached key is returned without I/O. Otherwise the key set is
    /// refetched once (shared with any concurrent caller) and the lookup retried.
    ///
    /// # Errors
    ///
    /// - [`KeyError::NotFound`] if the key is absent after the refresh
    /// - [`KeyError::Resolution`] if the fetch fails or times out
    pub async fn resolve(&self, kid: &str) -> Result<Arc<SigningKey>, KeyError> {
        let current = self.snapshot.load_full();

        if let Some(snapshot) = current.as_deref()
            && snapshot.is_fresh(self.ttl)
        {
            if let Some(key) = snapshot.keys.get(kid) {
                debug!(kid = %kid, "Signing key served from cache");
                return Ok(Arc::clone(key));
            }
            if snapshot.fetched_at.elapsed() < self.min_refresh_interval {
                debug!(kid = %kid, "Unknown key id inside min refresh interval, not refetching");
                return Err(not_found(kid));
            }
        }

        let seen = current.as_ref().map(|snapshot| snapshot.generation);
        let refreshed = self.refresh_after(seen).await?;

        refreshed
            .keys
            .get(kid)
            .cloned()
            .ok_or_else(|| not_found(kid))
    }

    /// Warm the cache; intended for startup
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Resolution`] if the fetch fails or times out.
    pub async fn prefetch(&self) -> Result<usize, KeyError> {
        let snapshot = self.refresh_after(self.generation()).await?;
        Ok(snapshot.keys.len())
    }

    /// Force a refetch regardless of TTL
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Resolution`] if the fetch fails or times out.
    pub async fn refresh(&self) -> Result<usize, KeyError> {
        self.prefetch().await
    }

    /// Number of key set fetches attempted so far
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Key identifiers in the current snapshot, sorted
    pub fn cached_key_ids(&self) -> Vec<String> {
        let mut kids: Vec<String> = self
            .snapshot
            .load()
            .as_deref()
            .map(|snapshot| snapshot.keys.keys().cloned().collect())
            .unwrap_or_default();
        kids.sort();
        kids
    }

    /// Drop the cached snapshot
    pub fn clear(&self) {
        self.snapshot.store(None);
        debug!("JWKS cache cleared");
    }

    fn generation(&self) -> Option<u64> {
        self.snapshot.load().as_deref().map(|snapshot| snapshot.generation)
    }

    /// Fetch a new snapshot unless one newer than `seen` appeared while waiting
    ///
    /// A caller that queued behind an attempt which then failed gets that
    /// attempt's error instead of starting another fetch.
    async fn refresh_after(&self, seen: Option<u64>) -> Result<Arc<KeySnapshot>, KeyError> {
        let settled_before = self.settled.load(Ordering::Acquire);
        let mut last_failure = self.refresh_lock.lock().await;

        if let Some(snapshot) = self.snapshot.load_full()
            && Some(snapshot.generation) != seen
        {
            debug!(generation = snapshot.generation, "Joined a concurrent JWKS refresh");
            return Ok(snapshot);
        }

        if let Some(failed) = last_failure.as_ref()
            && failed.attempt > settled_before
        {
            debug!(attempt = failed.attempt, "Joined a concurrent JWKS refresh that failed");
            return Err(failed.error.clone());
        }

        let generation = self.fetches.fetch_add(1, Ordering::Relaxed) + 1;
        let fetched = tokio::time::timeout(self.fetch_timeout, self.source.fetch_key_set())
            .await
            .map_err(|_| {
                KeyError::Resolution(format!(
                    "JWKS fetch timed out after {}ms",
                    self.fetch_timeout.as_millis()
                ))
            })
            .and_then(|result| result);
        let attempt = self.settled.fetch_add(1, Ordering::Release) + 1;

        let set = match fetched {
            Ok(set) => {
                *last_failure = None;
                set
            }
            Err(error) => {
                *last_failure = Some(FailedFetch {
                    attempt,
                    error: error.clone(),
                });
                return Err(error);
            }
        };

        let snapshot = Arc::new(KeySnapshot::build(&set, generation));

        info!(
            key_count = snapshot.keys.len(),
            published = set.keys.len(),
            generation,
            "Fetched JWKS"
        );

        self.snapshot.store(Some(Arc::clone(&snapshot)));
        Ok(snapshot)
    }
}

impl fmt::Debug for KeyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyResolver")
            .field("ttl", &self.ttl)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("min_refresh_interval", &self.min_refresh_interval)
            .field("cached_keys", &self.cached_key_ids())
            .field("fetches", &self.fetch_count())
            .finish_non_exhaustive()
    }
}

fn not_found(kid: &str) -> KeyError {
    KeyError::NotFound {
        kid: kid.to_string(),
    }
}
