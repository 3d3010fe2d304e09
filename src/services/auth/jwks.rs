//! Signing-key resolution from JWKS (JSON Web Key Set) endpoints.
//!
//! One `KeySetClient` exists per key-set URL for the life of the process.
//! Each client keeps the last fetched key set and only goes back to the
//! network when the set is stale or a requested `kid` is missing from it.
//!
//! Only RS256 and ES256 keys are ever handed out. Anything else (symmetric
//! keys, `none`, other curves) fails with `UnsupportedAlgorithm`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::services::auth::error::AuthError;

/// A single JSON Web Key (the public members we care about).
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA", "EC", "oct", ...)
    pub kty: String,

    #[serde(default)]
    pub kid: Option<String>,

    /// Intended use ("sig" for signature)
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    #[serde(default)]
    pub alg: Option<String>,

    // RSA
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,

    // EC
    #[serde(default)]
    pub crv: Option<String>,
    #[serde(default)]
    pub x: Option<String>,
    #[serde(default)]
    pub y: Option<String>,
}

impl Jwk {
    /// Keys published for encryption are never used to verify signatures.
    pub fn is_signing_key(&self) -> bool {
        self.key_use.as_deref().is_none_or(|u| u == "sig")
    }

    /// Declared `alg`, or the conventional algorithm for the key type.
    pub fn algorithm_name(&self) -> Result<&str, AuthError> {
        if let Some(alg) = self.alg.as_deref() {
            return Ok(alg);
        }

        match (self.kty.as_str(), self.crv.as_deref()) {
            ("RSA", _) => Ok("RS256"),
            ("EC", Some("P-256")) => Ok("ES256"),
            ("EC", Some("P-384")) => Ok("ES384"),
            ("EC", Some("P-521")) => Ok("ES512"),
            ("oct", _) => Ok("HS256"),
            ("OKP", _) => Ok("EdDSA"),
            (kty, _) => Err(AuthError::KeyResolution(format!(
                "unsupported key type: {kty}"
            ))),
        }
    }

    /// Only RS256 and ES256 keys verify tokens here.
    pub fn algorithm(&self) -> Result<Algorithm, AuthError> {
        match self.algorithm_name()? {
            "RS256" => Ok(Algorithm::RS256),
            "ES256" => Ok(Algorithm::ES256),
            other => Err(AuthError::UnsupportedAlgorithm(other.to_string())),
        }
    }

    pub fn to_signing_key(&self) -> Result<SigningKey, AuthError> {
        let algorithm = self.algorithm()?;

        let key = match algorithm {
            Algorithm::RS256 => {
                if self.kty != "RSA" {
                    return Err(AuthError::KeyResolution(format!(
                        "RS256 key has key type {}",
                        self.kty
                    )));
                }
                let n = self.n.as_deref().ok_or_else(|| {
                    AuthError::KeyResolution("RSA key missing modulus (n)".into())
                })?;
                let e = self.e.as_deref().ok_or_else(|| {
                    AuthError::KeyResolution("RSA key missing exponent (e)".into())
                })?;
                DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| AuthError::KeyResolution(format!("invalid RSA key: {e}")))?
            }
            _ => {
                if self.kty != "EC" || self.crv.as_deref().is_some_and(|c| c != "P-256") {
                    return Err(AuthError::KeyResolution(format!(
                        "ES256 key has key type {} / curve {:?}",
                        self.kty, self.crv
                    )));
                }
                let x = self.x.as_deref().ok_or_else(|| {
                    AuthError::KeyResolution("EC key missing x coordinate".into())
                })?;
                let y = self.y.as_deref().ok_or_else(|| {
                    AuthError::KeyResolution("EC key missing y coordinate".into())
                })?;
                DecodingKey::from_ec_components(x, y)
                    .map_err(|e| AuthError::KeyResolution(format!("invalid EC key: {e}")))?
            }
        };

        Ok(SigningKey {
            kid: self.kid.clone(),
            algorithm,
            key,
        })
    }
}

/// JSON Web Key Set document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JwkSet {
    #[serde(default)]
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// Signing key whose `kid` equals the token's `kid` (both may be absent).
    pub fn find(&self, kid: Option<&str>) -> Option<&Jwk> {
        self.keys
            .iter()
            .filter(|k| k.is_signing_key())
            .find(|k| k.kid.as_deref() == kid)
    }
}

/// Resolved public key together with the only algorithm it may verify.
#[derive(Clone)]
pub struct SigningKey {
    pub kid: Option<String>,
    pub algorithm: Algorithm,
    key: DecodingKey,
}

impl SigningKey {
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Source of key-set documents.
///
/// Production uses [`HttpKeySetFetcher`]; tests plug in fixed documents.
#[async_trait]
pub trait KeySetFetcher: Send + Sync + 'static {
    async fn fetch(&self, url: &str) -> Result<JwkSet, AuthError>;
}

/// Fetches key sets over HTTPS with a bounded timeout and no retries.
#[derive(Clone, Debug)]
pub struct HttpKeySetFetcher {
    client: reqwest::Client,
}

impl HttpKeySetFetcher {
    pub fn new(timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::KeyResolution(format!("http client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    async fn fetch(&self, url: &str) -> Result<JwkSet, AuthError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AuthError::KeyResolution(format!("fetch {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(AuthError::KeyResolution(format!(
                "fetch {url}: HTTP {}",
                response.status()
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AuthError::KeyResolution(format!("invalid key set from {url}: {e}")))
    }
}

struct CachedKeySet {
    set: JwkSet,
    fetched_at: Instant,
}

/// Key-set client for one URL.
pub struct KeySetClient {
    url: String,
    fetcher: Arc<dyn KeySetFetcher>,
    cache_ttl: Duration,
    cached: RwLock<Option<CachedKeySet>>,
}

impl KeySetClient {
    pub fn new(url: impl Into<String>, fetcher: Arc<dyn KeySetFetcher>, cache_ttl: Duration) -> Self {
        Self {
            url: url.into(),
            fetcher,
            cache_ttl,
            cached: RwLock::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Key for `kid`, re-fetching the set once if it is stale or lacks the key.
    pub async fn signing_key(&self, kid: Option<&str>) -> Result<SigningKey, AuthError> {
        if let Some(jwk) = self.cached_key(kid).await {
            return jwk.to_signing_key();
        }

        let set = self.fetcher.fetch(&self.url).await?;
        let jwk = set.find(kid).cloned();

        {
            let mut cached = self.cached.write().await;
            *cached = Some(CachedKeySet {
                set,
                fetched_at: Instant::now(),
            });
        }

        jwk.ok_or_else(|| {
            AuthError::KeyResolution(format!("no signing key matches kid {kid:?}"))
        })?
        .to_signing_key()
    }

    async fn cached_key(&self, kid: Option<&str>) -> Option<Jwk> {
        let cached = self.cached.read().await;
        let cached = cached.as_ref()?;
        if cached.fetched_at.elapsed() > self.cache_ttl {
            return None;
        }
        cached.set.find(kid).cloned()
    }
}

/// Process-wide map of key-set clients, keyed by URL.
///
/// Clients are created lazily and never evicted. Two requests racing on the
/// first use of a URL may both fetch; the map still converges to one client.
pub struct SigningKeyResolver {
    clients: DashMap<String, Arc<KeySetClient>>,
    fetcher: Arc<dyn KeySetFetcher>,
    cache_ttl: Duration,
}

impl SigningKeyResolver {
    pub fn new(fetcher: Arc<dyn KeySetFetcher>, cache_ttl: Duration) -> Self {
        Self {
            clients: DashMap::new(),
            fetcher,
            cache_ttl,
        }
    }

    pub fn client(&self, key_set_url: &str) -> Arc<KeySetClient> {
        if let Some(client) = self.clients.get(key_set_url) {
            return Arc::clone(client.value());
        }

        self.clients
            .entry(key_set_url.to_string())
            .or_insert_with(|| {
                Arc::new(KeySetClient::new(
                    key_set_url,
                    Arc::clone(&self.fetcher),
                    self.cache_ttl,
                ))
            })
            .value()
            .clone()
    }

    /// Resolve the key referenced by the token header's `kid`.
    pub async fn signing_key(&self, key_set_url: &str, token: &str) -> Result<SigningKey, AuthError> {
        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| AuthError::KeyResolution(format!("invalid token header: {e}")))?;

        self.client(key_set_url)
            .signing_key(header.kid.as_deref())
            .await
    }

    #[cfg(test)]
    fn client_count(&self) -> usize {
        self.clients.len()
    }
}

impl std::fmt::Debug for SigningKeyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyResolver")
            .field("clients", &self.clients.len())
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}
