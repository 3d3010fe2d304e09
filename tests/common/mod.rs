#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};

use delivery_api::services::auth::jwks::JwkSet;
use delivery_api::services::auth::{
    AuditSink, AuthError, Authorizer, KeySetFetcher, SigningKeyResolver, TokenValidator,
    TrustDomain, TrustDomainRegistry,
};

pub const ISSUER: &str = "https://issuer.test/I1";
pub const AUDIENCE: &str = "A1";
pub const KEY_SET_URL: &str = "https://issuer.test/jwks";

pub const OTHER_ISSUER: &str = "https://issuer.test/I2";
pub const OTHER_AUDIENCE: &str = "A2";
pub const OTHER_KEY_SET_URL: &str = "https://issuer.test/other-jwks";

pub const JWKS_JSON: &str = include_str!("../fixtures/jwks.json");
pub const RSA_PRIMARY_PEM: &str = include_str!("../fixtures/rsa_primary.pem");
pub const RSA_ROGUE_PEM: &str = include_str!("../fixtures/rsa_rogue.pem");
pub const EC_PRIMARY_PEM: &str = include_str!("../fixtures/ec_primary.pem");

/// Serves the fixture key set for every URL and counts the fetches.
#[derive(Default)]
pub struct CountingFetcher {
    fetches: AtomicUsize,
}

impl CountingFetcher {
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySetFetcher for CountingFetcher {
    async fn fetch(&self, _url: &str) -> Result<JwkSet, AuthError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        serde_json::from_str(JWKS_JSON).map_err(|e| AuthError::KeyResolution(e.to_string()))
    }
}

#[derive(Default)]
pub struct RecordingAuditSink {
    lines: Mutex<Vec<String>>,
}

impl RecordingAuditSink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }
}

pub struct Harness {
    pub authorizer: Authorizer,
    pub fetcher: Arc<CountingFetcher>,
    pub audit: Arc<RecordingAuditSink>,
}

pub fn default_registry() -> TrustDomainRegistry {
    TrustDomainRegistry::new(vec![TrustDomain::new(ISSUER, KEY_SET_URL, AUDIENCE)])
}

pub fn harness(registry: TrustDomainRegistry) -> Harness {
    let fetcher = Arc::new(CountingFetcher::default());
    let audit = Arc::new(RecordingAuditSink::default());

    let resolver = SigningKeyResolver::new(fetcher.clone(), Duration::from_secs(300));
    let validator = TokenValidator::new(Arc::new(resolver), 0);
    let authorizer = Authorizer::new(registry, validator).with_audit_sink(audit.clone());

    Harness {
        authorizer,
        fetcher,
        audit,
    }
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn claims(sub: &str) -> Value {
    json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "sub": sub,
        "iat": now(),
        "exp": now() + 600,
    })
}

pub fn expired_claims(sub: &str) -> Value {
    json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "sub": sub,
        "iat": now() - 7200,
        "exp": now() - 3600,
    })
}

pub fn sign(algorithm: Algorithm, kid: &str, key: &EncodingKey, claims: &Value) -> String {
    let mut header = Header::new(algorithm);
    header.kid = Some(kid.to_string());
    jsonwebtoken::encode(&header, claims, key).unwrap()
}

pub fn rs256(claims: &Value) -> String {
    let key = EncodingKey::from_rsa_pem(RSA_PRIMARY_PEM.as_bytes()).unwrap();
    sign(Algorithm::RS256, "rsa-primary", &key, claims)
}

pub fn rs256_rogue(claims: &Value) -> String {
    let key = EncodingKey::from_rsa_pem(RSA_ROGUE_PEM.as_bytes()).unwrap();
    sign(Algorithm::RS256, "rsa-primary", &key, claims)
}

pub fn es256(claims: &Value) -> String {
    let key = EncodingKey::from_ec_pem(EC_PRIMARY_PEM.as_bytes()).unwrap();
    sign(Algorithm::ES256, "ec-primary", &key, claims)
}

pub fn hs256(claims: &Value) -> String {
    let key = EncodingKey::from_secret(b"shared-secret-for-tests");
    sign(Algorithm::HS256, "hmac-1", &key, claims)
}

/// Hand-assembled `alg: none` token; `jsonwebtoken` refuses to produce one.
pub fn unsigned(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT","kid":"rsa-primary"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.")
}
