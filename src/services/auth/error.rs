use thiserror::Error;

/// Authentication failures.
///
/// Only `TokenExtraction`, `NoMatchingIdentity` and `InsecureConfiguration`
/// ever leave the authorizer. The others describe why a single trust domain
/// was disqualified and are absorbed (audit log only).
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no bearer token: {0}")]
    TokenExtraction(&'static str),

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("signing key resolution failed: {0}")]
    KeyResolution(String),

    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("token validation failed: {0}")]
    Validation(#[from] jsonwebtoken::errors::Error),

    #[error("missing 'sub' claim")]
    MissingSubject,

    #[error("no trust domain produced an identity")]
    NoMatchingIdentity,

    #[error("insecure auth options requested outside development")]
    InsecureConfiguration,
}
