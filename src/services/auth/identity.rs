/*
 * Responsibility
 * - 検証済みトークンから得られる「認証済み主体」の型
 * - middleware が request extensions に格納し、handler はこの型だけを受け取る
 */
use serde::{Deserialize, Serialize};

use crate::services::auth::error::AuthError;

/// Subject used for callers admitted through the internal shared secret.
pub const INTERNAL_CLIENT_SUBJECT: &str = "mcp-client";

/// Authenticated caller for the lifetime of one request.
///
/// Built only from a verified claim set (or the internal bypass); never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedIdentity {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl AuthenticatedIdentity {
    pub fn new(sub: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            user_id: None,
            name: None,
            picture: None,
            email: None,
        }
    }

    /// Identity handed to internal callers that present the shared secret.
    pub fn internal_client(client_id: Option<&str>) -> Self {
        Self {
            name: client_id.filter(|id| !id.is_empty()).map(str::to_string),
            ..Self::new(INTERNAL_CLIENT_SUBJECT)
        }
    }
}

/// Identity-bearing claims of a token.
///
/// Registered claims (`iss`, `aud`, `exp`) are checked by `jsonwebtoken` itself.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl TryFrom<IdentityClaims> for AuthenticatedIdentity {
    type Error = AuthError;

    fn try_from(claims: IdentityClaims) -> Result<Self, Self::Error> {
        let sub = claims
            .sub
            .filter(|s| !s.trim().is_empty())
            .ok_or(AuthError::MissingSubject)?;

        Ok(Self {
            sub,
            user_id: claims.user_id,
            name: claims.name,
            picture: claims.picture,
            email: claims.email,
        })
    }
}
