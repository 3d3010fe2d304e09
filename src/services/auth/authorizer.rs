//! Request authorization: bearer token → authenticated identity, or fail closed.
//!
//! Flow for one request:
//! 1. extract the bearer token (HTTP `Authorization` header or WebSocket subprotocol)
//! 2. internal shared-secret bypass (HTTP only, checked before any key fetch)
//! 3. read `iss` / `aud` without verification to pick candidate trust domains
//! 4. development relaxations from the query string (HTTP only, if the policy allows)
//! 5. validate against each candidate in order; first identity wins
//!
//! Callers only ever see `TokenExtraction` or `NoMatchingIdentity`; the reason a
//! candidate was rejected goes to the audit sink and nowhere else.

use std::sync::Arc;

use axum::http::{HeaderMap, header};

use crate::services::auth::audit::AuditSink;
use crate::services::auth::bypass::{DevelopmentBypassPolicy, InternalTokenBypass};
use crate::services::auth::error::AuthError;
use crate::services::auth::identity::AuthenticatedIdentity;
use crate::services::auth::trust_domain::TrustDomainRegistry;
use crate::services::auth::validator::{TokenValidator, UnverifiedClaims, VerificationOptions};

pub const BEARER_PREFIX: &str = "Bearer ";
pub const WEBSOCKET_BEARER_PREFIX: &str = "Authorization.Bearer.";
pub const MCP_CLIENT_ID_HEADER: &str = "x-mcp-client-id";

/// Token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::TokenExtraction("missing authorization header"))?;

    value
        .strip_prefix(BEARER_PREFIX)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::TokenExtraction("missing bearer token in authorization header"))
}

fn websocket_protocols(headers: &HeaderMap) -> impl Iterator<Item = &str> {
    headers
        .get_all(header::SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
}

/// Token from the first `Authorization.Bearer.<token>` subprotocol entry.
pub fn websocket_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    websocket_protocols(headers)
        .find_map(|p| p.strip_prefix(WEBSOCKET_BEARER_PREFIX))
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::TokenExtraction(
            "missing Authorization.Bearer.<token> in protocols",
        ))
}

/// Offered subprotocols minus the credential entry, safe to echo back.
pub fn application_subprotocols(headers: &HeaderMap) -> Vec<String> {
    websocket_protocols(headers)
        .filter(|p| !p.starts_with(WEBSOCKET_BEARER_PREFIX))
        .map(str::to_string)
        .collect()
}

/// Protocols the upgrade may select.
///
/// Application entries when the client offered any; otherwise the credential
/// entry itself, since browsers abort a handshake whose offered protocols get
/// no `Sec-WebSocket-Protocol` answer.
pub fn negotiable_subprotocols(headers: &HeaderMap) -> Vec<String> {
    let application = application_subprotocols(headers);
    if !application.is_empty() {
        return application;
    }

    websocket_protocols(headers)
        .filter(|p| p.starts_with(WEBSOCKET_BEARER_PREFIX))
        .take(1)
        .map(str::to_string)
        .collect()
}

pub struct Authorizer {
    registry: TrustDomainRegistry,
    validator: TokenValidator,
    dev_bypass: DevelopmentBypassPolicy,
    internal_bypass: Option<InternalTokenBypass>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl Authorizer {
    pub fn new(registry: TrustDomainRegistry, validator: TokenValidator) -> Self {
        Self {
            registry,
            validator,
            dev_bypass: DevelopmentBypassPolicy::Disabled,
            internal_bypass: None,
            audit: None,
        }
    }

    #[must_use]
    pub fn with_development_bypass(mut self, policy: DevelopmentBypassPolicy) -> Self {
        self.dev_bypass = policy;
        self
    }

    #[must_use]
    pub fn with_internal_bypass(mut self, bypass: Option<InternalTokenBypass>) -> Self {
        self.internal_bypass = bypass;
        self
    }

    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn registry(&self) -> &TrustDomainRegistry {
        &self.registry
    }

    pub fn has_trust_domains(&self) -> bool {
        !self.registry.is_empty()
    }

    /// HTTP path. `query` is the raw query string of the request URI.
    pub async fn authorize_request(
        &self,
        headers: &HeaderMap,
        query: Option<&str>,
    ) -> Result<AuthenticatedIdentity, AuthError> {
        let outcome = self.try_authorize_request(headers, query).await;
        self.conclude(outcome)
    }

    /// WebSocket path. No internal bypass and no development relaxations here.
    pub async fn authorize_websocket(
        &self,
        headers: &HeaderMap,
    ) -> Result<AuthenticatedIdentity, AuthError> {
        let outcome = match websocket_bearer_token(headers) {
            Ok(token) => {
                self.authorize_token(token, &VerificationOptions::strict())
                    .await
            }
            Err(err) => Err(err),
        };
        self.conclude(outcome)
    }

    async fn try_authorize_request(
        &self,
        headers: &HeaderMap,
        query: Option<&str>,
    ) -> Result<AuthenticatedIdentity, AuthError> {
        let token = bearer_token(headers)?;

        if let Some(bypass) = &self.internal_bypass {
            if bypass.accepts(token) {
                let client_id = headers
                    .get(MCP_CLIENT_ID_HEADER)
                    .and_then(|v| v.to_str().ok());
                self.record(&format!(
                    "Internal token accepted for MCP client {}",
                    client_id.unwrap_or("<unnamed>")
                ));
                return Ok(bypass.identity(client_id));
            }
        }

        let options = self.dev_bypass.relaxation(query).unwrap_or_default();
        self.authorize_token(token, &options).await
    }

    async fn authorize_token(
        &self,
        token: &str,
        options: &VerificationOptions,
    ) -> Result<AuthenticatedIdentity, AuthError> {
        let claims = UnverifiedClaims::peek(token)?;

        for domain in self.registry.candidates(claims.issuer(), claims.audience()) {
            match self.validator.validate(token, domain, options).await {
                Ok(identity) => {
                    self.record(&format!("User {} authenticated", identity.sub));
                    return Ok(identity);
                }
                Err(err) => {
                    self.record(&format!(
                        "Token rejected for issuer {}: {}",
                        domain.issuer, err
                    ));
                }
            }
        }

        Err(AuthError::NoMatchingIdentity)
    }

    /// Collapse every failure into the two caller-visible outcomes.
    fn conclude(
        &self,
        outcome: Result<AuthenticatedIdentity, AuthError>,
    ) -> Result<AuthenticatedIdentity, AuthError> {
        outcome.map_err(|err| {
            self.record(&format!("Request authentication failed: {err}"));
            match err {
                AuthError::TokenExtraction(reason) => AuthError::TokenExtraction(reason),
                _ => AuthError::NoMatchingIdentity,
            }
        })
    }

    fn record(&self, message: &str) {
        if let Some(audit) = &self.audit {
            audit.record(message);
        }
    }
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer")
            .field("registry", &self.registry)
            .field("dev_bypass", &self.dev_bypass)
            .field("internal_bypass", &self.internal_bypass.is_some())
            .field("audit", &self.audit.is_some())
            .finish()
    }
}
