/*
 * Responsibility
 * - 受け入れ可能な issuer / audience / JWKS URL の組 (TrustDomain) の定義
 * - extension 設定 (firebase-auth, stack-auth) から TrustDomain を組み立てる
 * - devx モードでのみ内部テスト用 TrustDomain を追加する
 */
use serde::Deserialize;

use crate::config::{Config, ConfigError, Extension};

pub const FIREBASE_AUTH_EXTENSION: &str = "firebase-auth";
pub const STACK_AUTH_EXTENSION: &str = "stack-auth";

const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// An issuer/audience pair we accept tokens from, and where its keys live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustDomain {
    pub issuer: String,
    pub key_set_url: String,
    pub audience: String,
}

impl TrustDomain {
    pub fn new(
        issuer: impl Into<String>,
        key_set_url: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            key_set_url: key_set_url.into(),
            audience: audience.into(),
        }
    }

    /// Routing check on *unverified* claims. Never proof of authenticity.
    pub fn matches(&self, issuer: Option<&str>, audience: Option<&str>) -> bool {
        issuer == Some(self.issuer.as_str()) && audience == Some(self.audience.as_str())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirebaseExtensionConfig {
    firebase_config: FirebaseProjectConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirebaseProjectConfig {
    project_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StackAuthExtensionConfig {
    project_id: String,
    jwks_url: String,
}

/// Identity providers that contribute a trust domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthProvider {
    Firebase { project_id: String },
    StackAuth { project_id: String, jwks_url: String },
    /// Internally issued test tokens, only in the devx service.
    InternalDevx { project_id: String, devx_url: String },
}

impl AuthProvider {
    /// Provider for a known auth extension, `None` for unrelated extensions.
    pub fn from_extension(extension: &Extension) -> Result<Option<Self>, ConfigError> {
        let name = extension.name.as_str();
        if name != FIREBASE_AUTH_EXTENSION && name != STACK_AUTH_EXTENSION {
            return Ok(None);
        }

        let config = extension.config.clone().ok_or_else(|| ConfigError::Extension {
            name: name.to_string(),
            reason: "expecting extension config".to_string(),
        })?;
        let invalid = |e: serde_json::Error| ConfigError::Extension {
            name: name.to_string(),
            reason: e.to_string(),
        };

        let provider = if name == FIREBASE_AUTH_EXTENSION {
            let c: FirebaseExtensionConfig = serde_json::from_value(config).map_err(invalid)?;
            Self::Firebase {
                project_id: c.firebase_config.project_id,
            }
        } else {
            let c: StackAuthExtensionConfig = serde_json::from_value(config).map_err(invalid)?;
            Self::StackAuth {
                project_id: c.project_id,
                jwks_url: c.jwks_url,
            }
        };

        Ok(Some(provider))
    }

    pub fn trust_domain(&self) -> TrustDomain {
        match self {
            Self::Firebase { project_id } => TrustDomain::new(
                format!("https://securetoken.google.com/{project_id}"),
                FIREBASE_JWKS_URL,
                project_id,
            ),
            Self::StackAuth {
                project_id,
                jwks_url,
            } => TrustDomain::new(
                format!("https://api.stack-auth.com/api/v1/projects/{project_id}"),
                jwks_url,
                project_id,
            ),
            Self::InternalDevx {
                project_id,
                devx_url,
            } => {
                let base = format!("https://api.databutton.com/_projects/{project_id}/dbtn/devx");
                TrustDomain::new(
                    format!("{base}/workspace/auth"),
                    format!("{}/workspace/auth/jwks", devx_url.trim_end_matches('/')),
                    base,
                )
            }
        }
    }
}

/// Ordered, immutable set of trust domains for this process.
#[derive(Debug, Clone, Default)]
pub struct TrustDomainRegistry {
    domains: Vec<TrustDomain>,
}

impl TrustDomainRegistry {
    pub fn new(domains: Vec<TrustDomain>) -> Self {
        Self { domains }
    }

    /// Firebase, then stack-auth, then (devx only) the internal test issuer.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut providers = Vec::new();

        for name in [FIREBASE_AUTH_EXTENSION, STACK_AUTH_EXTENSION] {
            if let Some(extension) = config.extension(name) {
                providers.extend(AuthProvider::from_extension(extension)?);
            }
        }

        // The internal issuer only complements real providers.
        if !providers.is_empty() && config.service_type.is_devx() {
            let devx_url = config
                .devx_url_internal
                .clone()
                .ok_or(ConfigError::Missing("DEVX_URL_INTERNAL"))?;
            providers.push(AuthProvider::InternalDevx {
                project_id: config.project_id.clone(),
                devx_url,
            });
        }

        let domains: Vec<TrustDomain> = providers.iter().map(AuthProvider::trust_domain).collect();
        for domain in &domains {
            tracing::info!(
                issuer = %domain.issuer,
                audience = %domain.audience,
                jwks_url = %domain.key_set_url,
                "trust domain configured"
            );
        }

        Ok(Self::new(domains))
    }

    /// Domains whose issuer and audience equal the unverified claims, in order.
    pub fn candidates<'a>(
        &'a self,
        issuer: Option<&'a str>,
        audience: Option<&'a str>,
    ) -> impl Iterator<Item = &'a TrustDomain> + 'a {
        self.domains
            .iter()
            .filter(move |d| d.matches(issuer, audience))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrustDomain> {
        self.domains.iter()
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}
