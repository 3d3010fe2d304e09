/*
 * Responsibility
 * - development 環境でのみ許可される検証緩和 (disable-verify / disable-aud / disable-exp)
 * - 内部コンポーネント (MCP) 用の shared secret による認証バイパス
 *
 * Notes
 * - どちらも起動時に一度だけ決定し、リクエストごとに環境変数を読まない
 * - production で緩和が有効になる構成は起動失敗 (InsecureConfiguration)
 */
use url::form_urlencoded;

use crate::config::{AppEnv, ServiceType};
use crate::services::auth::error::AuthError;
use crate::services::auth::identity::AuthenticatedIdentity;
use crate::services::auth::validator::VerificationOptions;

pub const DISABLE_VERIFY_FLAG: &str = "disable-verify";
pub const DISABLE_AUD_FLAG: &str = "disable-aud";
pub const DISABLE_EXP_FLAG: &str = "disable-exp";

/// Whether requests may ask for relaxed token verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevelopmentBypassPolicy {
    #[default]
    Disabled,
    Enabled,
}

impl DevelopmentBypassPolicy {
    /// Resolve once at startup.
    ///
    /// The devx service type asks for the capability; only the development
    /// environment may grant it. Any other environment is a deployment error.
    pub fn resolve(app_env: AppEnv, service_type: &ServiceType) -> Result<Self, AuthError> {
        if !service_type.is_devx() {
            return Ok(Self::Disabled);
        }

        if !app_env.is_development() {
            return Err(AuthError::InsecureConfiguration);
        }

        tracing::warn!("development auth bypass available (disable-verify / disable-aud / disable-exp)");
        Ok(Self::Enabled)
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }

    /// Relaxed options requested by the query string, if this policy allows any.
    pub fn relaxation(&self, query: Option<&str>) -> Option<VerificationOptions> {
        if !self.is_enabled() {
            return None;
        }

        let mut options = VerificationOptions::strict();
        for (key, _) in form_urlencoded::parse(query?.as_bytes()) {
            match &*key {
                DISABLE_VERIFY_FLAG => options.verify_signature = false,
                DISABLE_AUD_FLAG => options.verify_aud = false,
                DISABLE_EXP_FLAG => options.verify_exp = false,
                _ => {}
            }
        }

        if options.is_strict() {
            return None;
        }

        tracing::warn!(?options, "ENABLED INSECURE AUTH OPTIONS FOR DEBUGGING");
        Some(options)
    }
}

/// Shared-secret admission for the internal MCP component.
#[derive(Clone)]
pub struct InternalTokenBypass {
    secret: String,
}

impl InternalTokenBypass {
    /// `None` for an empty secret: an empty prefix would admit every token.
    pub fn new(secret: impl Into<String>) -> Option<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return None;
        }
        Some(Self { secret })
    }

    pub fn accepts(&self, token: &str) -> bool {
        token.starts_with(&self.secret)
    }

    pub fn identity(&self, client_id: Option<&str>) -> AuthenticatedIdentity {
        AuthenticatedIdentity::internal_client(client_id)
    }
}

impl std::fmt::Debug for InternalTokenBypass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print the shared secret
        f.debug_struct("InternalTokenBypass").finish_non_exhaustive()
    }
}
