//! Factory: build the process-wide `Authorizer` from application `Config`.
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::config::Config;
use crate::services::auth::{
    Authorizer, DevelopmentBypassPolicy, HttpKeySetFetcher, InternalTokenBypass,
    SigningKeyResolver, TokenValidator, TracingAuditSink, TrustDomainRegistry,
};

pub fn build_authorizer(config: &Config) -> Result<Arc<Authorizer>> {
    // Fails startup when the development bypass would be reachable outside development.
    let dev_bypass = DevelopmentBypassPolicy::resolve(config.app_env, &config.service_type)?;

    let registry = TrustDomainRegistry::from_config(config)?;
    if registry.is_empty() {
        tracing::warn!("no auth extensions configured, endpoints are not authenticated");
    }

    let fetcher = HttpKeySetFetcher::new(Duration::from_secs(config.jwks_fetch_timeout_seconds))?;
    let resolver = SigningKeyResolver::new(
        Arc::new(fetcher),
        Duration::from_secs(config.jwks_cache_ttl_seconds),
    );
    let validator = TokenValidator::new(Arc::new(resolver), config.auth_leeway_seconds);

    let internal_bypass = if config.enable_mcp {
        InternalTokenBypass::new(config.internal_mcp_token.clone())
    } else {
        None
    };

    let authorizer = Authorizer::new(registry, validator)
        .with_development_bypass(dev_bypass)
        .with_internal_bypass(internal_bypass)
        .with_audit_sink(Arc::new(TracingAuditSink));

    Ok(Arc::new(authorizer))
}
