/*
 * Responsibility
 * - 環境変数や設定の読み込み (ENVIRONMENT, service type, extensions, MCP 設定など)
 * - 設定値のバリデーション (不足なら起動失敗、development では警告のみ)
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use serde::Deserialize;

/// Service type value that marks the internal development workspace.
pub const DEVX_SERVICE_TYPE: &str = "devx";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    /// Only the exact value `development` counts as development.
    /// Anything else is treated as production so insecure paths stay closed.
    pub fn parse(value: Option<&str>) -> Self {
        match value.unwrap_or("development") {
            "development" => Self::Development,
            _ => Self::Production,
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceType {
    Devx,
    Other(String),
}

impl ServiceType {
    pub fn parse(value: Option<&str>) -> Self {
        match value.unwrap_or_default() {
            DEVX_SERVICE_TYPE => Self::Devx,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_devx(&self) -> bool {
        matches!(self, Self::Devx)
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Other(s) if s.is_empty())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
    Extension { name: String, reason: String },
    Issues(Vec<String>),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
            ConfigError::Extension { name, reason } => {
                write!(f, "invalid extension '{}': {}", name, reason)
            }
            ConfigError::Issues(issues) => write!(f, "{}", issues.join("\n")),
        }
    }
}

impl std::error::Error for ConfigError {}

/// One entry of the `DATABUTTON_EXTENSIONS` list.
///
/// `name` stays a plain string so unknown extension kinds still parse.
#[derive(Debug, Clone, Deserialize)]
pub struct Extension {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

pub fn parse_extensions(raw: &str) -> Result<Vec<Extension>, ConfigError> {
    if raw.trim().is_empty() {
        tracing::info!("no extensions configured");
        return Ok(Vec::new());
    }

    let extensions: Vec<Extension> = serde_json::from_str(raw)
        .map_err(|_| ConfigError::Invalid("DATABUTTON_EXTENSIONS"))?;

    let names: Vec<&str> = extensions.iter().map(|e| e.name.as_str()).collect();
    tracing::info!(?names, "found extensions");

    Ok(extensions)
}

pub struct Config {
    pub addr: SocketAddr,

    pub app_env: AppEnv,
    pub project_id: String,
    pub service_type: ServiceType,
    pub extensions: Vec<Extension>,

    pub devx_url_internal: Option<String>,

    pub enable_mcp: bool,
    pub internal_mcp_token: String,

    pub auth_leeway_seconds: u64,
    pub jwks_fetch_timeout_seconds: u64,
    pub jwks_cache_ttl_seconds: u64,

    pub request_timeout_seconds: u64,
    pub body_limit_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup (the process environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port: u16 = lookup("PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::parse(lookup("ENVIRONMENT").as_deref());
        let service_type = ServiceType::parse(lookup("DATABUTTON_SERVICE_TYPE").as_deref());
        let project_id = lookup("DATABUTTON_PROJECT_ID").unwrap_or_default();

        let extensions = parse_extensions(&lookup("DATABUTTON_EXTENSIONS").unwrap_or_default())?;

        let devx_api_port = lookup("DEVX_API_PORT").filter(|s| !s.is_empty());
        let devx_url_internal = lookup("DEVX_URL_INTERNAL")
            .filter(|s| !s.is_empty())
            .or_else(|| devx_api_port.map(|port| format!("http://localhost:{}", port)));

        let enable_mcp = lookup("ENABLE_MCP")
            .map(|v| parse_bool(&v).ok_or(ConfigError::Invalid("ENABLE_MCP")))
            .transpose()?
            .unwrap_or(false);

        let internal_mcp_token = lookup("INTERNAL_MCP_TOKEN").unwrap_or_default();
        if enable_mcp && internal_mcp_token.is_empty() {
            // An empty prefix would match every bearer token.
            return Err(ConfigError::Missing("INTERNAL_MCP_TOKEN"));
        }

        let auth_leeway_seconds = lookup("AUTH_LEEWAY_SECONDS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);

        let jwks_fetch_timeout_seconds = lookup("JWKS_FETCH_TIMEOUT_SECONDS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(5);

        let jwks_cache_ttl_seconds = lookup("JWKS_CACHE_TTL_SECONDS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(300);

        let request_timeout_seconds = lookup("REQUEST_TIMEOUT_SECONDS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(30);

        let body_limit_bytes = lookup("BODY_LIMIT_BYTES")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(1024 * 1024);

        Ok(Self {
            addr,
            app_env,
            project_id,
            service_type,
            extensions,
            devx_url_internal,
            enable_mcp,
            internal_mcp_token,
            auth_leeway_seconds,
            jwks_fetch_timeout_seconds,
            jwks_cache_ttl_seconds,
            request_timeout_seconds,
            body_limit_bytes,
        })
    }

    /// Startup checks. Development only warns; every other environment fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut issues = Vec::new();

        if self.project_id.is_empty() {
            issues.push("missing DATABUTTON_PROJECT_ID".to_string());
        }
        if self.service_type.is_unset() {
            issues.push("missing DATABUTTON_SERVICE_TYPE".to_string());
        }
        if self.service_type.is_devx() && self.devx_url_internal.is_none() {
            issues.push("missing DEVX_URL_INTERNAL".to_string());
        }

        if issues.is_empty() {
            return Ok(());
        }

        if self.app_env.is_development() {
            for issue in &issues {
                tracing::warn!(issue = %issue, "configuration issue");
            }
            Ok(())
        } else {
            Err(ConfigError::Issues(issues))
        }
    }

    /// Extensions with the given name. Duplicates are reported and the first wins.
    pub fn extension(&self, name: &str) -> Option<&Extension> {
        let mut matches = self.extensions.iter().filter(|e| e.name == name);
        let first = matches.next()?;
        if matches.next().is_some() {
            tracing::warn!(extension = %name, "duplicate extension configured, using the first");
        }
        Some(first)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
