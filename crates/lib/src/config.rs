//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.qinglong-bot/config.json`) and environment.
//! Every credential can be overridden by an environment variable; env wins over the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::qinglong::{Credentials, QingLongError};

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway (relay endpoint) settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// QingLong open API credentials.
    #[serde(default)]
    pub qinglong: QingLongConfig,

    /// DingTalk robot credentials.
    #[serde(default)]
    pub dingtalk: DingTalkConfig,
}

/// Gateway bind, port, and relay secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 15152).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Shared secret the stream relay must send in `x-relay-secret`. Overridden by QLBOT_RELAY_SECRET env.
    #[serde(default)]
    pub relay_secret: Option<String>,
}

fn default_gateway_port() -> u16 {
    15152
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            relay_secret: None,
        }
    }
}

/// QingLong panel URL and open-API application credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QingLongConfig {
    /// Panel base URL, e.g. `http://127.0.0.1:5700`. Overridden by QINGLONG_URL.
    pub url: Option<String>,
    /// Overridden by QINGLONG_CLIENT_ID.
    pub client_id: Option<String>,
    /// Overridden by QINGLONG_CLIENT_SECRET.
    pub client_secret: Option<String>,
}

/// DingTalk robot application credentials (stream mode).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DingTalkConfig {
    /// AppKey. Overridden by DINGTALK_CLIENT_ID.
    pub client_id: Option<String>,
    /// AppSecret. Overridden by DINGTALK_CLIENT_SECRET.
    pub client_secret: Option<String>,
    /// OpenAPI base URL (default `https://api.dingtalk.com`).
    pub api_base: Option<String>,
}

/// Resolved DingTalk robot credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DingTalkCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Pick the env value when set and non-empty, else the trimmed config value.
fn env_or_config(
    lookup: &impl Fn(&str) -> Option<String>,
    env_key: &str,
    configured: Option<&String>,
) -> Option<String> {
    lookup(env_key)
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            configured
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Resolve QingLong credentials from env and config. Any missing field is an initialization error.
pub fn resolve_qinglong_credentials(config: &Config) -> Result<Credentials, QingLongError> {
    resolve_qinglong_credentials_with(config, process_env)
}

pub fn resolve_qinglong_credentials_with(
    config: &Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Credentials, QingLongError> {
    let q = &config.qinglong;
    let base_url = env_or_config(&lookup, "QINGLONG_URL", q.url.as_ref());
    let client_id = env_or_config(&lookup, "QINGLONG_CLIENT_ID", q.client_id.as_ref());
    let client_secret = env_or_config(&lookup, "QINGLONG_CLIENT_SECRET", q.client_secret.as_ref());
    match (base_url, client_id, client_secret) {
        (Some(base_url), Some(client_id), Some(client_secret)) => {
            Ok(Credentials::new(base_url, client_id, client_secret))
        }
        _ => Err(QingLongError::Initialization),
    }
}

/// Resolve DingTalk robot credentials. `None` when either field is missing (robot registration is skipped).
pub fn resolve_dingtalk_credentials(config: &Config) -> Option<DingTalkCredentials> {
    resolve_dingtalk_credentials_with(config, process_env)
}

pub fn resolve_dingtalk_credentials_with(
    config: &Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Option<DingTalkCredentials> {
    let d = &config.dingtalk;
    let client_id = env_or_config(&lookup, "DINGTALK_CLIENT_ID", d.client_id.as_ref())?;
    let client_secret = env_or_config(&lookup, "DINGTALK_CLIENT_SECRET", d.client_secret.as_ref())?;
    Some(DingTalkCredentials {
        client_id,
        client_secret,
    })
}

/// Resolve the relay secret: env QLBOT_RELAY_SECRET overrides config.
pub fn resolve_relay_secret(config: &Config) -> Option<String> {
    env_or_config(
        &process_env,
        "QLBOT_RELAY_SECRET",
        config.gateway.relay_secret.as_ref(),
    )
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("QLBOT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".qinglong-bot").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, QLBOT_CONFIG_PATH, or the default. Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
