//! On-disk and environment configuration for restcache.
//!
//! A TOML file with `[api]`, `[gc]` and `[orchestrator]` tables, merged
//! over defaults and overridden by `RESTCACHE_*` environment variables
//! (`RESTCACHE_API__BASE_URL`, `RESTCACHE_GC__ENABLED`, ...), then
//! translated into `restcache_core::OrchestratorConfig` and
//! `restcache_api::TransportConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use restcache_api::{TlsMode, TransportConfig};
use restcache_core::{GcConfig, OrchestratorConfig};

const ENV_PREFIX: &str = "RESTCACHE_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("API token variable '{env}' is not set and no plaintext token is configured")]
    MissingToken { env: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiSection,

    #[serde(default)]
    pub gc: GcSection,

    #[serde(default)]
    pub orchestrator: OrchestratorSection,
}

/// `[api]`: where and how to reach the backing REST API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ApiSection {
    /// API root, e.g. `https://api.example.com/v1`.
    pub base_url: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Accept invalid TLS certificates.
    #[serde(default)]
    pub insecure: bool,

    /// Path to a custom CA certificate (PEM).
    pub ca_cert: Option<PathBuf>,

    /// Bearer token (plaintext, prefer `token_env`).
    pub token: Option<String>,

    /// Environment variable name holding the bearer token.
    pub token_env: Option<String>,

    pub user_agent: Option<String>,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: default_timeout(),
            insecure: false,
            ca_cert: None,
            token: None,
            token_env: None,
            user_agent: None,
        }
    }
}

/// `[gc]`: stale-collection sweep schedule, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GcSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,

    #[serde(default = "default_period")]
    pub period_secs: u64,
}

impl Default for GcSection {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_secs: default_initial_delay(),
            period_secs: default_period(),
        }
    }
}

/// `[orchestrator]`: worker tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OrchestratorSection {
    #[serde(default = "default_channel_size")]
    pub intent_channel_size: usize,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            intent_channel_size: default_channel_size(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_initial_delay() -> u64 {
    10 * 60
}
fn default_period() -> u64 {
    5 * 60
}
fn default_channel_size() -> usize {
    64
}

// ── Translation ─────────────────────────────────────────────────────

impl Config {
    /// Validate and translate into the orchestrator's runtime config.
    pub fn to_orchestrator_config(&self) -> Result<OrchestratorConfig, ConfigError> {
        if self.orchestrator.intent_channel_size == 0 {
            return Err(invalid("orchestrator.intent_channel_size", "must be at least 1"));
        }
        if self.gc.enabled && self.gc.period_secs == 0 {
            return Err(invalid("gc.period_secs", "must be positive when gc is enabled"));
        }

        Ok(OrchestratorConfig {
            intent_channel_size: self.orchestrator.intent_channel_size,
            gc: GcConfig {
                enabled: self.gc.enabled,
                initial_delay: Duration::from_secs(self.gc.initial_delay_secs),
                period: Duration::from_secs(self.gc.period_secs),
            },
        })
    }

    /// Validate and translate into the HTTP transport config, resolving
    /// the bearer token from the process environment.
    pub fn to_transport_config(&self) -> Result<TransportConfig, ConfigError> {
        self.to_transport_config_with(|name| std::env::var(name).ok())
    }

    /// Like [`to_transport_config`](Self::to_transport_config), with an
    /// explicit environment lookup.
    pub fn to_transport_config_with<F>(&self, lookup: F) -> Result<TransportConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api = &self.api;
        let raw = api
            .base_url
            .as_deref()
            .ok_or_else(|| invalid("api.base_url", "not configured"))?;
        let base_url: url::Url = raw
            .parse()
            .map_err(|e| invalid("api.base_url", format!("{raw}: {e}")))?;
        if api.timeout == 0 {
            return Err(invalid("api.timeout", "must be positive"));
        }

        let tls = if api.insecure {
            TlsMode::DangerAcceptInvalid
        } else if let Some(ref ca_path) = api.ca_cert {
            TlsMode::CustomCa(ca_path.clone())
        } else {
            TlsMode::System
        };

        let mut config = TransportConfig::new(base_url);
        config.tls = tls;
        config.timeout = Duration::from_secs(api.timeout);
        config.bearer_token = resolve_token(api, lookup)?;
        if let Some(ref agent) = api.user_agent {
            config.user_agent.clone_from(agent);
        }
        Ok(config)
    }
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the bearer token: the `token_env` variable first, then the
/// plaintext `token`.
///
/// Naming a variable that is unset, with no plaintext fallback, is an
/// error. Configuring neither means the API needs no token.
pub fn resolve_token<F>(api: &ApiSection, lookup: F) -> Result<Option<SecretString>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(ref env_name) = api.token_env {
        if let Some(value) = lookup(env_name) {
            return Ok(Some(SecretString::from(value)));
        }
    }

    if let Some(ref token) = api.token {
        return Ok(Some(SecretString::from(token.clone())));
    }

    match api.token_env {
        Some(ref env) => Err(ConfigError::MissingToken { env: env.clone() }),
        None => Ok(None),
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "restcache", "restcache").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("restcache");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from defaults, then `path` (if it exists), then `RESTCACHE_*`
/// environment variables, with `__` separating nested keys.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`, creating parent
/// directories as needed.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Serialize config to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_match_runtime_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.to_orchestrator_config().unwrap(), OrchestratorConfig::default());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.gc, GcSection::default());
        assert_eq!(cfg.orchestrator.intent_channel_size, 64);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[api]
base_url = "https://books.example.com/v1"
timeout = 5
token = "plain"

[gc]
initial_delay_secs = 60
period_secs = 30

[orchestrator]
intent_channel_size = 8
"#,
        )
        .unwrap();

        let cfg = load_config_from(&path).unwrap();
        let orch = cfg.to_orchestrator_config().unwrap();
        assert_eq!(orch.intent_channel_size, 8);
        assert_eq!(orch.gc.initial_delay, Duration::from_secs(60));
        assert_eq!(orch.gc.period, Duration::from_secs(30));
        assert!(orch.gc.enabled);

        let transport = cfg.to_transport_config_with(no_env).unwrap();
        assert_eq!(transport.base_url.as_str(), "https://books.example.com/v1");
        assert_eq!(transport.timeout, Duration::from_secs(5));
        assert_eq!(transport.tls, TlsMode::System);
        assert_eq!(transport.bearer_token.unwrap().expose_secret(), "plain");
    }

    #[test]
    fn save_then_load_preserves_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.api.base_url = Some("http://localhost:8080".into());
        cfg.api.insecure = true;
        cfg.gc.enabled = false;

        save_config_to(&cfg, &path).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), cfg);
    }

    #[test]
    fn token_env_wins_over_plaintext() {
        let api = ApiSection {
            token: Some("plain".into()),
            token_env: Some("BOOKS_TOKEN".into()),
            ..ApiSection::default()
        };
        let token = resolve_token(&api, |name| (name == "BOOKS_TOKEN").then(|| "from-env".into()))
            .unwrap()
            .unwrap();
        assert_eq!(token.expose_secret(), "from-env");

        let token = resolve_token(&api, no_env).unwrap().unwrap();
        assert_eq!(token.expose_secret(), "plain");
    }

    #[test]
    fn unset_token_env_without_fallback_is_an_error() {
        let api = ApiSection {
            token_env: Some("BOOKS_TOKEN".into()),
            ..ApiSection::default()
        };
        assert!(matches!(
            resolve_token(&api, no_env),
            Err(ConfigError::MissingToken { env }) if env == "BOOKS_TOKEN"
        ));
        assert!(resolve_token(&ApiSection::default(), no_env).unwrap().is_none());
    }

    #[test]
    fn transport_requires_valid_base_url() {
        let cfg = Config::default();
        assert!(matches!(
            cfg.to_transport_config_with(no_env),
            Err(ConfigError::Validation { field, .. }) if field == "api.base_url"
        ));

        let mut cfg = Config::default();
        cfg.api.base_url = Some("not a url".into());
        assert!(cfg.to_transport_config_with(no_env).is_err());
    }

    #[test]
    fn insecure_and_ca_cert_select_tls_mode() {
        let mut cfg = Config::default();
        cfg.api.base_url = Some("https://books.example.com".into());
        cfg.api.ca_cert = Some(PathBuf::from("/etc/ca.pem"));
        assert_eq!(
            cfg.to_transport_config_with(no_env).unwrap().tls,
            TlsMode::CustomCa(PathBuf::from("/etc/ca.pem"))
        );

        cfg.api.insecure = true;
        assert_eq!(
            cfg.to_transport_config_with(no_env).unwrap().tls,
            TlsMode::DangerAcceptInvalid
        );
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let mut cfg = Config::default();
        cfg.orchestrator.intent_channel_size = 0;
        assert!(cfg.to_orchestrator_config().is_err());

        let mut cfg = Config::default();
        cfg.gc.period_secs = 0;
        assert!(cfg.to_orchestrator_config().is_err());
        cfg.gc.enabled = false;
        assert!(cfg.to_orchestrator_config().is_ok());
    }
}
