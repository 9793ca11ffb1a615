//! Bridge configuration loading and validation.
//!
//! Sources, later ones winning:
//! 1. Built-in defaults.
//! 2. An optional YAML file named by `MCP_BRIDGE_CONFIG`, after `${VAR}` and
//!    `${VAR:-default}` interpolation.
//! 3. Environment overrides (`PORT`, `HOST`, `MCP_COMMAND`, ...).
//!
//! The CRM access credential is only ever read from the environment.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Env var naming the optional YAML config file.
pub const CONFIG_PATH_VAR: &str = "MCP_BRIDGE_CONFIG";

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {reason}")]
    Parse { reason: String },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

// ─── Public Types ────────────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub server: ServerSettings,
    pub process: ProcessConfig,
    pub timeouts: TimeoutConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    /// Platform-assigned via `PORT` in hosted environments.
    pub port: u16,
    /// How long in-flight requests may drain after a shutdown signal before
    /// the process force-exits with status 1.
    pub shutdown_grace_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            shutdown_grace_ms: 10_000,
        }
    }
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// How to launch the MCP server child process.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Extra environment for the child.
    pub env: HashMap<String, String>,
    pub cwd: Option<String>,
    /// Env vars checked, in order, for the CRM access credential.
    pub credential_vars: Vec<String>,
    /// Name under which the credential is handed to the child.
    pub child_credential_var: String,
    /// Spawn the child at boot instead of on the first call.
    pub eager_start: bool,
    #[serde(skip)]
    pub access_token: Option<AccessToken>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            command: default_npx_command().to_string(),
            args: vec!["-y".to_string(), "@hubspot/mcp-server".to_string()],
            env: HashMap::new(),
            cwd: None,
            credential_vars: vec![
                "PRIVATE_APP_ACCESS_TOKEN".to_string(),
                "HUBSPOT_ACCESS_TOKEN".to_string(),
            ],
            child_credential_var: "PRIVATE_APP_ACCESS_TOKEN".to_string(),
            eager_start: true,
            access_token: None,
        }
    }
}

impl ProcessConfig {
    /// A config that runs `command` with `args` and nothing else.
    pub fn for_command(command: &str, args: &[&str]) -> Self {
        Self {
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            eager_start: false,
            ..Self::default()
        }
    }

    /// The command line, for logs.
    pub fn display_command(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn has_credential(&self) -> bool {
        self.access_token.is_some()
    }
}

/// Platform-correct npx command.
fn default_npx_command() -> &'static str {
    if cfg!(target_os = "windows") {
        "npx.cmd"
    } else {
        "npx"
    }
}

/// Credential value that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Timer settings for the child process and the correlator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Delay between spawning the child and sending `initialize`.
    pub handshake_delay_ms: u64,
    pub request_timeout_ms: u64,
    pub ready_poll_interval_ms: u64,
    pub ready_poll_attempts: u32,
    /// How long the child gets to exit after stdin closes before it is killed.
    pub shutdown_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            handshake_delay_ms: 1_000,
            request_timeout_ms: 30_000,
            ready_poll_interval_ms: 100,
            ready_poll_attempts: 100,
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl TimeoutConfig {
    pub fn handshake_delay(&self) -> Duration {
        Duration::from_millis(self.handshake_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry lifetime; 0 disables caching.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::Invalid {
                reason: format!("unknown log format '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence when set.
    pub filter: String,
    pub format: LogFormat,
    /// Write logs to this file (rotated on startup) instead of stdout.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "crm_mcp_bridge=info,tower_http=info,warn".to_string(),
            format: LogFormat::Text,
            file: None,
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

impl BridgeConfig {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|name| std::env::var(name).ok())
    }

    /// Load configuration using `lookup` to read environment variables.
    pub fn load_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(CONFIG_PATH_VAR).filter(|p| !p.trim().is_empty()) {
            Some(path) => {
                let path = PathBuf::from(expand_home(&path));
                load_config_file(&path, &lookup)?
            }
            None => BridgeConfig::default(),
        };

        config.apply_env_overrides(&lookup)?;
        config.process.access_token = resolve_credential(&config.process.credential_vars, &lookup);
        config.validate()?;
        Ok(config)
    }

    /// Apply the well-known environment overrides.
    pub fn apply_env_overrides<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(host) = var("HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("PORT") {
            self.server.port = parse_number("PORT", &port)?;
        }
        if let Some(command) = var("MCP_COMMAND") {
            self.process.command = command;
        }
        if let Some(args) = var("MCP_ARGS") {
            self.process.args = args.split_whitespace().map(String::from).collect();
        }
        if let Some(timeout) = var("MCP_REQUEST_TIMEOUT_MS") {
            self.timeouts.request_timeout_ms = parse_number("MCP_REQUEST_TIMEOUT_MS", &timeout)?;
        }
        if let Some(format) = var("LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }
        if let Some(file) = var("LOG_FILE") {
            self.logging.file = Some(expand_home(&file));
        }
        Ok(())
    }

    /// Reject configurations the bridge cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.process.command.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: "process.command must not be empty".into(),
            });
        }
        if self.process.child_credential_var.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: "process.child_credential_var must not be empty".into(),
            });
        }
        if self.timeouts.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "timeouts.request_timeout_ms must be greater than 0".into(),
            });
        }
        if self.timeouts.ready_poll_interval_ms == 0 || self.timeouts.ready_poll_attempts == 0 {
            return Err(ConfigError::Invalid {
                reason: "readiness polling needs a non-zero interval and attempt count".into(),
            });
        }
        Ok(())
    }
}

/// Read and parse a YAML config file.
fn load_config_file<F>(path: &Path, lookup: &F) -> Result<BridgeConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let interpolated = interpolate_env_vars(&raw, lookup);

    serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
        reason: e.to_string(),
    })
}

/// First non-empty value among `vars`.
fn resolve_credential<F>(vars: &[String], lookup: &F) -> Option<AccessToken>
where
    F: Fn(&str) -> Option<String>,
{
    vars.iter()
        .filter_map(|name| lookup(name))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
        .map(AccessToken::new)
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        reason: format!("{name} must be a number, got '{value}'"),
    })
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Substitute `${VAR}` and `${VAR:-fallback}` references.
///
/// As in the shell, the fallback also applies when `VAR` is set but empty.
/// An unterminated `${` is copied through as-is.
fn interpolate_env_vars<F>(input: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let reference = &rest[start + 2..];
        let Some(end) = reference.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        out.push_str(&substitute(&reference[..end], lookup));
        rest = &reference[end + 1..];
    }

    out.push_str(rest);
    out
}

fn substitute<F>(reference: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    match reference.split_once(":-") {
        Some((name, fallback)) => lookup(name.trim())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| expand_home(fallback)),
        None => lookup(reference.trim()).unwrap_or_default(),
    }
}

/// Expand `~` and `~/...` to the home directory. `~user` is left alone.
fn expand_home(path: &str) -> String {
    let Some(rest) = path.strip_prefix('~') else {
        return path.to_string();
    };
    if !(rest.is_empty() || rest.starts_with('/') || rest.starts_with(std::path::MAIN_SEPARATOR)) {
        return path.to_string();
    }
    match dirs::home_dir() {
        Some(home) => format!("{}{rest}", home.display()),
        None => path.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
