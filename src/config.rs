//! Configuration loading.
//!
//! Configuration is a YAML file (`steward.yaml` by default) with
//! environment-variable expansion. Every section has serde defaults, so
//! an absent file yields a fully working configuration.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::fs;

use crate::session::CompactionSettings;
use crate::tasks::{RetryPolicy, WorkerCommand};

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Workspace directory for session data (default `.steward`).
    #[serde(default)]
    pub workspace: Option<PathBuf>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub codec: CodecConfig,
    #[serde(default)]
    pub compaction: CompactionConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub records: RecordsConfig,
    /// Command for the account-opening worker process. Absent means the
    /// open-account capability reports a configuration failure.
    #[serde(default)]
    pub account_worker: Option<WorkerConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("unclosed variable reference '${{' (missing '}}')")]
    UnclosedVarReference,
}

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// A missing file yields the default configuration.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        let expanded = expand_env_vars(&contents)?;
        Ok(serde_saphyr::from_str(&expanded)?)
    }

    /// Workspace directory, resolved relative to the config file.
    pub fn workspace_dir(&self, config_path: &Path) -> PathBuf {
        let workspace = self
            .workspace
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKSPACE));
        resolve_path(config_path, &workspace)
    }
}

/// Resolve a path relative to the config file directory.
///
/// Absolute paths are returned as-is; relative paths are joined with the
/// config file's parent directory so behavior does not depend on the
/// current working directory.
pub fn resolve_path(config_path: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }

    let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    config_dir.join(path)
}

/// Default workspace directory (relative to the config file).
pub const DEFAULT_WORKSPACE: &str = ".steward";

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_seconds: u64,
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_seconds: 300,
            max_connections: 1024,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub initial_interval_ms: u64,
    pub backoff_coefficient: f64,
    pub max_interval_ms: u64,
    pub max_elapsed_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 1000,
            backoff_coefficient: 2.0,
            max_interval_ms: 30_000,
            max_elapsed_ms: 300_000,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_interval: Duration::from_millis(self.initial_interval_ms),
            backoff_coefficient: self.backoff_coefficient,
            max_interval: Duration::from_millis(self.max_interval_ms),
            max_elapsed: Duration::from_millis(self.max_elapsed_ms),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Serialized size above which values are claim-checked.
    pub threshold_bytes: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            threshold_bytes: crate::codec::DEFAULT_THRESHOLD_BYTES,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    pub enabled: bool,
    pub event_threshold: u64,
    pub archive: bool,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        let defaults = CompactionSettings::default();
        Self {
            enabled: defaults.enabled,
            event_threshold: defaults.event_threshold,
            archive: defaults.archive,
        }
    }
}

impl CompactionConfig {
    pub fn to_settings(&self) -> CompactionSettings {
        CompactionSettings {
            enabled: self.enabled,
            event_threshold: self.event_threshold,
            archive: self.archive,
        }
    }
}

/// Which admission classifier implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMode {
    Keyword,
    Http,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub mode: GateMode,
    /// Classifier endpoint, required in `http` mode.
    pub endpoint: Option<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            mode: GateMode::Keyword,
            endpoint: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Handoff depth cap per turn.
    pub max_handoff_depth: u32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            max_handoff_depth: 5,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RecordsConfig {
    /// Record document path (default `{workspace}/records.json`).
    pub path: Option<PathBuf>,
    /// Seed the demo book of business on first start.
    pub seed_demo: bool,
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            path: None,
            seed_demo: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl WorkerConfig {
    pub fn to_command(&self) -> WorkerCommand {
        WorkerCommand {
            command: self.command.clone(),
            args: self.args.clone(),
        }
    }
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports `${VAR}` (required), `${VAR:-default}` (optional with
/// default), and `$$` as an escaped `$`. No nested expansion.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        match chars.peek() {
            Some('$') => {
                let _ = chars.next();
                result.push('$');
            }
            Some('{') => {
                let _ = chars.next();
                let mut reference = String::new();
                let mut closed = false;
                for r in chars.by_ref() {
                    if r == '}' {
                        closed = true;
                        break;
                    }
                    reference.push(r);
                }
                if !closed {
                    return Err(ConfigError::UnclosedVarReference);
                }

                let (name, default) = match reference.split_once(":-") {
                    Some((name, default)) => (name, Some(default)),
                    None => (reference.as_str(), None),
                };

                match std::env::var(name) {
                    Ok(value) => result.push_str(&value),
                    Err(_) => match default {
                        Some(d) => result.push_str(d),
                        None => return Err(ConfigError::MissingEnvVar(name.to_string())),
                    },
                }
            }
            _ => result.push('$'),
        }
    }

    Ok(result)
}
