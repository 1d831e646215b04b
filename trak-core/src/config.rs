//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/trak/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/trak/` (~/.config/trak/)
//! - State/Logs: `$XDG_STATE_HOME/trak/` (~/.local/state/trak/)
//!
//! Per-project session state lives next to the code in `<project>/.trak/`.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Name of the per-project state directory.
pub const STATE_DIR_NAME: &str = ".trak";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// LLM configuration for analysis and summaries (optional)
    #[serde(default)]
    pub llm: Option<LlmConfig>,

    /// File watcher configuration
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Organization reporting configuration (optional)
    #[serde(default)]
    pub org: OrgConfig,
}

/// LLM provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Provider type
    pub provider: LlmProvider,
    /// Model to use
    pub model: String,
    /// API endpoint (optional, uses default for provider)
    pub endpoint: Option<String>,
    /// API key (can also use env var)
    pub api_key: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_timeout() -> u64 {
    60
}

/// Supported LLM providers
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Ollama,
    Claude,
    OpenAI,
}

impl LlmProvider {
    /// Returns the default endpoint for this provider
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            LlmProvider::Ollama => "http://localhost:11434",
            LlmProvider::Claude => "https://api.anthropic.com",
            LlmProvider::OpenAI => "https://api.openai.com",
        }
    }
}

/// File watcher configuration
#[derive(Debug, Deserialize, Clone)]
pub struct WatcherConfig {
    /// File extensions to track (without the dot). Empty means everything.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Glob patterns, relative to the watched root, that are never tracked
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    /// Quiet period a file must stay unchanged before its event is emitted
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            exclude: default_exclude(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    ["ts", "js", "tsx", "jsx", "py", "go", "rs", "md"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_exclude() -> Vec<String> {
    [
        "**/node_modules/**",
        "**/dist/**",
        "**/build/**",
        "**/target/**",
        "**/.git/**",
        "**/.trak/**",
        "**/*.test.*",
        "**/fixtures/**",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_debounce_ms() -> u64 {
    300
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Organization reporting configuration
///
/// When enabled, a summary of every stopped session is posted to
/// `{endpoint}/api/sessions`.
#[derive(Debug, Deserialize, Clone)]
pub struct OrgConfig {
    /// Enable/disable org reporting
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of the org server
    pub endpoint: Option<String>,

    /// Bearer token issued by the organization
    pub token: Option<String>,

    /// Developer identifier (email or username)
    pub developer_id: Option<String>,

    /// Developer display name
    pub developer_name: Option<String>,

    /// Per-attempt HTTP timeout in seconds
    #[serde(default = "default_org_timeout")]
    pub timeout_secs: u64,

    /// Total delivery attempts
    #[serde(default = "default_org_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles after each failure
    #[serde(default = "default_org_initial_backoff")]
    pub initial_backoff_ms: u64,
}

impl Default for OrgConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            token: None,
            developer_id: None,
            developer_name: None,
            timeout_secs: default_org_timeout(),
            max_attempts: default_org_max_attempts(),
            initial_backoff_ms: default_org_initial_backoff(),
        }
    }
}

impl OrgConfig {
    /// Check if org reporting is properly configured and enabled
    pub fn is_ready(&self) -> bool {
        self.enabled
            && self.endpoint.is_some()
            && self.token.is_some()
            && self.developer_id.is_some()
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.endpoint.is_none() {
            return Err(Error::Config(
                "org.endpoint is required when org reporting is enabled".to_string(),
            ));
        }
        if self.token.is_none() {
            return Err(Error::Config(
                "org.token is required when org reporting is enabled".to_string(),
            ));
        }
        if self.developer_id.is_none() {
            return Err(Error::Config(
                "org.developer_id is required when org reporting is enabled".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config(
                "org.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply `TRAK_ORG_ENDPOINT` / `TRAK_ORG_TOKEN` overrides.
    fn apply_env(&mut self) {
        if let Ok(endpoint) = std::env::var("TRAK_ORG_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.endpoint = Some(endpoint);
            }
        }
        if let Ok(token) = std::env::var("TRAK_ORG_TOKEN") {
            if !token.trim().is_empty() {
                self.token = Some(token);
            }
        }
    }
}

fn default_org_timeout() -> u64 {
    10
}

fn default_org_max_attempts() -> u32 {
    3
}

fn default_org_initial_backoff() -> u64 {
    1000
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Config::default()
        };

        config.org.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Resolve the LLM backend, if any.
    ///
    /// An explicit `[llm]` section wins. Without one, an `OPENAI_API_KEY` in
    /// the environment selects OpenAI with `gpt-4o-mini`.
    pub fn llm_settings(&self) -> Option<LlmConfig> {
        if let Some(llm) = &self.llm {
            return Some(llm.clone());
        }

        match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Some(LlmConfig {
                provider: LlmProvider::OpenAI,
                model: "gpt-4o-mini".to_string(),
                endpoint: None,
                api_key: Some(key),
                timeout_secs: default_llm_timeout(),
            }),
            _ => None,
        }
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/trak/config.toml` (~/.config/trak/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("trak").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/trak/` (~/.local/state/trak/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("trak")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/trak/trak.log` (~/.local/state/trak/trak.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("trak.log")
    }

    /// Returns the per-project state directory for a working directory
    pub fn project_state_dir(working_dir: &Path) -> PathBuf {
        working_dir.join(STATE_DIR_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.llm.is_none());
        assert_eq!(config.watcher.debounce_ms, 300);
        assert!(config.watcher.extensions.contains(&"ts".to_string()));
        assert!(config
            .watcher
            .exclude
            .iter()
            .any(|p| p.contains("node_modules")));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[llm]
provider = "ollama"
model = "llama3.2"

[watcher]
extensions = ["rs"]
debounce_ms = 50

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        let llm = config.llm.unwrap();
        assert_eq!(llm.provider, LlmProvider::Ollama);
        assert_eq!(llm.model, "llama3.2");
        assert_eq!(llm.timeout_secs, 60);
        assert_eq!(config.watcher.extensions, vec!["rs".to_string()]);
        assert_eq!(config.watcher.debounce_ms, 50);
        // Unspecified watcher fields keep their defaults
        assert!(!config.watcher.exclude.is_empty());
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_llm_provider_endpoints() {
        assert_eq!(
            LlmProvider::Ollama.default_endpoint(),
            "http://localhost:11434"
        );
        assert_eq!(
            LlmProvider::Claude.default_endpoint(),
            "https://api.anthropic.com"
        );
    }

    #[test]
    fn test_org_config_defaults() {
        let config = OrgConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_backoff_ms, 1000);
        assert!(!config.is_ready());
    }

    #[test]
    fn test_org_config_validation() {
        // Disabled config is always valid
        let config = OrgConfig::default();
        assert!(config.validate().is_ok());

        // Enabled without credentials should fail
        let config = OrgConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = OrgConfig {
            enabled: true,
            endpoint: Some("https://org.example.com".to_string()),
            token: Some("org_token_123".to_string()),
            developer_id: Some("dev@example.com".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.is_ready());

        let config = OrgConfig {
            max_attempts: 0,
            ..config
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_org_config() {
        let toml = r#"
[org]
enabled = true
endpoint = "https://org.example.com"
token = "org_token_123"
developer_id = "dev@example.com"
developer_name = "Dev"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.org.enabled);
        assert_eq!(
            config.org.endpoint.as_deref(),
            Some("https://org.example.com")
        );
        assert_eq!(config.org.max_attempts, 3);
        assert!(config.org.is_ready());
    }

    #[test]
    fn test_project_state_dir() {
        let dir = Config::project_state_dir(Path::new("/work/project"));
        assert_eq!(dir, PathBuf::from("/work/project/.trak"));
    }
}
