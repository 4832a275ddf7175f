//! Configuration management for agentloop
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::agent::SessionBudget;
use crate::error::{AgentLoopError, Result};
use crate::tools::ToolKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for agentloop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Completion service configuration
    pub provider: ProviderConfig,
    /// Agent loop configuration
    #[serde(default)]
    pub agent: AgentConfig,
}

/// Provider configuration
///
/// Specifies which completion service to use and its settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Type of provider to use (gemini, ollama)
    #[serde(rename = "type")]
    pub provider_type: String,

    /// Google Gemini configuration
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Ollama configuration
    #[serde(default)]
    pub ollama: OllamaConfig,
}

/// Google Gemini provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Model to use
    #[serde(default = "default_gemini_model")]
    pub model: String,

    /// API base URL (overridable for tests and proxies)
    #[serde(default = "default_gemini_api_base")]
    pub api_base: String,

    /// API key; takes precedence over `api_key_env`
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(default = "default_gemini_api_key_env")]
    pub api_key_env: String,

    /// HTTP request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_gemini_api_base() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_gemini_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: default_gemini_model(),
            api_base: default_gemini_api_base(),
            api_key: None,
            api_key_env: default_gemini_api_key_env(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl GeminiConfig {
    /// Resolves the API key from the config or the configured environment variable
    ///
    /// # Errors
    ///
    /// Returns `AgentLoopError::MissingCredentials` if neither source has a non-empty key
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.clone());
        }

        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(AgentLoopError::MissingCredentials(format!(
                "gemini (set {} or provider.gemini.api_key)",
                self.api_key_env
            ))
            .into()),
        }
    }
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Ollama server host
    #[serde(default = "default_ollama_host")]
    pub host: String,

    /// Model to use for Ollama
    #[serde(default = "default_ollama_model")]
    pub model: String,

    /// HTTP request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2:latest".to_string()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            model: default_ollama_model(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// Agent loop configuration
///
/// Budgets are unset by default: a session runs until the model answers in text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum model calls per task
    #[serde(default)]
    pub max_turns: Option<usize>,

    /// Wall-clock budget per task (seconds)
    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    /// Replaces the built-in system instruction
    #[serde(default)]
    pub system_instruction: Option<String>,

    /// Tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Terminal execution settings
    #[serde(default)]
    pub terminal: TerminalConfig,
}

impl AgentConfig {
    /// Session budget derived from `max_turns` and `timeout_seconds`
    pub fn session_budget(&self) -> SessionBudget {
        SessionBudget {
            max_turns: self.max_turns,
            timeout: self.timeout_seconds.map(Duration::from_secs),
        }
    }
}

/// Tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Tools registered for each session, in declaration order
    #[serde(default = "default_enabled_tools")]
    pub enabled: Vec<ToolKind>,

    /// Maximum tool output size entering the history (bytes)
    #[serde(default = "default_max_output")]
    pub max_output_size: usize,

    /// Maximum file size readFile will load (bytes)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Directory tools operate in; the process working directory when unset
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

fn default_enabled_tools() -> Vec<ToolKind> {
    ToolKind::ALL.to_vec()
}

fn default_max_output() -> usize {
    1_048_576 // 1 MB
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10 MB
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_tools(),
            max_output_size: default_max_output(),
            max_file_size: default_max_file_size(),
            working_dir: None,
        }
    }
}

impl ToolsConfig {
    /// The directory tools run in
    ///
    /// # Errors
    ///
    /// Returns an IO error if no directory is configured and the process
    /// working directory cannot be determined
    pub fn resolved_working_dir(&self) -> Result<PathBuf> {
        match &self.working_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(std::env::current_dir().map_err(AgentLoopError::Io)?),
        }
    }
}

/// Terminal execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Timeout for terminal commands (seconds)
    #[serde(default = "default_command_timeout")]
    pub timeout_seconds: u64,

    /// Skip the dangerous-command denylist
    #[serde(default)]
    pub allow_dangerous: bool,
}

fn default_command_timeout() -> u64 {
    30
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_command_timeout(),
            allow_dangerous: false,
        }
    }
}

/// Provider types accepted by `provider.type`
pub const VALID_PROVIDERS: [&str; 2] = ["gemini", "ollama"];

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    /// Parses a YAML configuration file without applying overrides
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AgentLoopError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| AgentLoopError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(provider_type) = std::env::var("AGENTLOOP_PROVIDER") {
            self.provider.provider_type = provider_type;
        }

        if let Ok(gemini_model) = std::env::var("AGENTLOOP_GEMINI_MODEL") {
            self.provider.gemini.model = gemini_model;
        }

        if let Ok(ollama_host) = std::env::var("AGENTLOOP_OLLAMA_HOST") {
            self.provider.ollama.host = ollama_host;
        }

        if let Ok(ollama_model) = std::env::var("AGENTLOOP_OLLAMA_MODEL") {
            self.provider.ollama.model = ollama_model;
        }

        if let Ok(max_turns) = std::env::var("AGENTLOOP_MAX_TURNS") {
            if let Ok(value) = max_turns.parse() {
                self.agent.max_turns = Some(value);
            } else {
                tracing::warn!("Invalid AGENTLOOP_MAX_TURNS: {}", max_turns);
            }
        }

        if let Ok(timeout) = std::env::var("AGENTLOOP_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.agent.timeout_seconds = Some(value);
            } else {
                tracing::warn!("Invalid AGENTLOOP_TIMEOUT_SECONDS: {}", timeout);
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(provider) = &cli.provider {
            tracing::debug!("Using provider override: {}", provider);
            self.provider.provider_type = provider.clone();
        }

        if let Some(max_turns) = cli.max_turns {
            self.agent.max_turns = Some(max_turns);
        }

        if let Some(timeout) = cli.timeout {
            self.agent.timeout_seconds = Some(timeout);
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `AgentLoopError::Config` naming the first offending field
    pub fn validate(&self) -> Result<()> {
        if !VALID_PROVIDERS.contains(&self.provider.provider_type.as_str()) {
            return Err(AgentLoopError::Config(format!(
                "Invalid provider type: {}. Must be one of: {}",
                self.provider.provider_type,
                VALID_PROVIDERS.join(", ")
            ))
            .into());
        }

        if self.agent.max_turns == Some(0) {
            return Err(
                AgentLoopError::Config("max_turns must be greater than 0".to_string()).into(),
            );
        }

        if self.agent.timeout_seconds == Some(0) {
            return Err(
                AgentLoopError::Config("timeout_seconds must be greater than 0".to_string()).into(),
            );
        }

        if self.agent.tools.max_output_size == 0 {
            return Err(AgentLoopError::Config(
                "tools.max_output_size must be greater than 0".to_string(),
            )
            .into());
        }

        if self.agent.tools.max_file_size == 0 {
            return Err(AgentLoopError::Config(
                "tools.max_file_size must be greater than 0".to_string(),
            )
            .into());
        }

        if self.agent.terminal.timeout_seconds == 0 {
            return Err(AgentLoopError::Config(
                "terminal.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        let mut seen = HashSet::new();
        for kind in &self.agent.tools.enabled {
            if !seen.insert(kind) {
                return Err(AgentLoopError::Config(format!(
                    "tools.enabled lists {} more than once",
                    kind
                ))
                .into());
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig {
                provider_type: "gemini".to_string(),
                gemini: GeminiConfig::default(),
                ollama: OllamaConfig::default(),
            },
            agent: AgentConfig::default(),
        }
    }
}
