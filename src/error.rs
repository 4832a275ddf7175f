//! Error types for agentloop
//!
//! This module defines the error taxonomy of the agent loop using `thiserror`.
//! Only a handful of variants are ever fatal to a session; the tool-facing
//! variants are rendered into `ToolResult` payloads and handed back to the model.

use thiserror::Error;

/// Main error type for agentloop operations
#[derive(Error, Debug)]
pub enum AgentLoopError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The completion service could not be reached or returned an unusable response
    ///
    /// This is the only failure that ends a session abnormally.
    #[error("Completion error: {0}")]
    Completion(String),

    /// Missing credentials for a completion service
    #[error("Missing credentials for provider: {0}")]
    MissingCredentials(String),

    /// A tool with the same name is already registered
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    /// The model asked for a tool that is not in the registry
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool arguments do not match the declared schema
    #[error("Invalid arguments for tool '{tool}': {message}")]
    InvalidArguments {
        /// Name of the tool that rejected its arguments
        tool: String,
        /// What was wrong with them
        message: String,
    },

    /// Tool execution errors
    #[error("Tool execution error: {0}")]
    Tool(String),

    /// Command matched the dangerous-command denylist
    #[error("Dangerous command detected: {0}")]
    DangerousCommand(String),

    /// Path validation failed (outside working directory)
    #[error("Path validation failed: {0}")]
    PathOutsideWorkingDirectory(String),

    /// A task ended without an answer (budget exhausted or interrupted)
    #[error("Task cancelled: {0}")]
    Cancelled(String),

    /// Session operation attempted in the wrong loop state
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AgentLoopError {
    /// Returns true if this error is fatal to a running session
    ///
    /// # Examples
    ///
    /// ```
    /// use agentloop::error::AgentLoopError;
    ///
    /// assert!(AgentLoopError::Completion("timeout".to_string()).is_fatal());
    /// assert!(!AgentLoopError::UnknownTool("deploy".to_string()).is_fatal());
    /// ```
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Completion(_)
                | Self::MissingCredentials(_)
                | Self::Http(_)
                | Self::Config(_)
                | Self::InvalidState(_)
        )
    }
}

/// Result type alias for agentloop operations
///
/// Uses `anyhow::Error` so callers can attach context while still being able
/// to downcast to [`AgentLoopError`].
pub type Result<T> = anyhow::Result<T>;
