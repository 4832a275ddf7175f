//! Provider module for agentloop
//!
//! This module contains the completion-service abstraction and its
//! implementations: Google Gemini, Ollama and an offline scripted provider.

pub mod base;
pub mod gemini;
pub mod ollama;
pub mod scripted;

pub use base::{CompletionResponse, ModelOutcome, Provider, TokenUsage, ToolInvocationRequest};
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use scripted::{RecordedCall, ScriptedProvider};

use crate::config::ProviderConfig;
use crate::error::{AgentLoopError, Result};
use std::sync::Arc;

/// Create a provider instance based on configuration
///
/// # Arguments
///
/// * `config` - Provider configuration; `config.provider_type` selects the backend
///
/// # Returns
///
/// Returns a shared provider instance
///
/// # Errors
///
/// Returns error if the provider type is unknown, credentials are missing,
/// or initialization fails
///
/// # Examples
///
/// ```
/// use agentloop::config::ProviderConfig;
/// use agentloop::providers::create_provider;
///
/// let config = ProviderConfig {
///     provider_type: "ollama".to_string(),
///     gemini: Default::default(),
///     ollama: Default::default(),
/// };
/// let provider = create_provider(&config).unwrap();
/// assert_eq!(provider.name(), "ollama");
/// ```
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
    match config.provider_type.as_str() {
        "gemini" => {
            let api_key = config.gemini.resolve_api_key()?;
            Ok(Arc::new(GeminiProvider::new(config.gemini.clone(), api_key)?))
        }
        "ollama" => Ok(Arc::new(OllamaProvider::new(config.ollama.clone())?)),
        other => Err(AgentLoopError::Config(format!("Unknown provider type: {}", other)).into()),
    }
}
