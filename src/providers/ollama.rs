//! Ollama provider implementation for agentloop
//!
//! This module implements the Provider trait for Ollama, connecting to a local
//! or remote Ollama server's `/api/chat` endpoint with tool calling support.

use crate::agent::history::{Role, Turn, TurnContent};
use crate::config::OllamaConfig;
use crate::error::{AgentLoopError, Result};
use crate::providers::{CompletionResponse, Provider, TokenUsage, ToolInvocationRequest};
use crate::tools::ToolDeclaration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// Ollama API provider
///
/// # Examples
///
/// ```
/// use agentloop::config::OllamaConfig;
/// use agentloop::providers::OllamaProvider;
///
/// let provider = OllamaProvider::new(OllamaConfig::default());
/// assert!(provider.is_ok());
/// ```
pub struct OllamaProvider {
    client: Client,
    config: OllamaConfig,
}

/// Request structure for Ollama API
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OllamaTool>,
    stream: bool,
}

/// Message structure for Ollama API
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OllamaToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

impl OllamaMessage {
    fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            tool_calls: None,
            tool_name: None,
        }
    }
}

/// Tool definition for Ollama API
#[derive(Debug, Serialize)]
struct OllamaTool {
    r#type: String,
    function: OllamaFunction,
}

/// Function definition for Ollama tools
#[derive(Debug, Serialize)]
struct OllamaFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

/// Tool call in Ollama format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaToolCall {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    id: String,
    function: OllamaFunctionCall,
}

/// Function call details in Ollama format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

/// Response structure from Ollama API
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: usize,
    #[serde(default)]
    eval_count: usize,
}

impl OllamaProvider {
    /// Create a new Ollama provider instance
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent(concat!("agentloop/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AgentLoopError::Config(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            "Initialized Ollama provider: host={}, model={}",
            config.host,
            config.model
        );

        Ok(Self { client, config })
    }

    /// Get the configured Ollama host
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Convert history turns to Ollama messages
    fn convert_history(
        &self,
        history: &[Turn],
        system_instruction: Option<&str>,
    ) -> Vec<OllamaMessage> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(instruction) = system_instruction {
            messages.push(OllamaMessage::text("system", instruction));
        }

        for turn in history {
            let message = match turn.content() {
                TurnContent::Text { text } => match turn.role() {
                    Role::Model => OllamaMessage::text("assistant", text.clone()),
                    _ => OllamaMessage::text("user", text.clone()),
                },
                TurnContent::ToolInvocation { request } => OllamaMessage {
                    role: "assistant".to_string(),
                    content: String::new(),
                    tool_calls: Some(vec![OllamaToolCall {
                        id: request.id.clone(),
                        function: OllamaFunctionCall {
                            name: request.name.clone(),
                            arguments: request.arguments.clone(),
                        },
                    }]),
                    tool_name: None,
                },
                TurnContent::ToolResult { name, result, .. } => OllamaMessage {
                    role: "tool".to_string(),
                    content: json!({
                        "status": result.status,
                        "output": result.payload,
                    })
                    .to_string(),
                    tool_calls: None,
                    tool_name: Some(name.clone()),
                },
            };
            messages.push(message);
        }

        messages
    }

    /// Convert tool declarations to Ollama format
    fn convert_tools(&self, tools: &[ToolDeclaration]) -> Vec<OllamaTool> {
        tools
            .iter()
            .map(|t| OllamaTool {
                r#type: "function".to_string(),
                function: OllamaFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.to_json_schema(),
                },
            })
            .collect()
    }

    /// Convert an Ollama response message into a completion response
    fn convert_response_message(&self, message: OllamaMessage) -> CompletionResponse {
        let tool_calls: Vec<ToolInvocationRequest> = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                if tc.id.is_empty() {
                    ToolInvocationRequest::new(tc.function.name, tc.function.arguments)
                } else {
                    ToolInvocationRequest::with_id(tc.id, tc.function.name, tc.function.arguments)
                }
            })
            .collect();

        let text = if tool_calls.is_empty() || !message.content.trim().is_empty() {
            Some(message.content)
        } else {
            None
        };

        CompletionResponse {
            text,
            tool_calls,
            usage: None,
        }
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> Option<&str> {
        Some(&self.config.model)
    }

    async fn generate(
        &self,
        history: &[Turn],
        tools: &[ToolDeclaration],
        system_instruction: Option<&str>,
    ) -> Result<CompletionResponse> {
        let url = format!("{}/api/chat", self.config.host.trim_end_matches('/'));

        let ollama_request = OllamaRequest {
            model: self.config.model.clone(),
            messages: self.convert_history(history, system_instruction),
            tools: self.convert_tools(tools),
            stream: false,
        };

        tracing::debug!(
            "Sending Ollama request: {} messages, {} tools",
            ollama_request.messages.len(),
            ollama_request.tools.len()
        );

        let response = self
            .client
            .post(&url)
            .json(&ollama_request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Ollama request failed: {}", e);
                AgentLoopError::Completion(format!("Ollama request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Ollama returned error {}: {}", status, error_text);
            return Err(AgentLoopError::Completion(format!(
                "Ollama returned error {}: {}",
                status, error_text
            ))
            .into());
        }

        let ollama_response: OllamaResponse = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse Ollama response: {}", e);
            AgentLoopError::Completion(format!("Failed to parse Ollama response: {}", e))
        })?;

        tracing::debug!(
            "Ollama response: done={}, prompt_tokens={}, completion_tokens={}",
            ollama_response.done,
            ollama_response.prompt_eval_count,
            ollama_response.eval_count
        );

        let mut completion = self.convert_response_message(ollama_response.message);
        if ollama_response.prompt_eval_count > 0 || ollama_response.eval_count > 0 {
            completion = completion.with_usage(TokenUsage::new(
                ollama_response.prompt_eval_count,
                ollama_response.eval_count,
            ));
        }

        Ok(completion)
    }
}
