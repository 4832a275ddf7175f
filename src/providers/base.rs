//! Base provider trait and common types for agentloop
//!
//! This module defines the completion-service boundary: the [`Provider`]
//! trait, the invocation requests a model can emit, and the response shape
//! every provider normalises its wire format into.

use crate::agent::history::Turn;
use crate::error::{AgentLoopError, Result};
use crate::tools::ToolDeclaration;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request from the model to run one tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    /// Call id pairing the request with its result
    pub id: String,
    /// Requested tool name
    pub name: String,
    /// Arguments shaped by the tool's parameter schema
    pub arguments: Value,
}

impl ToolInvocationRequest {
    /// Creates a request with a generated call id
    ///
    /// Used for services that do not assign ids themselves.
    ///
    /// # Examples
    ///
    /// ```
    /// use agentloop::providers::ToolInvocationRequest;
    /// use serde_json::json;
    ///
    /// let request =
///     ToolInvocationRequest::new("executeCommand", json!({"command": "mkdir demo"}));
    /// assert!(request.id.starts_with("call_"));
    /// assert_eq!(request.name, "executeCommand");
    /// ```
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name: name.into(),
            arguments,
        }
    }

    /// Creates a request with a service-assigned call id
    pub fn with_id(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Token usage information from a completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of tokens in the prompt
    pub prompt_tokens: usize,
    /// Number of tokens in the completion
    pub completion_tokens: usize,
    /// Total tokens used
    pub total_tokens: usize,
}

impl TokenUsage {
    /// Create a new TokenUsage instance
    ///
    /// # Examples
    ///
    /// ```
    /// use agentloop::providers::TokenUsage;
    ///
    /// let usage = TokenUsage::new(100, 50);
    /// assert_eq!(usage.total_tokens, 150);
    /// ```
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Normalised response of one completion call
///
/// A service may return text, invocation candidates, or both; the loop decides
/// what to act on through [`CompletionResponse::into_outcome`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionResponse {
    /// Text output, if the service returned any
    pub text: Option<String>,
    /// Invocation candidates, in the order the service returned them
    pub tool_calls: Vec<ToolInvocationRequest>,
    /// Optional token usage information
    pub usage: Option<TokenUsage>,
}

/// What the loop acts on after one completion call
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutcome {
    /// Final answer
    Text(String),
    /// First invocation candidate, plus how many further candidates were dropped
    ToolCall {
        /// The candidate that will be dispatched
        request: ToolInvocationRequest,
        /// Candidates after the first, which are not acted on
        dropped: usize,
    },
}

impl CompletionResponse {
    /// A text-only response
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// A response carrying a single invocation request
    pub fn tool_call(request: ToolInvocationRequest) -> Self {
        Self {
            tool_calls: vec![request],
            ..Self::default()
        }
    }

    /// A response carrying several invocation candidates
    pub fn tool_calls(requests: Vec<ToolInvocationRequest>) -> Self {
        Self {
            tool_calls: requests,
            ..Self::default()
        }
    }

    /// Attaches token usage
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Reduces the response to the single thing the loop acts on
    ///
    /// Invocation requests win over text; only the first candidate is kept.
    ///
    /// # Errors
    ///
    /// Returns `AgentLoopError::Completion` when the response has neither an
    /// invocation request nor non-blank text
    ///
    /// # Examples
    ///
    /// ```
    /// use agentloop::providers::{CompletionResponse, ModelOutcome, ToolInvocationRequest};
    /// use serde_json::json;
    ///
    /// let response = CompletionResponse::tool_calls(vec![
    ///     ToolInvocationRequest::new("sum", json!({"num1": 1, "num2": 2})),
    ///     ToolInvocationRequest::new("isPrime", json!({"num": 3})),
    /// ]);
    /// match response.into_outcome().unwrap() {
    ///     ModelOutcome::ToolCall { request, dropped } => {
    ///         assert_eq!(request.name, "sum");
    ///         assert_eq!(dropped, 1);
    ///     }
    ///     other => panic!("unexpected outcome: {:?}", other),
    /// }
    /// ```
    pub fn into_outcome(self) -> Result<ModelOutcome> {
        let mut calls = self.tool_calls.into_iter();
        if let Some(request) = calls.next() {
            return Ok(ModelOutcome::ToolCall {
                request,
                dropped: calls.count(),
            });
        }

        match self.text.filter(|text| !text.trim().is_empty()) {
            Some(text) => Ok(ModelOutcome::Text(text)),
            None => Err(AgentLoopError::Completion(
                "Response contained neither text nor a tool call".to_string(),
            )
            .into()),
        }
    }
}

/// Completion service boundary
///
/// Implementations translate the canonical history into their wire format and
/// normalise the reply. Transport and parse failures are reported as
/// `AgentLoopError::Completion`.
///
/// # Examples
///
/// ```no_run
/// use agentloop::agent::history::Turn;
/// use agentloop::error::Result;
/// use agentloop::providers::{CompletionResponse, Provider};
/// use agentloop::tools::ToolDeclaration;
/// use async_trait::async_trait;
///
/// struct Echo;
///
/// #[async_trait]
/// impl Provider for Echo {
///     fn name(&self) -> &str {
///         "echo"
///     }
///
///     async fn generate(
///         &self,
///         history: &[Turn],
///         _tools: &[ToolDeclaration],
///         _system_instruction: Option<&str>,
///     ) -> Result<CompletionResponse> {
///         Ok(CompletionResponse::text(format!("{} turns so far", history.len())))
///     }
/// }
/// ```
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short provider identifier used in logs
    fn name(&self) -> &str;

    /// Model in use, when the provider has one
    fn model(&self) -> Option<&str> {
        None
    }

    /// Sends the history and tool declarations to the service
    ///
    /// # Arguments
    ///
    /// * `history` - Full ordered history snapshot
    /// * `tools` - Declarations in registration order; empty disables tool calling
    /// * `system_instruction` - Passed through unmodified
    async fn generate(
        &self,
        history: &[Turn],
        tools: &[ToolDeclaration],
        system_instruction: Option<&str>,
    ) -> Result<CompletionResponse>;
}
