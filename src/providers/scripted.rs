//! Scripted provider: replays canned responses without a network
//!
//! Useful for driving the agent loop in tests and offline demos. Every call
//! records what the loop sent so callers can assert on history snapshots.

use crate::agent::history::Turn;
use crate::error::{AgentLoopError, Result};
use crate::providers::{CompletionResponse, Provider};
use crate::tools::ToolDeclaration;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// What the loop sent on one completion call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// History snapshot at call time
    pub history: Vec<Turn>,
    /// Names of the declared tools, in declaration order
    pub tool_names: Vec<String>,
    /// System instruction, if one was passed
    pub system_instruction: Option<String>,
}

/// Provider that returns pre-baked responses in order
///
/// Once the script runs out every further call fails with
/// `AgentLoopError::Completion`.
///
/// # Examples
///
/// ```
/// use agentloop::agent::history::Turn;
/// use agentloop::providers::{CompletionResponse, Provider, ScriptedProvider};
///
/// # tokio_test::block_on(async {
/// let provider = ScriptedProvider::new(vec![CompletionResponse::text("hello")]);
/// let response = provider.generate(&[Turn::user("hi")], &[], None).await.unwrap();
/// assert_eq!(response.text.as_deref(), Some("hello"));
/// assert!(provider.generate(&[], &[], None).await.is_err());
/// assert_eq!(provider.call_count(), 2);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<CompletionResponse>>,
    calls: Mutex<Vec<RecordedCall>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedProvider {
    /// Creates a provider that answers with `responses`, front to back
    pub fn new(responses: Vec<CompletionResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Appends a response to the end of the script
    pub fn push(&self, response: CompletionResponse) {
        lock(&self.script).push_back(response);
    }

    /// Number of completion calls made so far, including failed ones
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Responses not yet consumed
    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }

    /// Everything recorded so far
    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// History snapshots, one per call
    pub fn recorded_histories(&self) -> Vec<Vec<Turn>> {
        lock(&self.calls)
            .iter()
            .map(|call| call.history.clone())
            .collect()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        history: &[Turn],
        tools: &[ToolDeclaration],
        system_instruction: Option<&str>,
    ) -> Result<CompletionResponse> {
        lock(&self.calls).push(RecordedCall {
            history: history.to_vec(),
            tool_names: tools.iter().map(|t| t.name.clone()).collect(),
            system_instruction: system_instruction.map(str::to_string),
        });

        let next = lock(&self.script).pop_front();
        match next {
            Some(response) => Ok(response),
            None => {
                tracing::debug!("Scripted provider exhausted after {} call(s)", self.call_count());
                Err(AgentLoopError::Completion(
                    "Scripted provider has no responses left".to_string(),
                )
                .into())
            }
        }
    }
}
