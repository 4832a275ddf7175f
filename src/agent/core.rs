//! Agent loop: the session state machine
//!
//! A [`Session`] owns one history and one tool registry. Each task runs
//! `AwaitingModel -> DispatchingTool -> AwaitingModel -> ... -> Terminated`:
//! - the model is called with the full history, the declarations and the
//!   system instruction
//! - an invocation request is recorded as a model turn, dispatched, and its
//!   result recorded as a tool-result turn
//! - a text-only response is recorded as a model turn and ends the task
//!
//! Tool failures never leave the loop. A completion failure aborts the session.

use crate::agent::events::{send_event, SessionEvent};
use crate::agent::history::{History, Turn};
use crate::error::{AgentLoopError, Result};
use crate::providers::{
    CompletionResponse, ModelOutcome, Provider, TokenUsage, ToolInvocationRequest,
};
use crate::tools::{ToolRegistry, ToolResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where a session is in the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// No task started yet
    Idle,
    /// Next step calls the completion service
    AwaitingModel,
    /// Next step runs the pending invocation request
    DispatchingTool,
    /// The last task ended; a follow-up task may be started
    Terminated,
    /// The completion service failed; the session accepts no more tasks
    Aborted,
}

/// Why a task ended without an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// `max_turns` model calls were made
    TurnBudget,
    /// The wall-clock budget ran out
    TimeBudget,
    /// The cancellation token fired
    Interrupted,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TurnBudget => f.write_str("turn budget exhausted"),
            Self::TimeBudget => f.write_str("time budget exhausted"),
            Self::Interrupted => f.write_str("interrupted"),
        }
    }
}

/// How a task ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Termination {
    /// The model answered in plain text
    Answered {
        /// The final answer, equal to the last model turn's text
        text: String,
    },
    /// The task was cut short
    Cancelled {
        /// What cut it short
        reason: CancelReason,
    },
}

impl Termination {
    /// Final answer, if the task was answered
    pub fn answer(&self) -> Option<&str> {
        match self {
            Self::Answered { text } => Some(text),
            Self::Cancelled { .. } => None,
        }
    }
}

/// Optional per-task limits, checked before each model call
///
/// Both limits are unset by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionBudget {
    /// Maximum model calls per task
    pub max_turns: Option<usize>,
    /// Wall-clock limit per task
    pub timeout: Option<Duration>,
}

impl SessionBudget {
    /// No limits
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Sets the model-call limit
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    /// Sets the wall-clock limit
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// True when neither limit is set
    pub fn is_unbounded(&self) -> bool {
        self.max_turns.is_none() && self.timeout.is_none()
    }
}

enum ModelRace {
    Interrupted,
    TimedOut,
    Responded(Result<CompletionResponse>),
}

enum ToolRace {
    Interrupted,
    Completed(ToolResult),
}

/// One agent loop run, owning its history and registry exclusively
///
/// # Examples
///
/// ```no_run
/// use agentloop::agent::{Session, Termination};
/// use agentloop::config::Config;
/// use agentloop::providers::create_provider;
/// use agentloop::tools::build_registry;
///
/// # async fn example() -> agentloop::error::Result<()> {
/// let config = Config::default();
/// let provider = create_provider(&config.provider)?;
/// let registry = build_registry(&config.agent)?;
///
/// let mut session = Session::new(provider, registry);
/// let termination = session.run("create a project folder named demo").await?;
/// if let Termination::Answered { text } = termination {
///     println!("{}", text);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Session {
    provider: Arc<dyn Provider>,
    registry: ToolRegistry,
    history: History,
    system_instruction: Option<String>,
    budget: SessionBudget,
    max_output_size: Option<usize>,
    state: LoopState,
    pending: Option<ToolInvocationRequest>,
    event_tx: Option<UnboundedSender<SessionEvent>>,
    cancel_token: CancellationToken,
    model_calls: usize,
    task_started: Option<Instant>,
    usage: TokenUsage,
}

impl Session {
    /// Creates an idle session
    pub fn new(provider: Arc<dyn Provider>, registry: ToolRegistry) -> Self {
        Self {
            provider,
            registry,
            history: History::new(),
            system_instruction: None,
            budget: SessionBudget::unbounded(),
            max_output_size: None,
            state: LoopState::Idle,
            pending: None,
            event_tx: None,
            cancel_token: CancellationToken::new(),
            model_calls: 0,
            task_started: None,
            usage: TokenUsage::default(),
        }
    }

    /// System instruction passed unmodified on every model call
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    /// Per-task budget
    pub fn with_budget(mut self, budget: SessionBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Truncates tool payloads to `max_output_size` bytes before they enter the history
    pub fn with_max_output_size(mut self, max_output_size: usize) -> Self {
        self.max_output_size = Some(max_output_size);
        self
    }

    /// Streams [`SessionEvent`]s to `tx`
    pub fn with_event_tx(mut self, tx: UnboundedSender<SessionEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Uses `token` for operator interrupts
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Replaces the interrupt token, e.g. with a fresh one before a follow-up task
    pub fn set_cancel_token(&mut self, token: CancellationToken) {
        self.cancel_token = token;
    }

    /// The current interrupt token
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Current loop state
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// The session's history
    pub fn history(&self) -> &History {
        &self.history
    }

    /// The session's tool registry
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Token usage accumulated over all model calls that reported it
    pub fn usage(&self) -> TokenUsage {
        self.usage
    }

    /// Runs one task to termination
    ///
    /// # Errors
    ///
    /// - `AgentLoopError::InvalidState` if the session is mid-task or aborted
    /// - `AgentLoopError::Completion` (or another fatal error) if the completion
    ///   service fails; the session is aborted
    pub async fn run(&mut self, task: impl Into<String>) -> Result<Termination> {
        self.start(task)?;
        loop {
            if let Some(termination) = self.step().await? {
                return Ok(termination);
            }
        }
    }

    /// Appends `task` as a user turn and moves to `AwaitingModel`
    ///
    /// Allowed from `Idle` and, for follow-up tasks, from `Terminated`.
    ///
    /// # Errors
    ///
    /// Returns `AgentLoopError::InvalidState` from any other state
    pub fn start(&mut self, task: impl Into<String>) -> Result<()> {
        match self.state {
            LoopState::Idle | LoopState::Terminated => {}
            other => {
                return Err(AgentLoopError::InvalidState(format!(
                    "cannot start a task while {:?}",
                    other
                ))
                .into())
            }
        }

        let task = task.into();
        info!("Starting task ({} prior turns)", self.history.len());
        self.history.append(Turn::user(task.clone()));
        self.model_calls = 0;
        self.task_started = Some(Instant::now());
        self.state = LoopState::AwaitingModel;
        send_event(&self.event_tx, SessionEvent::TaskStarted { task });
        Ok(())
    }

    /// Performs one transition
    ///
    /// Returns `Some(termination)` when the task ends.
    ///
    /// # Errors
    ///
    /// - `AgentLoopError::InvalidState` when no task is running
    /// - fatal completion errors, after which the state is `Aborted`
    pub async fn step(&mut self) -> Result<Option<Termination>> {
        match self.state {
            LoopState::AwaitingModel => self.call_model().await,
            LoopState::DispatchingTool => self.dispatch_pending().await,
            other => Err(AgentLoopError::InvalidState(format!(
                "no task is running (state: {:?})",
                other
            ))
            .into()),
        }
    }

    async fn call_model(&mut self) -> Result<Option<Termination>> {
        if self.cancel_token.is_cancelled() {
            return Ok(Some(self.cancel(CancelReason::Interrupted)));
        }
        if let Some(reason) = self.budget_exhausted() {
            return Ok(Some(self.cancel(reason)));
        }

        self.model_calls += 1;
        debug!(
            "Iteration {}, history: {} turns (~{} tokens)",
            self.model_calls,
            self.history.len(),
            self.history.estimated_tokens()
        );
        send_event(
            &self.event_tx,
            SessionEvent::ModelRequested {
                iteration: self.model_calls,
            },
        );

        let remaining = self.remaining_time();
        let race = {
            let declarations = self.registry.declarations();
            let call = self.provider.generate(
                self.history.snapshot(),
                &declarations,
                self.system_instruction.as_deref(),
            );
            tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => ModelRace::Interrupted,
                _ = sleep_for(remaining) => ModelRace::TimedOut,
                response = call => ModelRace::Responded(response),
            }
        };

        let response = match race {
            ModelRace::Interrupted => return Ok(Some(self.cancel(CancelReason::Interrupted))),
            ModelRace::TimedOut => return Ok(Some(self.cancel(CancelReason::TimeBudget))),
            ModelRace::Responded(response) => response,
        };

        let outcome = match response.and_then(|r| {
            if let Some(usage) = r.usage {
                self.record_usage(usage);
            }
            r.into_outcome()
        }) {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.abort(e)),
        };

        match outcome {
            ModelOutcome::Text(text) => {
                self.history.append(Turn::model_text(text.clone()));
                info!("Task answered after {} model call(s)", self.model_calls);
                Ok(Some(self.finish(Termination::Answered { text })))
            }
            ModelOutcome::ToolCall { request, dropped } => {
                if dropped > 0 {
                    warn!(
                        "Response carried {} extra tool call(s); only '{}' is dispatched",
                        dropped, request.name
                    );
                    send_event(
                        &self.event_tx,
                        SessionEvent::CandidatesDropped { count: dropped },
                    );
                }
                debug!("Model requested tool '{}' ({})", request.name, request.id);
                self.history.append(Turn::tool_invocation(request.clone()));
                self.pending = Some(request);
                self.state = LoopState::DispatchingTool;
                Ok(None)
            }
        }
    }

    async fn dispatch_pending(&mut self) -> Result<Option<Termination>> {
        let request = match self.pending.take() {
            Some(request) => request,
            None => {
                return Err(self.abort(
                    AgentLoopError::InvalidState("no pending tool invocation".to_string()).into(),
                ))
            }
        };

        info!("Dispatching tool '{}'", request.name);
        send_event(
            &self.event_tx,
            SessionEvent::ToolInvoked {
                call_id: request.id.clone(),
                name: request.name.clone(),
                arguments: request.arguments.clone(),
            },
        );

        let race = {
            let dispatch = self
                .registry
                .dispatch(&request.name, request.arguments.clone());
            tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => ToolRace::Interrupted,
                result = dispatch => ToolRace::Completed(result),
            }
        };

        let (result, interrupted) = match race {
            ToolRace::Completed(result) => (result, false),
            ToolRace::Interrupted => (ToolResult::error("Interrupted by operator"), true),
        };

        let result = match self.max_output_size {
            Some(max) => result.truncate_if_needed(max),
            None => result,
        };

        if result.is_success() {
            debug!("Tool '{}' succeeded", request.name);
        } else {
            warn!("Tool '{}' failed: {}", request.name, result.payload);
        }

        send_event(
            &self.event_tx,
            SessionEvent::ToolCompleted {
                call_id: request.id.clone(),
                name: request.name.clone(),
                status: result.status,
                payload: result.payload.clone(),
                truncated: result.truncated,
            },
        );
        self.history.append(Turn::tool_result(&request, result));

        if interrupted {
            return Ok(Some(self.cancel(CancelReason::Interrupted)));
        }

        self.state = LoopState::AwaitingModel;
        Ok(None)
    }

    fn budget_exhausted(&self) -> Option<CancelReason> {
        if let Some(max_turns) = self.budget.max_turns {
            if self.model_calls >= max_turns {
                return Some(CancelReason::TurnBudget);
            }
        }
        if self.remaining_time() == Some(Duration::ZERO) {
            return Some(CancelReason::TimeBudget);
        }
        None
    }

    fn remaining_time(&self) -> Option<Duration> {
        let timeout = self.budget.timeout?;
        let elapsed = self.task_started.map(|t| t.elapsed()).unwrap_or_default();
        Some(timeout.saturating_sub(elapsed))
    }

    fn record_usage(&mut self, usage: TokenUsage) {
        self.usage = TokenUsage::new(
            self.usage.prompt_tokens + usage.prompt_tokens,
            self.usage.completion_tokens + usage.completion_tokens,
        );
    }

    fn cancel(&mut self, reason: CancelReason) -> Termination {
        warn!("Task cancelled: {:?}", reason);
        self.finish(Termination::Cancelled { reason })
    }

    fn finish(&mut self, termination: Termination) -> Termination {
        self.state = LoopState::Terminated;
        self.pending = None;
        send_event(
            &self.event_tx,
            SessionEvent::Finished {
                termination: termination.clone(),
            },
        );
        termination
    }

    fn abort(&mut self, err: anyhow::Error) -> anyhow::Error {
        error!("Session aborted: {:#}", err);
        self.state = LoopState::Aborted;
        self.pending = None;
        send_event(
            &self.event_tx,
            SessionEvent::Failed {
                message: err.to_string(),
            },
        );
        err
    }
}

async fn sleep_for(remaining: Option<Duration>) {
    match remaining {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::history::{Role, TurnContent};
    use crate::providers::ScriptedProvider;
    use crate::tools::{
        ParamType, ParameterSchema, ToolDeclaration, ToolExecutor, ToolKind, ToolStatus,
    };
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct EchoSum;

    #[async_trait]
    impl ToolExecutor for EchoSum {
        fn kind(&self) -> ToolKind {
            ToolKind::Sum
        }

        fn declaration(&self) -> ToolDeclaration {
            ToolDeclaration::new(
                ToolKind::Sum,
                "Adds",
                ParameterSchema::new()
                    .required("num1", ParamType::Number, "a")
                    .required("num2", ParamType::Number, "b"),
            )
        }

        async fn execute(&self, args: Value) -> ToolResult {
            let a = args["num1"].as_f64().unwrap_or_default();
            let b = args["num2"].as_f64().unwrap_or_default();
            ToolResult::success((a + b).to_string())
        }
    }

    struct Slow;

    #[async_trait]
    impl ToolExecutor for Slow {
        fn kind(&self) -> ToolKind {
            ToolKind::ExecuteCommand
        }

        fn declaration(&self) -> ToolDeclaration {
            ToolDeclaration::new(ToolKind::ExecuteCommand, "Sleeps", ParameterSchema::new())
        }

        async fn execute(&self, _args: Value) -> ToolResult {
            tokio::time::sleep(Duration::from_secs(30)).await;
            ToolResult::success("done")
        }
    }

    struct Napping(Duration);

    #[async_trait]
    impl ToolExecutor for Napping {
        fn kind(&self) -> ToolKind {
            ToolKind::Sum
        }

        fn declaration(&self) -> ToolDeclaration {
            ToolDeclaration::new(ToolKind::Sum, "Naps", ParameterSchema::new())
        }

        async fn execute(&self, _args: Value) -> ToolResult {
            tokio::time::sleep(self.0).await;
            ToolResult::success("rested")
        }
    }

    struct StalledProvider;

    #[async_trait]
    impl Provider for StalledProvider {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn generate(
            &self,
            _history: &[Turn],
            _tools: &[ToolDeclaration],
            _system_instruction: Option<&str>,
        ) -> Result<CompletionResponse> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(CompletionResponse::text("too late"))
        }
    }

    fn registry_with(tool: Arc<dyn ToolExecutor>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(tool).unwrap();
        registry
    }

    fn sum_call(id: &str) -> CompletionResponse {
        CompletionResponse::tool_call(ToolInvocationRequest::with_id(
            id,
            "sum",
            json!({"num1": 2, "num2": 3}),
        ))
    }

    #[tokio::test]
    async fn test_text_only_response_terminates() {
        let provider = Arc::new(ScriptedProvider::new(vec![CompletionResponse::text(
            "Paris.",
        )]));
        let mut session = Session::new(provider.clone(), ToolRegistry::new());

        let termination = session.run("capital of France?").await.unwrap();

        assert_eq!(termination.answer(), Some("Paris."));
        assert_eq!(session.state(), LoopState::Terminated);
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history().last_model_text(), Some("Paris."));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_tool_call_then_answer() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            sum_call("c1"),
            CompletionResponse::text("The sum is 5."),
        ]));
        let mut session = Session::new(provider.clone(), registry_with(Arc::new(EchoSum)));

        let termination = session.run("add 2 and 3").await.unwrap();

        assert_eq!(termination.answer(), Some("The sum is 5."));
        let roles: Vec<Role> = session.history().iter().map(Turn::role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Model, Role::ToolResult, Role::Model]
        );
        match session.history().snapshot()[2].content() {
            TurnContent::ToolResult {
                call_id, result, ..
            } => {
                assert_eq!(call_id, "c1");
                assert_eq!(result.payload, "5");
            }
            other => panic!("unexpected content: {:?}", other),
        }

        // The second model call saw the tool result.
        let calls = provider.recorded_histories();
        assert_eq!(calls[0].len(), 1);
        assert_eq!(calls[1].len(), 3);
    }

    #[tokio::test]
    async fn test_step_by_step_states() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            sum_call("c1"),
            CompletionResponse::text("done"),
        ]));
        let mut session = Session::new(provider, registry_with(Arc::new(EchoSum)));
        assert_eq!(session.state(), LoopState::Idle);

        session.start("task").unwrap();
        assert_eq!(session.state(), LoopState::AwaitingModel);

        assert!(session.step().await.unwrap().is_none());
        assert_eq!(session.state(), LoopState::DispatchingTool);

        assert!(session.step().await.unwrap().is_none());
        assert_eq!(session.state(), LoopState::AwaitingModel);

        assert!(session.step().await.unwrap().is_some());
        assert_eq!(session.state(), LoopState::Terminated);

        assert!(session.step().await.is_err());
    }

    #[tokio::test]
    async fn test_start_while_running_is_invalid() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let mut session = Session::new(provider, ToolRegistry::new());
        session.start("first").unwrap();

        let err = session.start("second").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AgentLoopError>(),
            Some(AgentLoopError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_completion_failure_aborts() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let mut session = Session::new(provider, ToolRegistry::new());

        let err = session.run("anything").await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<AgentLoopError>(),
            Some(AgentLoopError::Completion(_))
        ));
        assert_eq!(session.state(), LoopState::Aborted);
        assert_eq!(session.history().len(), 1);
        assert!(session.start("again").is_err());
    }

    #[tokio::test]
    async fn test_turn_budget_cancels() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            sum_call("c1"),
            sum_call("c2"),
            sum_call("c3"),
        ]));
        let mut session = Session::new(provider.clone(), registry_with(Arc::new(EchoSum)))
            .with_budget(SessionBudget::unbounded().with_max_turns(2));

        let termination = session.run("loop forever").await.unwrap();

        assert_eq!(
            termination,
            Termination::Cancelled {
                reason: CancelReason::TurnBudget
            }
        );
        assert_eq!(provider.call_count(), 2);
        // user, (model, tool-result) x 2
        assert_eq!(session.history().len(), 5);
        assert_eq!(session.history().last().unwrap().role(), Role::ToolResult);
    }

    #[tokio::test]
    async fn test_time_budget_cancels_in_flight_model_call() {
        let mut session = Session::new(Arc::new(StalledProvider), ToolRegistry::new())
            .with_budget(SessionBudget::unbounded().with_timeout(Duration::from_millis(50)));

        let started = Instant::now();
        let termination = session.run("think hard").await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(
            termination,
            Termination::Cancelled {
                reason: CancelReason::TimeBudget
            }
        );
        assert_eq!(session.state(), LoopState::Terminated);
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.history().last().unwrap().role(), Role::User);
    }

    #[tokio::test]
    async fn test_time_budget_spent_by_tool_refuses_next_model_call() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            sum_call("c1"),
            CompletionResponse::text("never read"),
        ]));
        let registry = registry_with(Arc::new(Napping(Duration::from_millis(200))));
        let mut session = Session::new(provider.clone(), registry)
            .with_budget(SessionBudget::unbounded().with_timeout(Duration::from_millis(50)));

        let termination = session.run("nap then answer").await.unwrap();

        assert_eq!(
            termination,
            Termination::Cancelled {
                reason: CancelReason::TimeBudget
            }
        );
        assert_eq!(provider.call_count(), 1);
        assert_eq!(provider.remaining(), 1);
        let roles: Vec<Role> = session.history().iter().map(Turn::role).collect();
        assert_eq!(roles, vec![Role::User, Role::Model, Role::ToolResult]);
        match session.history().last().unwrap().content() {
            TurnContent::ToolResult {
                call_id, result, ..
            } => {
                assert_eq!(call_id, "c1");
                assert_eq!(result.payload, "rested");
            }
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blank_answer_aborts() {
        let provider = Arc::new(ScriptedProvider::new(vec![CompletionResponse::text("  ")]));
        let mut session = Session::new(provider, ToolRegistry::new());

        let err = session.run("say something").await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<AgentLoopError>(),
            Some(AgentLoopError::Completion(_))
        ));
        assert_eq!(session.state(), LoopState::Aborted);
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_declines_to_call_model() {
        let provider = Arc::new(ScriptedProvider::new(vec![CompletionResponse::text("x")]));
        let token = CancellationToken::new();
        token.cancel();
        let mut session =
            Session::new(provider.clone(), ToolRegistry::new()).with_cancel_token(token);

        let termination = session.run("task").await.unwrap();

        assert_eq!(
            termination,
            Termination::Cancelled {
                reason: CancelReason::Interrupted
            }
        );
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_interrupt_during_tool_appends_error_result() {
        let provider = Arc::new(ScriptedProvider::new(vec![CompletionResponse::tool_call(
            ToolInvocationRequest::with_id("slow1", "executeCommand", json!({})),
        )]));
        let token = CancellationToken::new();
        let mut session = Session::new(provider, registry_with(Arc::new(Slow)))
            .with_cancel_token(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });
        let termination = session.run("wait").await.unwrap();
        canceller.await.unwrap();

        assert_eq!(
            termination,
            Termination::Cancelled {
                reason: CancelReason::Interrupted
            }
        );
        let last = session.history().last().unwrap();
        assert_eq!(last.role(), Role::ToolResult);
        match last.content() {
            TurnContent::ToolResult { result, .. } => {
                assert_eq!(result.status, ToolStatus::Error)
            }
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_follow_up_task_extends_history() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            CompletionResponse::text("first"),
            CompletionResponse::text("second"),
        ]));
        let mut session = Session::new(provider.clone(), ToolRegistry::new());

        session.run("one").await.unwrap();
        let termination = session.run("two").await.unwrap();

        assert_eq!(termination.answer(), Some("second"));
        assert_eq!(session.history().len(), 4);
        assert_eq!(provider.recorded_histories()[1].len(), 3);
    }

    #[tokio::test]
    async fn test_output_truncated_before_history() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            sum_call("c1"),
            CompletionResponse::text("ok"),
        ]));
        struct Loud;
        #[async_trait]
        impl ToolExecutor for Loud {
            fn kind(&self) -> ToolKind {
                ToolKind::Sum
            }
            fn declaration(&self) -> ToolDeclaration {
                ToolDeclaration::new(ToolKind::Sum, "Loud", ParameterSchema::new())
            }
            async fn execute(&self, _args: Value) -> ToolResult {
                ToolResult::success("x".repeat(500))
            }
        }
        let mut session =
            Session::new(provider, registry_with(Arc::new(Loud))).with_max_output_size(100);

        session.run("be loud").await.unwrap();

        match session.history().snapshot()[2].content() {
            TurnContent::ToolResult { result, .. } => {
                assert!(result.truncated);
                assert!(result.payload.len() < 200);
            }
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_usage_accumulates() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            sum_call("c1").with_usage(TokenUsage::new(10, 2)),
            CompletionResponse::text("ok").with_usage(TokenUsage::new(20, 3)),
        ]));
        let mut session = Session::new(provider, registry_with(Arc::new(EchoSum)));

        session.run("add").await.unwrap();

        assert_eq!(session.usage(), TokenUsage::new(30, 5));
    }

    #[tokio::test]
    async fn test_events_in_loop_order() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            sum_call("c1"),
            CompletionResponse::text("5"),
        ]));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut session =
            Session::new(provider, registry_with(Arc::new(EchoSum))).with_event_tx(tx);

        session.run("add").await.unwrap();
        drop(session);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert!(matches!(events[0], SessionEvent::TaskStarted { .. }));
        assert_eq!(events[1], SessionEvent::ModelRequested { iteration: 1 });
        assert!(matches!(events[2], SessionEvent::ToolInvoked { ref name, .. } if name == "sum"));
        assert!(matches!(
            events[3],
            SessionEvent::ToolCompleted { status: ToolStatus::Success, .. }
        ));
        assert_eq!(events[4], SessionEvent::ModelRequested { iteration: 2 });
        assert_eq!(
            events[5],
            SessionEvent::Finished {
                termination: Termination::Answered {
                    text: "5".to_string()
                }
            }
        );
        assert_eq!(events.len(), 6);
    }
}
