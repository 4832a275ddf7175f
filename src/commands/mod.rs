/*!
Command handlers for the CLI

This module provides the handlers invoked by the CLI entrypoint:

- `chat`: interactive prompt, one task per line, follow-ups share a history
- `run`: run a single task and print the transcript
- `tools`: print the tool declarations sent to the model

The handlers share session construction and transcript rendering defined here.
*/

use crate::agent::{CancelReason, Session, SessionEvent, Termination};
use crate::config::Config;
use crate::error::{AgentLoopError, Result};
use crate::prompts::{build_system_instruction, current_os};
use crate::providers::{create_provider, Provider};
use crate::tools::{build_registry, ToolStatus};
use colored::Colorize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

/// Lines of tool output shown in the transcript before eliding the rest
const TRANSCRIPT_PREVIEW_LINES: usize = 20;

/// Builds a session from configuration
///
/// Registers the enabled tools, then uses the configured system instruction
/// or builds one for the current OS and the registered tools.
///
/// # Errors
///
/// Returns error if the tool registry cannot be built
pub fn build_session(config: &Config, provider: Arc<dyn Provider>) -> Result<Session> {
    let registry = build_registry(&config.agent)?;

    let instruction = match &config.agent.system_instruction {
        Some(custom) => custom.clone(),
        None => build_system_instruction(current_os(), &registry.declarations()),
    };

    tracing::debug!(
        "Building session: provider={}, tools={:?}, budget={:?}",
        provider.name(),
        registry.names(),
        config.agent.session_budget()
    );

    Ok(Session::new(provider, registry)
        .with_system_instruction(instruction)
        .with_budget(config.agent.session_budget())
        .with_max_output_size(config.agent.tools.max_output_size))
}

fn describe_arguments(name: &str, arguments: &Value) -> String {
    match (name, arguments.get("command").and_then(Value::as_str)) {
        ("executeCommand", Some(command)) => format!("Executing: {}", command),
        _ => format!("Calling {} with {}", name, arguments),
    }
}

fn preview(payload: &str) -> String {
    let lines: Vec<&str> = payload.trim_end().lines().collect();
    if lines.len() <= TRANSCRIPT_PREVIEW_LINES {
        return lines.join("\n    ");
    }
    format!(
        "{}\n    ... ({} more lines)",
        lines[..TRANSCRIPT_PREVIEW_LINES].join("\n    "),
        lines.len() - TRANSCRIPT_PREVIEW_LINES
    )
}

/// Renders one session event as a transcript line
///
/// Returns `None` for events the transcript does not show; the final answer
/// is printed by the caller.
pub fn format_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::TaskStarted { .. } | SessionEvent::ModelRequested { .. } => None,
        SessionEvent::ToolInvoked {
            name, arguments, ..
        } => Some(format!(
            "{} {}",
            "→".cyan(),
            describe_arguments(name, arguments).cyan()
        )),
        SessionEvent::ToolCompleted {
            status,
            payload,
            truncated,
            ..
        } => {
            let tag = match status {
                ToolStatus::Success => "success".green(),
                ToolStatus::Error => "error".red(),
            };
            let body = if payload.trim().is_empty() {
                "(no output)".dimmed().to_string()
            } else {
                preview(payload)
            };
            let note = if *truncated {
                format!(" {}", "(truncated)".yellow())
            } else {
                String::new()
            };
            Some(format!("  [{}]{}\n    {}", tag, note, body))
        }
        SessionEvent::CandidatesDropped { count } => Some(
            format!("Ignoring {} additional tool call(s)", count)
                .yellow()
                .to_string(),
        ),
        SessionEvent::Finished {
            termination: Termination::Cancelled { reason },
        } => Some(format!("Task cancelled: {}", reason).yellow().to_string()),
        SessionEvent::Finished { .. } => None,
        SessionEvent::Failed { message } => {
            Some(format!("Completion failed: {}", message).red().to_string())
        }
    }
}

fn print_pending(events: &mut UnboundedReceiver<SessionEvent>) {
    while let Ok(event) = events.try_recv() {
        if let Some(line) = format_event(&event) {
            println!("{}", line);
        }
    }
}

/// Runs one task on `session`, printing the transcript as the loop advances
///
/// Ctrl-C while the task runs cancels it through a fresh cancellation token.
///
/// # Errors
///
/// Propagates session errors (completion failures, invalid state)
pub async fn drive_task(
    session: &mut Session,
    events: &mut UnboundedReceiver<SessionEvent>,
    task: &str,
) -> Result<Termination> {
    let token = CancellationToken::new();
    session.set_cancel_token(token.clone());
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let outcome: Result<Termination> = async {
        session.start(task)?;
        loop {
            let step = session.step().await;
            print_pending(events);
            if let Some(termination) = step? {
                return Ok(termination);
            }
        }
    }
    .await;

    interrupt.abort();
    outcome
}

// Chat command handler
pub mod chat {
    //! Interactive chat mode handler.
    //!
    //! Reads one task per line with rustyline and runs it on a long-lived
    //! session, so follow-up tasks see the earlier history. A session aborted
    //! by a completion failure is replaced by a fresh one.

    use super::*;
    use crate::agent::LoopState;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use tokio::sync::mpsc::unbounded_channel;

    /// Start interactive chat mode
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    ///
    /// # Errors
    ///
    /// Returns error if the provider, the tools or the line editor cannot be set up
    pub async fn run_chat(config: Config) -> Result<()> {
        tracing::info!("Starting interactive chat mode");

        let provider = create_provider(&config.provider)?;
        let (tx, mut rx) = unbounded_channel();
        let mut session = build_session(&config, provider.clone())?.with_event_tx(tx.clone());

        let mut rl = DefaultEditor::new()?;
        print_welcome_banner(provider.as_ref(), session.registry().len());

        loop {
            match rl.readline(&format!("{} ", "agentloop>".bold().green())) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if matches!(trimmed, "exit" | "quit") {
                        break;
                    }
                    let _ = rl.add_history_entry(trimmed);

                    if session.state() == LoopState::Aborted {
                        println!("{}", "Previous session failed; starting a new one.".yellow());
                        session =
                            build_session(&config, provider.clone())?.with_event_tx(tx.clone());
                    }

                    match drive_task(&mut session, &mut rx, trimmed).await {
                        Ok(Termination::Answered { text }) => println!("\n{}\n", text),
                        Ok(Termination::Cancelled { .. }) => println!(),
                        Err(e) => eprintln!("{}\n", format!("Error: {}", e).red()),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        let usage = session.usage();
        tracing::info!(
            "Chat finished: {} turns, {} tokens",
            session.history().len(),
            usage.total_tokens
        );
        println!("Goodbye!");
        Ok(())
    }

    fn print_welcome_banner(provider: &dyn Provider, tool_count: usize) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║              agentloop Interactive Mode - Welcome!           ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        println!(
            "Provider: {} ({})",
            provider.name().cyan(),
            provider.model().unwrap_or("default model")
        );
        if tool_count == 0 {
            println!("Tools:    {}", "none (direct answers)".yellow());
        } else {
            println!("Tools:    {}", tool_count);
        }
        println!("Type a task and press Enter. 'exit' or Ctrl-D quits.\n");
    }
}

// Run command handler
pub mod run {
    //! Single-task handler.

    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    /// Run one task and print the transcript followed by the answer
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `prompt` - Task text
    ///
    /// # Errors
    ///
    /// Returns error if setup fails, the completion service fails, or the task
    /// is cancelled (`AgentLoopError::Cancelled`)
    pub async fn run_task(config: Config, prompt: String) -> Result<()> {
        tracing::info!("Running single task");

        let provider = create_provider(&config.provider)?;
        run_task_with_provider(&config, provider, &prompt).await
    }

    /// Same as [`run_task`] with an already constructed provider
    pub async fn run_task_with_provider(
        config: &Config,
        provider: Arc<dyn Provider>,
        prompt: &str,
    ) -> Result<()> {
        let (tx, mut rx) = unbounded_channel();
        let mut session = build_session(config, provider)?.with_event_tx(tx);

        println!("{} {}\n", "Task:".bold(), prompt);
        let termination = drive_task(&mut session, &mut rx, prompt).await;

        let usage = session.usage();
        if usage.total_tokens > 0 {
            tracing::info!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens,
                usage.completion_tokens,
                usage.total_tokens
            );
        }

        match termination? {
            Termination::Answered { text } => {
                println!("\n{}", text);
                Ok(())
            }
            Termination::Cancelled { reason } => Err(cancelled(reason)),
        }
    }

    fn cancelled(reason: CancelReason) -> anyhow::Error {
        AgentLoopError::Cancelled(reason.to_string()).into()
    }
}

// Tools command handler
pub mod tools {
    //! Lists the declarations the model is offered.

    use super::*;
    use crate::tools::ToolDeclaration;
    use prettytable::{cell, row, Table};

    /// Print the enabled tool declarations as a table or JSON
    ///
    /// # Errors
    ///
    /// Returns error if the registry cannot be built or JSON serialization fails
    pub fn list_tools(config: &Config, json: bool) -> Result<()> {
        let registry = build_registry(&config.agent)?;
        let declarations = registry.declarations();

        if json {
            println!("{}", declarations_json(&declarations)?);
        } else {
            output_tools_table(&declarations);
        }
        Ok(())
    }

    /// Renders declarations in the common function-calling JSON shape
    pub fn declarations_json(declarations: &[ToolDeclaration]) -> Result<String> {
        let values: Vec<Value> = declarations.iter().map(ToolDeclaration::to_json).collect();
        Ok(serde_json::to_string_pretty(&values).map_err(AgentLoopError::Serialization)?)
    }

    fn output_tools_table(declarations: &[ToolDeclaration]) {
        if declarations.is_empty() {
            println!("\nNo tools enabled; the model will answer directly.\n");
            return;
        }

        let mut table = Table::new();
        table.add_row(row!["Name", "Description", "Parameters"]);

        for declaration in declarations {
            let params = declaration
                .parameters
                .params()
                .iter()
                .map(|p| {
                    let marker = if p.required { "" } else { "?" };
                    format!("{}{}: {}", p.name, marker, p.kind.json_type())
                })
                .collect::<Vec<_>>()
                .join(", ");

            table.add_row(row![declaration.name, declaration.description, params]);
        }

        println!("\nAvailable tools:\n");
        table.printstd();
        println!();
    }
}
