//! Builds the per-session tool registry from configuration

use crate::config::{AgentConfig, TerminalConfig, ToolsConfig};
use crate::error::Result;
use crate::tools::file_ops::{AppendToFileTool, CreateFileTool, ReadFileTool};
use crate::tools::math::{IsPrimeTool, SumTool};
use crate::tools::terminal::ExecuteCommandTool;
use crate::tools::{ToolExecutor, ToolKind, ToolRegistry};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Creates the executor for one tool variant
pub fn create_tool(
    kind: ToolKind,
    working_dir: &Path,
    tools: &ToolsConfig,
    terminal: &TerminalConfig,
) -> Arc<dyn ToolExecutor> {
    let dir = working_dir.to_path_buf();
    match kind {
        ToolKind::ExecuteCommand => Arc::new(ExecuteCommandTool::new(
            dir,
            Duration::from_secs(terminal.timeout_seconds),
            terminal.allow_dangerous,
        )),
        ToolKind::CreateFile => Arc::new(CreateFileTool::new(dir)),
        ToolKind::ReadFile => Arc::new(ReadFileTool::new(dir, tools.max_file_size)),
        ToolKind::AppendToFile => Arc::new(AppendToFileTool::new(dir)),
        ToolKind::Sum => Arc::new(SumTool),
        ToolKind::IsPrime => Arc::new(IsPrimeTool),
    }
}

/// Registers every enabled tool, in the configured order
///
/// An empty `enabled` list yields an empty registry (direct-answer mode).
///
/// # Errors
///
/// Returns `AgentLoopError::DuplicateTool` if a tool is listed twice, or an IO
/// error if the working directory cannot be determined
///
/// # Examples
///
/// ```
/// use agentloop::config::AgentConfig;
/// use agentloop::tools::build_registry;
///
/// let registry = build_registry(&AgentConfig::default()).unwrap();
/// assert_eq!(registry.len(), 6);
/// ```
pub fn build_registry(config: &AgentConfig) -> Result<ToolRegistry> {
    let working_dir = config.tools.resolved_working_dir()?;
    let mut registry = ToolRegistry::new();

    for kind in &config.tools.enabled {
        registry.register(create_tool(
            *kind,
            &working_dir,
            &config.tools,
            &config.terminal,
        ))?;
    }

    tracing::debug!(
        "Built tool registry in {}: {:?}",
        working_dir.display(),
        registry.names()
    );
    Ok(registry)
}
