use agentloop::agent::Session;
use agentloop::config::AgentConfig;
use agentloop::providers::{CompletionResponse, ScriptedProvider, ToolInvocationRequest};
use agentloop::tools::{build_registry, ToolKind};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Agent config whose tools run inside `dir`
#[allow(dead_code)]
pub fn agent_config_in(dir: &TempDir, enabled: Vec<ToolKind>) -> AgentConfig {
    let mut config = AgentConfig::default();
    config.tools.working_dir = Some(dir.path().to_path_buf());
    config.tools.enabled = enabled;
    config
}

/// Session driven by a scripted provider, with the given tools rooted in `dir`
#[allow(dead_code)]
pub fn scripted_session(
    dir: &TempDir,
    enabled: Vec<ToolKind>,
    script: Vec<CompletionResponse>,
) -> (Session, Arc<ScriptedProvider>) {
    let provider = Arc::new(ScriptedProvider::new(script));
    let registry = build_registry(&agent_config_in(dir, enabled)).expect("build registry");
    (Session::new(provider.clone(), registry), provider)
}

/// A response asking for one `executeCommand` call
#[allow(dead_code)]
pub fn command_call(id: &str, command: &str) -> CompletionResponse {
    CompletionResponse::tool_call(ToolInvocationRequest::with_id(
        id,
        "executeCommand",
        json!({ "command": command }),
    ))
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
