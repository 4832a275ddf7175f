//! File tools: `createFile`, `readFile` and `appendToFile`
//!
//! All three take paths relative to the session working directory. A missing
//! file is a recoverable error the model can react to, never a session failure.

use crate::error::{AgentLoopError, Result};
use crate::tools::file_utils::{check_file_size, ensure_parent_dirs, PathValidator};
use crate::tools::{
    parse_args, ParamType, ParameterSchema, ToolDeclaration, ToolExecutor, ToolKind, ToolResult,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// Arguments of `createFile` and `appendToFile`
#[derive(Debug, Deserialize)]
struct WriteParams {
    path: String,
    content: String,
}

/// Arguments of `readFile`
#[derive(Debug, Deserialize)]
struct ReadParams {
    path: String,
}

/// Creates (or overwrites) a file, creating parent directories as needed
///
/// # Examples
///
/// ```
/// use agentloop::tools::file_ops::CreateFileTool;
/// use agentloop::tools::{ToolExecutor, ToolKind};
/// use std::path::PathBuf;
///
/// let tool = CreateFileTool::new(PathBuf::from("/project"));
/// assert_eq!(tool.kind(), ToolKind::CreateFile);
/// ```
pub struct CreateFileTool {
    validator: PathValidator,
}

impl CreateFileTool {
    /// Creates the tool rooted at `working_dir`
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            validator: PathValidator::new(working_dir),
        }
    }

    async fn run(&self, args: Value) -> Result<String> {
        let params: WriteParams = parse_args(ToolKind::CreateFile, args)?;
        let path = self.validator.resolve(&params.path)?;

        ensure_parent_dirs(&path).await?;
        tokio::fs::write(&path, params.content.as_bytes())
            .await
            .map_err(AgentLoopError::Io)?;

        tracing::debug!("Created file {}", path.display());
        Ok(format!("Created file at {}", params.path))
    }
}

#[async_trait]
impl ToolExecutor for CreateFileTool {
    fn kind(&self) -> ToolKind {
        ToolKind::CreateFile
    }

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            ToolKind::CreateFile,
            "Create a file with the given content. Parent directories are created \
             automatically; an existing file is overwritten.",
            ParameterSchema::new()
                .required(
                    "path",
                    ParamType::String,
                    "File path relative to the working directory",
                )
                .required("content", ParamType::String, "Full content of the file"),
        )
    }

    async fn execute(&self, args: Value) -> ToolResult {
        ToolResult::from_outcome(self.run(args).await)
    }
}

/// Reads the full contents of a text file
pub struct ReadFileTool {
    validator: PathValidator,
    max_file_size: u64,
}

impl ReadFileTool {
    /// Creates the tool rooted at `working_dir`, refusing files larger than `max_file_size` bytes
    pub fn new(working_dir: PathBuf, max_file_size: u64) -> Self {
        Self {
            validator: PathValidator::new(working_dir),
            max_file_size,
        }
    }

    async fn run(&self, args: Value) -> Result<String> {
        let params: ReadParams = parse_args(ToolKind::ReadFile, args)?;
        let path = self.validator.resolve(&params.path)?;

        if !path.exists() {
            return Err(AgentLoopError::Tool(format!("File not found: {}", params.path)).into());
        }
        if path.is_dir() {
            return Err(AgentLoopError::Tool(format!(
                "Path is a directory, not a file: {}",
                params.path
            ))
            .into());
        }

        check_file_size(&path, self.max_file_size).await?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(AgentLoopError::Io)?;
        Ok(content)
    }
}

#[async_trait]
impl ToolExecutor for ReadFileTool {
    fn kind(&self) -> ToolKind {
        ToolKind::ReadFile
    }

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            ToolKind::ReadFile,
            "Read the contents of a text file.",
            ParameterSchema::new().required(
                "path",
                ParamType::String,
                "File path relative to the working directory",
            ),
        )
    }

    async fn execute(&self, args: Value) -> ToolResult {
        ToolResult::from_outcome(self.run(args).await)
    }
}

/// Appends content to an existing file
pub struct AppendToFileTool {
    validator: PathValidator,
}

impl AppendToFileTool {
    /// Creates the tool rooted at `working_dir`
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            validator: PathValidator::new(working_dir),
        }
    }

    async fn run(&self, args: Value) -> Result<String> {
        let params: WriteParams = parse_args(ToolKind::AppendToFile, args)?;
        let path = self.validator.resolve(&params.path)?;

        if !path.is_file() {
            return Err(AgentLoopError::Tool(format!("File not found: {}", params.path)).into());
        }

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(AgentLoopError::Io)?;
        file.write_all(params.content.as_bytes())
            .await
            .map_err(AgentLoopError::Io)?;
        file.flush().await.map_err(AgentLoopError::Io)?;

        Ok(format!("Appended content to {}", params.path))
    }
}

#[async_trait]
impl ToolExecutor for AppendToFileTool {
    fn kind(&self) -> ToolKind {
        ToolKind::AppendToFile
    }

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            ToolKind::AppendToFile,
            "Append content to the end of an existing file.",
            ParameterSchema::new()
                .required(
                    "path",
                    ParamType::String,
                    "File path relative to the working directory",
                )
                .required("content", ParamType::String, "Content to append"),
        )
    }

    async fn execute(&self, args: Value) -> ToolResult {
        ToolResult::from_outcome(self.run(args).await)
    }
}
