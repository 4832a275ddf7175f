//! Tools module for agentloop
//!
//! This module contains the tool contract, tool declarations, the tool result
//! type and the registry the agent loop dispatches through, plus the concrete
//! tool implementations (terminal, file operations, arithmetic).

pub mod file_ops;
pub mod file_utils;
pub mod math;
pub mod registry_builder;
pub mod terminal;

use crate::error::{AgentLoopError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use registry_builder::build_registry;

/// Closed set of tools the loop knows how to dispatch
///
/// The wire name of each variant is what the model sees in the declarations
/// and what it sends back in an invocation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolKind {
    /// Run a host shell command
    #[serde(rename = "executeCommand")]
    ExecuteCommand,
    /// Create (or overwrite) a file
    #[serde(rename = "createFile")]
    CreateFile,
    /// Read a file
    #[serde(rename = "readFile")]
    ReadFile,
    /// Append to an existing file
    #[serde(rename = "appendToFile")]
    AppendToFile,
    /// Add two numbers
    #[serde(rename = "sum")]
    Sum,
    /// Primality test
    #[serde(rename = "isPrime")]
    IsPrime,
}

impl ToolKind {
    /// Every tool variant, in the default registration order
    pub const ALL: [ToolKind; 6] = [
        ToolKind::ExecuteCommand,
        ToolKind::CreateFile,
        ToolKind::ReadFile,
        ToolKind::AppendToFile,
        ToolKind::Sum,
        ToolKind::IsPrime,
    ];

    /// Returns the wire name of the tool
    ///
    /// # Examples
    ///
    /// ```
    /// use agentloop::tools::ToolKind;
    ///
    /// assert_eq!(ToolKind::ExecuteCommand.name(), "executeCommand");
    /// ```
    pub fn name(&self) -> &'static str {
        match self {
            Self::ExecuteCommand => "executeCommand",
            Self::CreateFile => "createFile",
            Self::ReadFile => "readFile",
            Self::AppendToFile => "appendToFile",
            Self::Sum => "sum",
            Self::IsPrime => "isPrime",
        }
    }

    /// Resolves a wire name to a tool variant
    ///
    /// Returns `None` for names outside the closed set.
    ///
    /// # Examples
    ///
    /// ```
    /// use agentloop::tools::ToolKind;
    ///
    /// assert_eq!(ToolKind::from_name("readFile"), Some(ToolKind::ReadFile));
    /// assert_eq!(ToolKind::from_name("deleteEverything"), None);
    /// ```
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ToolKind {
    type Err = AgentLoopError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| AgentLoopError::UnknownTool(s.to_string()))
    }
}

/// Primitive parameter types a tool may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// UTF-8 string
    String,
    /// Floating point number
    Number,
    /// Whole number
    Integer,
    /// true / false
    Boolean,
}

impl ParamType {
    /// JSON-schema type name
    pub fn json_type(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    /// Parameter name as it appears in the argument map
    pub name: String,
    /// Primitive type
    pub kind: ParamType,
    /// Natural-language description shown to the model
    pub description: String,
    /// Whether the parameter is in the required subset
    pub required: bool,
}

/// Parameter schema of a tool: named parameters plus a required subset
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSchema {
    params: Vec<ParameterSpec>,
}

impl ParameterSchema {
    /// Creates an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a required parameter
    ///
    /// # Examples
    ///
    /// ```
    /// use agentloop::tools::{ParamType, ParameterSchema};
    ///
    /// let schema = ParameterSchema::new()
    ///     .required("path", ParamType::String, "File path");
    /// assert_eq!(schema.required_names(), vec!["path"]);
    /// ```
    pub fn required(mut self, name: &str, kind: ParamType, description: &str) -> Self {
        self.params.push(ParameterSpec {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: true,
        });
        self
    }

    /// Adds an optional parameter
    pub fn optional(mut self, name: &str, kind: ParamType, description: &str) -> Self {
        self.params.push(ParameterSpec {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: false,
        });
        self
    }

    /// All declared parameters in declaration order
    pub fn params(&self) -> &[ParameterSpec] {
        &self.params
    }

    /// Names of the required parameters
    pub fn required_names(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect()
    }

    /// Renders the schema as a JSON-schema object
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params {
            properties.insert(
                param.name.clone(),
                json!({
                    "type": param.kind.json_type(),
                    "description": param.description,
                }),
            );
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": self.required_names(),
        })
    }
}

/// Static metadata describing a tool to the completion service
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDeclaration {
    /// Unique tool name, equal to the registry key
    pub name: String,
    /// Natural-language description
    pub description: String,
    /// Parameter schema
    pub parameters: ParameterSchema,
}

impl ToolDeclaration {
    /// Creates a declaration for a tool variant
    pub fn new(
        kind: ToolKind,
        description: impl Into<String>,
        parameters: ParameterSchema,
    ) -> Self {
        Self {
            name: kind.name().to_string(),
            description: description.into(),
            parameters,
        }
    }

    /// Renders the declaration in the common function-calling JSON shape
    ///
    /// ```json
    /// {"name": "...", "description": "...", "parameters": {"type": "object", ...}}
    /// ```
    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters.to_json_schema(),
        })
    }
}

/// Outcome tag of a tool execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    /// The tool did what it was asked
    Success,
    /// The tool failed; the payload is a diagnostic
    Error,
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// Result of one tool execution
///
/// The status is carried as a tag; it is never encoded in the payload text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Success or error
    pub status: ToolStatus,
    /// Tool output on success, diagnostic on error
    pub payload: String,
    /// Whether the payload was truncated before entering the history
    #[serde(default)]
    pub truncated: bool,
}

impl ToolResult {
    /// Create a successful tool result
    pub fn success(payload: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Success,
            payload: payload.into(),
            truncated: false,
        }
    }

    /// Create a failed tool result
    pub fn error(diagnostic: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            payload: diagnostic.into(),
            truncated: false,
        }
    }

    /// Converts a fallible tool body into a result, turning the error into a diagnostic
    ///
    /// # Examples
    ///
    /// ```
    /// use agentloop::error::AgentLoopError;
    /// use agentloop::tools::{ToolResult, ToolStatus};
    ///
    /// let failed = ToolResult::from_outcome(Err(AgentLoopError::Tool("boom".to_string()).into()));
    /// assert_eq!(failed.status, ToolStatus::Error);
    /// assert_eq!(failed.payload, "boom");
    /// ```
    pub fn from_outcome(outcome: Result<String>) -> Self {
        match outcome {
            Ok(output) => Self::success(output),
            Err(err) => Self::error(diagnostic(&err)),
        }
    }

    /// True when the status is `Success`
    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    /// Truncate the payload if it exceeds the maximum size
    ///
    /// # Arguments
    ///
    /// * `max_size` - Maximum size in bytes
    pub fn truncate_if_needed(mut self, max_size: usize) -> Self {
        if self.payload.len() > max_size {
            let mut cut = max_size;
            while !self.payload.is_char_boundary(cut) {
                cut -= 1;
            }
            self.payload.truncate(cut);
            self.payload.push_str("\n... (truncated)");
            self.truncated = true;
        }
        self
    }
}

/// Human-readable diagnostic for a tool failure
///
/// Tool-level variants carry their message verbatim; everything else uses the
/// error's display form.
fn diagnostic(err: &anyhow::Error) -> String {
    match err.downcast_ref::<AgentLoopError>() {
        Some(AgentLoopError::Tool(message)) => message.clone(),
        Some(other) => other.to_string(),
        None => err.to_string(),
    }
}

/// Deserializes tool arguments into the tool's typed parameter struct
///
/// # Errors
///
/// Returns `AgentLoopError::InvalidArguments` if the arguments do not fit the schema
pub fn parse_args<T: DeserializeOwned>(kind: ToolKind, args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| {
        AgentLoopError::InvalidArguments {
            tool: kind.name().to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

/// Contract every pluggable tool satisfies
///
/// `execute` never fails out of band: any failure, including malformed
/// arguments, comes back as a `ToolResult` with `ToolStatus::Error`.
///
/// # Examples
///
/// ```no_run
/// use agentloop::tools::{ParameterSchema, ToolDeclaration, ToolExecutor, ToolKind, ToolResult};
/// use async_trait::async_trait;
/// use serde_json::Value;
///
/// struct AlwaysOk;
///
/// #[async_trait]
/// impl ToolExecutor for AlwaysOk {
///     fn kind(&self) -> ToolKind {
///         ToolKind::Sum
///     }
///
///     fn declaration(&self) -> ToolDeclaration {
///         ToolDeclaration::new(ToolKind::Sum, "Always succeeds", ParameterSchema::new())
///     }
///
///     async fn execute(&self, _args: Value) -> ToolResult {
///         ToolResult::success("ok")
///     }
/// }
/// ```
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// The registry key of this tool
    fn kind(&self) -> ToolKind;

    /// Declaration sent to the completion service
    fn declaration(&self) -> ToolDeclaration;

    /// Executes the tool with the given arguments
    async fn execute(&self, args: Value) -> ToolResult;
}

/// Registry of the tools available to one session
///
/// Keyed by [`ToolKind`]; declarations are reported in registration order.
pub struct ToolRegistry {
    order: Vec<ToolKind>,
    tools: HashMap<ToolKind, Arc<dyn ToolExecutor>>,
}

impl ToolRegistry {
    /// Create a new empty tool registry
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            tools: HashMap::new(),
        }
    }

    /// Register a tool executor
    ///
    /// # Errors
    ///
    /// - `AgentLoopError::DuplicateTool` if a tool of the same kind is registered
    /// - `AgentLoopError::Config` if the declaration name does not match the tool kind
    pub fn register(&mut self, executor: Arc<dyn ToolExecutor>) -> Result<()> {
        let kind = executor.kind();
        let declaration = executor.declaration();

        if declaration.name != kind.name() {
            return Err(AgentLoopError::Config(format!(
                "Declaration name '{}' does not match tool '{}'",
                declaration.name, kind
            ))
            .into());
        }

        if self.tools.contains_key(&kind) {
            return Err(AgentLoopError::DuplicateTool(kind.name().to_string()).into());
        }

        tracing::debug!("Registered tool: {}", kind);
        self.order.push(kind);
        self.tools.insert(kind, executor);
        Ok(())
    }

    /// Looks up a tool by wire name and runs it
    ///
    /// Names outside the closed tool set, or not registered in this session,
    /// produce an error result naming the unknown tool so the model can correct itself.
    pub async fn dispatch(&self, name: &str, args: Value) -> ToolResult {
        let executor = match ToolKind::from_name(name).and_then(|kind| self.tools.get(&kind)) {
            Some(executor) => executor,
            None => {
                tracing::warn!("Model requested unknown tool: {}", name);
                return ToolResult::error(format!(
                    "{}. Available tools: {}",
                    AgentLoopError::UnknownTool(name.to_string()),
                    self.names().join(", ")
                ));
            }
        };

        tracing::debug!("Dispatching tool: {}", name);
        executor.execute(args).await
    }

    /// Declarations of all registered tools, in registration order
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.order
            .iter()
            .filter_map(|kind| self.tools.get(kind))
            .map(|executor| executor.declaration())
            .collect()
    }

    /// Wire names of all registered tools, in registration order
    pub fn names(&self) -> Vec<&'static str> {
        self.order.iter().map(|kind| kind.name()).collect()
    }

    /// True if a tool of the given kind is registered
    pub fn contains(&self, kind: ToolKind) -> bool {
        self.tools.contains_key(&kind)
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
