//! agentloop - tool-augmented conversational agent library
//!
//! This library hands a natural-language task to a completion service and
//! lets the model drive local tools until it answers in plain text.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `agent`: Conversation history, the session state machine and its event feed
//! - `providers`: Completion-service abstraction and implementations (Gemini, Ollama, scripted)
//! - `tools`: Tool contract, registry, and the terminal, file and arithmetic tools
//! - `prompts`: System instruction construction
//! - `config`: Configuration management and validation
//! - `commands`: CLI command handlers
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use agentloop::agent::Session;
//! use agentloop::config::Config;
//! use agentloop::providers::create_provider;
//! use agentloop::tools::build_registry;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let provider = create_provider(&config.provider)?;
//!     let registry = build_registry(&config.agent)?;
//!     let mut session = Session::new(provider, registry);
//!     let termination = session.run("create a project folder named demo").await?;
//!     println!("{:?}", termination.answer());
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod prompts;
pub mod providers;
pub mod tools;

// Re-export commonly used types
pub use agent::{Session, SessionBudget, Termination};
pub use config::Config;
pub use error::{AgentLoopError, Result};
