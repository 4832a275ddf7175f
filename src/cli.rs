//! Command-line interface definition for agentloop
//!
//! This module defines the CLI structure using clap's derive API.

use clap::{Parser, Subcommand};

/// agentloop - tool-augmented conversational agent
///
/// Hands a natural-language task to a completion service and lets the model
/// drive local tools (shell, files, arithmetic) until it answers in plain text.
#[derive(Parser, Debug, Clone)]
#[command(name = "agentloop")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the provider from config (gemini, ollama)
    #[arg(long, global = true)]
    pub provider: Option<String>,

    /// Maximum model calls per task
    #[arg(long, global = true)]
    pub max_turns: Option<usize>,

    /// Wall-clock budget per task, in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for agentloop
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the interactive prompt, one task per line
    Chat,

    /// Run a single task and print the transcript
    Run {
        /// Task to hand to the agent
        #[arg(short, long)]
        prompt: String,
    },

    /// Print the tool declarations sent to the model
    Tools {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
