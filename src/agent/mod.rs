//! Agent module for agentloop
//!
//! This module contains the conversation history, the session state machine
//! and the event feed it emits.

pub mod core;
pub mod events;
pub mod history;

pub use self::core::{CancelReason, LoopState, Session, SessionBudget, Termination};
pub use events::SessionEvent;
pub use history::{History, Role, Turn, TurnContent};
