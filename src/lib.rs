//! Browser agent that turns a natural-language goal into DOM actions.
//!
//! One attempt runs five phases in order: recall past attempts, analyze the
//! page, plan steps with a remote model, act on the page and learn from the
//! outcome. [`retry::RetryController`] wraps attempts with bounded retries and
//! [`agent::Agent`] is the entry point that wires everything together.

pub mod actions;
pub mod agent;
pub mod bridge;
pub mod chrome;
pub mod clients;
pub mod config;
pub mod cursor;
pub mod dom;
pub mod engine;
pub mod error;
pub mod locator;
pub mod orchestrator;
pub mod retry;
pub mod session;
pub mod simulated;
pub mod snapshot;
pub mod types;

pub use agent::Agent;
pub use config::AgentConfig;
pub use error::{AgentError, ErrorKind};
pub use types::{
    ActionStep, ElementDescriptor, ExecutionPlan, ExecutionResult, MemoryEntry, ReasoningResult,
};
