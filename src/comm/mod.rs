//! Per-provider request/reply orchestration.

mod communicator;
mod error;
mod escalation;

pub use communicator::{AskOutcome, AskState, Communicator, SessionStatus};
pub use error::AskError;
pub use escalation::{FixedAction, TerminalPrompt, TimeoutAction, TimeoutPrompt};
