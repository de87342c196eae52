//! Provider sessions: where they live, how to reach them, whether they are up.
//!
//! - [`SessionInfo`] is loaded from the environment or a per-project side file
//! - [`Transmit`] pushes a prompt into the provider's pane or pipe
//! - [`HealthCheck`] gates sends on the session being reachable
//! - [`BindingStore`] remembers which record file the session writes to

mod binding;
mod error;
mod health;
mod transmit;

pub use binding::{
    BindingStore, SessionBinding, SessionInfo, Terminal, extract_session_id,
};
pub use error::{SessionError, SessionResult, TransmitError};
pub use health::{HealthCheck, HealthStatus, SessionHealth, process_alive};
pub use transmit::{
    FifoTransmit, TmuxTransmit, Transmit, WeztermTransmit, correlation_marker, transmit_for,
};
