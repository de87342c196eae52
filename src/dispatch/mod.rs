//! Concurrent fan-out of one message to several providers.

mod dispatcher;
mod error;

pub use dispatcher::{DispatchReport, DispatchResult, Dispatcher};
pub use error::DispatchError;
