pub mod backoff;
pub mod cli;
pub mod comm;
pub mod config;
pub mod dispatch;
pub mod io;
pub mod logging;
pub mod reader;
pub mod session;
pub mod types;
pub mod watcher;

pub use backoff::Backoff;
pub use comm::{AskError, AskOutcome, AskState, Communicator, TimeoutAction};
pub use config::Settings;
pub use dispatch::{DispatchReport, DispatchResult, Dispatcher};
pub use reader::{Checkpoint, Polled, ReaderError, ReplyReader};
pub use types::{Conversation, OutputMode, Provider, RecordFormat, Reply};
pub use watcher::{ChangeWatcher, WaitOutcome};
