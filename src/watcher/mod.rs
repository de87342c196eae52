//! File change detection for reply waits.
//!
//! A single blocking primitive, [`ChangeWatcher::wait_for_change`], that the
//! readers call between extraction attempts.
//!
//! # Architecture
//!
//! ```text
//! ChangeWatcher
//!   - notify::RecommendedWatcher armed on one path at a time
//!   - re-armed when the path changes or the file is replaced
//!   - timed polling when notification is unavailable
//! ```

mod change;
mod error;

pub use change::{ChangeWatcher, WaitOutcome};
pub use error::WatchError;
