//! Work queue, worker pool and completion signalling.

pub mod completion;
pub mod context;
pub mod executor;
pub mod logger;
pub mod session;

pub use completion::CompletionSignal;
pub use context::TaskContext;
pub use executor::{ExecutionReport, Executor};
pub use logger::{init_log, LogTarget};
pub use session::{SessionStatus, TaskStatus};
