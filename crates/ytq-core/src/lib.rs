pub mod config;
pub mod logging;

pub mod control;
pub mod error;
pub mod executable;
pub mod scheduler;
pub mod supervisor;
pub mod task;

pub use scheduler::Scheduler;
pub use supervisor::{Credentials, Executable, LaunchSettings};
pub use task::{Task, TaskId, TaskStatus};
