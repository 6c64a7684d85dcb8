//! CLI command handlers. Each command is in its own file.

mod add;
mod cookies;
mod run;
mod show_config;
mod status;
mod task_control;

pub use add::run_add;
pub use cookies::{run_cookies, CookieArgs};
pub use run::{run_queue, QueueArgs};
pub use show_config::run_show_config;
pub use status::run_status;
pub use task_control::{run_task_command, TaskAction};
