pub mod config;
pub mod engine;
pub mod host;
pub mod logging;
pub mod models;
pub(crate) mod task_context;

pub use config::SchedulerConfig;
pub use engine::{PendingCountSink, Scheduler};
pub use task_context::current_task_id;
