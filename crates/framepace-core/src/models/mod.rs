pub mod error;
pub mod mode;
pub mod task;

pub use error::{SchedulerError, SchedulerErrorKind, SchedulerResult};
pub use mode::{SchedulerSnapshot, SchedulingMode, Strategy, Visibility};
pub use task::{TaskId, TaskOptions, TaskPriority, TimerRequest, coerce_delay_ms};
