use thiserror::Error;

use crate::models::TaskId;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SchedulerErrorKind {
    HostUnsupported,
    ConfigInvalid,
    InterceptionConflict,
    CallbackFailed,
    DispatchFailed,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind:?}: {message}")]
pub struct SchedulerError {
    pub kind: SchedulerErrorKind,
    pub task: Option<TaskId>,
    pub message: String,
}

impl SchedulerError {
    pub fn new(kind: SchedulerErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            task: None,
            message: message.into(),
        }
    }

    pub fn for_task(kind: SchedulerErrorKind, task: TaskId, message: impl Into<String>) -> Self {
        Self {
            kind,
            task: Some(task),
            message: message.into(),
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
