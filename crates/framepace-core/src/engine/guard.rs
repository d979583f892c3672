use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::engine::registry::TaskCallback;
use crate::models::{SchedulerError, SchedulerErrorKind, TaskId};
use crate::task_context::run_as_task;

/// Runs a task callback inside a failure boundary. Both returned errors and
/// panics come back as `CallbackFailed`.
pub(crate) fn run_guarded(task_id: TaskId, callback: TaskCallback) -> Result<(), SchedulerError> {
    match catch_unwind(AssertUnwindSafe(|| run_as_task(task_id, callback))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(message)) => Err(SchedulerError::for_task(
            SchedulerErrorKind::CallbackFailed,
            task_id,
            message,
        )),
        Err(payload) => Err(SchedulerError::for_task(
            SchedulerErrorKind::CallbackFailed,
            task_id,
            format!("callback panicked: {}", panic_message(payload.as_ref())),
        )),
    }
}

pub(crate) fn log_failure(error: &SchedulerError) {
    tracing::error!(
        task_id = error.task.map(|task| task.0),
        kind = ?error.kind,
        message = %error.message,
        "scheduled task failed"
    );
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
