use std::cell::Cell;

use crate::models::TaskId;

thread_local! {
    static RUNNING_TASK: Cell<Option<TaskId>> = const { Cell::new(None) };
}

/// Id of the scheduled task whose callback is executing on this thread.
pub fn current_task_id() -> Option<TaskId> {
    RUNNING_TASK.with(Cell::get)
}

struct RestoreOnDrop(Option<TaskId>);

impl Drop for RestoreOnDrop {
    fn drop(&mut self) {
        RUNNING_TASK.with(|slot| slot.set(self.0));
    }
}

pub(crate) fn run_as_task<R>(task_id: TaskId, operation: impl FnOnce() -> R) -> R {
    let _restore = RestoreOnDrop(RUNNING_TASK.with(|slot| slot.replace(Some(task_id))));
    operation()
}
