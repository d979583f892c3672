use std::rc::Rc;
use std::time::Duration;

use crate::engine::registry::{DriverHandle, TaskEntry};
use crate::engine::{EngineState, Shared, mode};
use crate::host::{CooperativeToken, DispatchOutcome};
use crate::models::{SchedulerError, SchedulerErrorKind, TaskId};

/// Posts every batched task that has no dispatch outstanding.
pub(crate) fn enroll_pending(shared: &Rc<Shared>, state: &mut EngineState) {
    let now = shared.host.now();
    for entry in state.registry.unenrolled_batched_mut() {
        enroll(shared, entry, now);
    }
}

pub(crate) fn enroll(shared: &Rc<Shared>, entry: &mut TaskEntry, now: Duration) {
    let token = CooperativeToken::new();
    let dispatch = token.clone();
    let task_id = entry.id;
    let weak = Rc::downgrade(shared);
    shared.host.post_task(
        entry.priority,
        entry.execute_at.saturating_sub(now),
        token.clone(),
        Box::new(move |outcome: DispatchOutcome| {
            if let Some(shared) = weak.upgrade() {
                on_dispatch(&shared, task_id, &dispatch, outcome);
            }
        }),
    );
    entry.driver_handle = Some(DriverHandle::Cooperative(token));
}

fn on_dispatch(
    shared: &Rc<Shared>,
    task_id: TaskId,
    token: &CooperativeToken,
    outcome: DispatchOutcome,
) {
    match outcome {
        DispatchOutcome::Aborted => {}
        DispatchOutcome::Failed(reason) => {
            let removed = {
                let mut state = shared.state.borrow_mut();
                state.registry.is_dispatch_current(task_id, token)
                    && state.registry.remove(task_id).is_some()
            };
            if !removed {
                return;
            }
            shared.report(SchedulerError::for_task(
                SchedulerErrorKind::DispatchFailed,
                task_id,
                reason,
            ));
            finish(shared);
        }
        DispatchOutcome::Ran => {
            let callback = {
                let mut state = shared.state.borrow_mut();
                if !state.registry.is_dispatch_current(task_id, token) {
                    return;
                }
                state.registry.get_mut(task_id).and_then(|entry| {
                    entry.driver_handle = None;
                    entry.callback.take()
                })
            };
            let Some(callback) = callback else {
                return;
            };
            shared.execute(task_id, callback);
            shared.state.borrow_mut().registry.remove(task_id);
            finish(shared);
        }
    }
}

fn finish(shared: &Rc<Shared>) {
    shared.publish_pending();
    let drained = shared.state.borrow().registry.batched_len() == 0;
    if drained {
        mode::reselect(shared);
    }
}
