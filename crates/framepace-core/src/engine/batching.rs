use std::rc::Rc;
use std::time::Duration;

use crate::engine::Shared;
use crate::engine::registry::{DriverHandle, TaskEntry};
use crate::models::TaskId;

/// Arms the dedicated native timer for an unbatched task. It fires at the
/// nominal delay whatever the mode, visibility or budget.
pub(crate) fn arm_dedicated(shared: &Rc<Shared>, entry: &mut TaskEntry, delay: Duration) {
    let task_id = entry.id;
    let weak = Rc::downgrade(shared);
    let handle = shared.host.set_timeout(
        delay,
        Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                fire_dedicated(&shared, task_id);
            }
        }),
    );
    entry.driver_handle = Some(DriverHandle::Dedicated(handle));
}

fn fire_dedicated(shared: &Rc<Shared>, task_id: TaskId) {
    let callback = {
        let mut state = shared.state.borrow_mut();
        match state.registry.get_mut(task_id) {
            Some(entry) if !entry.batching => {
                entry.driver_handle = None;
                entry.callback.take()
            }
            _ => None,
        }
    };
    let Some(callback) = callback else {
        return;
    };
    shared.execute(task_id, callback);
    shared.state.borrow_mut().registry.remove(task_id);
    shared.publish_pending();
}
