use std::rc::Rc;

use crate::engine::{Shared, guard, mode};

/// Stops the active driver and re-registers every pending task on the host's
/// native timer with its remaining delay. The registry is left empty.
///
/// A task whose callback is executing at this moment is dropped from the
/// registry without being re-registered; it is already running.
pub(crate) fn hand_off_pending(shared: &Rc<Shared>) {
    let (entries, now) = {
        let mut state = shared.state.borrow_mut();
        mode::stop_driver(shared.host.as_ref(), &mut state);
        (state.registry.drain(), shared.host.now())
    };
    if entries.is_empty() {
        return;
    }

    let mut handed_off = 0usize;
    for mut entry in entries {
        if let Some(handle) = entry.driver_handle.take() {
            handle.release(shared.host.as_ref());
        }
        let Some(callback) = entry.callback.take() else {
            continue;
        };
        let task_id = entry.id;
        let weak = Rc::downgrade(shared);
        shared.host.set_timeout(
            entry.execute_at.saturating_sub(now),
            Box::new(move || {
                if let Err(error) = guard::run_guarded(task_id, callback) {
                    match weak.upgrade() {
                        Some(shared) => shared.report(error),
                        None => guard::log_failure(&error),
                    }
                }
            }),
        );
        handed_off += 1;
    }

    if shared.logging_enabled() {
        tracing::debug!(handed_off, "pending tasks handed off to native timers");
    }
    shared.publish_pending();
}
