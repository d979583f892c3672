use std::rc::Rc;
use std::time::Duration;

use crate::engine::budget::BudgetAdjustment;
use crate::engine::{Shared, mode};
use crate::host::{FrameHandle, TimerHandle};
use crate::models::{SchedulingMode, TaskId};

pub(crate) fn request_frame(shared: &Rc<Shared>) -> FrameHandle {
    let weak = Rc::downgrade(shared);
    shared.host.request_frame(Box::new(move || {
        if let Some(shared) = weak.upgrade() {
            run_cycle(&shared, SchedulingMode::FramePaced);
        }
    }))
}

pub(crate) fn arm_interval(shared: &Rc<Shared>, tick: Duration) -> TimerHandle {
    let weak = Rc::downgrade(shared);
    shared.host.set_timeout(
        tick,
        Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                run_cycle(&shared, SchedulingMode::IntervalFallback);
            }
        }),
    )
}

/// One tick of the batched registry, invoked by the driver for `origin`.
///
/// User-visible due tasks run first, up to the task budget. Background due
/// tasks follow only while the cycle is still inside its time budget. The
/// pending count is published once, after the pass.
pub(crate) fn run_cycle(shared: &Rc<Shared>, origin: SchedulingMode) {
    let started = shared.host.now();
    let (due, task_budget, time_budget) = {
        let mut state = shared.state.borrow_mut();
        if state.driver.mode() != origin {
            return;
        }
        state.driver.disarm();
        (
            state.registry.due_batched(started),
            state.budget.tasks_per_frame(),
            state.budget.frame_time_budget(),
        )
    };

    let mut executed = 0usize;
    for task_id in due.user_visible {
        if executed >= task_budget {
            break;
        }
        if execute_batched(shared, task_id) {
            executed += 1;
        }
    }
    for task_id in due.background {
        if executed >= task_budget || shared.host.now().saturating_sub(started) >= time_budget {
            break;
        }
        if execute_batched(shared, task_id) {
            executed += 1;
        }
    }

    let elapsed = shared.host.now().saturating_sub(started);
    let adjustment = if origin == SchedulingMode::FramePaced {
        shared.state.borrow_mut().budget.record_cycle(elapsed)
    } else {
        BudgetAdjustment::Unchanged
    };
    if shared.logging_enabled() {
        tracing::debug!(
            mode = ?origin,
            executed,
            elapsed_us = elapsed.as_micros() as u64,
            "execution cycle finished"
        );
        if adjustment != BudgetAdjustment::Unchanged {
            tracing::debug!(?adjustment, "tasks-per-frame budget adjusted");
        }
    }

    shared.publish_pending();

    let (still_driving, remaining) = {
        let state = shared.state.borrow();
        (state.driver.mode() == origin, state.registry.batched_len())
    };
    if !still_driving {
        return;
    }
    if remaining == 0 {
        mode::reselect(shared);
    } else {
        mode::ensure_armed(shared);
    }
}

/// Runs one batched task; the entry is removed only after the callback
/// returns. Returns `false` when the task was cancelled or claimed since the
/// due scan.
fn execute_batched(shared: &Rc<Shared>, task_id: TaskId) -> bool {
    let callback = {
        let mut state = shared.state.borrow_mut();
        match state.registry.get_mut(task_id) {
            Some(entry) if entry.batching && entry.driver_handle.is_none() => {
                entry.callback.take()
            }
            _ => None,
        }
    };
    let Some(callback) = callback else {
        return false;
    };
    shared.execute(task_id, callback);
    shared.state.borrow_mut().registry.remove(task_id);
    true
}
