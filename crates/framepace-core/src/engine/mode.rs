use std::rc::Rc;

use crate::engine::{EngineState, Shared, cooperative, cycle};
use crate::host::{FrameHandle, Host, TimerHandle};
use crate::models::{SchedulingMode, Strategy, Visibility};

/// The active driver together with whatever host registration it holds.
pub(crate) enum Driver {
    Idle,
    FramePaced { frame: Option<FrameHandle> },
    Cooperative,
    IntervalFallback { timer: Option<TimerHandle> },
}

impl Driver {
    fn for_mode(mode: SchedulingMode) -> Self {
        match mode {
            SchedulingMode::Idle => Driver::Idle,
            SchedulingMode::FramePaced => Driver::FramePaced { frame: None },
            SchedulingMode::Cooperative => Driver::Cooperative,
            SchedulingMode::IntervalFallback => Driver::IntervalFallback { timer: None },
        }
    }

    pub(crate) fn mode(&self) -> SchedulingMode {
        match self {
            Driver::Idle => SchedulingMode::Idle,
            Driver::FramePaced { .. } => SchedulingMode::FramePaced,
            Driver::Cooperative => SchedulingMode::Cooperative,
            Driver::IntervalFallback { .. } => SchedulingMode::IntervalFallback,
        }
    }

    /// Forgets a registration that has just fired.
    pub(crate) fn disarm(&mut self) {
        match self {
            Driver::FramePaced { frame } => *frame = None,
            Driver::IntervalFallback { timer } => *timer = None,
            Driver::Idle | Driver::Cooperative => {}
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct ModeInputs {
    pub(crate) batched_pending: usize,
    pub(crate) strategy: Strategy,
    pub(crate) visibility: Visibility,
    pub(crate) cooperative_available: bool,
}

pub(crate) fn select_mode(inputs: ModeInputs) -> SchedulingMode {
    if inputs.batched_pending == 0 {
        return SchedulingMode::Idle;
    }
    if inputs.strategy == Strategy::Responsiveness && inputs.cooperative_available {
        return SchedulingMode::Cooperative;
    }
    if inputs.visibility == Visibility::Visible {
        return SchedulingMode::FramePaced;
    }
    if inputs.cooperative_available {
        SchedulingMode::Cooperative
    } else {
        SchedulingMode::IntervalFallback
    }
}

/// Recomputes the mode from current engine and host state and moves there.
pub(crate) fn reselect(shared: &Rc<Shared>) {
    let target = {
        let state = shared.state.borrow();
        if state.shut_down {
            return;
        }
        select_mode(ModeInputs {
            batched_pending: state.registry.batched_len(),
            strategy: state.config.primary_strategy,
            visibility: shared.host.visibility(),
            cooperative_available: shared.host.capabilities().cooperative_tasks,
        })
    };
    transition(shared, target);
}

fn transition(shared: &Rc<Shared>, target: SchedulingMode) {
    let previous = {
        let mut state = shared.state.borrow_mut();
        let previous = state.driver.mode();
        if previous != target {
            stop_driver(shared.host.as_ref(), &mut state);
            state.driver = Driver::for_mode(target);
        }
        arm(shared, &mut state);
        previous
    };
    if previous != target && shared.logging_enabled() {
        tracing::debug!(from = ?previous, to = ?target, "scheduling mode changed");
    }
}

/// Ensures the current driver has a registration outstanding.
pub(crate) fn ensure_armed(shared: &Rc<Shared>) {
    let mut state = shared.state.borrow_mut();
    arm(shared, &mut state);
}

fn arm(shared: &Rc<Shared>, state: &mut EngineState) {
    if matches!(state.driver, Driver::Cooperative) {
        cooperative::enroll_pending(shared, state);
        return;
    }
    let tick = state.config.background_tick();
    match &mut state.driver {
        Driver::FramePaced { frame } if frame.is_none() => {
            *frame = Some(cycle::request_frame(shared));
        }
        Driver::IntervalFallback { timer } if timer.is_none() => {
            *timer = Some(cycle::arm_interval(shared, tick));
        }
        _ => {}
    }
}

/// Cancels the active driver's registration and any in-flight cooperative
/// dispatches, leaving the engine idle.
pub(crate) fn stop_driver(host: &dyn Host, state: &mut EngineState) {
    match std::mem::replace(&mut state.driver, Driver::Idle) {
        Driver::FramePaced { frame: Some(handle) } => host.cancel_frame(handle),
        Driver::IntervalFallback {
            timer: Some(handle),
        } => host.clear_timeout(handle),
        Driver::Cooperative => state.registry.abort_cooperative_dispatches(),
        _ => {}
    }
}
