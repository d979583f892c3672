use std::rc::{Rc, Weak};

use crate::engine::{Shared, cancel_task, schedule_task};
use crate::host::{HostCallback, TimerHooks};
use crate::models::{
    SchedulerError, SchedulerErrorKind, SchedulerResult, TaskId, TaskOptions, TimerRequest,
};

/// Classifies an intercepted ambient call. The request's delay always wins
/// over the delay in the returned options.
pub type TimerClassifier = Rc<dyn Fn(&TimerRequest) -> TaskOptions>;

/// Single owner of the host's ambient timer entry points while intercepting.
#[derive(Default)]
pub(crate) struct InterceptionBoundary {
    installed: bool,
}

impl InterceptionBoundary {
    pub(crate) fn is_installed(&self) -> bool {
        self.installed
    }
}

struct SchedulerHooks {
    shared: Weak<Shared>,
    classify: Option<TimerClassifier>,
}

impl TimerHooks for SchedulerHooks {
    fn set_timeout(
        &self,
        request: TimerRequest,
        callback: HostCallback,
    ) -> Result<TaskId, HostCallback> {
        let Some(shared) = self.shared.upgrade() else {
            return Err(callback);
        };
        if shared.state.borrow().shut_down {
            return Err(callback);
        }
        let options = self
            .classify
            .as_ref()
            .map_or_else(TaskOptions::default, |classify| classify(&request))
            .with_delay(request.delay);
        Ok(schedule_task(
            &shared,
            Box::new(move || {
                callback();
                Ok(())
            }),
            options,
        ))
    }

    fn clear_timeout(&self, task_id: TaskId) {
        if let Some(shared) = self.shared.upgrade() {
            cancel_task(&shared, task_id);
        }
    }
}

pub(crate) fn install(
    shared: &Rc<Shared>,
    classify: Option<TimerClassifier>,
) -> SchedulerResult<()> {
    {
        let state = shared.state.borrow();
        if state.interception.installed {
            return Ok(());
        }
        if state.shut_down {
            tracing::warn!("scheduler is shut down; ambient timer entry points left untouched");
            return Ok(());
        }
    }
    let hooks = Rc::new(SchedulerHooks {
        shared: Rc::downgrade(shared),
        classify,
    });
    if !shared.host.install_timer_hooks(hooks) {
        return Err(SchedulerError::new(
            SchedulerErrorKind::InterceptionConflict,
            "ambient timer entry points are already intercepted by another scheduler",
        ));
    }
    shared.state.borrow_mut().interception.installed = true;
    if shared.logging_enabled() {
        tracing::debug!("ambient timer entry points intercepted");
    }
    Ok(())
}

/// Returns `false` when nothing was installed.
pub(crate) fn release(shared: &Rc<Shared>) -> bool {
    {
        let mut state = shared.state.borrow_mut();
        if !state.interception.installed {
            return false;
        }
        state.interception.installed = false;
    }
    shared.host.remove_timer_hooks();
    if shared.logging_enabled() {
        tracing::debug!("ambient timer entry points restored");
    }
    true
}
