pub mod budget;
pub(crate) mod batching;
pub(crate) mod cooperative;
pub(crate) mod cycle;
pub(crate) mod guard;
pub mod interception;
pub(crate) mod mode;
pub mod pending;
pub(crate) mod registry;
pub(crate) mod teardown;

pub use budget::{BudgetAdjustment, BudgetController};
pub use interception::TimerClassifier;
pub use pending::PendingCountSink;

use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;

use tokio::sync::watch;

use crate::config::SchedulerConfig;
use crate::engine::interception::InterceptionBoundary;
use crate::engine::mode::Driver;
use crate::engine::pending::PendingCounter;
use crate::engine::registry::{TaskCallback, TaskRegistry};
use crate::host::{Host, ObserverHandle};
use crate::models::{
    SchedulerError, SchedulerErrorKind, SchedulerResult, SchedulerSnapshot, SchedulingMode,
    Strategy, TaskId, TaskOptions, TimerRequest, Visibility,
};

type ErrorObserver = Rc<dyn Fn(&SchedulerError)>;

pub(crate) struct EngineState {
    pub(crate) config: SchedulerConfig,
    pub(crate) registry: TaskRegistry,
    pub(crate) driver: Driver,
    pub(crate) budget: BudgetController,
    pub(crate) interception: InterceptionBoundary,
    pub(crate) visibility_observer: Option<ObserverHandle>,
    pub(crate) shut_down: bool,
}

pub(crate) struct Shared {
    pub(crate) host: Rc<dyn Host>,
    pub(crate) state: RefCell<EngineState>,
    pub(crate) pending: PendingCounter,
    error_observer: RefCell<Option<ErrorObserver>>,
    logging_enabled: bool,
}

impl Shared {
    pub(crate) fn logging_enabled(&self) -> bool {
        self.logging_enabled
    }

    pub(crate) fn publish_pending(&self) {
        let pending = self.state.borrow().registry.len();
        self.pending.publish(pending);
    }

    pub(crate) fn execute(&self, task_id: TaskId, callback: TaskCallback) {
        if let Err(error) = guard::run_guarded(task_id, callback) {
            self.report(error);
        }
    }

    pub(crate) fn report(&self, error: SchedulerError) {
        guard::log_failure(&error);
        let observer = self.error_observer.borrow().clone();
        if let Some(observer) = observer {
            observer(&error);
        }
    }
}

/// Cooperative timer scheduling engine.
///
/// Handles are cheap to clone and share one engine; all of them must stay on
/// the host's thread.
#[derive(Clone)]
pub struct Scheduler {
    shared: Rc<Shared>,
}

impl Scheduler {
    pub fn new(host: impl Host + 'static, config: SchedulerConfig) -> SchedulerResult<Self> {
        config.validate()?;
        let capabilities = host.capabilities();
        if !capabilities.monotonic_clock {
            return Err(SchedulerError::new(
                SchedulerErrorKind::HostUnsupported,
                "host does not provide a monotonic clock",
            ));
        }
        if !capabilities.frame_callbacks {
            return Err(SchedulerError::new(
                SchedulerErrorKind::HostUnsupported,
                "host does not provide frame callbacks",
            ));
        }

        let logging_enabled = config.logging_enabled;
        let shared = Rc::new(Shared {
            host: Rc::new(host),
            state: RefCell::new(EngineState {
                budget: BudgetController::new(&config),
                config,
                registry: TaskRegistry::default(),
                driver: Driver::Idle,
                interception: InterceptionBoundary::default(),
                visibility_observer: None,
                shut_down: false,
            }),
            pending: PendingCounter::new(),
            error_observer: RefCell::new(None),
            logging_enabled,
        });

        let weak = Rc::downgrade(&shared);
        let observer = shared.host.observe_visibility(Rc::new(move |visibility: Visibility| {
            if let Some(shared) = weak.upgrade() {
                if shared.logging_enabled() {
                    tracing::debug!(?visibility, "document visibility changed");
                }
                mode::reselect(&shared);
            }
        }));
        shared.state.borrow_mut().visibility_observer = Some(observer);
        mode::reselect(&shared);

        if logging_enabled {
            tracing::debug!(?capabilities, "scheduler constructed");
        }
        Ok(Self { shared })
    }

    pub fn with_defaults(host: impl Host + 'static) -> SchedulerResult<Self> {
        Self::new(host, SchedulerConfig::default())
    }

    pub fn schedule(&self, callback: impl FnOnce() + 'static, options: TaskOptions) -> TaskId {
        schedule_task(
            &self.shared,
            Box::new(move || {
                callback();
                Ok(())
            }),
            options,
        )
    }

    /// Like `schedule`, but an `Err` from the callback is reported as a
    /// callback failure.
    pub fn schedule_fallible<E: Display>(
        &self,
        callback: impl FnOnce() -> Result<(), E> + 'static,
        options: TaskOptions,
    ) -> TaskId {
        schedule_task(
            &self.shared,
            Box::new(move || callback().map_err(|error| error.to_string())),
            options,
        )
    }

    /// Unknown or already finished ids are ignored.
    pub fn cancel(&self, task_id: TaskId) {
        cancel_task(&self.shared, task_id);
    }

    /// Idempotent. Once the scheduler is shut down the ambient entry points
    /// are left alone.
    pub fn intercept_global_timers(&self) -> SchedulerResult<()> {
        interception::install(&self.shared, None)
    }

    pub fn intercept_global_timers_with(
        &self,
        classify: impl Fn(&TimerRequest) -> TaskOptions + 'static,
    ) -> SchedulerResult<()> {
        interception::install(&self.shared, Some(Rc::new(classify)))
    }

    /// Restores the ambient entry points and hands every pending task to the
    /// host's native timer. A no-op when not intercepting.
    pub fn release_global_timers(&self) {
        if !self.shared.state.borrow().interception.is_installed() {
            return;
        }
        {
            let mut state = self.shared.state.borrow_mut();
            mode::stop_driver(self.shared.host.as_ref(), &mut state);
        }
        interception::release(&self.shared);
        teardown::hand_off_pending(&self.shared);
    }

    /// Releases interception, hands off anything still pending, detaches
    /// from visibility changes and closes the pending-count channel.
    /// Tasks scheduled afterwards go straight to the native timer.
    pub fn shutdown(&self) {
        if self.shared.state.borrow().shut_down {
            return;
        }
        self.release_global_timers();
        teardown::hand_off_pending(&self.shared);
        let observer = {
            let mut state = self.shared.state.borrow_mut();
            state.shut_down = true;
            state.visibility_observer.take()
        };
        if let Some(observer) = observer {
            self.shared.host.unobserve_visibility(observer);
        }
        self.shared.pending.complete();
        if self.shared.logging_enabled() {
            tracing::debug!("scheduler shut down");
        }
    }

    pub fn set_strategy(&self, strategy: Strategy) {
        {
            let mut state = self.shared.state.borrow_mut();
            if state.config.primary_strategy == strategy {
                return;
            }
            state.config.primary_strategy = strategy;
        }
        mode::reselect(&self.shared);
    }

    pub fn subscribe_pending(&self) -> watch::Receiver<usize> {
        self.shared.pending.subscribe()
    }

    pub fn add_pending_sink(&self, sink: Rc<dyn PendingCountSink>) {
        self.shared.pending.add_sink(sink);
    }

    /// Receives every callback and dispatch failure after it is logged.
    pub fn on_error(&self, observer: impl Fn(&SchedulerError) + 'static) {
        *self.shared.error_observer.borrow_mut() = Some(Rc::new(observer));
    }

    pub fn mode(&self) -> SchedulingMode {
        self.shared.state.borrow().driver.mode()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.state.borrow().registry.len()
    }

    pub fn tasks_per_frame(&self) -> usize {
        self.shared.state.borrow().budget.tasks_per_frame()
    }

    pub fn is_intercepting(&self) -> bool {
        self.shared.state.borrow().interception.is_installed()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.state.borrow().shut_down
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        let state = self.shared.state.borrow();
        SchedulerSnapshot {
            mode: state.driver.mode(),
            pending: state.registry.len(),
            batched_pending: state.registry.batched_len(),
            tasks_per_frame: state.budget.tasks_per_frame(),
            strategy: state.config.primary_strategy,
            intercepting: state.interception.is_installed(),
            shut_down: state.shut_down,
        }
    }
}

pub(crate) fn schedule_task(
    shared: &Rc<Shared>,
    callback: TaskCallback,
    options: TaskOptions,
) -> TaskId {
    let now = shared.host.now();
    let (task_id, needs_driver) = {
        let mut state = shared.state.borrow_mut();
        if state.shut_down {
            let task_id = state.registry.allocate_id();
            drop(state);
            return dispatch_detached(shared, task_id, callback, options);
        }
        let idle = state.driver.mode() == SchedulingMode::Idle;
        let cooperative = state.driver.mode() == SchedulingMode::Cooperative;
        let entry = state.registry.insert(
            callback,
            now.saturating_add(options.delay),
            options.priority,
            options.batching,
        );
        let task_id = entry.id;
        if !options.batching {
            batching::arm_dedicated(shared, entry, options.delay);
            (task_id, false)
        } else if cooperative {
            cooperative::enroll(shared, entry, now);
            (task_id, false)
        } else {
            (task_id, idle)
        }
    };
    shared.publish_pending();
    if needs_driver {
        mode::reselect(shared);
    }
    task_id
}

fn dispatch_detached(
    shared: &Rc<Shared>,
    task_id: TaskId,
    callback: TaskCallback,
    options: TaskOptions,
) -> TaskId {
    tracing::warn!(
        task_id = task_id.0,
        "scheduler is shut down; dispatching task on the native timer"
    );
    shared.host.set_timeout(
        options.delay,
        Box::new(move || {
            if let Err(error) = guard::run_guarded(task_id, callback) {
                guard::log_failure(&error);
            }
        }),
    );
    task_id
}

pub(crate) fn cancel_task(shared: &Rc<Shared>, task_id: TaskId) {
    let was_batched = {
        let mut state = shared.state.borrow_mut();
        let Some(mut entry) = state.registry.remove(task_id) else {
            return;
        };
        if let Some(handle) = entry.driver_handle.take() {
            handle.release(shared.host.as_ref());
        }
        entry.batching
    };
    shared.publish_pending();
    let needs_idle = {
        let state = shared.state.borrow();
        was_batched
            && state.registry.batched_len() == 0
            && state.driver.mode() != SchedulingMode::Idle
    };
    if needs_idle {
        mode::reselect(shared);
    }
}
