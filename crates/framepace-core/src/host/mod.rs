//! Host primitives the engine drives.
//!
//! A host is the single-threaded event loop the engine is embedded in. Every
//! callback handed to a host must be invoked later, from the loop itself, and
//! never synchronously from inside the registering call.

pub mod manual;
pub mod tokio_host;

pub use manual::ManualHost;
pub use tokio_host::TokioHost;

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use crate::models::{TaskId, TaskPriority, TimerRequest, Visibility};

pub type HostCallback = Box<dyn FnOnce()>;
pub type DispatchCallback = Box<dyn FnOnce(DispatchOutcome)>;
pub type VisibilityCallback = Rc<dyn Fn(Visibility)>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct FrameHandle(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct TimerHandle(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ObserverHandle(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HostCapabilities {
    pub monotonic_clock: bool,
    pub frame_callbacks: bool,
    pub cooperative_tasks: bool,
    pub idle_callbacks: bool,
}

impl HostCapabilities {
    pub const FULL: Self = Self {
        monotonic_clock: true,
        frame_callbacks: true,
        cooperative_tasks: true,
        idle_callbacks: true,
    };

    pub fn without_cooperative_tasks(mut self) -> Self {
        self.cooperative_tasks = false;
        self
    }
}

/// How a cooperative dispatch ended, as reported by the host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DispatchOutcome {
    Ran,
    Aborted,
    Failed(String),
}

/// Abort signal attached to a single cooperative dispatch. The host checks it
/// immediately before invoking the dispatch; once invoked it has no effect.
#[derive(Clone, Debug, Default)]
pub struct CooperativeToken {
    aborted: Rc<Cell<bool>>,
}

impl CooperativeToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.aborted.set(true);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.get()
    }

    pub fn same_dispatch(&self, other: &CooperativeToken) -> bool {
        Rc::ptr_eq(&self.aborted, &other.aborted)
    }
}

/// Replacement for the host's ambient delayed-invocation entry points.
///
/// A hook that refuses a call hands the callback back so the host can fall
/// back to its native timer.
pub trait TimerHooks {
    fn set_timeout(
        &self,
        request: TimerRequest,
        callback: HostCallback,
    ) -> Result<TaskId, HostCallback>;

    fn clear_timeout(&self, task_id: TaskId);
}

pub trait Host {
    fn capabilities(&self) -> HostCapabilities;

    fn now(&self) -> Duration;

    fn request_frame(&self, callback: HostCallback) -> FrameHandle;

    fn cancel_frame(&self, handle: FrameHandle);

    fn post_task(
        &self,
        priority: TaskPriority,
        delay: Duration,
        token: CooperativeToken,
        callback: DispatchCallback,
    );

    fn set_timeout(&self, delay: Duration, callback: HostCallback) -> TimerHandle;

    fn clear_timeout(&self, handle: TimerHandle);

    fn visibility(&self) -> Visibility;

    fn observe_visibility(&self, callback: VisibilityCallback) -> ObserverHandle;

    fn unobserve_visibility(&self, handle: ObserverHandle);

    /// Routes the ambient entry points through `hooks`. Returns `false` when
    /// another set of hooks is already installed.
    fn install_timer_hooks(&self, hooks: Rc<dyn TimerHooks>) -> bool;

    fn remove_timer_hooks(&self);
}

/// Result of calling an ambient `set_timeout` entry point.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AmbientTimer {
    Intercepted(TaskId),
    Native(TimerHandle),
}

pub(crate) fn route_ambient_timeout(
    host: &dyn Host,
    hooks: Option<Rc<dyn TimerHooks>>,
    request: TimerRequest,
    callback: HostCallback,
) -> AmbientTimer {
    let callback = match hooks {
        Some(hooks) => match hooks.set_timeout(request, callback) {
            Ok(task_id) => return AmbientTimer::Intercepted(task_id),
            Err(callback) => callback,
        },
        None => callback,
    };
    AmbientTimer::Native(host.set_timeout(request.delay, callback))
}

/// Clearing an intercepted timer after its hooks were removed is a no-op: the
/// task has already been handed to a native timer under a new handle.
pub(crate) fn route_ambient_clear(
    host: &dyn Host,
    hooks: Option<Rc<dyn TimerHooks>>,
    timer: AmbientTimer,
) {
    match timer {
        AmbientTimer::Intercepted(task_id) => {
            if let Some(hooks) = hooks {
                hooks.clear_timeout(task_id);
            }
        }
        AmbientTimer::Native(handle) => host.clear_timeout(handle),
    }
}
