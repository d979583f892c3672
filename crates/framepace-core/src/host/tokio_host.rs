//! Host backed by a current-thread tokio runtime.
//!
//! Every primitive is a `spawn_local` task, so the host must be used from
//! inside a `tokio::task::LocalSet`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tokio::task::{AbortHandle, spawn_local, yield_now};
use tokio::time::{Instant, sleep};

use crate::host::{
    AmbientTimer, CooperativeToken, DispatchCallback, DispatchOutcome, FrameHandle, Host,
    HostCallback, HostCapabilities, ObserverHandle, TimerHandle, TimerHooks, VisibilityCallback,
    route_ambient_clear, route_ambient_timeout,
};
use crate::models::{TaskPriority, TimerRequest, Visibility};

pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Clone)]
pub struct TokioHost {
    inner: Rc<TokioHostState>,
}

struct TokioHostState {
    origin: Instant,
    frame_interval: Duration,
    next_handle: Cell<u64>,
    frames: RefCell<HashMap<u64, AbortHandle>>,
    timers: RefCell<HashMap<u64, AbortHandle>>,
    visibility: Cell<Visibility>,
    observers: RefCell<Vec<(u64, VisibilityCallback)>>,
    hooks: RefCell<Option<Rc<dyn TimerHooks>>>,
}

impl TokioHostState {
    fn next_handle(&self) -> u64 {
        let handle = self.next_handle.get().saturating_add(1);
        self.next_handle.set(handle);
        handle
    }
}

impl Default for TokioHost {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioHost {
    pub fn new() -> Self {
        Self::with_frame_interval(DEFAULT_FRAME_INTERVAL)
    }

    pub fn with_frame_interval(frame_interval: Duration) -> Self {
        Self {
            inner: Rc::new(TokioHostState {
                origin: Instant::now(),
                frame_interval,
                next_handle: Cell::new(0),
                frames: RefCell::new(HashMap::new()),
                timers: RefCell::new(HashMap::new()),
                visibility: Cell::new(Visibility::Visible),
                observers: RefCell::new(Vec::new()),
                hooks: RefCell::new(None),
            }),
        }
    }

    pub fn set_visibility(&self, visibility: Visibility) {
        if self.inner.visibility.replace(visibility) == visibility {
            return;
        }
        let observers = self
            .inner
            .observers
            .borrow()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect::<Vec<_>>();
        for observer in observers {
            observer(visibility);
        }
    }

    pub fn ambient_set_timeout(
        &self,
        request: TimerRequest,
        callback: impl FnOnce() + 'static,
    ) -> AmbientTimer {
        let hooks = self.inner.hooks.borrow().clone();
        route_ambient_timeout(self, hooks, request, Box::new(callback))
    }

    pub fn ambient_clear_timeout(&self, timer: AmbientTimer) {
        let hooks = self.inner.hooks.borrow().clone();
        route_ambient_clear(self, hooks, timer);
    }
}

impl Host for TokioHost {
    fn capabilities(&self) -> HostCapabilities {
        HostCapabilities {
            monotonic_clock: true,
            frame_callbacks: true,
            cooperative_tasks: true,
            idle_callbacks: false,
        }
    }

    fn now(&self) -> Duration {
        Instant::now().saturating_duration_since(self.inner.origin)
    }

    fn request_frame(&self, callback: HostCallback) -> FrameHandle {
        let id = self.inner.next_handle();
        let interval = self.inner.frame_interval;
        let state = Rc::downgrade(&self.inner);
        let join = spawn_local(async move {
            // Frames stop while hidden, as a display refresh callback would.
            loop {
                sleep(interval).await;
                let Some(state) = state.upgrade() else {
                    return;
                };
                if state.visibility.get() == Visibility::Visible {
                    state.frames.borrow_mut().remove(&id);
                    break;
                }
            }
            callback();
        });
        self.inner
            .frames
            .borrow_mut()
            .insert(id, join.abort_handle());
        FrameHandle(id)
    }

    fn cancel_frame(&self, handle: FrameHandle) {
        if let Some(abort) = self.inner.frames.borrow_mut().remove(&handle.0) {
            abort.abort();
        }
    }

    fn post_task(
        &self,
        priority: TaskPriority,
        delay: Duration,
        token: CooperativeToken,
        callback: DispatchCallback,
    ) {
        spawn_local(async move {
            if !delay.is_zero() {
                sleep(delay).await;
            }
            yield_now().await;
            if priority == TaskPriority::Background {
                yield_now().await;
            }
            let outcome = if token.is_aborted() {
                DispatchOutcome::Aborted
            } else {
                DispatchOutcome::Ran
            };
            callback(outcome);
        });
    }

    fn set_timeout(&self, delay: Duration, callback: HostCallback) -> TimerHandle {
        let id = self.inner.next_handle();
        let state: Weak<TokioHostState> = Rc::downgrade(&self.inner);
        let join = spawn_local(async move {
            sleep(delay).await;
            if let Some(state) = state.upgrade() {
                state.timers.borrow_mut().remove(&id);
            }
            callback();
        });
        self.inner
            .timers
            .borrow_mut()
            .insert(id, join.abort_handle());
        TimerHandle(id)
    }

    fn clear_timeout(&self, handle: TimerHandle) {
        if let Some(abort) = self.inner.timers.borrow_mut().remove(&handle.0) {
            abort.abort();
        }
    }

    fn visibility(&self) -> Visibility {
        self.inner.visibility.get()
    }

    fn observe_visibility(&self, callback: VisibilityCallback) -> ObserverHandle {
        let id = self.inner.next_handle();
        self.inner.observers.borrow_mut().push((id, callback));
        ObserverHandle(id)
    }

    fn unobserve_visibility(&self, handle: ObserverHandle) {
        self.inner
            .observers
            .borrow_mut()
            .retain(|(id, _)| *id != handle.0);
    }

    fn install_timer_hooks(&self, hooks: Rc<dyn TimerHooks>) -> bool {
        let mut installed = self.inner.hooks.borrow_mut();
        if installed.is_some() {
            return false;
        }
        *installed = Some(hooks);
        true
    }

    fn remove_timer_hooks(&self) {
        self.inner.hooks.borrow_mut().take();
    }
}
