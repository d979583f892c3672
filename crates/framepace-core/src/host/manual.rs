//! Deterministic host with a virtual clock.
//!
//! Nothing happens until the owner drives it: `run_frame` fires pending frame
//! callbacks, `run_posted_tasks` drains due cooperative dispatches and
//! `advance` moves the clock forward, firing native timers in due order.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use crate::host::{
    AmbientTimer, CooperativeToken, DispatchCallback, DispatchOutcome, FrameHandle, Host,
    HostCallback, HostCapabilities, ObserverHandle, TimerHandle, TimerHooks, VisibilityCallback,
    route_ambient_clear, route_ambient_timeout,
};
use crate::models::{TaskPriority, TimerRequest, Visibility};

#[derive(Clone)]
pub struct ManualHost {
    inner: Rc<RefCell<ManualState>>,
}

struct PostedTask {
    seq: u64,
    due: Duration,
    priority: TaskPriority,
    token: CooperativeToken,
    callback: DispatchCallback,
}

struct ManualState {
    capabilities: HostCapabilities,
    now: Duration,
    next_handle: u64,
    frames: BTreeMap<u64, HostCallback>,
    timers: BTreeMap<(Duration, u64), HostCallback>,
    posted: Vec<PostedTask>,
    injected_failures: VecDeque<String>,
    visibility: Visibility,
    observers: Vec<(u64, VisibilityCallback)>,
    hooks: Option<Rc<dyn TimerHooks>>,
}

impl ManualState {
    fn next_handle(&mut self) -> u64 {
        self.next_handle = self.next_handle.saturating_add(1);
        self.next_handle
    }
}

impl Default for ManualHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualHost {
    pub fn new() -> Self {
        Self::with_capabilities(HostCapabilities::FULL)
    }

    pub fn with_capabilities(capabilities: HostCapabilities) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ManualState {
                capabilities,
                now: Duration::ZERO,
                next_handle: 0,
                frames: BTreeMap::new(),
                timers: BTreeMap::new(),
                posted: Vec::new(),
                injected_failures: VecDeque::new(),
                visibility: Visibility::Visible,
                observers: Vec::new(),
                hooks: None,
            })),
        }
    }

    /// Moves the clock without firing anything, standing in for time spent
    /// inside a callback.
    pub fn spend(&self, duration: Duration) {
        let mut state = self.inner.borrow_mut();
        state.now = state.now.saturating_add(duration);
    }

    /// Moves the clock forward, firing every native timer that falls due on
    /// the way with the clock set to its due time.
    pub fn advance(&self, duration: Duration) {
        let target = self.inner.borrow().now.saturating_add(duration);
        loop {
            let next = {
                let mut state = self.inner.borrow_mut();
                let due = state.timers.first_key_value().map(|(&(due, _), _)| due);
                match due {
                    Some(due) if due <= target => {
                        if due > state.now {
                            state.now = due;
                        }
                        state.timers.pop_first().map(|(_, callback)| callback)
                    }
                    _ => None,
                }
            };
            match next {
                Some(callback) => callback(),
                None => break,
            }
        }
        let mut state = self.inner.borrow_mut();
        if target > state.now {
            state.now = target;
        }
    }

    /// Fires the frame callbacks registered so far. Frames are suppressed
    /// while the document is hidden.
    pub fn run_frame(&self) -> usize {
        let frames = {
            let mut state = self.inner.borrow_mut();
            if state.visibility == Visibility::Hidden {
                return 0;
            }
            std::mem::take(&mut state.frames)
        };
        let count = frames.len();
        for (_, callback) in frames {
            callback();
        }
        count
    }

    /// Runs cooperative dispatches until none is due. User-visible dispatches
    /// run before background ones; aborted dispatches are reported whether or
    /// not they are due.
    pub fn run_posted_tasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = {
                let mut state = self.inner.borrow_mut();
                let now = state.now;
                let position = state
                    .posted
                    .iter()
                    .enumerate()
                    .filter(|(_, task)| task.token.is_aborted() || task.due <= now)
                    .min_by_key(|(_, task)| (priority_rank(task.priority), task.seq))
                    .map(|(index, _)| index);
                position.map(|index| {
                    let task = state.posted.remove(index);
                    let outcome = if task.token.is_aborted() {
                        DispatchOutcome::Aborted
                    } else if let Some(reason) = state.injected_failures.pop_front() {
                        DispatchOutcome::Failed(reason)
                    } else {
                        DispatchOutcome::Ran
                    };
                    (task.callback, outcome)
                })
            };
            let Some((callback, outcome)) = next else {
                break;
            };
            if outcome == DispatchOutcome::Ran {
                ran += 1;
            }
            callback(outcome);
        }
        ran
    }

    /// The next cooperative dispatch that would run reports `Failed` instead.
    pub fn fail_next_dispatch(&self, reason: impl Into<String>) {
        self.inner
            .borrow_mut()
            .injected_failures
            .push_back(reason.into());
    }

    pub fn set_visibility(&self, visibility: Visibility) {
        let observers = {
            let mut state = self.inner.borrow_mut();
            if state.visibility == visibility {
                return;
            }
            state.visibility = visibility;
            state
                .observers
                .iter()
                .map(|(_, callback)| callback.clone())
                .collect::<Vec<_>>()
        };
        for observer in observers {
            observer(visibility);
        }
    }

    /// The ambient `set_timeout` entry point, routed through installed hooks.
    pub fn ambient_set_timeout(
        &self,
        request: TimerRequest,
        callback: impl FnOnce() + 'static,
    ) -> AmbientTimer {
        let hooks = self.inner.borrow().hooks.clone();
        route_ambient_timeout(self, hooks, request, Box::new(callback))
    }

    pub fn ambient_clear_timeout(&self, timer: AmbientTimer) {
        let hooks = self.inner.borrow().hooks.clone();
        route_ambient_clear(self, hooks, timer);
    }

    pub fn pending_frame_count(&self) -> usize {
        self.inner.borrow().frames.len()
    }

    pub fn native_timer_count(&self) -> usize {
        self.inner.borrow().timers.len()
    }

    pub fn posted_task_count(&self) -> usize {
        self.inner.borrow().posted.len()
    }

    pub fn observer_count(&self) -> usize {
        self.inner.borrow().observers.len()
    }

    pub fn has_timer_hooks(&self) -> bool {
        self.inner.borrow().hooks.is_some()
    }
}

impl Host for ManualHost {
    fn capabilities(&self) -> HostCapabilities {
        self.inner.borrow().capabilities
    }

    fn now(&self) -> Duration {
        self.inner.borrow().now
    }

    fn request_frame(&self, callback: HostCallback) -> FrameHandle {
        let mut state = self.inner.borrow_mut();
        let handle = state.next_handle();
        state.frames.insert(handle, callback);
        FrameHandle(handle)
    }

    fn cancel_frame(&self, handle: FrameHandle) {
        self.inner.borrow_mut().frames.remove(&handle.0);
    }

    fn post_task(
        &self,
        priority: TaskPriority,
        delay: Duration,
        token: CooperativeToken,
        callback: DispatchCallback,
    ) {
        let mut state = self.inner.borrow_mut();
        let seq = state.next_handle();
        let due = state.now.saturating_add(delay);
        state.posted.push(PostedTask {
            seq,
            due,
            priority,
            token,
            callback,
        });
    }

    fn set_timeout(&self, delay: Duration, callback: HostCallback) -> TimerHandle {
        let mut state = self.inner.borrow_mut();
        let handle = state.next_handle();
        let due = state.now.saturating_add(delay);
        state.timers.insert((due, handle), callback);
        TimerHandle(handle)
    }

    fn clear_timeout(&self, handle: TimerHandle) {
        self.inner
            .borrow_mut()
            .timers
            .retain(|&(_, id), _| id != handle.0);
    }

    fn visibility(&self) -> Visibility {
        self.inner.borrow().visibility
    }

    fn observe_visibility(&self, callback: VisibilityCallback) -> ObserverHandle {
        let mut state = self.inner.borrow_mut();
        let handle = state.next_handle();
        state.observers.push((handle, callback));
        ObserverHandle(handle)
    }

    fn unobserve_visibility(&self, handle: ObserverHandle) {
        self.inner
            .borrow_mut()
            .observers
            .retain(|(id, _)| *id != handle.0);
    }

    fn install_timer_hooks(&self, hooks: Rc<dyn TimerHooks>) -> bool {
        let mut state = self.inner.borrow_mut();
        if state.hooks.is_some() {
            return false;
        }
        state.hooks = Some(hooks);
        true
    }

    fn remove_timer_hooks(&self) {
        self.inner.borrow_mut().hooks = None;
    }
}

fn priority_rank(priority: TaskPriority) -> u8 {
    match priority {
        TaskPriority::UserVisible => 0,
        TaskPriority::Background => 1,
    }
}
