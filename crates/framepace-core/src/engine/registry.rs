use std::collections::BTreeMap;
use std::time::Duration;

use crate::host::{CooperativeToken, Host, TimerHandle};
use crate::models::{TaskId, TaskPriority};

pub(crate) type TaskCallback = Box<dyn FnOnce() -> Result<(), String>>;

/// The dispatch currently holding a task, tagged by the primitive that owns it.
pub(crate) enum DriverHandle {
    Dedicated(TimerHandle),
    Cooperative(CooperativeToken),
}

impl DriverHandle {
    pub(crate) fn release(self, host: &dyn Host) {
        match self {
            DriverHandle::Dedicated(handle) => host.clear_timeout(handle),
            DriverHandle::Cooperative(token) => token.abort(),
        }
    }
}

pub(crate) struct TaskEntry {
    pub(crate) id: TaskId,
    /// `None` while the callback is executing.
    pub(crate) callback: Option<TaskCallback>,
    pub(crate) execute_at: Duration,
    pub(crate) priority: TaskPriority,
    pub(crate) batching: bool,
    pub(crate) driver_handle: Option<DriverHandle>,
}

#[derive(Debug, Default, Eq, PartialEq)]
pub(crate) struct DueTasks {
    pub(crate) user_visible: Vec<TaskId>,
    pub(crate) background: Vec<TaskId>,
}

#[derive(Default)]
pub(crate) struct TaskRegistry {
    last_id: u64,
    tasks: BTreeMap<TaskId, TaskEntry>,
}

impl TaskRegistry {
    pub(crate) fn allocate_id(&mut self) -> TaskId {
        self.last_id = self.last_id.saturating_add(1);
        TaskId(self.last_id)
    }

    pub(crate) fn insert(
        &mut self,
        callback: TaskCallback,
        execute_at: Duration,
        priority: TaskPriority,
        batching: bool,
    ) -> &mut TaskEntry {
        let id = self.allocate_id();
        self.tasks.entry(id).or_insert(TaskEntry {
            id,
            callback: Some(callback),
            execute_at,
            priority,
            batching,
            driver_handle: None,
        })
    }

    pub(crate) fn get_mut(&mut self, task_id: TaskId) -> Option<&mut TaskEntry> {
        self.tasks.get_mut(&task_id)
    }

    pub(crate) fn remove(&mut self, task_id: TaskId) -> Option<TaskEntry> {
        self.tasks.remove(&task_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn batched_len(&self) -> usize {
        self.tasks.values().filter(|entry| entry.batching).count()
    }

    /// Batched tasks eligible at `now`, in id order, split by priority.
    /// Tasks held by a cooperative dispatch or currently executing are
    /// skipped.
    pub(crate) fn due_batched(&self, now: Duration) -> DueTasks {
        let mut due = DueTasks::default();
        for entry in self.tasks.values() {
            if !entry.batching
                || entry.callback.is_none()
                || entry.driver_handle.is_some()
                || entry.execute_at > now
            {
                continue;
            }
            match entry.priority {
                TaskPriority::UserVisible => due.user_visible.push(entry.id),
                TaskPriority::Background => due.background.push(entry.id),
            }
        }
        due
    }

    pub(crate) fn unenrolled_batched_mut(&mut self) -> impl Iterator<Item = &mut TaskEntry> {
        self.tasks.values_mut().filter(|entry| {
            entry.batching && entry.callback.is_some() && entry.driver_handle.is_none()
        })
    }

    pub(crate) fn abort_cooperative_dispatches(&mut self) {
        for entry in self.tasks.values_mut() {
            if let Some(DriverHandle::Cooperative(token)) = &entry.driver_handle {
                token.abort();
                entry.driver_handle = None;
            }
        }
    }

    pub(crate) fn is_dispatch_current(&self, task_id: TaskId, token: &CooperativeToken) -> bool {
        matches!(
            self.tasks.get(&task_id).and_then(|entry| entry.driver_handle.as_ref()),
            Some(DriverHandle::Cooperative(current)) if current.same_dispatch(token)
        )
    }

    pub(crate) fn drain(&mut self) -> Vec<TaskEntry> {
        std::mem::take(&mut self.tasks).into_values().collect()
    }
}
