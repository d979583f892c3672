use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TaskId(pub u64);

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskPriority {
    #[default]
    UserVisible,
    Background,
}

/// Per-call scheduling options.
///
/// `batching = false` opts the task out of the execution cycle: it is armed on
/// a dedicated native timer and runs at its nominal delay regardless of mode,
/// visibility or budget.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TaskOptions {
    pub delay: Duration,
    pub priority: TaskPriority,
    pub batching: bool,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            priority: TaskPriority::UserVisible,
            batching: true,
        }
    }
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Accepts a raw millisecond delay; negative, NaN and infinite values
    /// are coerced to zero.
    pub fn with_delay_ms(mut self, delay_ms: f64) -> Self {
        self.delay = coerce_delay_ms(delay_ms);
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_batching(mut self, batching: bool) -> Self {
        self.batching = batching;
        self
    }

    pub fn unbatched(self) -> Self {
        self.with_batching(false)
    }
}

pub fn coerce_delay_ms(delay_ms: f64) -> Duration {
    if !delay_ms.is_finite() || delay_ms <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(delay_ms / 1000.0).unwrap_or(Duration::MAX)
}

/// A call arriving through the intercepted ambient timer entry points.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TimerRequest {
    pub delay: Duration,
    pub label: Option<&'static str>,
}

impl TimerRequest {
    pub fn new(delay: Duration) -> Self {
        Self { delay, label: None }
    }

    pub fn labelled(delay: Duration, label: &'static str) -> Self {
        Self {
            delay,
            label: Some(label),
        }
    }
}
