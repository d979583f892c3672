use serde::{Deserialize, Serialize};

/// Which host primitive currently drives the batched registry.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulingMode {
    #[default]
    Idle,
    FramePaced,
    Cooperative,
    IntervalFallback,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Throughput,
    Responsiveness,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SchedulerSnapshot {
    pub mode: SchedulingMode,
    pub pending: usize,
    pub batched_pending: usize,
    pub tasks_per_frame: usize,
    pub strategy: Strategy,
    pub intercepting: bool,
    pub shut_down: bool,
}
