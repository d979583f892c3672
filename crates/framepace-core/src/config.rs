use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{SchedulerError, SchedulerErrorKind, SchedulerResult, Strategy};

pub const DEFAULT_INITIAL_TASKS_PER_FRAME: usize = 50;
pub const DEFAULT_MAX_TASKS_PER_FRAME: usize = 150;
pub const DEFAULT_FRAME_TIME_BUDGET_MS: u64 = 8;
pub const DEFAULT_BACKGROUND_TICK_INTERVAL_MS: u64 = 250;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchedulerConfig {
    pub primary_strategy: Strategy,
    pub initial_tasks_per_frame: usize,
    pub max_tasks_per_frame: usize,
    pub frame_time_budget_ms: u64,
    pub dynamic_budget_enabled: bool,
    pub background_tick_interval: u64,
    pub logging_enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            primary_strategy: Strategy::Throughput,
            initial_tasks_per_frame: DEFAULT_INITIAL_TASKS_PER_FRAME,
            max_tasks_per_frame: DEFAULT_MAX_TASKS_PER_FRAME,
            frame_time_budget_ms: DEFAULT_FRAME_TIME_BUDGET_MS,
            dynamic_budget_enabled: true,
            background_tick_interval: DEFAULT_BACKGROUND_TICK_INTERVAL_MS,
            logging_enabled: false,
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(raw: &str) -> SchedulerResult<Self> {
        let config: Self = serde_json::from_str(raw).map_err(|error| {
            SchedulerError::new(
                SchedulerErrorKind::ConfigInvalid,
                format!("failed to parse scheduler config: {error}"),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.primary_strategy = strategy;
        self
    }

    pub fn with_initial_tasks_per_frame(mut self, tasks: usize) -> Self {
        self.initial_tasks_per_frame = tasks;
        self
    }

    pub fn with_max_tasks_per_frame(mut self, tasks: usize) -> Self {
        self.max_tasks_per_frame = tasks;
        self
    }

    /// Stored in whole milliseconds; a sub-millisecond budget becomes 0 and
    /// is rejected by `validate`.
    pub fn with_frame_time_budget(mut self, budget: Duration) -> Self {
        self.frame_time_budget_ms = whole_millis(budget);
        self
    }

    pub fn with_dynamic_budget(mut self, enabled: bool) -> Self {
        self.dynamic_budget_enabled = enabled;
        self
    }

    /// Stored in whole milliseconds, like `with_frame_time_budget`.
    pub fn with_background_tick_interval(mut self, interval: Duration) -> Self {
        self.background_tick_interval = whole_millis(interval);
        self
    }

    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.logging_enabled = enabled;
        self
    }

    pub fn frame_time_budget(&self) -> Duration {
        Duration::from_millis(self.frame_time_budget_ms)
    }

    pub fn background_tick(&self) -> Duration {
        Duration::from_millis(self.background_tick_interval)
    }

    pub fn validate(&self) -> SchedulerResult<()> {
        if self.initial_tasks_per_frame == 0 {
            return Err(invalid("initialTasksPerFrame must be at least 1"));
        }
        if self.max_tasks_per_frame < self.initial_tasks_per_frame {
            return Err(invalid(format!(
                "maxTasksPerFrame ({}) must not be below initialTasksPerFrame ({})",
                self.max_tasks_per_frame, self.initial_tasks_per_frame
            )));
        }
        if self.frame_time_budget_ms == 0 {
            return Err(invalid("frameTimeBudgetMs must be positive"));
        }
        if self.background_tick_interval == 0 {
            return Err(invalid("backgroundTickInterval must be positive"));
        }
        Ok(())
    }
}

fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn invalid(message: impl Into<String>) -> SchedulerError {
    SchedulerError::new(SchedulerErrorKind::ConfigInvalid, message)
}
