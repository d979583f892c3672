use std::time::Duration;

use crate::config::SchedulerConfig;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BudgetAdjustment {
    Unchanged,
    Shrunk { from: usize, to: usize },
    Grown { from: usize, to: usize },
}

/// Adaptive ceiling on tasks executed per frame-paced cycle.
///
/// Overrunning cycles back off multiplicatively (10%, floor 1); cycles that
/// finish under budget recover additively, one task at a time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BudgetController {
    current: usize,
    max: usize,
    frame_time_budget: Duration,
    dynamic: bool,
}

impl BudgetController {
    pub fn new(config: &SchedulerConfig) -> Self {
        let max = config.max_tasks_per_frame.max(1);
        Self {
            current: config.initial_tasks_per_frame.clamp(1, max),
            max,
            frame_time_budget: config.frame_time_budget(),
            dynamic: config.dynamic_budget_enabled,
        }
    }

    pub fn tasks_per_frame(&self) -> usize {
        self.current
    }

    pub fn frame_time_budget(&self) -> Duration {
        self.frame_time_budget
    }

    pub fn record_cycle(&mut self, elapsed: Duration) -> BudgetAdjustment {
        if !self.dynamic {
            return BudgetAdjustment::Unchanged;
        }
        let from = self.current;
        if elapsed > self.frame_time_budget && from > 1 {
            self.current = (from - from.div_ceil(10)).max(1);
            BudgetAdjustment::Shrunk {
                from,
                to: self.current,
            }
        } else if elapsed < self.frame_time_budget && from < self.max {
            self.current = from + 1;
            BudgetAdjustment::Grown {
                from,
                to: self.current,
            }
        } else {
            BudgetAdjustment::Unchanged
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{BudgetAdjustment, BudgetController};
    use crate::config::SchedulerConfig;

    fn controller(initial: usize, max: usize) -> BudgetController {
        BudgetController::new(
            &SchedulerConfig::default()
                .with_initial_tasks_per_frame(initial)
                .with_max_tasks_per_frame(max),
        )
    }

    #[test]
    fn overruns_shrink_by_ten_percent() {
        let mut budget = controller(50, 150);
        assert_eq!(
            budget.record_cycle(Duration::from_millis(20)),
            BudgetAdjustment::Shrunk { from: 50, to: 45 }
        );
    }

    #[test]
    fn shrinking_a_huge_budget_does_not_overflow() {
        let mut budget = controller(usize::MAX, usize::MAX);
        assert_eq!(
            budget.record_cycle(Duration::from_millis(100)),
            BudgetAdjustment::Shrunk {
                from: usize::MAX,
                to: usize::MAX - usize::MAX.div_ceil(10),
            }
        );
        assert_eq!(
            budget.record_cycle(Duration::ZERO),
            BudgetAdjustment::Grown {
                from: usize::MAX - usize::MAX.div_ceil(10),
                to: usize::MAX - usize::MAX.div_ceil(10) + 1,
            }
        );
    }

    #[test]
    fn small_budgets_still_shrink_on_overrun() {
        let mut budget = controller(9, 150);
        assert_eq!(
            budget.record_cycle(Duration::from_millis(20)),
            BudgetAdjustment::Shrunk { from: 9, to: 8 }
        );
        let mut budget = controller(2, 150);
        assert_eq!(
            budget.record_cycle(Duration::from_millis(20)),
            BudgetAdjustment::Shrunk { from: 2, to: 1 }
        );
    }

    #[test]
    fn sustained_overload_converges_to_one_and_stays() {
        let mut budget = controller(50, 150);
        let mut previous = budget.tasks_per_frame();
        for _ in 0..200 {
            budget.record_cycle(Duration::from_millis(12));
            assert!(budget.tasks_per_frame() <= previous);
            previous = budget.tasks_per_frame();
        }
        assert_eq!(budget.tasks_per_frame(), 1);
        assert_eq!(
            budget.record_cycle(Duration::from_millis(12)),
            BudgetAdjustment::Unchanged
        );
    }

    #[test]
    fn fast_cycles_converge_to_maximum_and_stay() {
        let mut budget = controller(50, 60);
        for _ in 0..100 {
            budget.record_cycle(Duration::from_millis(1));
        }
        assert_eq!(budget.tasks_per_frame(), 60);
        assert_eq!(
            budget.record_cycle(Duration::from_millis(1)),
            BudgetAdjustment::Unchanged
        );
    }

    #[test]
    fn cycle_exactly_on_budget_leaves_it_alone() {
        let mut budget = controller(50, 150);
        assert_eq!(
            budget.record_cycle(Duration::from_millis(8)),
            BudgetAdjustment::Unchanged
        );
    }

    #[test]
    fn disabled_controller_keeps_initial_value() {
        let mut budget = BudgetController::new(
            &SchedulerConfig::default()
                .with_initial_tasks_per_frame(20)
                .with_dynamic_budget(false),
        );
        budget.record_cycle(Duration::from_millis(100));
        budget.record_cycle(Duration::ZERO);
        assert_eq!(budget.tasks_per_frame(), 20);
    }
}
