use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use framepace_core::host::{AmbientTimer, Host, ManualHost};
use framepace_core::models::{
    SchedulerErrorKind, SchedulingMode, Strategy, TaskOptions, TaskPriority, TimerRequest,
};
use framepace_core::{PendingCountSink, Scheduler, SchedulerConfig};

#[derive(Default)]
struct PendingLog {
    values: RefCell<Vec<usize>>,
    completed: Cell<bool>,
}

impl PendingCountSink for PendingLog {
    fn publish(&self, pending: usize) {
        self.values.borrow_mut().push(pending);
    }

    fn complete(&self) {
        self.completed.set(true);
    }
}

fn millis(value: u64) -> Duration {
    Duration::from_millis(value)
}

#[test]
fn ambient_timers_are_routed_through_the_registry_while_intercepting() {
    let host = ManualHost::new();
    let scheduler = Scheduler::with_defaults(host.clone()).unwrap();
    let ran = Rc::new(Cell::new(0));

    scheduler.intercept_global_timers().unwrap();
    assert!(scheduler.is_intercepting());
    assert!(host.has_timer_hooks());

    let counter = ran.clone();
    let timer = host.ambient_set_timeout(TimerRequest::new(Duration::ZERO), move || {
        counter.set(counter.get() + 1)
    });
    assert!(matches!(timer, AmbientTimer::Intercepted(_)));
    assert_eq!(scheduler.pending_count(), 1);
    assert_eq!(scheduler.mode(), SchedulingMode::FramePaced);

    host.run_frame();
    assert_eq!(ran.get(), 1);
}

#[test]
fn clearing_an_intercepted_timer_cancels_the_task() {
    let host = ManualHost::new();
    let scheduler = Scheduler::with_defaults(host.clone()).unwrap();
    let ran = Rc::new(Cell::new(false));
    scheduler.intercept_global_timers().unwrap();

    let flag = ran.clone();
    let timer = host.ambient_set_timeout(TimerRequest::new(millis(10)), move || flag.set(true));
    host.ambient_clear_timeout(timer);

    assert_eq!(scheduler.pending_count(), 0);
    host.advance(millis(20));
    host.run_frame();
    assert!(!ran.get());
}

#[test]
fn classifier_can_exempt_calls_from_batching() {
    let host = ManualHost::new();
    let scheduler = Scheduler::with_defaults(host.clone()).unwrap();
    scheduler
        .intercept_global_timers_with(|request| match request.label {
            Some("keep-alive") => TaskOptions::default().unbatched(),
            _ => TaskOptions::default().with_priority(TaskPriority::Background),
        })
        .unwrap();

    host.ambient_set_timeout(TimerRequest::labelled(millis(30), "keep-alive"), || {});
    assert_eq!(scheduler.mode(), SchedulingMode::Idle);
    assert_eq!(scheduler.snapshot().batched_pending, 0);

    host.ambient_set_timeout(TimerRequest::new(millis(30)), || {});
    assert_eq!(scheduler.mode(), SchedulingMode::FramePaced);
    assert_eq!(scheduler.snapshot().batched_pending, 1);
}

#[test]
fn interception_is_idempotent_and_exclusive_per_host() {
    let host = ManualHost::new();
    let first = Scheduler::with_defaults(host.clone()).unwrap();
    let second = Scheduler::with_defaults(host.clone()).unwrap();

    first.intercept_global_timers().unwrap();
    first.intercept_global_timers().unwrap();

    let error = second.intercept_global_timers().unwrap_err();
    assert_eq!(error.kind, SchedulerErrorKind::InterceptionConflict);
    assert!(!second.is_intercepting());

    first.release_global_timers();
    second.intercept_global_timers().unwrap();
    assert!(second.is_intercepting());
}

#[test]
fn release_hands_every_pending_task_to_native_timers_without_loss() {
    let host = ManualHost::new();
    let scheduler = Scheduler::with_defaults(host.clone()).unwrap();
    let log = Rc::new(PendingLog::default());
    scheduler.add_pending_sink(log.clone());
    scheduler.intercept_global_timers().unwrap();

    let fired = Rc::new(RefCell::new(Vec::new()));
    let plans = [
        (0u64, TaskOptions::default()),
        (50, TaskOptions::default().with_priority(TaskPriority::Background)),
        (100, TaskOptions::default().unbatched()),
        (300, TaskOptions::default()),
    ];
    for (delay, options) in plans {
        let clock = host.clone();
        let fired = fired.clone();
        scheduler.schedule(
            move || fired.borrow_mut().push((delay, clock.now())),
            options.with_delay(millis(delay)),
        );
    }

    host.advance(millis(40));
    assert!(fired.borrow().is_empty());

    scheduler.release_global_timers();
    assert_eq!(scheduler.pending_count(), 0);
    assert_eq!(scheduler.mode(), SchedulingMode::Idle);
    assert!(!scheduler.is_intercepting());
    assert!(!host.has_timer_hooks());
    assert_eq!(host.pending_frame_count(), 0);
    assert_eq!(log.values.borrow().last(), Some(&0));

    host.advance(millis(1000));
    assert_eq!(
        *fired.borrow(),
        vec![
            (0, millis(40)),
            (50, millis(50)),
            (100, millis(100)),
            (300, millis(300)),
        ]
    );
}

#[test]
fn unbatched_keep_alive_still_fires_at_its_nominal_time_after_release() {
    let host = ManualHost::new();
    let scheduler = Scheduler::with_defaults(host.clone()).unwrap();
    scheduler.intercept_global_timers().unwrap();
    let fired_at = Rc::new(RefCell::new(Vec::new()));

    let clock = host.clone();
    let record = fired_at.clone();
    scheduler.schedule(
        move || record.borrow_mut().push(clock.now()),
        TaskOptions::default().with_delay(millis(1000)).unbatched(),
    );

    host.advance(millis(400));
    scheduler.release_global_timers();
    assert_eq!(host.native_timer_count(), 1);

    host.advance(millis(599));
    assert!(fired_at.borrow().is_empty());
    host.advance(millis(1));
    host.advance(millis(5000));
    assert_eq!(*fired_at.borrow(), vec![millis(1000)]);
}

#[test]
fn release_aborts_in_flight_cooperative_dispatches() {
    let host = ManualHost::new();
    let config = SchedulerConfig::default().with_strategy(Strategy::Responsiveness);
    let scheduler = Scheduler::new(host.clone(), config).unwrap();
    scheduler.intercept_global_timers().unwrap();
    let ran = Rc::new(Cell::new(0));

    for _ in 0..3 {
        let counter = ran.clone();
        scheduler.schedule(move || counter.set(counter.get() + 1), TaskOptions::default());
    }
    assert_eq!(host.posted_task_count(), 3);

    scheduler.release_global_timers();
    assert_eq!(host.run_posted_tasks(), 0);
    host.advance(Duration::ZERO);
    assert_eq!(ran.get(), 3);
}

#[test]
fn release_without_interception_is_a_no_op() {
    let host = ManualHost::new();
    let scheduler = Scheduler::with_defaults(host.clone()).unwrap();
    scheduler.schedule(|| {}, TaskOptions::default());

    scheduler.release_global_timers();
    assert_eq!(scheduler.pending_count(), 1);
    assert_eq!(scheduler.mode(), SchedulingMode::FramePaced);
}

#[test]
fn ambient_calls_after_release_go_straight_to_native_timers() {
    let host = ManualHost::new();
    let scheduler = Scheduler::with_defaults(host.clone()).unwrap();
    scheduler.intercept_global_timers().unwrap();
    scheduler.release_global_timers();
    scheduler.release_global_timers();

    let timer = host.ambient_set_timeout(TimerRequest::new(millis(5)), || {});
    assert!(matches!(timer, AmbientTimer::Native(_)));
    assert_eq!(scheduler.pending_count(), 0);
}

#[test]
fn shutdown_drains_detaches_and_closes_the_pending_channel() {
    let host = ManualHost::new();
    let scheduler = Scheduler::with_defaults(host.clone()).unwrap();
    let log = Rc::new(PendingLog::default());
    scheduler.add_pending_sink(log.clone());
    let receiver = scheduler.subscribe_pending();
    let ran = Rc::new(Cell::new(0));
    assert_eq!(host.observer_count(), 1);

    for delay in [0, 25] {
        let counter = ran.clone();
        scheduler.schedule(
            move || counter.set(counter.get() + 1),
            TaskOptions::default().with_delay(millis(delay)),
        );
    }

    scheduler.shutdown();
    scheduler.shutdown();

    assert!(scheduler.is_shut_down());
    assert_eq!(host.observer_count(), 0);
    assert!(log.completed.get());
    assert_eq!(*receiver.borrow(), 0);
    assert!(receiver.has_changed().is_err());

    let counter = ran.clone();
    scheduler.schedule(move || counter.set(counter.get() + 1), TaskOptions::default());
    assert_eq!(scheduler.pending_count(), 0);

    host.advance(millis(25));
    assert_eq!(ran.get(), 3);
    assert_eq!(*log.values.borrow(), vec![0, 1, 2, 0]);
}

#[test]
fn release_from_inside_a_running_callback_hands_off_the_rest_once() {
    let host = ManualHost::new();
    let scheduler = Scheduler::with_defaults(host.clone()).unwrap();
    scheduler.intercept_global_timers().unwrap();
    let runs = Rc::new(RefCell::new(Vec::new()));

    let releasing = scheduler.clone();
    let record = runs.clone();
    host.ambient_set_timeout(TimerRequest::new(Duration::ZERO), move || {
        record.borrow_mut().push(0);
        releasing.release_global_timers();
    });
    for label in 1..=3 {
        let record = runs.clone();
        host.ambient_set_timeout(TimerRequest::new(Duration::ZERO), move || {
            record.borrow_mut().push(label)
        });
    }
    assert_eq!(scheduler.pending_count(), 4);

    assert_eq!(host.run_frame(), 1);
    assert_eq!(*runs.borrow(), vec![0]);
    assert_eq!(scheduler.pending_count(), 0);
    assert_eq!(scheduler.mode(), SchedulingMode::Idle);
    assert!(!scheduler.is_intercepting());
    assert_eq!(host.native_timer_count(), 3);

    host.advance(Duration::ZERO);
    host.run_frame();
    assert_eq!(*runs.borrow(), vec![0, 1, 2, 3]);
}

#[test]
fn interception_after_shutdown_leaves_the_host_untouched() {
    let host = ManualHost::new();
    let scheduler = Scheduler::with_defaults(host.clone()).unwrap();
    scheduler.shutdown();

    scheduler.intercept_global_timers().unwrap();
    assert!(!scheduler.is_intercepting());
    assert!(!host.has_timer_hooks());

    let timer = host.ambient_set_timeout(TimerRequest::new(millis(5)), || {});
    assert!(matches!(timer, AmbientTimer::Native(_)));
}
