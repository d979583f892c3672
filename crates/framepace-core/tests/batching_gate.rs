use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use framepace_core::host::{Host, HostCapabilities, ManualHost};
use framepace_core::models::{SchedulingMode, TaskOptions, Visibility};
use framepace_core::{Scheduler, SchedulerConfig};

fn keep_alive(delay_ms: u64) -> TaskOptions {
    TaskOptions::default()
        .with_delay(Duration::from_millis(delay_ms))
        .unbatched()
}

#[test]
fn unbatched_task_fires_at_nominal_delay_without_any_driver() {
    let host = ManualHost::with_capabilities(HostCapabilities::FULL.without_cooperative_tasks());
    host.set_visibility(Visibility::Hidden);
    let scheduler = Scheduler::with_defaults(host.clone()).unwrap();
    let fired_at = Rc::new(RefCell::new(Vec::new()));

    let clock = host.clone();
    let record = fired_at.clone();
    scheduler.schedule(move || record.borrow_mut().push(clock.now()), keep_alive(1000));

    assert_eq!(scheduler.mode(), SchedulingMode::Idle);
    assert_eq!(scheduler.pending_count(), 1);

    host.advance(Duration::from_millis(999));
    assert!(fired_at.borrow().is_empty());
    host.advance(Duration::from_millis(1));
    assert_eq!(*fired_at.borrow(), vec![Duration::from_millis(1000)]);
    assert_eq!(scheduler.pending_count(), 0);
}

#[test]
fn unbatched_task_is_not_picked_up_by_execution_cycles() {
    let host = ManualHost::new();
    let scheduler = Scheduler::with_defaults(host.clone()).unwrap();
    let unbatched = Rc::new(Cell::new(0));
    let batched = Rc::new(Cell::new(0));

    let counter = unbatched.clone();
    scheduler.schedule(move || counter.set(counter.get() + 1), keep_alive(0));
    let counter = batched.clone();
    scheduler.schedule(move || counter.set(counter.get() + 1), TaskOptions::default());

    host.run_frame();
    assert_eq!(batched.get(), 1);
    assert_eq!(unbatched.get(), 0);
    assert_eq!(scheduler.snapshot().batched_pending, 0);
    assert_eq!(scheduler.pending_count(), 1);

    host.advance(Duration::ZERO);
    assert_eq!(unbatched.get(), 1);
    assert_eq!(scheduler.pending_count(), 0);
}

#[test]
fn unbatched_task_ignores_an_exhausted_frame_budget() {
    let host = ManualHost::new();
    let config = SchedulerConfig::default()
        .with_initial_tasks_per_frame(1)
        .with_dynamic_budget(false);
    let scheduler = Scheduler::new(host.clone(), config).unwrap();
    let fired = Rc::new(Cell::new(false));

    for _ in 0..10 {
        scheduler.schedule(|| {}, TaskOptions::default());
    }
    let flag = fired.clone();
    scheduler.schedule(move || flag.set(true), keep_alive(5));

    host.run_frame();
    host.advance(Duration::from_millis(5));
    assert!(fired.get());
    assert_eq!(scheduler.pending_count(), 9);
}

#[test]
fn only_unbatched_tasks_keep_the_engine_idle() {
    let host = ManualHost::new();
    let scheduler = Scheduler::with_defaults(host.clone()).unwrap();

    scheduler.schedule(|| {}, keep_alive(10));
    scheduler.schedule(|| {}, keep_alive(20));

    assert_eq!(scheduler.mode(), SchedulingMode::Idle);
    assert_eq!(host.pending_frame_count(), 0);
    assert_eq!(host.native_timer_count(), 2);
}

#[test]
fn cancelling_an_unbatched_task_clears_its_timer() {
    let host = ManualHost::new();
    let scheduler = Scheduler::with_defaults(host.clone()).unwrap();
    let fired = Rc::new(Cell::new(false));

    let flag = fired.clone();
    let task = scheduler.schedule(move || flag.set(true), keep_alive(100));
    assert_eq!(host.native_timer_count(), 1);

    scheduler.cancel(task);
    assert_eq!(host.native_timer_count(), 0);
    host.advance(Duration::from_millis(200));
    assert!(!fired.get());
    assert_eq!(scheduler.pending_count(), 0);
}
