//! Integration tests for scoped projections.

mod common;

use std::sync::Arc;

use common::{Child, FireCounter, Parent, Recorder};
use republish::prelude::*;
use static_assertions::assert_impl_all;

#[derive(Observable)]
struct AppState {
    #[change_signal]
    changed: ChangeSignal,

    #[published]
    count: Published<i32>,

    #[published]
    title: Published<String>,
}

impl AppState {
    fn new(count: i32) -> Arc<Self> {
        let changed = ChangeSignal::for_type::<Self>();
        Arc::new(Self {
            count: Published::with_owner(&changed, count),
            title: Published::with_owner(&changed, "App".into()),
            changed,
        })
    }
}

assert_impl_all!(Scoped<AppState, i32>: Observable, Send, Sync, Clone);
assert_impl_all!(Scoped<Parent, Arc<Child>>: Observable, Send, Sync, Clone);

fn count_projection(run_loop: &RunLoop) -> Scoped<AppState, i32> {
    Scoped::writable(
        |state: &AppState| state.count(),
        |state: &AppState, value| state.set_count(value),
    )
    .on_run_loop(run_loop)
}

#[test]
fn test_one_delivery_per_burst() {
    let run_loop = RunLoop::new();
    let state = AppState::new(0);
    let count = count_projection(&run_loop);
    count.bind(&state);
    let fires = FireCounter::new(&count);

    state.set_count(1);
    state.set_count(2);
    state.set_count(3);
    assert_eq!(fires.get(), 0);
    assert_eq!(count.pending_changes(), 3);

    run_loop.run_pending();
    assert_eq!(fires.get(), 1);
    assert_eq!(count.get(), 3);
    assert_eq!(count.pending_changes(), 0);
}

#[test]
fn test_burst_returning_to_start_is_skipped() {
    let run_loop = RunLoop::new();
    let state = AppState::new(0);
    let count = count_projection(&run_loop);
    count.bind(&state);
    let fires = FireCounter::new(&count);

    state.set_count(5);
    state.set_count(0);
    run_loop.run_pending();
    assert_eq!(fires.get(), 0);
}

#[test]
fn test_unrelated_changes_are_deduplicated() {
    let run_loop = RunLoop::new();
    let state = AppState::new(0);
    let count = count_projection(&run_loop);
    count.bind(&state);
    let fires = FireCounter::new(&count);

    state.set_title("Renamed".into());
    run_loop.run_pending();
    assert_eq!(fires.get(), 0);
}

#[test]
fn test_listener_reads_old_value() {
    let run_loop = RunLoop::new();
    let state = AppState::new(0);
    let count = count_projection(&run_loop);
    count.bind(&state);
    let reader = count.clone();
    let recorder = Recorder::new(&count, move || reader.get());

    state.set_count(1);
    run_loop.run_pending();
    state.set_count(2);
    run_loop.run_pending();

    assert_eq!(recorder.seen(), vec![0, 1]);
    assert_eq!(count.get(), 2);
}

#[test]
fn test_write_through() {
    let run_loop = RunLoop::new();
    let state = AppState::new(0);
    let count = count_projection(&run_loop);
    count.bind(&state);
    let fires = FireCounter::new(&count);

    count.set(7).expect("projection is bound");
    assert_eq!(state.count(), 7);
    run_loop.run_pending();
    assert_eq!(fires.get(), 1);
    assert_eq!(count.get(), 7);
}

#[test]
fn test_root_swap_fires_immediately() {
    let run_loop = RunLoop::new();
    let first = AppState::new(1);
    let second = AppState::new(2);
    let same = AppState::new(2);
    let count = count_projection(&run_loop);
    count.bind(&first);
    let fires = FireCounter::new(&count);

    count.bind(&second);
    assert_eq!(fires.get(), 1);
    assert_eq!(count.get(), 2);

    count.bind(&same);
    assert_eq!(fires.get(), 1);

    // The old root no longer drives the projection.
    first.set_count(10);
    run_loop.run_pending();
    assert_eq!(fires.get(), 1);
}

#[test]
fn test_unbound_projection_errors() {
    let count = count_projection(&RunLoop::new());
    assert!(!count.is_bound());
    assert!(matches!(count.try_get(), Err(ScopeError::MissingRoot { .. })));
    assert!(matches!(count.set(1), Err(ScopeError::MissingRoot { .. })));

    let read_only: Scoped<AppState, i32> = Scoped::new(|state: &AppState| state.count());
    assert!(matches!(read_only.set(1), Err(ScopeError::ReadOnly)));
}

#[test]
fn test_main_run_loop_flush() {
    let state = AppState::new(0);
    let count: Scoped<AppState, i32> = Scoped::new(|state: &AppState| state.count());
    count.bind(&state);
    let fires = FireCounter::new(&count);

    state.set_count(1);
    flush_pending_changes();
    assert_eq!(fires.get(), 1);
}

#[test]
fn test_observable_child_swap() {
    let run_loop = RunLoop::new();
    let child0 = Child::new(0);
    let child1 = Child::new(1);
    let child2 = Child::new(2);
    let root = Parent::new(child0.clone());

    let scoped = Scoped::observing_writable(
        |parent: &Parent| parent.child(),
        |parent: &Parent, child| parent.set_child(child),
    )
    .on_run_loop(&run_loop);
    scoped.bind(&root);
    let reader = scoped.clone();
    let recorder = Recorder::new(&scoped, move || reader.get().value());

    root.set_child(child1);
    run_loop.run_pending();
    scoped.set(child2).expect("projection is bound");
    run_loop.run_pending();
    root.set_child(child0);
    run_loop.run_pending();

    assert_eq!(recorder.seen(), vec![0, 1, 2]);
}

#[test]
fn test_observable_projection_forwards_child_changes() {
    let run_loop = RunLoop::new();
    let child = Child::new(0);
    let root = Parent::new(child.clone());
    let scoped: Scoped<Parent, Arc<Child>> =
        Scoped::observing(|parent: &Parent| parent.child()).on_run_loop(&run_loop);
    scoped.bind(&root);
    let fires = FireCounter::new(&scoped);

    // Forwarded immediately; the root notification is identical after the
    // burst and delivers nothing more.
    child.set_value(1);
    assert_eq!(fires.get(), 1);
    run_loop.run_pending();
    assert_eq!(fires.get(), 1);
}

#[test]
fn test_replaced_child_stops_forwarding_before_flush() {
    let run_loop = RunLoop::new();
    let old = Child::new(0);
    let root = Parent::new(old.clone());
    let scoped: Scoped<Parent, Arc<Child>> =
        Scoped::observing(|parent: &Parent| parent.child()).on_run_loop(&run_loop);
    scoped.bind(&root);
    let fires = FireCounter::new(&scoped);

    let new = Child::new(10);
    root.set_child(new.clone());
    old.set_value(5);
    assert_eq!(fires.get(), 0);

    run_loop.run_pending();
    assert_eq!(fires.get(), 1);
    assert!(Arc::ptr_eq(&scoped.get(), &new));

    old.set_value(6);
    new.set_value(11);
    assert_eq!(fires.get(), 2);
}

#[test]
fn test_silent_write_is_compared_with_delivered_value() {
    let run_loop = RunLoop::new();
    let state = AppState::new(0);
    let count = count_projection(&run_loop);
    count.bind(&state);
    let reader = count.clone();
    let recorder = Recorder::new(&count, move || reader.get());

    state.count.set_silent(5);
    state.set_count(5);
    run_loop.run_pending();

    assert_eq!(recorder.seen(), vec![0]);
    assert_eq!(count.get(), 5);
}
