//! Integration tests for the #[derive(Observable)] macro.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use republish_core::{
    ChangeSignal, Dependencies, Dependency, DependencyKey, Observable, Published, Republished,
    WithDependencies,
};
use republish_macros::Observable;

#[derive(Observable)]
struct Counter {
    #[change_signal]
    changed: ChangeSignal,

    #[published]
    value: Published<i32>,

    #[published(read_only)]
    label: Published<String>,
}

impl Counter {
    fn new(value: i32) -> Arc<Self> {
        Arc::new(Self {
            changed: ChangeSignal::for_type::<Self>(),
            value: Published::new(value),
            label: Published::new("counter".into()),
        })
    }
}

#[derive(Observable)]
struct Screen {
    #[change_signal]
    changed: ChangeSignal,

    #[republished]
    counter: Republished<Arc<Counter>>,

    #[republished]
    extra: Republished<Option<Arc<Counter>>>,
}

struct Greeting;

impl DependencyKey for Greeting {
    type Value = &'static str;

    fn default_value() -> &'static str {
        "hello"
    }
}

#[derive(Observable)]
struct Greeter {
    #[change_signal]
    changed: ChangeSignal,

    #[dependency]
    greeting: Dependency<Greeting>,
}

#[derive(Observable)]
#[observable(no_accessors)]
struct Bare {
    #[change_signal]
    changed: ChangeSignal,
    value: Published<u8>,
}

#[derive(Observable)]
struct Wrapper<T: Clone + Send + Sync + 'static> {
    #[change_signal]
    changed: ChangeSignal,

    #[published]
    inner: Published<T>,
}

fn count_fires(signal: &ChangeSignal) -> (Arc<AtomicUsize>, republish_core::Subscription) {
    let fired = Arc::new(AtomicUsize::new(0));
    let fired_clone = fired.clone();
    let sub = signal.subscribe(move || {
        fired_clone.fetch_add(1, Ordering::SeqCst);
    });
    (fired, sub)
}

#[test]
fn test_change_signal_is_the_marked_field() {
    let counter = Counter::new(0);
    assert!(counter.change_signal().ptr_eq(&counter.changed));
    assert_eq!(counter.object_id(), counter.changed.id());
}

#[test]
fn test_published_accessors_bind_lazily() {
    let counter = Counter::new(3);
    assert!(!counter.value.is_bound());

    assert_eq!(counter.value(), 3);
    assert!(counter.value.is_bound());

    let (fired, _sub) = count_fires(&counter.changed);
    counter.set_value(4);
    assert_eq!(counter.value(), 4);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_setter_binds_before_writing() {
    let counter = Counter::new(0);
    let (fired, _sub) = count_fires(&counter.changed);
    counter.set_value(1);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_read_only_field_has_getter() {
    let counter = Counter::new(0);
    assert_eq!(counter.label(), "counter");
}

#[test]
fn test_bind_observable_fields() {
    let counter = Counter::new(0);
    counter.bind_observable_fields();
    assert!(counter.value.is_bound());
    assert!(counter.label.is_bound());

    let (fired, _sub) = count_fires(&counter.changed);
    counter.value.set(9);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_republished_accessors_forward_children() {
    let screen = Screen {
        changed: ChangeSignal::for_type::<Screen>(),
        counter: Republished::new(Counter::new(0)),
        extra: Republished::new(None),
    };
    screen.bind_observable_fields();

    let (fired, _sub) = count_fires(&screen.changed);
    screen.counter().set_value(1);
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    screen.set_extra(Some(Counter::new(5)));
    assert_eq!(fired.load(Ordering::SeqCst), 2);
    if let Some(extra) = screen.extra() {
        extra.set_value(6);
    }
    assert_eq!(fired.load(Ordering::SeqCst), 3);

    let replaced = screen.counter();
    screen.set_counter(Counter::new(10));
    replaced.set_value(2);
    assert_eq!(fired.load(Ordering::SeqCst), 4);
}

#[test]
fn test_dependency_getter() {
    let greeter = WithDependencies::new(Dependencies::new().with::<Greeting>("bonjour"), || {
        Greeter {
            changed: ChangeSignal::new(),
            greeting: Dependency::new(),
        }
    });
    assert_eq!(greeter.greeting(), "bonjour");

    let plain = Greeter {
        changed: ChangeSignal::new(),
        greeting: Dependency::new(),
    };
    assert_eq!(plain.greeting(), "hello");
}

#[test]
fn test_no_accessors_still_observable() {
    let bare = Bare {
        changed: ChangeSignal::new(),
        value: Published::new(0),
    };
    assert!(bare.change_signal().ptr_eq(&bare.changed));
    assert_eq!(bare.value.get(), 0);
}

#[test]
fn test_generic_struct() {
    let wrapper = Wrapper {
        changed: ChangeSignal::new(),
        inner: Published::new(String::from("a")),
    };
    let (fired, _sub) = count_fires(&wrapper.changed);
    wrapper.set_inner("b".into());
    assert_eq!(wrapper.inner(), "b");
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}
