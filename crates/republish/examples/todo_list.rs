//! Republish Todo List Example
//!
//! Walks through the main pieces of the crate on a small model:
//! - Child edits republished to the owning list
//! - A scoped projection that only reports net changes per pass
//! - Dependencies inherited by every todo from the list
//!
//! Run with: RUST_LOG=republish_core=trace cargo run -p republish --example todo_list

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use republish::prelude::*;
use republish::{InheritanceDebug, TreeFormatOptions};
use tracing_subscriber::EnvFilter;

/// Prefix used when rendering todo titles.
struct TitlePrefix;

impl DependencyKey for TitlePrefix {
    type Value = &'static str;

    fn default_value() -> &'static str {
        "[ ]"
    }

    fn preview_value() -> &'static str {
        "[preview]"
    }
}

#[derive(Observable)]
struct Todo {
    #[change_signal]
    changed: ChangeSignal,

    #[published]
    title: Published<String>,

    #[published]
    done: Published<bool>,

    #[dependency]
    prefix: Dependency<TitlePrefix>,
}

impl Todo {
    fn new(title: &str) -> Arc<Self> {
        let changed = ChangeSignal::for_type::<Self>();
        Arc::new(Self {
            title: Published::with_owner(&changed, title.into()),
            done: Published::with_owner(&changed, false),
            prefix: Dependency::new(),
            changed,
        })
    }

    fn render(&self) -> String {
        let mark = if self.done() { "[x]" } else { self.prefix() };
        format!("{mark} {}", self.title())
    }
}

#[derive(Observable)]
struct TodoList {
    #[change_signal]
    changed: ChangeSignal,

    #[republished]
    items: Republished<Vec<Arc<Todo>>>,
}

impl TodoList {
    fn new() -> Self {
        let changed = ChangeSignal::for_type::<Self>();
        Self {
            items: Republished::with_owner(&changed, Vec::new()),
            changed,
        }
    }

    fn add(&self, title: &str) {
        self.items.update(|items| items.push(Todo::new(title)));
    }

    fn completed(&self) -> usize {
        self.items().iter().filter(|todo| todo.done()).count()
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let list = Arc::new(WithDependencies::new(
        Dependencies::new().with::<TitlePrefix>("[todo]"),
        TodoList::new,
    ));

    let list_changes = Arc::new(AtomicU64::new(0));
    let counter = list_changes.clone();
    let _list_sub = list.changed.subscribe(move || {
        counter.fetch_add(1, Ordering::Relaxed);
    });

    let completed = Scoped::new(|list: &WithDependencies<TodoList>| list.completed());
    let completed_changes = Arc::new(AtomicU64::new(0));
    let counter = completed_changes.clone();
    let _completed_sub = completed.subscribe(move || {
        counter.fetch_add(1, Ordering::Relaxed);
    });

    list.add("write docs");
    list.add("review changes");
    list.add("release");
    completed.bind(&list);

    // One pass: two edits to completion that cancel out, one that sticks.
    let items = list.items();
    items[0].set_done(true);
    items[0].set_done(false);
    items[1].set_done(true);
    items[2].set_title("release 0.1".into());
    flush_pending_changes();

    for todo in list.items() {
        println!("{}", todo.render());
    }
    tracing::info!(
        list_changes = list_changes.load(Ordering::Relaxed),
        completed_changes = completed_changes.load(Ordering::Relaxed),
        completed = completed.get(),
        "pass delivered"
    );

    let options = TreeFormatOptions {
        show_ids: false,
        ..Default::default()
    };
    print!(
        "{}",
        InheritanceDebug::with_options(options).format_subtree(list.object_id())
    );
}
