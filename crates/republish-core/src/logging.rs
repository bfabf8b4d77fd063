//! Logging and debugging facilities for Republish.
//!
//! This module provides:
//! - Target names for filtering the crate's `tracing` events per subsystem
//! - A debug view of the dependency inheritance hierarchy
//! - A guard for timing operations as tracing spans
//!
//! # Tracing Integration
//!
//! Republish only emits `tracing` events; install a subscriber in your
//! application to see them:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("republish_core::dependencies=debug,republish_core::scoped=trace")
//!     .init();
//! ```
//!
//! # Debug Visualization
//!
//! Use [`InheritanceDebug`] to see which objects inherit dependencies from
//! which owners:
//!
//! ```ignore
//! use republish_core::logging::InheritanceDebug;
//!
//! println!("{}", InheritanceDebug::new().format_subtree(owner.object_id()));
//! ```

use std::collections::HashMap;
use std::fmt::{self, Write as FmtWrite};

use crate::registry::{identity_registry, IdentityInfo, ObjectId};

/// Span names used throughout Republish for tracing.
pub mod span_names {
    /// Republished value replacement span.
    pub const REPUBLISH: &str = "republish::republish";
    /// Run loop pass span.
    pub const RUN_LOOP_PASS: &str = "republish::run_loop_pass";
    /// Scoped projection flush span.
    pub const SCOPED_FLUSH: &str = "republish::scoped_flush";
}

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core crate target.
    pub const CORE: &str = "republish_core";
    /// Signal/subscription target.
    pub const SIGNAL: &str = "republish_core::signal";
    /// Change signal target.
    pub const CHANGE: &str = "republish_core::change";
    /// Identity registry target.
    pub const REGISTRY: &str = "republish_core::registry";
    /// Dependency store target.
    pub const DEPENDENCIES: &str = "republish_core::dependencies";
    /// Environment detection target.
    pub const ENVIRONMENT: &str = "republish_core::environment";
    /// Published value target.
    pub const PUBLISHED: &str = "republish_core::published";
    /// Republished value target.
    pub const REPUBLISHED: &str = "republish_core::republished";
    /// Run loop target.
    pub const RUN_LOOP: &str = "republish_core::run_loop";
    /// Scoped projection target.
    pub const SCOPED: &str = "republish_core::scoped";
    /// Synchronization target.
    pub const SYNCHRONIZE: &str = "republish_core::synchronize";
    /// Performance spans target.
    pub const PERF: &str = "republish::perf";
}

/// Style options for inheritance tree visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
    /// Compact single-line representation.
    Compact,
}

/// Configuration for inheritance tree output.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    /// The style of tree visualization.
    pub style: TreeStyle,
    /// Whether to show object IDs.
    pub show_ids: bool,
    /// Whether to mark identities with bound dependencies.
    pub show_dependencies: bool,
    /// Maximum depth to traverse (None for unlimited).
    pub max_depth: Option<usize>,
    /// Indent size for each level.
    pub indent_size: usize,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_ids: true,
            show_dependencies: true,
            max_depth: None,
            indent_size: 2,
        }
    }
}

impl TreeFormatOptions {
    /// Create options for minimal output.
    pub fn minimal() -> Self {
        Self {
            show_ids: false,
            show_dependencies: false,
            ..Default::default()
        }
    }
}

/// Debug utility for visualizing the dependency inheritance hierarchy.
///
/// Nodes are the live identities of the registry; an edge points from an
/// owner to each object whose parent link currently resolves to it.
#[derive(Debug, Clone, Default)]
pub struct InheritanceDebug {
    options: TreeFormatOptions,
}

struct Snapshot {
    info: HashMap<ObjectId, IdentityInfo>,
    children: HashMap<ObjectId, Vec<ObjectId>>,
}

impl Snapshot {
    fn take() -> Self {
        let entries = identity_registry().entries();
        let mut children: HashMap<ObjectId, Vec<ObjectId>> = HashMap::new();
        for entry in &entries {
            if let Some(parent) = entry.parent {
                children.entry(parent).or_default().push(entry.id);
            }
        }
        let info: HashMap<ObjectId, IdentityInfo> =
            entries.into_iter().map(|entry| (entry.id, entry)).collect();
        for list in children.values_mut() {
            list.sort_by_key(|id| info[id].sequence);
        }
        Self { info, children }
    }

    /// Registration order of a live identity.
    fn sequence(&self, id: ObjectId) -> u64 {
        self.info.get(&id).map_or(u64::MAX, |info| info.sequence)
    }
}

impl InheritanceDebug {
    /// Create a new debug visualizer with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a debug visualizer with custom options.
    pub fn with_options(options: TreeFormatOptions) -> Self {
        Self { options }
    }

    /// Format every inheritance tree, one per identity without a parent.
    pub fn format_all(&self) -> String {
        let snapshot = Snapshot::take();
        let mut roots: Vec<ObjectId> = snapshot
            .info
            .values()
            .filter(|info| info.parent.is_none())
            .map(|info| info.id)
            .collect();
        roots.sort_by_key(|id| snapshot.sequence(*id));

        let mut output = String::new();
        let _ = writeln!(output, "Inheritance Tree ({} live identities):", snapshot.info.len());
        if roots.is_empty() {
            output.push_str("  (empty)\n");
        }
        for root in roots {
            self.format_into(&snapshot, root, 0, true, &mut output);
        }
        output
    }

    /// Format the tree below one identity.
    ///
    /// Returns an empty string for stale identities.
    pub fn format_subtree(&self, root: ObjectId) -> String {
        let snapshot = Snapshot::take();
        let mut output = String::new();
        self.format_into(&snapshot, root, 0, true, &mut output);
        output
    }

    fn format_into(
        &self,
        snapshot: &Snapshot,
        id: ObjectId,
        depth: usize,
        is_last: bool,
        output: &mut String,
    ) {
        if self.options.max_depth.is_some_and(|max| depth > max) {
            return;
        }
        let Some(info) = snapshot.info.get(&id) else {
            return;
        };

        output.push_str(&self.build_prefix(depth, is_last));
        output.push_str(short_label(info.label));
        if self.options.show_ids {
            let _ = write!(output, " [{:?}]", id);
        }
        if self.options.show_dependencies && info.has_dependencies {
            output.push_str(" (dependencies)");
        }
        output.push('\n');

        // Cycles in raw parent links.
        if depth > snapshot.info.len() {
            return;
        }
        let children = snapshot.children.get(&id).map(Vec::as_slice).unwrap_or(&[]);
        for (i, child) in children.iter().enumerate() {
            self.format_into(snapshot, *child, depth + 1, i + 1 == children.len(), output);
        }
    }

    fn build_prefix(&self, depth: usize, is_last: bool) -> String {
        if depth == 0 {
            return String::new();
        }

        let (branch, corner, last) = match self.options.style {
            TreeStyle::Ascii => ("|", "+-- ", "`-- "),
            TreeStyle::Unicode => ("\u{2502}", "\u{251c}\u{2500}\u{2500} ", "\u{2514}\u{2500}\u{2500} "),
            TreeStyle::Compact => ("", "- ", "- "),
        };

        let mut prefix = String::new();
        for _ in 0..(depth - 1) {
            prefix.push_str(branch);
            prefix.push_str(&" ".repeat(self.options.indent_size));
        }
        prefix.push_str(if is_last { last } else { corner });
        prefix
    }
}

/// Strip the module path and generic arguments from a type name.
fn short_label(label: &str) -> &str {
    let base = label.split('<').next().unwrap_or(label);
    base.rsplit("::").next().unwrap_or(base)
}

impl fmt::Display for InheritanceDebug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_all())
    }
}

/// A guard that keeps a tracing span entered until dropped.
///
/// Useful for tracking the duration of an operation.
#[derive(Debug)]
pub struct PerfSpan {
    _span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create and enter a new performance span.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::trace_span!(target: targets::PERF, "perf", operation = name);
        Self {
            _span: span.entered(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Node(ObjectId);

    impl Node {
        fn new(label: &'static str) -> Self {
            Self(identity_registry().register(label))
        }
    }

    impl Drop for Node {
        fn drop(&mut self) {
            identity_registry().unregister(self.0);
        }
    }

    #[test]
    fn test_format_all_has_header() {
        let output = InheritanceDebug::new().format_all();
        assert!(output.contains("Inheritance Tree"));
    }

    #[test]
    fn test_format_single() {
        let node = Node::new("app::Settings");
        let output = InheritanceDebug::new().format_subtree(node.0);
        assert!(output.starts_with("Settings"));
        assert!(output.contains('['));
    }

    #[test]
    fn test_format_hierarchy() {
        let root = Node::new("Root");
        let first = Node::new("First");
        let second = Node::new("Second");
        let root_id = root.0;
        let _a = identity_registry().bind_parent(first.0, move || Some(root_id));
        let _b = identity_registry().bind_parent(second.0, move || Some(root_id));
        let _deps = identity_registry().bind(crate::Dependencies::new(), root.0);

        let options = TreeFormatOptions {
            style: TreeStyle::Ascii,
            show_ids: false,
            ..Default::default()
        };
        let output = InheritanceDebug::with_options(options).format_subtree(root.0);
        assert_eq!(output, "Root (dependencies)\n+-- First\n`-- Second\n");
    }

    #[test]
    fn test_children_follow_registration_order() {
        // A reused slot carries a newer version, so `first` can outrank
        // `second` in raw id order.
        drop(Node::new("Spare"));
        let root = Node::new("Root");
        let first = Node::new("First");
        let second = Node::new("Second");
        let root_id = root.0;
        let _b = identity_registry().bind_parent(second.0, move || Some(root_id));
        let _a = identity_registry().bind_parent(first.0, move || Some(root_id));

        let sequence = |node: &Node| identity_registry().info(node.0).map(|info| info.sequence);
        assert!(sequence(&first) < sequence(&second));

        let options = TreeFormatOptions {
            style: TreeStyle::Ascii,
            ..TreeFormatOptions::minimal()
        };
        let output = InheritanceDebug::with_options(options).format_subtree(root.0);
        assert_eq!(output, "Root\n+-- First\n`-- Second\n");
    }

    #[test]
    fn test_format_minimal_and_depth() {
        let root = Node::new("Root");
        let child = Node::new("Child");
        let root_id = root.0;
        let _link = identity_registry().bind_parent(child.0, move || Some(root_id));

        let options = TreeFormatOptions {
            max_depth: Some(0),
            ..TreeFormatOptions::minimal()
        };
        let output = InheritanceDebug::with_options(options).format_subtree(root.0);
        assert_eq!(output, "Root\n");
    }

    #[test]
    fn test_stale_identity_formats_empty() {
        let id = Node::new("Gone").0;
        assert!(InheritanceDebug::new().format_subtree(id).is_empty());
    }

    #[test]
    fn test_short_label() {
        assert_eq!(short_label("app::Settings"), "Settings");
        assert_eq!(short_label("republish_core::scoped::Scoped<app::Model, i32>"), "Scoped");
        assert_eq!(short_label("Plain"), "Plain");
    }

    #[test]
    fn test_perf_span() {
        let _span = PerfSpan::new("test_operation");
    }
}
