//! Republish - reactive state propagation for trees of observable objects.
//!
//! This is the main umbrella crate that re-exports all public APIs.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use republish::prelude::*;
//!
//! #[derive(Observable)]
//! struct Counter {
//!     #[change_signal]
//!     changed: ChangeSignal,
//!     #[published]
//!     value: Published<i32>,
//! }
//!
//! #[derive(Observable)]
//! struct Screen {
//!     #[change_signal]
//!     changed: ChangeSignal,
//!     #[republished]
//!     counter: Republished<Arc<Counter>>,
//! }
//!
//! let counter = Arc::new(Counter { changed: ChangeSignal::new(), value: Published::new(0) });
//! let screen = Screen { changed: ChangeSignal::new(), counter: Republished::new(counter) };
//! screen.bind_observable_fields();
//!
//! let _redraw = screen.changed.subscribe(|| println!("screen will change"));
//! screen.counter().set_value(1);
//! ```

pub use republish_core::*;
pub use republish_macros::*;

pub mod prelude;
