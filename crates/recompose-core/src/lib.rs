//! # Composition, State, and Effects
//!
//! Recompose builds output by running plain functions ("content") under a
//! `Composer` and re-running them when the state they read changes. There is
//! no retained widget tree and no diff: each pass walks the same code again,
//! and a per-composer slot table makes repeated work cheap.
//!
//! - `Recomposer` owns composers, the dependency graph and the pending set.
//! - `Composer` drives one pass: nodes, groups, slots, reads.
//! - `State<T>` is a reactive value; reading it subscribes the running
//!   composer, writing it schedules every subscriber.
//!
//! ## State and recomposition
//!
//! ```rust
//! use recompose_core::*;
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let rec = Recomposer::new();
//! let count = rec.state(0);
//! let seen = Rc::new(Cell::new(-1));
//!
//! let id = rec.create_composer({
//!     let (count, seen) = (count.clone(), seen.clone());
//!     move |_cx: &mut Composer| seen.set(count.get())
//! });
//! assert_eq!(seen.get(), 0);
//!
//! count.set(5);
//! assert_eq!(seen.get(), 5);
//! assert_eq!(rec.reads_of(id), vec![count.id()]);
//! ```
//!
//! The default scheduler flushes synchronously. Pass a `DeferredScheduler`
//! to `Recomposer::builder()` to flush once per frame instead.
//!
//! ## Remembered values
//!
//! - `remember` is positional: the Nth call in a pass refers to the Nth
//!   stored value.
//! - `remember_keyed` recomputes when its input changes.
//! - `remember_with_key` is keyed by a string and survives branch changes.
//!
//! Conditionals and loops that change which slots are visited must be wrapped
//! in `keyed` (or `start_group`/`end_group`) so positions stay aligned.
//!
//! ## Effects and cleanup
//!
//! ```rust
//! use recompose_core::*;
//!
//! let rec = Recomposer::new();
//! let user = rec.state(1u32);
//! rec.create_composer({
//!     let user = user.clone();
//!     move |cx: &mut Composer| {
//!         let id = user.get();
//!         cx.disposable_effect(id, move || {
//!             log::info!("watching user {id}");
//!             on_unmount(move || log::info!("stopped watching user {id}"))
//!         });
//!     }
//! });
//! user.set(2); // runs the cleanup for user 1, then starts user 2
//! ```
//!
//! - `disposable_effect` returns its own cleanup.
//! - `launched_effect` hands a job to the `EffectExecutor`; restarting or
//!   disposing cancels its `CancellationToken`.
//! - `side_effect` runs after the pass commits.
//!
//! Failures never escape a flush: they come back in the `FlushReport`, through
//! the builder's `on_error` hook, and in the log.

pub mod clock;
pub mod composer;
pub mod effects;
pub mod effects_ext;
pub mod error;
pub mod locals;
pub mod prelude;
pub mod reactive;
pub mod recomposer;
pub mod render_api;
pub mod scheduler;
pub mod scope;
pub mod slot_table;
pub mod state;
pub mod sync;

pub use clock::*;
pub use composer::*;
pub use effects::*;
pub use error::*;
pub use locals::*;
pub use reactive::*;
pub use recomposer::*;
pub use render_api::*;
pub use scheduler::*;
pub use scope::*;
pub use slot_table::*;
pub use state::*;
pub use sync::*;
