//! # Hydration
//!
//! Server-rendered markup arrives dormant: visible, not interactive. This
//! crate turns it live piece by piece.
//!
//! - `HydrationScheduler` activates islands in priority order, in time
//!   slices, yielding to the host between slices.
//! - `EventBuffer` keeps interactions with dormant islands and replays them
//!   once the island is live, dropping anything older than the staleness
//!   window.
//! - `Hydrator` wires the two together.
//! - `HydrationManifest` and `CallbackClient` cover the server-authoritative
//!   round trip.
//!
//! ```rust
//! use recompose_core::{Clock, ManualClock};
//! use recompose_hydrate::*;
//! use std::time::Duration;
//!
//! let clock = ManualClock::new();
//! let host = ManualHost::new();
//! let hydrator = Hydrator::new(clock.clone(), host.clone(), HydrationConfig::default());
//!
//! hydrator.register_island("btn1", HydrationPriority::Critical, |h| {
//!     h.on("btn1", "click", |_| Ok(()));
//!     Ok(true)
//! });
//!
//! // clicked before the island is live: buffered
//! assert!(hydrator.dispatch(CapturedEvent::new("click", "btn1", clock.now())).is_none());
//!
//! clock.advance(Duration::from_millis(100));
//! host.run_all();
//! assert_eq!(hydrator.take_reports()[0].result, EventReplayResult::Success);
//! ```

pub mod callback;
pub mod config;
pub mod error;
pub mod events;
pub mod hydrator;
pub mod manifest;
pub mod marker;
pub mod priority;
pub mod scheduler;
pub mod task;

pub use callback::*;
pub use config::*;
pub use error::*;
pub use events::*;
pub use hydrator::*;
pub use manifest::*;
pub use marker::*;
pub use priority::*;
pub use scheduler::*;
pub use task::*;
