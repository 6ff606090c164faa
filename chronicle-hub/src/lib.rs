//! Event distribution hub for the chronicle runtime.
//!
//! [`EventHub`] is the single emission point for one running session:
//! `emit`/`publish` fan out to the durable store, live subscribers, and
//! observer callbacks, and `checkpoint` is where pause/resume is decided.
//! [`HubRegistry`] is the multi-session facade the public API surface is
//! built on — it tracks which session has a live hub, and holds paused
//! snapshots for sessions that don't.

mod error;
mod hub;
mod pattern;
mod registry;

pub use error::{NotPausedError, PauseError};
pub use hub::EventHub;
pub use registry::HubRegistry;
