//! `syncline-events` library crate.
//!
//! Engine-wide notification infrastructure:
//!
//! - [`EventBus`] — in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`EngineEvent`] — the typed engine notification enum.

pub mod bus;

pub use bus::{EngineEvent, EventBus};
