//! Drill session orchestration.
//!
//! A [`DrillSessionController`] is a cheap, cloneable handle to a single task
//! that owns the readiness coordinator, shot collector, session clock and
//! scoring aggregator. Every call on the handle and every transport
//! notification is a message into that task, so phase transitions are
//! evaluated one at a time on its tick.

mod actor;
mod builder;
mod callbacks;
mod command;
mod controller;
mod snapshot;

pub use builder::DrillSessionBuilder;
pub use callbacks::{NoopCallbacks, SessionCallbacks, SummarySink};
pub use controller::DrillSessionController;
pub use snapshot::{SessionSnapshot, SessionStatus};
