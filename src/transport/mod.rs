//! Seam to the wireless link that reaches the target devices.
//!
//! The engine only needs to push JSON-like commands out and to receive two
//! kinds of notifications back (device ready, shot received). Inbound
//! notifications travel over an unbounded channel owned by the session task,
//! which is the only point where another thread hands data to the engine.

mod commands;
mod inbound;
mod mock;

use crate::error::TransportError;
use async_trait::async_trait;

pub use commands::{TransportCommand, BROADCAST_DEST};
pub use inbound::TransportEvent;
pub use mock::MockTransport;

/// Outbound half of the transport collaborator
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write a command to the link. Delivery is fire-and-forget; an error means
    /// the write itself could not be queued.
    async fn send(&self, command: &TransportCommand) -> Result<(), TransportError>;
}
