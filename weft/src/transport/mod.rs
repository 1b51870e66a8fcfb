//! The transport contract the runtime is built over.
//!
//! The runtime needs very little from its transport: ordered reliable
//! point-to-point sends between rank pairs carrying a 32-bit tag, a
//! non-blocking receive, the world size and own rank, and a barrier. No
//! collective correctness beyond the barrier is assumed.

use thiserror::Error;

use crate::types::{Node, Tag};

cfg_if! {
    if #[cfg(feature = "transport_local")] {
        pub mod local;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("destination rank {dest} does not exist")]
    InvalidDestination { dest: Node },
    #[error("peer {dest} hung up")]
    Disconnected { dest: Node },
}

/// Ordered reliable point-to-point messaging between ranked processes.
///
/// Sends between a fixed `(sender, receiver)` pair must be received in send
/// order regardless of tag; the runtime's rendezvous protocol relies on a
/// control message preceding its data fragments.
pub trait Transport: Send {
    /// Own rank in `[0, num_nodes)`.
    fn node(&self) -> Node;

    fn num_nodes(&self) -> Node;

    fn send(&mut self, dest: Node, tag: Tag, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Non-blocking probe and receive of the next pending message.
    fn recv(&mut self) -> Option<(Node, Tag, Vec<u8>)>;

    /// Block until every rank has entered the barrier.
    fn barrier(&mut self);
}
