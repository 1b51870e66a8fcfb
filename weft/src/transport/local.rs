//! In-process transport: every node is a thread, connected pairwise by
//! ordered channels.

use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Barrier};

use crate::transport::{Transport, TransportError};
use crate::types::{Node, Tag};

type Packet = (Node, Tag, Vec<u8>);

/// Builds the endpoints of an in-process world.
///
/// ```
/// use weft::{LocalNetwork, Transport};
///
/// let mut endpoints = LocalNetwork::new(4);
/// assert_eq!(endpoints.len(), 4);
/// assert_eq!(endpoints[3].node(), 3);
/// ```
pub struct LocalNetwork;

impl LocalNetwork {
    /// Create `num_nodes` connected endpoints. Hand one to each node
    /// thread.
    pub fn new(num_nodes: Node) -> Vec<LocalTransport> {
        assert!(num_nodes > 0, "a world needs at least one node");

        let mut senders: Vec<Sender<Packet>> = Vec::with_capacity(num_nodes as usize);
        let mut receivers: Vec<Receiver<Packet>> = Vec::with_capacity(num_nodes as usize);
        for _ in 0..num_nodes {
            let (tx, rx) = channel();
            senders.push(tx);
            receivers.push(rx);
        }
        let barrier = Arc::new(Barrier::new(num_nodes as usize));

        receivers
            .into_iter()
            .enumerate()
            .map(|(node, receiver)| LocalTransport {
                node: node as Node,
                num_nodes,
                senders: senders.clone(),
                receiver,
                barrier: barrier.clone(),
            })
            .collect()
    }
}

/// One node's endpoint of a [`LocalNetwork`].
pub struct LocalTransport {
    node: Node,
    num_nodes: Node,
    senders: Vec<Sender<Packet>>,
    receiver: Receiver<Packet>,
    barrier: Arc<Barrier>,
}

impl Transport for LocalTransport {
    fn node(&self) -> Node {
        self.node
    }

    fn num_nodes(&self) -> Node {
        self.num_nodes
    }

    fn send(&mut self, dest: Node, tag: Tag, payload: Vec<u8>) -> Result<(), TransportError> {
        let sender = self
            .senders
            .get(dest as usize)
            .ok_or(TransportError::InvalidDestination { dest })?;
        sender
            .send((self.node, tag, payload))
            .map_err(|_| TransportError::Disconnected { dest })
    }

    fn recv(&mut self) -> Option<(Node, Tag, Vec<u8>)> {
        match self.receiver.try_recv() {
            Ok(packet) => Some(packet),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    fn barrier(&mut self) {
        self.barrier.wait();
    }
}
