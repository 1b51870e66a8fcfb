use crate::epoch::Epoch;
use crate::types::Node;

/// Allocates epoch ids and tracks the stack of currently open epochs.
///
/// Rooted ids embed the originating node, so each node's rooted stream is
/// globally unique. Collective ids come from a counter every node advances
/// in the same order (`make_epoch_collective` is a collective call), so all
/// nodes mint identical ids without communication. Sequence 0 of the
/// collective stream is reserved for the global no-epoch bucket.
pub(crate) struct EpochManager {
    node: Node,
    rooted_seq: u64,
    collective_seq: u64,
    stack: Vec<Epoch>,
}

impl EpochManager {
    pub fn new(node: Node) -> Self {
        Self {
            node,
            rooted_seq: 0,
            collective_seq: 0,
            stack: Vec::new(),
        }
    }

    pub fn make_rooted(&mut self) -> Epoch {
        self.rooted_seq += 1;
        Epoch::make_rooted(self.node, 0, self.rooted_seq)
    }

    pub fn make_collective(&mut self) -> Epoch {
        self.collective_seq += 1;
        Epoch::make_collective(0, self.collective_seq)
    }

    /// The epoch new sends are accounted to: innermost open epoch, else the
    /// global bucket.
    pub fn current(&self) -> Epoch {
        self.stack.last().copied().unwrap_or_else(Epoch::global)
    }

    pub fn push(&mut self, epoch: Epoch) {
        self.stack.push(epoch);
    }

    pub fn pop(&mut self) -> Option<Epoch> {
        self.stack.pop()
    }
}
