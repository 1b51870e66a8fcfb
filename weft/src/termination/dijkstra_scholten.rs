//! Dijkstra-Scholten state for rooted epochs.
//!
//! The originating node is the permanent root of an engagement tree that
//! grows along first-contact message edges. Every send raises the sender's
//! deficit; every ack lowers it. A non-root node acks non-engaging messages
//! as it consumes them, and holds the ack for its engaging message until it
//! has nothing left to do, which disengages it from its parent. The epoch
//! is terminated when the root is finished and its own deficit is zero.

use crate::types::Node;

/// Per-node Dijkstra-Scholten bookkeeping for one rooted epoch.
pub(crate) struct DsState {
    pub is_root: bool,
    /// Engager: the predecessor whose first message pulled this node into
    /// the computation. Always `None` on the root.
    pub parent: Option<Node>,
    /// Outgoing sends not yet acknowledged.
    pub deficit: u64,
    /// Messages received under this epoch and not yet consumed.
    pub pending_local: u64,
}

impl DsState {
    pub fn new(is_root: bool) -> Self {
        Self {
            is_root,
            parent: None,
            deficit: 0,
            pending_local: 0,
        }
    }

    /// Account an outgoing send.
    pub fn produce(&mut self, count: u64) {
        self.deficit += count;
    }

    /// Account an incoming message. Returns whether this message engages
    /// the node (first contact while disengaged).
    pub fn on_receive(&mut self, from: Node) -> bool {
        self.pending_local += 1;
        if !self.is_root && self.parent.is_none() {
            self.parent = Some(from);
            return true;
        }
        false
    }

    pub fn on_consume(&mut self) {
        debug_assert!(self.pending_local > 0);
        self.pending_local -= 1;
    }

    pub fn on_ack(&mut self, count: u64) {
        debug_assert!(self.deficit >= count);
        self.deficit -= count;
    }

    /// A non-root node may disengage once it owes nothing: no outstanding
    /// sends and no unconsumed messages.
    pub fn can_disengage(&self) -> bool {
        !self.is_root && self.parent.is_some() && self.deficit == 0 && self.pending_local == 0
    }

    /// The root terminates the epoch once finished with the same
    /// obligations cleared.
    pub fn root_quiet(&self) -> bool {
        self.is_root && self.deficit == 0 && self.pending_local == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_contact_engages() {
        let mut state = DsState::new(false);
        assert!(state.on_receive(2));
        assert_eq!(state.parent, Some(2));
        // further messages, even from other predecessors, do not re-engage
        assert!(!state.on_receive(3));
        assert!(!state.on_receive(2));
    }

    #[test]
    fn the_root_never_engages() {
        let mut state = DsState::new(true);
        assert!(!state.on_receive(1));
        assert_eq!(state.parent, None);
    }

    #[test]
    fn disengage_waits_for_deficit_and_pending_work() {
        let mut state = DsState::new(false);
        state.on_receive(0);
        state.produce(1);
        state.on_consume();
        assert!(!state.can_disengage()); // deficit outstanding
        state.on_ack(1);
        assert!(state.can_disengage());
    }

    #[test]
    fn root_quiet_requires_cleared_obligations() {
        let mut state = DsState::new(true);
        state.produce(2);
        assert!(!state.root_quiet());
        state.on_ack(1);
        state.on_ack(1);
        assert!(state.root_quiet());
    }
}
