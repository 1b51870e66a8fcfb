use std::collections::HashMap;

use weft_serde::{BitReader, BitWrite, Serde, SerdeErr};

use crate::group::GroupId;
use crate::pipe::CallbackKind;
use crate::types::{Node, Tag};

/// What a reduction ranges over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ReduceScope {
    Group(GroupId),
    Collection(u32),
}

impl Serde for ReduceScope {
    fn ser(&self, writer: &mut dyn BitWrite) {
        match self {
            ReduceScope::Group(group) => {
                writer.write_bit(false);
                group.ser(writer);
            }
            ReduceScope::Collection(proxy) => {
                writer.write_bit(true);
                proxy.ser(writer);
            }
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        if reader.read_bit()? {
            Ok(ReduceScope::Collection(u32::de(reader)?))
        } else {
            Ok(ReduceScope::Group(GroupId::de(reader)?))
        }
    }

    fn bit_length(&self) -> u32 {
        match self {
            ReduceScope::Group(group) => 1 + group.bit_length(),
            ReduceScope::Collection(proxy) => 1 + proxy.bit_length(),
        }
    }
}

pub(crate) type ReduceKey = (ReduceScope, Tag, u64);

/// Side effects of feeding a contribution or a child answer in.
pub(crate) enum ReduceEffect {
    /// This node's subtree is complete: pass the combined value up.
    SendUp {
        to: Node,
        scope: ReduceScope,
        tag: Tag,
        seq: u64,
        op: u32,
        value: Option<Vec<u8>>,
        cb: Option<CallbackKind>,
    },
    /// Root completion: fire the callback with the reduced value.
    Fire { cb: CallbackKind, value: Vec<u8> },
}

/// The tree edges this node sees for one reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReduceEdges {
    pub parent: Option<Node>,
    pub children: usize,
}

struct ReduceState {
    op: u32,
    edges: ReduceEdges,
    local_expected: usize,
    local_got: usize,
    children_got: usize,
    /// Local contributions folded in arrival order.
    own: Option<Vec<u8>>,
    /// Child subtree values, in arrival order, folded after the local ones.
    child_vals: Vec<Vec<u8>>,
    cb: Option<CallbackKind>,
}

type Combine<'c> = &'c dyn Fn(&[u8], &[u8]) -> Result<Vec<u8>, SerdeErr>;

/// Per-(scope, tag, seq) combine state.
pub(crate) struct ReduceManager {
    seqs: HashMap<(ReduceScope, Tag), u64>,
    states: HashMap<ReduceKey, ReduceState>,
}

impl ReduceManager {
    pub fn new() -> Self {
        Self {
            seqs: HashMap::new(),
            states: HashMap::new(),
        }
    }

    /// Mint the sequence number for this participant's next reduction on
    /// `(scope, tag)`. Participants call collectively in the same order,
    /// so every node mints matching sequences.
    pub fn next_seq(&mut self, scope: ReduceScope, tag: Tag) -> u64 {
        let seq = self.seqs.entry((scope, tag)).or_insert(0);
        *seq += 1;
        *seq
    }

    fn state_mut(
        &mut self,
        key: ReduceKey,
        op: u32,
        edges: ReduceEdges,
        local_expected: usize,
    ) -> &mut ReduceState {
        self.states.entry(key).or_insert_with(|| ReduceState {
            op,
            edges,
            local_expected,
            local_got: 0,
            children_got: 0,
            own: None,
            child_vals: Vec::new(),
            cb: None,
        })
    }

    /// One local contribution.
    pub fn contribute(
        &mut self,
        key: ReduceKey,
        op: u32,
        edges: ReduceEdges,
        local_expected: usize,
        value: Vec<u8>,
        cb: Option<CallbackKind>,
        combine: Combine,
    ) -> Result<Vec<ReduceEffect>, SerdeErr> {
        let state = self.state_mut(key, op, edges, local_expected);
        state.local_got += 1;
        state.own = match state.own.take() {
            None => Some(value),
            Some(acc) => Some(combine(&acc, &value)?),
        };
        if state.cb.is_none() {
            state.cb = cb;
        }
        self.try_complete(key, combine)
    }

    /// A child subtree's combined value arrived.
    pub fn on_up(
        &mut self,
        key: ReduceKey,
        op: u32,
        edges: ReduceEdges,
        local_expected: usize,
        value: Option<Vec<u8>>,
        cb: Option<CallbackKind>,
        combine: Combine,
    ) -> Result<Vec<ReduceEffect>, SerdeErr> {
        let state = self.state_mut(key, op, edges, local_expected);
        state.children_got += 1;
        if let Some(value) = value {
            state.child_vals.push(value);
        }
        if state.cb.is_none() {
            state.cb = cb;
        }
        self.try_complete(key, combine)
    }

    fn try_complete(&mut self, key: ReduceKey, combine: Combine) -> Result<Vec<ReduceEffect>, SerdeErr> {
        let state = self.states.get(&key).expect("state just touched");
        if state.local_got < state.local_expected || state.children_got < state.edges.children {
            return Ok(Vec::new());
        }

        let state = self.states.remove(&key).expect("state vanished");
        let mut acc = state.own;
        for value in state.child_vals {
            acc = match acc {
                None => Some(value),
                Some(folded) => Some(combine(&folded, &value)?),
            };
        }

        let (scope, tag, seq) = key;
        match state.edges.parent {
            Some(parent) => Ok(vec![ReduceEffect::SendUp {
                to: parent,
                scope,
                tag,
                seq,
                op: state.op,
                value: acc,
                cb: state.cb,
            }]),
            None => {
                let value = acc.expect("reduction completed with no contributions");
                let cb = state.cb.expect("reduction completed with no callback");
                Ok(vec![ReduceEffect::Fire { cb, value }])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerId, HandlerKind};
    use weft_serde::Serde;

    fn combine(a: &[u8], b: &[u8]) -> Result<Vec<u8>, SerdeErr> {
        let a = i32::from_bytes(a)?;
        let b = i32::from_bytes(b)?;
        Ok((a + b).to_bytes())
    }

    fn cb() -> CallbackKind {
        CallbackKind::Send {
            handler: HandlerId::new(HandlerKind::Auto, 1, 0),
            node: 0,
        }
    }

    fn key(seq: u64) -> ReduceKey {
        (ReduceScope::Group(GroupId::WORLD), 0, seq)
    }

    #[test]
    fn sequences_increment_per_scope_and_tag() {
        let mut mgr = ReduceManager::new();
        let scope = ReduceScope::Group(GroupId::WORLD);
        assert_eq!(mgr.next_seq(scope, 0), 1);
        assert_eq!(mgr.next_seq(scope, 0), 2);
        assert_eq!(mgr.next_seq(scope, 9), 1);
        assert_eq!(mgr.next_seq(ReduceScope::Collection(3), 0), 1);
    }

    #[test]
    fn leaf_sends_up_after_its_own_contribution() {
        let mut mgr = ReduceManager::new();
        let edges = ReduceEdges {
            parent: Some(0),
            children: 0,
        };
        let effects = mgr
            .contribute(key(1), 0, edges, 1, 5i32.to_bytes(), None, &combine)
            .unwrap();
        match &effects[0] {
            ReduceEffect::SendUp { to, value, .. } => {
                assert_eq!(*to, 0);
                assert_eq!(i32::from_bytes(value.as_ref().unwrap()).unwrap(), 5);
            }
            _ => panic!("expected SendUp"),
        }
    }

    #[test]
    fn root_fires_after_children_and_own() {
        let mut mgr = ReduceManager::new();
        let edges = ReduceEdges {
            parent: None,
            children: 2,
        };
        assert!(mgr
            .contribute(key(1), 0, edges, 1, 1i32.to_bytes(), Some(cb()), &combine)
            .unwrap()
            .is_empty());
        assert!(mgr
            .on_up(key(1), 0, edges, 1, Some(2i32.to_bytes()), None, &combine)
            .unwrap()
            .is_empty());
        let effects = mgr
            .on_up(key(1), 0, edges, 1, Some(3i32.to_bytes()), None, &combine)
            .unwrap();
        match &effects[0] {
            ReduceEffect::Fire { value, .. } => {
                assert_eq!(i32::from_bytes(value).unwrap(), 6);
            }
            _ => panic!("expected Fire"),
        }
    }

    #[test]
    fn child_answers_may_arrive_before_own_contribution() {
        let mut mgr = ReduceManager::new();
        let edges = ReduceEdges {
            parent: Some(2),
            children: 1,
        };
        assert!(mgr
            .on_up(key(4), 0, edges, 1, Some(9i32.to_bytes()), None, &combine)
            .unwrap()
            .is_empty());
        let effects = mgr
            .contribute(key(4), 0, edges, 1, 1i32.to_bytes(), None, &combine)
            .unwrap();
        match &effects[0] {
            ReduceEffect::SendUp { value, .. } => {
                // own folds before child arrivals
                assert_eq!(i32::from_bytes(value.as_ref().unwrap()).unwrap(), 10);
            }
            _ => panic!("expected SendUp"),
        }
    }

    #[test]
    fn empty_subtree_values_are_skipped() {
        let mut mgr = ReduceManager::new();
        let edges = ReduceEdges {
            parent: Some(0),
            children: 1,
        };
        assert!(mgr.on_up(key(7), 0, edges, 1, None, None, &combine).unwrap().is_empty());
        let effects = mgr
            .contribute(key(7), 0, edges, 1, 4i32.to_bytes(), None, &combine)
            .unwrap();
        match &effects[0] {
            ReduceEffect::SendUp { value, .. } => {
                assert_eq!(i32::from_bytes(value.as_ref().unwrap()).unwrap(), 4);
            }
            _ => panic!("expected SendUp"),
        }
    }
}
