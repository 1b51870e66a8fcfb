use std::any::Any;
use std::collections::{HashMap, HashSet};

use crate::collection::index::CollIndex;
use crate::collection::mapping::MapFn;
use crate::collection::Collection;
use crate::epoch::Epoch;
use crate::types::Node;

/// A live element: the user value plus the broadcast sequences it has
/// already seen (carried along on migration so a broadcast is never
/// delivered twice to a moving element).
pub(crate) struct LiveElement<C> {
    pub elm: C,
    pub bcast_seen: HashMap<Node, u64>,
}

pub(crate) enum ElementSlot<C> {
    Live(LiveElement<C>),
    /// Held by the runtime while its handler runs.
    CheckedOut,
    /// Tombstone after migrating out: forward arrivals toward this node.
    Departed(Node),
}

/// The typed half of one node's view of a collection: the elements and
/// their mapping.
pub(crate) struct CollectionRecord<C: Collection> {
    pub range: C::Index,
    pub map: MapFn<C::Index>,
    pub dynamic: bool,
    pub elements: HashMap<C::Index, ElementSlot<C>>,
}

impl<C: Collection> CollectionRecord<C> {
    pub fn new(range: C::Index, map: MapFn<C::Index>, dynamic: bool) -> Self {
        Self {
            range,
            map,
            dynamic,
            elements: HashMap::new(),
        }
    }

    pub fn home_of(&self, index: &C::Index, num_nodes: Node) -> Node {
        (self.map)(index, &self.range, num_nodes)
    }

    pub fn entity_of(&self, index: &C::Index) -> u64 {
        index.linearize(&self.range)
    }

    pub fn insert_live(&mut self, index: C::Index, elm: C, bcast_seen: HashMap<Node, u64>) {
        self.elements
            .insert(index, ElementSlot::Live(LiveElement { elm, bcast_seen }));
    }

    pub fn is_live(&self, index: &C::Index) -> bool {
        matches!(self.elements.get(index), Some(ElementSlot::Live(_)))
    }

    pub fn departed_to(&self, index: &C::Index) -> Option<Node> {
        match self.elements.get(index) {
            Some(ElementSlot::Departed(node)) => Some(*node),
            _ => None,
        }
    }

    /// Take the element out for a handler run.
    pub fn checkout(&mut self, index: &C::Index) -> Option<LiveElement<C>> {
        match self.elements.get_mut(index) {
            Some(slot @ ElementSlot::Live(_)) => {
                let taken = std::mem::replace(slot, ElementSlot::CheckedOut);
                match taken {
                    ElementSlot::Live(live) => Some(live),
                    _ => unreachable!(),
                }
            }
            _ => None,
        }
    }

    pub fn reinsert(&mut self, index: C::Index, live: LiveElement<C>) {
        self.elements.insert(index, ElementSlot::Live(live));
    }

    /// Migrate-out transition: the checked-out slot becomes a tombstone.
    pub fn depart(&mut self, index: C::Index, to: Node) {
        self.elements.insert(index, ElementSlot::Departed(to));
    }

    pub fn live_indices(&self) -> Vec<C::Index> {
        self.elements
            .iter()
            .filter(|(_, slot)| matches!(slot, ElementSlot::Live(_)))
            .map(|(index, _)| *index)
            .collect()
    }

    /// Member set and size of a bulk range under this record's mapping.
    pub fn bulk_layout(&self, num_nodes: Node) -> (Vec<Node>, u64) {
        let size = C::Index::size(&self.range);
        let mut members = HashSet::new();
        for linear in 0..size {
            let index = C::Index::from_linear(&self.range, linear);
            members.insert(self.home_of(&index, num_nodes));
        }
        let mut members: Vec<Node> = members.into_iter().collect();
        members.sort_unstable();
        (members, size)
    }
}

/// The untyped half: everything the runtime's system handlers need without
/// knowing the element type.
pub(crate) struct CollectionMeta {
    /// Nodes hosting at least one element (the collection's group).
    pub members: Vec<Node>,
    pub members_ready: bool,
    pub total: u64,
    /// Live elements on this node.
    pub live: u64,
    /// Outgoing broadcast sequence from this node.
    pub bcast_out: u64,
    /// Open dynamic-modification bracket, if any.
    pub open_insert: Option<Epoch>,
}

impl CollectionMeta {
    fn new() -> Self {
        Self {
            members: Vec::new(),
            members_ready: false,
            total: 0,
            live: 0,
            bcast_out: 0,
            open_insert: None,
        }
    }
}

/// Holds every collection on this node. Records are type-erased; the typed
/// dispatch closures registered with the protocol recover the element
/// type.
pub(crate) struct CollectionManager {
    seq: u32,
    records: HashMap<u32, Box<dyn Any>>,
    metas: HashMap<u32, CollectionMeta>,
    destroyed: HashSet<u32>,
}

impl CollectionManager {
    pub fn new() -> Self {
        Self {
            seq: 0,
            records: HashMap::new(),
            metas: HashMap::new(),
            destroyed: HashSet::new(),
        }
    }

    /// Mint the next proxy id. Construction is collective, so every node
    /// mints identical ids.
    pub fn mint(&mut self) -> u32 {
        self.seq += 1;
        self.seq
    }

    pub fn install<C: Collection>(&mut self, proxy: u32, record: CollectionRecord<C>) {
        self.records.insert(proxy, Box::new(record));
        self.metas.insert(proxy, CollectionMeta::new());
    }

    pub fn record_mut<C: Collection>(&mut self, proxy: u32) -> Option<&mut CollectionRecord<C>> {
        self.records
            .get_mut(&proxy)
            .and_then(|any| any.downcast_mut::<CollectionRecord<C>>())
    }

    pub fn meta(&self, proxy: u32) -> Option<&CollectionMeta> {
        self.metas.get(&proxy)
    }

    pub fn meta_mut(&mut self, proxy: u32) -> Option<&mut CollectionMeta> {
        self.metas.get_mut(&proxy)
    }

    pub fn is_destroyed(&self, proxy: u32) -> bool {
        self.destroyed.contains(&proxy)
    }

    pub fn exists(&self, proxy: u32) -> bool {
        self.records.contains_key(&proxy)
    }

    pub fn destroy(&mut self, proxy: u32) -> bool {
        self.destroyed.insert(proxy);
        self.metas.remove(&proxy);
        self.records.remove(&proxy).is_some()
    }
}
