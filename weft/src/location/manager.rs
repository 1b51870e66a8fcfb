use std::collections::{HashMap, HashSet, VecDeque};

use log::trace;

use crate::location::{LocationError, LocationRecord, LruCache};
use crate::runtime::Runtime;
use crate::types::{EntityId, Node};

/// How a send should proceed after consulting the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LocationEffect {
    /// The entity is resident here.
    DeliverLocal,
    /// Best known location; the target forwards if it went stale.
    Forward { to: Node },
    /// No knowledge: the message was queued and the home must be asked.
    QueryHome { home: Node },
    /// A query for this entity is already in flight; the message was
    /// queued behind it.
    Queued,
}

type LookupCb = Box<dyn FnOnce(&mut Runtime, Node)>;

/// One universe's directory: home records for entities homed here, a
/// bounded cache of learned locations, and messages parked while a
/// where-is query is outstanding.
pub(crate) struct LocationManager<P> {
    node: Node,
    records: HashMap<EntityId, LocationRecord>,
    cache: LruCache<EntityId, Node>,
    pending: HashMap<EntityId, VecDeque<P>>,
    outstanding: HashSet<EntityId>,
    lookups: HashMap<EntityId, Vec<LookupCb>>,
    /// Where-is queries that arrived before the entity was registered
    /// here, answered once a registration or migration shows up.
    parked_queries: HashMap<EntityId, Vec<Node>>,
}

impl<P> LocationManager<P> {
    pub fn new(node: Node, cache_capacity: usize) -> Self {
        Self {
            node,
            records: HashMap::new(),
            cache: LruCache::new(cache_capacity),
            pending: HashMap::new(),
            outstanding: HashSet::new(),
            lookups: HashMap::new(),
            parked_queries: HashMap::new(),
        }
    }

    // Registration and migration bookkeeping

    /// Install a `Local` record: the entity lives here now.
    pub fn register(&mut self, entity: EntityId) {
        self.records.insert(entity, LocationRecord::Local);
        self.cache.remove(&entity);
    }

    pub fn unregister(&mut self, entity: EntityId) {
        self.records.remove(&entity);
    }

    pub fn is_local(&self, entity: EntityId) -> bool {
        matches!(self.records.get(&entity), Some(LocationRecord::Local))
    }

    /// Home-side update after a migration landed on `node`.
    pub fn entity_migrated(&mut self, entity: EntityId, node: Node) {
        if node == self.node {
            self.records.insert(entity, LocationRecord::Local);
        } else {
            self.records.insert(entity, LocationRecord::Remote(node));
        }
        self.cache.remove(&entity);
    }

    /// Learned location from an inform or a routed delivery.
    pub fn prime_cache(&mut self, entity: EntityId, node: Node) {
        if node != self.node {
            self.cache.insert(entity, node);
        }
    }

    pub fn invalidate(&mut self, entity: EntityId) {
        self.cache.remove(&entity);
    }

    // Send-side resolution

    /// Decide where a message for `entity` should go. A `QueryHome` result
    /// means the caller must queue the message via [`queue_pending`] and
    /// issue the query; `Queued` means a query is already out.
    ///
    /// [`queue_pending`]: Self::queue_pending
    pub fn resolve(&mut self, entity: EntityId, home: Node) -> LocationEffect {
        match self.records.get(&entity) {
            Some(LocationRecord::Local) => return LocationEffect::DeliverLocal,
            Some(LocationRecord::Remote(node)) => {
                return LocationEffect::Forward { to: *node };
            }
            None => {}
        }
        if let Some(node) = self.cache.get(&entity) {
            return LocationEffect::Forward { to: *node };
        }
        if home != self.node {
            if self.outstanding.insert(entity) {
                LocationEffect::QueryHome { home }
            } else {
                LocationEffect::Queued
            }
        } else {
            // We are the home and have no record: the entity does not
            // exist (yet). Queue until a registration or inform shows up.
            if self.outstanding.insert(entity) {
                trace!("node {}: home miss for entity {}", self.node, entity);
            }
            LocationEffect::Queued
        }
    }

    pub fn queue_pending(&mut self, entity: EntityId, msg: P) {
        self.pending.entry(entity).or_default().push_back(msg);
    }

    /// Release everything parked behind `entity`, in arrival order.
    pub fn take_pending(&mut self, entity: EntityId) -> VecDeque<P> {
        self.outstanding.remove(&entity);
        self.pending.remove(&entity).unwrap_or_default()
    }

    pub fn has_pending(&self, entity: EntityId) -> bool {
        self.pending.contains_key(&entity)
    }

    // Home-side query handling

    /// Answer a where-is query.
    pub fn where_is(&self, entity: EntityId) -> Result<Node, LocationError> {
        match self.records.get(&entity) {
            Some(LocationRecord::Local) => Ok(self.node),
            Some(LocationRecord::Remote(node)) => Ok(*node),
            None => Err(LocationError::UnknownEntity { entity }),
        }
    }

    /// Hold an early where-is query until the entity registers here.
    pub fn park_query(&mut self, entity: EntityId, asker: Node) {
        self.parked_queries.entry(entity).or_default().push(asker);
    }

    /// Askers waiting on this entity, drained once it becomes known.
    pub fn release_queries(&mut self, entity: EntityId) -> Vec<Node> {
        self.parked_queries.remove(&entity).unwrap_or_default()
    }

    // Lookup callbacks (`get_location`)

    /// Resolve a location for a user callback. Returns the location to
    /// invoke it with immediately, or `None` after parking the callback
    /// until an inform arrives.
    pub fn lookup(&mut self, entity: EntityId, cb: LookupCb) -> Option<(LookupCb, Node)> {
        if self.is_local(entity) {
            return Some((cb, self.node));
        }
        if let Some(LocationRecord::Remote(node)) = self.records.get(&entity) {
            return Some((cb, *node));
        }
        if let Some(node) = self.cache.get(&entity) {
            return Some((cb, *node));
        }
        self.lookups.entry(entity).or_default().push(cb);
        None
    }

    /// Whether a where-is must be issued for this lookup.
    pub fn lookup_needs_query(&mut self, entity: EntityId) -> bool {
        self.outstanding.insert(entity)
    }

    /// An inform arrived: prime the cache and hand back parked lookups.
    pub fn on_inform(&mut self, entity: EntityId, node: Node) -> Vec<(LookupCb, Node)> {
        self.prime_cache(entity, node);
        self.lookups
            .remove(&entity)
            .unwrap_or_default()
            .into_iter()
            .map(|cb| (cb, node))
            .collect()
    }
}
