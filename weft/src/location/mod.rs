//! The distributed entity directory.
//!
//! One [`LocationManager`] exists per entity universe (for example, one
//! collection's elements). Each entity has a home node fixed by the
//! universe's mapping; the home's record tracks where the entity currently
//! lives. Other nodes keep a bounded lookup cache and queue messages for
//! entities whose location is still being resolved.

mod cache;
mod manager;

pub(crate) use cache::LruCache;
pub(crate) use manager::{LocationEffect, LocationManager};

use thiserror::Error;

use crate::types::{EntityId, Node};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    /// The home node has no record of the entity.
    #[error("entity {entity} is unknown at its home node")]
    UnknownEntity { entity: EntityId },
    /// The cached location went stale and the hop bound was exhausted.
    #[error("entity {entity} moved away; last seen toward node {toward}")]
    Stale { entity: EntityId, toward: Node },
}

/// Where a universe believes an entity is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LocationRecord {
    /// The entity is resident on this node.
    Local,
    /// Home-side record of the entity's current node.
    Remote(Node),
}
