/// Rank of a process in the transport world.
pub type Node = u16;

/// Destination value carried by broadcast envelopes instead of a rank.
pub const BROADCAST_DEST: Node = Node::MAX;

/// User-level disambiguator for concurrent flows through the same handler.
pub type Tag = u32;

/// Tag value meaning "no tag".
pub const NO_TAG: Tag = 0;

/// Identifier of an entity universe inside the location directory. Each
/// collection's elements form one universe.
pub type UniverseId = u64;

/// Opaque application-chosen identity of a migratable entity within one
/// universe.
pub type EntityId = u64;
