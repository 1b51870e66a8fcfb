use std::collections::{HashMap, HashSet};

use log::debug;

use crate::group::region::Region;
use crate::group::spanning_tree::SpanningTree;
use crate::group::{GroupError, GroupId};
use crate::runtime::Runtime;
use crate::types::Node;

/// Side effects a group-manager transition asks the runtime to perform.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum GroupEffect {
    /// Install request: tell `to` the full member list so it can wire up
    /// its local subtree and ack to `ack_to`.
    SendSetup {
        to: Node,
        group: GroupId,
        members: Vec<Node>,
        ack_to: Node,
    },
    SendSetupAck {
        to: Node,
        group: GroupId,
    },
    /// Collective wiring finished: fan the ready signal down the member
    /// tree from the known root.
    SendReady {
        to: Node,
        group: GroupId,
    },
    /// Run the completion callback stored for this group on this node.
    FireCallback {
        group: GroupId,
    },
}

struct GroupLocal {
    tree: SpanningTree,
    known_root: Node,
    ready: bool,
}

/// Rooted-creation bookkeeping on the originator.
struct OriginState {
    acks_remaining: usize,
}

/// Collective-creation bookkeeping on the known root.
struct CoordState {
    acks_remaining: usize,
}

type GroupCallback = Box<dyn FnOnce(&mut Runtime, GroupId)>;

/// Builds process subsets and their spanning trees, and answers routing
/// queries for group broadcasts and reductions.
pub(crate) struct GroupManager {
    node: Node,
    num_nodes: Node,
    rooted_seq: u64,
    collective_seq: u64,
    local: HashMap<GroupId, GroupLocal>,
    /// Known roots remembered by rooted-group creators, who may not be
    /// members themselves.
    creator_roots: HashMap<GroupId, Node>,
    origins: HashMap<GroupId, OriginState>,
    coordinators: HashMap<GroupId, CoordState>,
    /// Acks that reached the known root before its own setup did.
    early_acks: HashMap<GroupId, usize>,
    callbacks: HashMap<GroupId, GroupCallback>,
    destroyed: HashSet<GroupId>,
}

impl GroupManager {
    pub fn new(node: Node, num_nodes: Node) -> Self {
        let mut local = HashMap::new();
        local.insert(
            GroupId::WORLD,
            GroupLocal {
                tree: SpanningTree::world(num_nodes),
                known_root: 0,
                ready: true,
            },
        );
        Self {
            node,
            num_nodes,
            rooted_seq: 0,
            collective_seq: 0,
            local,
            creator_roots: HashMap::new(),
            origins: HashMap::new(),
            coordinators: HashMap::new(),
            early_acks: HashMap::new(),
            callbacks: HashMap::new(),
            destroyed: HashSet::new(),
        }
    }

    // Creation

    /// Rooted creation: this node supplies the region and a callback fired
    /// here once every member has wired up.
    pub fn new_rooted(
        &mut self,
        region: &Region,
        is_static: bool,
        cb: GroupCallback,
    ) -> (GroupId, Vec<GroupEffect>) {
        self.rooted_seq += 1;
        let group = GroupId::make_rooted(self.node, self.rooted_seq, is_static);
        let members = region.members(self.num_nodes);
        assert!(!members.is_empty(), "group region resolves to no members");

        self.origins.insert(
            group,
            OriginState {
                acks_remaining: members.len(),
            },
        );
        self.creator_roots.insert(group, members[0]);
        self.callbacks.insert(group, cb);

        let effects = members
            .iter()
            .map(|member| GroupEffect::SendSetup {
                to: *member,
                group,
                members: members.clone(),
                ack_to: self.node,
            })
            .collect();
        (group, effects)
    }

    /// Collective creation, local half: mint the id (identical on every
    /// node) and stash the callback. The member-list gathering runs as a
    /// world reduction driven by the runtime.
    pub fn new_collective(&mut self, is_member: bool, cb: GroupCallback) -> (GroupId, bool) {
        self.collective_seq += 1;
        let group = GroupId::make_collective(self.collective_seq, true);
        if is_member {
            self.callbacks.insert(group, cb);
        }
        (group, is_member)
    }

    /// Collective creation, coordinator half: the world-reduction root
    /// learned the full member list and distributes it.
    pub fn coordinate_collective(&mut self, group: GroupId, members: Vec<Node>) -> Vec<GroupEffect> {
        assert!(!members.is_empty(), "collective group has no members");
        let known_root = members[0];
        members
            .iter()
            .map(|member| GroupEffect::SendSetup {
                to: *member,
                group,
                members: members.clone(),
                ack_to: known_root,
            })
            .collect()
    }

    /// A setup request arrived: wire up the local subtree.
    pub fn install(
        &mut self,
        group: GroupId,
        members: Vec<Node>,
        ack_to: Node,
    ) -> Vec<GroupEffect> {
        let known_root = members[0];
        let tree = SpanningTree::new(members);
        debug!(
            "node {}: group {:?} installed, parent={:?}",
            self.node,
            group,
            tree.parent(self.node)
        );
        // The known root of a collective group counts acks (including its
        // own) before declaring the group ready. Acks from fast members may
        // already be waiting; the root's own ack is still outbound, so the
        // remainder stays positive.
        if group.is_collective() && ack_to == self.node {
            let early = self.early_acks.remove(&group).unwrap_or(0);
            self.coordinators.insert(
                group,
                CoordState {
                    acks_remaining: tree.len() - early,
                },
            );
        }
        self.local.insert(
            group,
            GroupLocal {
                tree,
                known_root,
                ready: !group.is_collective(),
            },
        );
        vec![GroupEffect::SendSetupAck { to: ack_to, group }]
    }

    /// An ack arrived at the rooted originator or the collective known
    /// root.
    pub fn ack(&mut self, group: GroupId) -> Vec<GroupEffect> {
        if let Some(origin) = self.origins.get_mut(&group) {
            origin.acks_remaining -= 1;
            if origin.acks_remaining == 0 {
                self.origins.remove(&group);
                return vec![GroupEffect::FireCallback { group }];
            }
            return Vec::new();
        }
        if let Some(coord) = self.coordinators.get_mut(&group) {
            coord.acks_remaining -= 1;
            if coord.acks_remaining == 0 {
                self.coordinators.remove(&group);
                return self.ready(group);
            }
            return Vec::new();
        }
        // ack raced ahead of this node's own setup
        *self.early_acks.entry(group).or_insert(0) += 1;
        Vec::new()
    }

    /// Ready signal: mark wired, fan to member-tree children, fire the
    /// local completion callback.
    pub fn ready(&mut self, group: GroupId) -> Vec<GroupEffect> {
        let Some(local) = self.local.get_mut(&group) else {
            return Vec::new();
        };
        local.ready = true;
        let mut effects: Vec<GroupEffect> = local
            .tree
            .children(self.node)
            .into_iter()
            .map(|child| GroupEffect::SendReady { to: child, group })
            .collect();
        effects.push(GroupEffect::FireCallback { group });
        effects
    }

    pub fn take_callback(&mut self, group: GroupId) -> Option<GroupCallback> {
        self.callbacks.remove(&group)
    }

    // Routing queries

    pub fn known_root(&self, group: GroupId) -> Result<Node, GroupError> {
        match self.record(group) {
            Ok(local) => Ok(local.known_root),
            // a rooted creator may address the group without being a member
            Err(GroupError::Unknown(_)) => self
                .creator_roots
                .get(&group)
                .copied()
                .ok_or(GroupError::Unknown(group.bits())),
            Err(e) => Err(e),
        }
    }

    /// Children of this node in the world tree rooted at `root` (used for
    /// plain broadcasts and termination fan-out).
    pub fn world_children_from(&self, root: Node) -> Vec<Node> {
        let world = self.local.get(&GroupId::WORLD).expect("world group missing");
        world.tree.children_from(root, self.node)
    }

    /// Parent of this node in the world tree rooted at node 0 (the wave
    /// tree).
    pub fn world_parent(&self) -> Option<Node> {
        let world = self.local.get(&GroupId::WORLD).expect("world group missing");
        world.tree.parent_from(0, self.node)
    }

    /// Children of this node for a broadcast fanned down from the known
    /// root.
    pub fn bcast_children(&self, group: GroupId) -> Result<Vec<Node>, GroupError> {
        let local = self.record(group)?;
        Ok(local.tree.children_from(local.known_root, self.node))
    }

    /// Parent and child count for reductions up toward the known root.
    pub fn reduce_edges(&self, group: GroupId) -> Result<(Option<Node>, usize), GroupError> {
        let local = self.record(group)?;
        let parent = local.tree.parent_from(local.known_root, self.node);
        let children = local.tree.children_from(local.known_root, self.node).len();
        Ok((parent, children))
    }

    pub fn is_member(&self, group: GroupId) -> bool {
        self.local
            .get(&group)
            .map(|local| local.tree.contains(self.node))
            .unwrap_or(false)
    }

    pub fn members(&self, group: GroupId) -> Result<Vec<Node>, GroupError> {
        self.record(group).map(|local| local.tree.members().to_vec())
    }

    fn record(&self, group: GroupId) -> Result<&GroupLocal, GroupError> {
        if self.destroyed.contains(&group) {
            return Err(GroupError::Stale(group.bits()));
        }
        let local = self
            .local
            .get(&group)
            .ok_or(GroupError::Unknown(group.bits()))?;
        if !local.ready {
            return Err(GroupError::NotReady(group.bits()));
        }
        Ok(local)
    }

    // Destruction

    /// Drop the local record. Static groups cannot be destroyed.
    pub fn destroy(&mut self, group: GroupId) -> Result<Vec<Node>, GroupError> {
        if group.is_static() {
            return Err(GroupError::Stale(group.bits()));
        }
        let local = self
            .local
            .remove(&group)
            .ok_or(GroupError::Unknown(group.bits()))?;
        self.destroyed.insert(group);
        Ok(local.tree.children_from(local.known_root, self.node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_cb() -> GroupCallback {
        Box::new(|_rt, _group| {})
    }

    #[test]
    fn rooted_creation_sends_setup_to_every_member() {
        let mut mgr = GroupManager::new(0, 8);
        let region = Region::Range { lo: 2, hi: 5 };
        let (group, effects) = mgr.new_rooted(&region, false, noop_cb());
        assert!(!group.is_collective());
        assert_eq!(effects.len(), 3);
        assert!(effects.iter().all(|e| matches!(
            e,
            GroupEffect::SendSetup { ack_to: 0, .. }
        )));
    }

    #[test]
    fn rooted_callback_fires_after_all_acks() {
        let mut mgr = GroupManager::new(0, 8);
        let (group, _) = mgr.new_rooted(&Region::List(vec![1, 2]), false, noop_cb());
        assert_eq!(mgr.ack(group), Vec::new());
        assert_eq!(mgr.ack(group), vec![GroupEffect::FireCallback { group }]);
    }

    #[test]
    fn install_wires_the_member_tree() {
        let mut mgr = GroupManager::new(3, 8);
        let group = GroupId::make_rooted(0, 1, false);
        let effects = mgr.install(group, vec![1, 3, 5, 7], 0);
        assert_eq!(effects, vec![GroupEffect::SendSetupAck { to: 0, group }]);
        assert_eq!(mgr.known_root(group).unwrap(), 1);
        assert!(mgr.is_member(group));
    }

    #[test]
    fn collective_known_root_counts_acks_then_fans_ready() {
        let mut mgr = GroupManager::new(1, 4);
        let group = GroupId::make_collective(1, true);
        mgr.callbacks.insert(group, noop_cb());
        let effects = mgr.install(group, vec![1, 3], 1);
        assert_eq!(effects, vec![GroupEffect::SendSetupAck { to: 1, group }]);
        // not ready until every member acked
        assert!(mgr.known_root(group).is_err());
        assert_eq!(mgr.ack(group), Vec::new());
        let effects = mgr.ack(group);
        assert!(effects.contains(&GroupEffect::SendReady { to: 3, group }));
        assert!(effects.contains(&GroupEffect::FireCallback { group }));
        assert_eq!(mgr.known_root(group).unwrap(), 1);
    }

    #[test]
    fn early_acks_are_buffered_until_the_root_installs() {
        let mut mgr = GroupManager::new(1, 4);
        let group = GroupId::make_collective(2, true);
        mgr.callbacks.insert(group, noop_cb());
        // a fast member's ack arrives before this root's own setup
        assert_eq!(mgr.ack(group), Vec::new());
        mgr.install(group, vec![1, 3], 1);
        // only the root's own ack is outstanding now
        let effects = mgr.ack(group);
        assert!(effects.contains(&GroupEffect::FireCallback { group }));
        assert_eq!(mgr.known_root(group).unwrap(), 1);
    }

    #[test]
    fn destroyed_groups_are_stale() {
        let mut mgr = GroupManager::new(1, 4);
        let group = GroupId::make_rooted(0, 1, false);
        mgr.install(group, vec![1, 3], 0);
        mgr.destroy(group).unwrap();
        assert!(matches!(mgr.known_root(group), Err(GroupError::Stale(_))));
    }

    #[test]
    fn world_is_ready_at_construction() {
        let mgr = GroupManager::new(2, 4);
        assert_eq!(mgr.known_root(GroupId::WORLD).unwrap(), 0);
        assert!(mgr.is_member(GroupId::WORLD));
        assert_eq!(mgr.members(GroupId::WORLD).unwrap(), vec![0, 1, 2, 3]);
    }
}
