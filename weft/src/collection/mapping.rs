//! Index-to-node mappings.
//!
//! A mapping fixes each index's home node. It must be pure: every node
//! evaluates it locally and must reach the same answer.

use crate::collection::index::CollIndex;
use crate::types::Node;

/// `(index, range, num_nodes) -> home node`.
pub type MapFn<I> = fn(&I, &I, Node) -> Node;

/// Balanced contiguous blocks of the linearized range.
pub fn dense_block_map<I: CollIndex>(index: &I, range: &I, num_nodes: Node) -> Node {
    let size = I::size(range).max(1);
    let linear = index.linearize(range);
    ((linear * u64::from(num_nodes)) / size) as Node
}

/// Linearized index modulo node count.
pub fn dense_round_robin_map<I: CollIndex>(index: &I, range: &I, num_nodes: Node) -> Node {
    (index.linearize(range) % u64::from(num_nodes)) as Node
}
