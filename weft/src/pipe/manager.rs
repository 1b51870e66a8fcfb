use std::collections::HashMap;

use crate::key_generator::KeyGenerator;
use crate::pipe::PipeId;
use crate::runtime::Runtime;
use crate::types::Node;

pub(crate) type PipeFn = Box<dyn FnMut(&mut Runtime, Node, &[u8])>;

pub(crate) struct PipeEntry {
    pub f: PipeFn,
    pub persist: bool,
}

/// The per-node table backing anonymous callbacks.
pub(crate) struct PipeManager {
    node: Node,
    seqs: KeyGenerator,
    table: HashMap<u64, PipeEntry>,
}

impl PipeManager {
    pub fn new(node: Node) -> Self {
        Self {
            node,
            seqs: KeyGenerator::new(1),
            table: HashMap::new(),
        }
    }

    pub fn register(&mut self, f: PipeFn, persist: bool) -> PipeId {
        let pipe = PipeId::new(self.node, self.seqs.generate(), persist, false);
        self.table.insert(pipe.bits(), PipeEntry { f, persist });
        pipe
    }

    /// Take the entry for firing. Single-use entries leave the table for
    /// good; persistent ones must be handed back via [`restore`].
    ///
    /// [`restore`]: Self::restore
    pub fn take(&mut self, pipe: PipeId) -> Option<PipeEntry> {
        let entry = self.table.remove(&pipe.bits())?;
        if !entry.persist {
            self.seqs.recycle(pipe.seq());
        }
        Some(entry)
    }

    pub fn restore(&mut self, pipe: PipeId, entry: PipeEntry) {
        self.table.insert(pipe.bits(), entry);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_use_entries_vanish_after_take() {
        let mut pipes = PipeManager::new(0);
        let pipe = pipes.register(Box::new(|_, _, _| {}), false);
        assert!(pipes.take(pipe).is_some());
        assert!(pipes.take(pipe).is_none());
    }

    #[test]
    fn persistent_entries_can_be_restored() {
        let mut pipes = PipeManager::new(0);
        let pipe = pipes.register(Box::new(|_, _, _| {}), true);
        assert!(pipe.is_persist());
        let entry = pipes.take(pipe).unwrap();
        pipes.restore(pipe, entry);
        assert!(pipes.take(pipe).is_some());
    }

    #[test]
    fn pipe_ids_carry_the_owning_node() {
        let mut pipes = PipeManager::new(7);
        let pipe = pipes.register(Box::new(|_, _, _| {}), false);
        assert_eq!(pipe.node(), 7);
    }
}
