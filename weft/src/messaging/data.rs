//! Out-of-band payload streams.
//!
//! Payloads too large for the eager path travel as a control envelope
//! followed by one or more fragments under a freshly minted transport tag.
//! The receive side keeps a per-(sender, tag) holder that counts fragments
//! and reassembles the payload. The same tag space serves raw
//! `send_data`/`recv_data_msg` transfers.

use std::collections::HashMap;

use thiserror::Error;

use crate::constants::FIRST_DATA_TAG;
use crate::key_generator::KeyGenerator;
use crate::messaging::envelope::Envelope;
use crate::runtime::Runtime;
use crate::types::{Node, Tag};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    #[error("fragment under tag {tag} from {from} has no announced stream")]
    UnannouncedFragment { from: Node, tag: Tag },
    #[error("stream {tag} from {from} announced twice")]
    DuplicateStream { from: Node, tag: Tag },
}

enum HolderKind {
    /// Completion re-enters the active-message path under this envelope.
    Envelope(Box<Envelope>),
    /// Completion fires a user action registered via `recv_data_msg`.
    User,
}

struct Holder {
    expected: u32,
    total_len: u64,
    chunks: Vec<Vec<u8>>,
    kind: HolderKind,
}

#[derive(Debug, PartialEq)]
pub(crate) struct CompletedData {
    /// Present when the stream was the tail of a rendezvous send.
    pub env: Option<Envelope>,
    pub payload: Vec<u8>,
}

pub(crate) type DataAction = Box<dyn FnOnce(&mut Runtime, Node, Vec<u8>)>;

/// Splits outgoing payloads and reassembles incoming ones.
pub(crate) struct DataManager {
    tags: KeyGenerator,
    holders: HashMap<(Node, Tag), Holder>,
    actions: HashMap<Tag, DataAction>,
    /// Streams that completed before their action was registered.
    completed: HashMap<Tag, Vec<(Node, Vec<u8>)>>,
}

impl DataManager {
    pub fn new() -> Self {
        Self {
            tags: KeyGenerator::new(u64::from(FIRST_DATA_TAG)),
            holders: HashMap::new(),
            actions: HashMap::new(),
            completed: HashMap::new(),
        }
    }

    pub fn mint_tag(&mut self) -> Tag {
        self.tags.generate() as Tag
    }

    pub fn release_tag(&mut self, tag: Tag) {
        self.tags.recycle(u64::from(tag));
    }

    pub fn split(payload: &[u8], fragment_bytes: usize) -> Vec<Vec<u8>> {
        debug_assert!(fragment_bytes > 0);
        if payload.is_empty() {
            return vec![Vec::new()];
        }
        payload
            .chunks(fragment_bytes)
            .map(|chunk| chunk.to_vec())
            .collect()
    }

    /// A rendezvous control envelope arrived: expect its data stream.
    pub fn expect_envelope(&mut self, from: Node, env: Envelope) -> Result<(), DataError> {
        let tag = env.put_tag().expect("rendezvous envelope without put tag");
        let expected = env.put_fragments();
        let total_len = env.put_len();
        if self
            .holders
            .insert(
                (from, tag),
                Holder {
                    expected,
                    total_len,
                    chunks: Vec::with_capacity(expected as usize),
                    kind: HolderKind::Envelope(Box::new(env)),
                },
            )
            .is_some()
        {
            return Err(DataError::DuplicateStream { from, tag });
        }
        Ok(())
    }

    /// A raw data stream was announced via `send_data`.
    pub fn expect_user(&mut self, from: Node, tag: Tag, total_len: u64, fragments: u32) -> Result<(), DataError> {
        if self
            .holders
            .insert(
                (from, tag),
                Holder {
                    expected: fragments,
                    total_len,
                    chunks: Vec::with_capacity(fragments as usize),
                    kind: HolderKind::User,
                },
            )
            .is_some()
        {
            return Err(DataError::DuplicateStream { from, tag });
        }
        Ok(())
    }

    /// A fragment arrived. Returns the reassembled stream when complete.
    pub fn on_fragment(
        &mut self,
        from: Node,
        tag: Tag,
        bytes: Vec<u8>,
    ) -> Result<Option<CompletedData>, DataError> {
        let holder = self
            .holders
            .get_mut(&(from, tag))
            .ok_or(DataError::UnannouncedFragment { from, tag })?;
        holder.chunks.push(bytes);
        if (holder.chunks.len() as u32) < holder.expected {
            return Ok(None);
        }

        let holder = self
            .holders
            .remove(&(from, tag))
            .ok_or(DataError::UnannouncedFragment { from, tag })?;
        let mut payload = holder.chunks.concat();
        payload.truncate(holder.total_len as usize);
        let env = match holder.kind {
            HolderKind::Envelope(env) => Some(*env),
            HolderKind::User => None,
        };
        Ok(Some(CompletedData { env, payload }))
    }

    // User-side receive half of a raw transfer.

    /// Register the action to run when the stream under `tag` completes.
    /// If the stream already completed, the caller receives it back to fire
    /// immediately.
    pub fn register_action(
        &mut self,
        tag: Tag,
        action: DataAction,
    ) -> Option<(DataAction, Node, Vec<u8>)> {
        if let Some(ready) = self.completed.get_mut(&tag) {
            if !ready.is_empty() {
                let (from, payload) = ready.remove(0);
                if ready.is_empty() {
                    self.completed.remove(&tag);
                }
                return Some((action, from, payload));
            }
        }
        self.actions.insert(tag, action);
        None
    }

    /// A user stream completed: hand back the registered action, or stash
    /// the payload until one shows up.
    pub fn take_action(&mut self, tag: Tag, from: Node, payload: Vec<u8>) -> Option<(DataAction, Node, Vec<u8>)> {
        match self.actions.remove(&tag) {
            Some(action) => Some((action, from, payload)),
            None => {
                self.completed.entry(tag).or_default().push((from, payload));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerId, HandlerKind};

    fn put_env(tag: Tag, len: u64, fragments: u32) -> Envelope {
        let mut env = Envelope::new(1, HandlerId::new(HandlerKind::Auto, 0, 0));
        env.set_put(tag, len, fragments);
        env
    }

    #[test]
    fn split_covers_the_payload() {
        let payload: Vec<u8> = (0..10).collect();
        let chunks = DataManager::split(&payload, 4);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), payload);
    }

    #[test]
    fn empty_payload_still_sends_one_fragment() {
        assert_eq!(DataManager::split(&[], 4).len(), 1);
    }

    #[test]
    fn reassembles_in_arrival_order() {
        let mut data = DataManager::new();
        data.expect_envelope(2, put_env(33, 6, 2)).unwrap();
        assert!(data.on_fragment(2, 33, vec![1, 2, 3]).unwrap().is_none());
        let done = data.on_fragment(2, 33, vec![4, 5, 6]).unwrap().unwrap();
        assert_eq!(done.payload, vec![1, 2, 3, 4, 5, 6]);
        assert!(done.env.is_some());
    }

    #[test]
    fn unannounced_fragment_is_an_error() {
        let mut data = DataManager::new();
        assert_eq!(
            data.on_fragment(0, 99, vec![]),
            Err(DataError::UnannouncedFragment { from: 0, tag: 99 })
        );
    }

    #[test]
    fn same_tag_from_different_senders_do_not_collide() {
        let mut data = DataManager::new();
        data.expect_user(0, 50, 1, 1).unwrap();
        data.expect_user(1, 50, 1, 1).unwrap();
        let a = data.on_fragment(0, 50, vec![7]).unwrap().unwrap();
        let b = data.on_fragment(1, 50, vec![8]).unwrap().unwrap();
        assert_eq!(a.payload, vec![7]);
        assert_eq!(b.payload, vec![8]);
    }

    #[test]
    fn completed_stream_waits_for_its_action() {
        let mut data = DataManager::new();
        data.expect_user(0, 60, 2, 1).unwrap();
        data.on_fragment(0, 60, vec![1, 2]).unwrap().unwrap();
        // completion observed by the runtime, no action yet
        assert!(data.take_action(60, 0, vec![1, 2]).is_none());
        // late registration is handed the stashed payload
        let handed = data.register_action(60, Box::new(|_, _, _| {}));
        assert!(handed.is_some());
        assert_eq!(handed.unwrap().2, vec![1, 2]);
    }
}
