//! First-class serializable continuations.
//!
//! A [`Callback`] names "when invoked with a value, do X at endpoint Y":
//! run a closure on the creating node (anonymous, backed by a per-node pipe
//! table), run a handler on a node or on every node, or deliver to a
//! collection element or a whole collection. Callbacks are plain values;
//! they serialize, travel inside reductions and group setups, and fire from
//! any node.

mod manager;

pub(crate) use manager::{PipeEntry, PipeManager};

use std::marker::PhantomData;

use weft_serde::{BitReader, BitWrite, ConstBitLength, Serde, SerdeErr, UnsignedInteger};

use crate::handler::HandlerId;
use crate::types::Node;

// PipeId bit layout, LSB first.
const PERSIST_BIT: u64 = 1 << 0;
const SEND_BACK_BIT: u64 = 1 << 1;
const NODE_SHIFT: u64 = 2;
const NODE_BITS: u64 = 16;
const SEQ_SHIFT: u64 = 18;

/// Packed identity of an anonymous-callback pipe: the owning node, a
/// sequence, and the persist / send-back-to-sender bits.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct PipeId(u64);

impl PipeId {
    pub(crate) fn new(node: Node, seq: u64, persist: bool, send_back: bool) -> Self {
        let mut bits = 0u64;
        if persist {
            bits |= PERSIST_BIT;
        }
        if send_back {
            bits |= SEND_BACK_BIT;
        }
        bits |= (u64::from(node) & ((1 << NODE_BITS) - 1)) << NODE_SHIFT;
        bits |= seq << SEQ_SHIFT;
        Self(bits)
    }

    pub fn node(&self) -> Node {
        ((self.0 >> NODE_SHIFT) & ((1 << NODE_BITS) - 1)) as Node
    }

    pub fn seq(&self) -> u64 {
        self.0 >> SEQ_SHIFT
    }

    pub fn is_persist(&self) -> bool {
        self.0 & PERSIST_BIT != 0
    }

    pub fn is_send_back(&self) -> bool {
        self.0 & SEND_BACK_BIT != 0
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }
}

impl std::fmt::Debug for PipeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "PipeId(node={} seq={} persist={})",
            self.node(),
            self.seq(),
            self.is_persist()
        )
    }
}

impl Serde for PipeId {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.0.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Self(u64::de(reader)?))
    }

    fn bit_length(&self) -> u32 {
        64
    }
}

impl ConstBitLength for PipeId {
    const BIT_LENGTH: u32 = 64;
}

/// The endpoint a callback fires at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackKind {
    /// Single-use (or persistent) closure in the creating node's pipe
    /// table.
    Anon { pipe: PipeId },
    /// Run a handler on one node.
    Send { handler: HandlerId, node: Node },
    /// Run a handler on every node.
    Broadcast {
        handler: HandlerId,
        include_sender: bool,
    },
    /// Run an object-group member on one node (the handler id carries the
    /// object index).
    ObjGroupSend { handler: HandlerId, node: Node },
    /// Deliver to one collection element, wherever it lives. The entity id
    /// and home node are precomputed so any node can route the value
    /// without knowing the collection's element type.
    ElementSend {
        handler: HandlerId,
        proxy: u32,
        index: Vec<u8>,
        entity: u64,
        home: Node,
    },
    /// Deliver to every element of a collection.
    CollectionBcast { handler: HandlerId, proxy: u32 },
}

impl Serde for CallbackKind {
    fn ser(&self, writer: &mut dyn BitWrite) {
        match self {
            CallbackKind::Anon { pipe } => {
                UnsignedInteger::<3>::new(0).ser(writer);
                pipe.ser(writer);
            }
            CallbackKind::Send { handler, node } => {
                UnsignedInteger::<3>::new(1).ser(writer);
                handler.ser(writer);
                node.ser(writer);
            }
            CallbackKind::Broadcast {
                handler,
                include_sender,
            } => {
                UnsignedInteger::<3>::new(2).ser(writer);
                handler.ser(writer);
                include_sender.ser(writer);
            }
            CallbackKind::ObjGroupSend { handler, node } => {
                UnsignedInteger::<3>::new(3).ser(writer);
                handler.ser(writer);
                node.ser(writer);
            }
            CallbackKind::ElementSend {
                handler,
                proxy,
                index,
                entity,
                home,
            } => {
                UnsignedInteger::<3>::new(4).ser(writer);
                handler.ser(writer);
                proxy.ser(writer);
                index.ser(writer);
                entity.ser(writer);
                home.ser(writer);
            }
            CallbackKind::CollectionBcast { handler, proxy } => {
                UnsignedInteger::<3>::new(5).ser(writer);
                handler.ser(writer);
                proxy.ser(writer);
            }
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        match UnsignedInteger::<3>::de(reader)?.get() {
            0 => Ok(CallbackKind::Anon {
                pipe: PipeId::de(reader)?,
            }),
            1 => Ok(CallbackKind::Send {
                handler: HandlerId::de(reader)?,
                node: Node::de(reader)?,
            }),
            2 => Ok(CallbackKind::Broadcast {
                handler: HandlerId::de(reader)?,
                include_sender: bool::de(reader)?,
            }),
            3 => Ok(CallbackKind::ObjGroupSend {
                handler: HandlerId::de(reader)?,
                node: Node::de(reader)?,
            }),
            4 => Ok(CallbackKind::ElementSend {
                handler: HandlerId::de(reader)?,
                proxy: u32::de(reader)?,
                index: Vec::<u8>::de(reader)?,
                entity: u64::de(reader)?,
                home: Node::de(reader)?,
            }),
            5 => Ok(CallbackKind::CollectionBcast {
                handler: HandlerId::de(reader)?,
                proxy: u32::de(reader)?,
            }),
            _ => Err(SerdeErr),
        }
    }

    fn bit_length(&self) -> u32 {
        3 + match self {
            CallbackKind::Anon { pipe } => pipe.bit_length(),
            CallbackKind::Send { handler, node } => handler.bit_length() + node.bit_length(),
            CallbackKind::Broadcast {
                handler,
                include_sender,
            } => handler.bit_length() + include_sender.bit_length(),
            CallbackKind::ObjGroupSend { handler, node } => {
                handler.bit_length() + node.bit_length()
            }
            CallbackKind::ElementSend {
                handler,
                proxy,
                index,
                entity,
                home,
            } => {
                handler.bit_length()
                    + proxy.bit_length()
                    + index.bit_length()
                    + entity.bit_length()
                    + home.bit_length()
            }
            CallbackKind::CollectionBcast { handler, proxy } => {
                handler.bit_length() + proxy.bit_length()
            }
        }
    }
}

/// A typed callback over a serializable value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Callback<M> {
    kind: CallbackKind,
    _marker: PhantomData<fn(M)>,
}

impl<M: Serde + 'static> Callback<M> {
    pub(crate) fn from_kind(kind: CallbackKind) -> Self {
        Self {
            kind,
            _marker: PhantomData,
        }
    }

    pub(crate) fn kind(&self) -> &CallbackKind {
        &self.kind
    }

    /// Invoke the callback with `msg`, routing to wherever it points.
    pub fn send(&self, rt: &mut crate::Runtime, msg: M) {
        rt.fire_callback(self.kind.clone(), msg.to_bytes());
    }
}

impl<M: Serde + 'static> Serde for Callback<M> {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.kind.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Self::from_kind(CallbackKind::de(reader)?))
    }

    fn bit_length(&self) -> u32 {
        self.kind.bit_length()
    }
}
