//! The bit-packed header prefixing every active message.
//!
//! A fixed prefix (flags, destination, handler id, reference count) is
//! followed by optional fields gated by the flag bits. The receive side
//! must consult a flag before reading the field it guards; the wire layout
//! for a given flag combination is deterministic.

use weft_serde::{BitReader, BitWrite, Serde, SerdeErr};

use crate::epoch::Epoch;
use crate::group::GroupId;
use crate::handler::HandlerId;
use crate::scheduler::Priority;
use crate::types::{Node, Tag, BROADCAST_DEST, NO_TAG};

/// Envelope flag bits.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EnvelopeFlags;

impl EnvelopeFlags {
    pub const HAS_EPOCH: u16 = 1 << 0;
    pub const HAS_TAG: u16 = 1 << 1;
    pub const HAS_GROUP: u16 = 1 << 2;
    pub const IS_PUT: u16 = 1 << 3;
    pub const IS_PACKED_PUT: u16 = 1 << 4;
    pub const IS_CALLBACK: u16 = 1 << 5;
    pub const DELIVER_BCAST_TO_SENDER: u16 = 1 << 6;
    pub const IS_SYSTEM: u16 = 1 << 7;
    pub const HAS_PRIORITY: u16 = 1 << 8;
    pub const IS_BCAST: u16 = 1 << 9;
}

/// The per-message header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    flags: u16,
    dest: Node,
    handler: HandlerId,
    ref_count: u8,
    epoch: Epoch,
    tag: Tag,
    group: GroupId,
    priority: Priority,
    bcast_root: Node,
    bcast_origin: Node,
    put_tag: Tag,
    put_len: u64,
    put_fragments: u32,
}

impl Envelope {
    pub fn new(dest: Node, handler: HandlerId) -> Self {
        Self {
            flags: 0,
            dest,
            handler,
            ref_count: 0,
            epoch: Epoch::global(),
            tag: NO_TAG,
            group: GroupId::WORLD,
            priority: Priority::default(),
            bcast_root: 0,
            bcast_origin: 0,
            put_tag: NO_TAG,
            put_len: 0,
            put_fragments: 0,
        }
    }

    // Fixed fields

    pub fn dest(&self) -> Node {
        self.dest
    }

    pub fn set_dest(&mut self, dest: Node) {
        self.dest = dest;
    }

    pub fn handler(&self) -> HandlerId {
        self.handler
    }

    pub fn set_handler(&mut self, handler: HandlerId) {
        self.handler = handler;
    }

    pub fn ref_count(&self) -> u8 {
        self.ref_count
    }

    pub fn ref_inc(&mut self) {
        self.ref_count += 1;
    }

    pub fn ref_dec(&mut self) -> u8 {
        self.ref_count -= 1;
        self.ref_count
    }

    pub fn flags(&self) -> u16 {
        self.flags
    }

    fn flag(&self, bit: u16) -> bool {
        self.flags & bit != 0
    }

    fn set_flag(&mut self, bit: u16, on: bool) {
        if on {
            self.flags |= bit;
        } else {
            self.flags &= !bit;
        }
    }

    // Optional fields, each gated by its flag

    pub fn epoch(&self) -> Option<Epoch> {
        self.flag(EnvelopeFlags::HAS_EPOCH).then_some(self.epoch)
    }

    pub fn set_epoch(&mut self, epoch: Epoch) {
        self.set_flag(EnvelopeFlags::HAS_EPOCH, true);
        self.epoch = epoch;
    }

    /// The termination bucket this message is accounted to: its epoch, or
    /// the global bucket when none is set.
    pub fn term_epoch(&self) -> Epoch {
        self.epoch().unwrap_or_else(Epoch::global)
    }

    pub fn tag(&self) -> Option<Tag> {
        self.flag(EnvelopeFlags::HAS_TAG).then_some(self.tag)
    }

    pub fn set_tag(&mut self, tag: Tag) {
        self.set_flag(EnvelopeFlags::HAS_TAG, true);
        self.tag = tag;
    }

    pub fn group(&self) -> Option<GroupId> {
        self.flag(EnvelopeFlags::HAS_GROUP).then_some(self.group)
    }

    pub fn set_group(&mut self, group: GroupId) {
        self.set_flag(EnvelopeFlags::HAS_GROUP, true);
        self.group = group;
    }

    pub fn priority(&self) -> Priority {
        if self.flag(EnvelopeFlags::HAS_PRIORITY) {
            self.priority
        } else {
            Priority::default()
        }
    }

    pub fn set_priority(&mut self, priority: Priority) {
        self.set_flag(EnvelopeFlags::HAS_PRIORITY, true);
        self.priority = priority;
    }

    // Broadcast

    pub fn is_bcast(&self) -> bool {
        self.flag(EnvelopeFlags::IS_BCAST)
    }

    /// Mark as broadcast: fanned down the spanning tree rooted at
    /// `bcast_root`, originated by `origin` (used for sender suppression).
    pub fn set_bcast(&mut self, bcast_root: Node, origin: Node) {
        self.set_flag(EnvelopeFlags::IS_BCAST, true);
        self.dest = BROADCAST_DEST;
        self.bcast_root = bcast_root;
        self.bcast_origin = origin;
    }

    pub fn bcast_root(&self) -> Node {
        self.bcast_root
    }

    pub fn bcast_origin(&self) -> Node {
        self.bcast_origin
    }

    pub fn deliver_bcast_to_sender(&self) -> bool {
        self.flag(EnvelopeFlags::DELIVER_BCAST_TO_SENDER)
    }

    pub fn set_deliver_bcast_to_sender(&mut self, on: bool) {
        self.set_flag(EnvelopeFlags::DELIVER_BCAST_TO_SENDER, on);
    }

    // System exemption from termination accounting

    pub fn is_system(&self) -> bool {
        self.flag(EnvelopeFlags::IS_SYSTEM)
    }

    pub fn set_system(&mut self) {
        self.set_flag(EnvelopeFlags::IS_SYSTEM, true);
    }

    // Callback marker

    pub fn is_callback(&self) -> bool {
        self.flag(EnvelopeFlags::IS_CALLBACK)
    }

    pub fn set_callback(&mut self) {
        self.set_flag(EnvelopeFlags::IS_CALLBACK, true);
    }

    // Out-of-band payload (rendezvous / RDMA-carried)

    pub fn is_put(&self) -> bool {
        self.flag(EnvelopeFlags::IS_PUT)
    }

    pub fn is_packed_put(&self) -> bool {
        self.flag(EnvelopeFlags::IS_PACKED_PUT)
    }

    /// Describe an out-of-band payload: `fragments` transport sends under
    /// `put_tag` totalling `put_len` bytes follow this envelope.
    pub fn set_put(&mut self, put_tag: Tag, put_len: u64, put_fragments: u32) {
        self.set_flag(EnvelopeFlags::IS_PUT, true);
        self.put_tag = put_tag;
        self.put_len = put_len;
        self.put_fragments = put_fragments;
    }

    pub fn set_packed_put(&mut self) {
        self.set_flag(EnvelopeFlags::IS_PACKED_PUT, true);
    }

    pub fn put_tag(&self) -> Option<Tag> {
        self.flag(EnvelopeFlags::IS_PUT).then_some(self.put_tag)
    }

    pub fn put_len(&self) -> u64 {
        self.put_len
    }

    pub fn put_fragments(&self) -> u32 {
        self.put_fragments
    }
}

impl Serde for Envelope {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.flags.ser(writer);
        self.dest.ser(writer);
        self.handler.ser(writer);
        self.ref_count.ser(writer);
        if self.flag(EnvelopeFlags::HAS_EPOCH) {
            self.epoch.ser(writer);
        }
        if self.flag(EnvelopeFlags::HAS_TAG) {
            self.tag.ser(writer);
        }
        if self.flag(EnvelopeFlags::HAS_GROUP) {
            self.group.ser(writer);
        }
        if self.flag(EnvelopeFlags::HAS_PRIORITY) {
            self.priority.ser(writer);
        }
        if self.flag(EnvelopeFlags::IS_BCAST) {
            self.bcast_root.ser(writer);
            self.bcast_origin.ser(writer);
        }
        if self.flag(EnvelopeFlags::IS_PUT) {
            self.put_tag.ser(writer);
            self.put_len.ser(writer);
            self.put_fragments.ser(writer);
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let flags = u16::de(reader)?;
        let dest = Node::de(reader)?;
        let handler = HandlerId::de(reader)?;
        let ref_count = u8::de(reader)?;
        let mut env = Envelope::new(dest, handler);
        env.flags = flags;
        env.ref_count = ref_count;
        if env.flag(EnvelopeFlags::HAS_EPOCH) {
            env.epoch = Epoch::de(reader)?;
        }
        if env.flag(EnvelopeFlags::HAS_TAG) {
            env.tag = Tag::de(reader)?;
        }
        if env.flag(EnvelopeFlags::HAS_GROUP) {
            env.group = GroupId::de(reader)?;
        }
        if env.flag(EnvelopeFlags::HAS_PRIORITY) {
            env.priority = Priority::de(reader)?;
        }
        if env.flag(EnvelopeFlags::IS_BCAST) {
            env.bcast_root = Node::de(reader)?;
            env.bcast_origin = Node::de(reader)?;
        }
        if env.flag(EnvelopeFlags::IS_PUT) {
            env.put_tag = Tag::de(reader)?;
            env.put_len = u64::de(reader)?;
            env.put_fragments = u32::de(reader)?;
        }
        Ok(env)
    }

    fn bit_length(&self) -> u32 {
        let mut bits = 16 + 16 + 32 + 8;
        if self.flag(EnvelopeFlags::HAS_EPOCH) {
            bits += 64;
        }
        if self.flag(EnvelopeFlags::HAS_TAG) {
            bits += 32;
        }
        if self.flag(EnvelopeFlags::HAS_GROUP) {
            bits += 64;
        }
        if self.flag(EnvelopeFlags::HAS_PRIORITY) {
            bits += Priority::default().bit_length();
        }
        if self.flag(EnvelopeFlags::IS_BCAST) {
            bits += 32;
        }
        if self.flag(EnvelopeFlags::IS_PUT) {
            bits += 32 + 64 + 32;
        }
        bits
    }
}
