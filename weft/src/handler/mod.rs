//! The handler registry.
//!
//! Every callable a message can target is registered up front through the
//! [`Protocol`](crate::Protocol) builder and assigned a dense integer id.
//! The packed [`HandlerId`] additionally records which taxonomy the callable
//! belongs to: auto handlers (free functions and functors registered by
//! unique type), object-group members (dispatched through a per-node
//! singleton looked up at delivery time), and collection-element handlers.

use std::any::TypeId;
use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;
use weft_serde::{BitReader, BitWrite, ConstBitLength, Serde, SerdeErr};

use crate::runtime::Runtime;

// HandlerId bit layout, LSB first.
const AUTO_BIT: u32 = 1 << 0;
const FUNCTOR_BIT: u32 = 1 << 1;
const OBJGROUP_BIT: u32 = 1 << 2;
const ID_SHIFT: u32 = 3;
const ID_BITS: u32 = 21;
const OBJ_SHIFT: u32 = 24;
const OBJ_BITS: u32 = 8;

/// Which taxonomy a handler id belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HandlerKind {
    /// Free function or functor registered by unique type.
    Auto,
    /// Member of a per-node singleton object group.
    ObjGroup,
    /// Collection-element handler (an auto handler with element routing).
    Collection,
}

/// Packed handler identifier.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct HandlerId(u32);

impl HandlerId {
    /// Pack a handler id from its parts. Ids are normally minted by the
    /// protocol registry.
    pub fn new(kind: HandlerKind, id: u32, obj: u8) -> Self {
        debug_assert!(id < (1 << ID_BITS));
        let mut bits = (id << ID_SHIFT) & (((1 << ID_BITS) - 1) << ID_SHIFT);
        match kind {
            HandlerKind::Auto | HandlerKind::Collection => bits |= AUTO_BIT,
            HandlerKind::ObjGroup => {
                bits |= OBJGROUP_BIT;
                bits |= u32::from(obj) << OBJ_SHIFT;
            }
        }
        Self(bits)
    }

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Same handler with the object-group index set (stamped at send
    /// time; the registry id is shared by every instance).
    pub(crate) fn with_obj(self, obj: u8) -> Self {
        let cleared = self.0 & !(((1 << OBJ_BITS) - 1) << OBJ_SHIFT);
        Self(cleared | (u32::from(obj) << OBJ_SHIFT))
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn is_auto(&self) -> bool {
        self.0 & AUTO_BIT != 0
    }

    pub fn is_functor(&self) -> bool {
        self.0 & FUNCTOR_BIT != 0
    }

    pub fn is_obj_group(&self) -> bool {
        self.0 & OBJGROUP_BIT != 0
    }

    /// Dense registry id.
    pub fn id(&self) -> u32 {
        (self.0 >> ID_SHIFT) & ((1 << ID_BITS) - 1)
    }

    /// Object-group index, meaningful when [`is_obj_group`](Self::is_obj_group).
    pub fn obj(&self) -> u8 {
        ((self.0 >> OBJ_SHIFT) & ((1 << OBJ_BITS) - 1)) as u8
    }
}

impl std::fmt::Debug for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "HandlerId(id={} auto={} objgroup={} obj={})",
            self.id(),
            self.is_auto(),
            self.is_obj_group(),
            self.obj()
        )
    }
}

impl Serde for HandlerId {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.0.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Self(u32::de(reader)?))
    }

    fn bit_length(&self) -> u32 {
        32
    }
}

impl ConstBitLength for HandlerId {
    const BIT_LENGTH: u32 = 32;
}

/// An active-message handler: a unique type whose `handle` runs on the
/// destination node with the delivered message. Sender context is available
/// through [`Runtime::msg_from`] and [`Runtime::current_epoch`].
pub trait ActiveHandler: 'static {
    type Msg: Serde + 'static;

    fn handle(rt: &mut Runtime, msg: Self::Msg);
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("handler type registered twice")]
    AlreadyRegistered,
    #[error("unknown handler id {id}")]
    Unknown { id: u32 },
}

pub(crate) type DispatchFn = Rc<dyn Fn(&mut Runtime, &mut BitReader) -> Result<(), SerdeErr>>;

pub(crate) struct HandlerRecord {
    pub dispatch: DispatchFn,
    pub trace_name: String,
    pub kind: HandlerKind,
}

/// Dense registry mapping handler ids to dispatch closures, built once by
/// the protocol and immutable afterwards.
pub(crate) struct HandlerKinds {
    records: Vec<HandlerRecord>,
    by_type: HashMap<TypeId, HandlerId>,
}

impl HandlerKinds {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            by_type: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        type_id: TypeId,
        kind: HandlerKind,
        obj: u8,
        trace_name: String,
        dispatch: DispatchFn,
    ) -> Result<HandlerId, HandlerError> {
        if self.by_type.contains_key(&type_id) {
            return Err(HandlerError::AlreadyRegistered);
        }
        let id = HandlerId::new(kind, self.records.len() as u32, obj);
        self.records.push(HandlerRecord {
            dispatch,
            trace_name,
            kind,
        });
        self.by_type.insert(type_id, id);
        Ok(id)
    }

    pub fn get(&self, handler: HandlerId) -> Result<&HandlerRecord, HandlerError> {
        self.records
            .get(handler.id() as usize)
            .ok_or(HandlerError::Unknown { id: handler.id() })
    }

    pub fn id_of(&self, type_id: &TypeId) -> Option<HandlerId> {
        self.by_type.get(type_id).copied()
    }

    pub fn set_trace_name(&mut self, handler: HandlerId, name: String) {
        if let Some(record) = self.records.get_mut(handler.id() as usize) {
            record.trace_name = name;
        }
    }

    pub fn trace_name(&self, handler: HandlerId) -> &str {
        self.records
            .get(handler.id() as usize)
            .map(|r| r.trace_name.as_str())
            .unwrap_or("<unknown>")
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
