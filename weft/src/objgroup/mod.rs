//! Object groups: per-node singleton objects addressable by handler.
//!
//! An object group instantiates one object of a type on every node; its
//! member handlers run against the local instance, looked up through the
//! object index carried in the handler id.

use std::marker::PhantomData;

use weft_serde::{BitReader, BitWrite, Serde, SerdeErr};

use crate::runtime::Runtime;

/// Marker for types usable as object-group singletons.
pub trait ObjGroup: 'static {}

impl<T: 'static> ObjGroup for T {}

/// A member handler of an object group.
pub trait ObjGroupHandler<O: ObjGroup>: 'static {
    type Msg: Serde + 'static;

    fn handle(obj: &mut O, rt: &mut Runtime, msg: Self::Msg);
}

/// Handle to an object group. Constructed collectively; the index is
/// identical on every node.
pub struct ObjGroupProxy<O: ObjGroup> {
    pub(crate) idx: u8,
    _marker: PhantomData<fn(O)>,
}

impl<O: ObjGroup> ObjGroupProxy<O> {
    pub(crate) fn new(idx: u8) -> Self {
        Self {
            idx,
            _marker: PhantomData,
        }
    }

    pub fn idx(&self) -> u8 {
        self.idx
    }

    /// Run a member handler on `node`'s instance.
    pub fn send<H: ObjGroupHandler<O>>(&self, rt: &mut Runtime, node: crate::Node, msg: H::Msg) {
        rt.obj_group_send::<O, H>(self.idx, node, msg);
    }

    /// Run a member handler on every node's instance.
    pub fn broadcast<H: ObjGroupHandler<O>>(&self, rt: &mut Runtime, msg: H::Msg) {
        rt.obj_group_broadcast::<O, H>(self.idx, msg);
    }
}

impl<O: ObjGroup> Clone for ObjGroupProxy<O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<O: ObjGroup> Copy for ObjGroupProxy<O> {}

impl<O: ObjGroup> Serde for ObjGroupProxy<O> {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.idx.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Self::new(u8::de(reader)?))
    }

    fn bit_length(&self) -> u32 {
        8
    }
}
