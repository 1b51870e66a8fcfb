//! Serializable handles to collections and their elements.

use std::marker::PhantomData;

use weft_serde::{BitReader, BitWrite, Serde, SerdeErr};

use crate::collection::{Collection, ElementHandler};
use crate::pipe::Callback;
use crate::reduce::ReduceOp;
use crate::runtime::Runtime;
use crate::types::Node;

/// Handle to a collection. Addressing an element has no side effect.
pub struct CollectionProxy<C: Collection> {
    pub(crate) id: u32,
    _marker: PhantomData<fn(C)>,
}

impl<C: Collection> CollectionProxy<C> {
    pub(crate) fn new(id: u32) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Address one element.
    pub fn element(&self, index: C::Index) -> ElementProxy<C> {
        ElementProxy {
            proxy: self.id,
            index,
        }
    }

    /// Deliver `msg` to every live element exactly once.
    pub fn broadcast<H: ElementHandler<C>>(&self, rt: &mut Runtime, msg: H::Msg) {
        rt.collection_broadcast::<C, H>(self.id, msg);
    }

    /// Tear the collection down on every node. Subsequent sends are a
    /// fatal configuration error.
    pub fn destroy(&self, rt: &mut Runtime) {
        rt.collection_destroy(self.id);
    }
}

impl<C: Collection> Clone for CollectionProxy<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C: Collection> Copy for CollectionProxy<C> {}

impl<C: Collection> std::fmt::Debug for CollectionProxy<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CollectionProxy({})", self.id)
    }
}

impl<C: Collection> Serde for CollectionProxy<C> {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.id.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Self::new(u32::de(reader)?))
    }

    fn bit_length(&self) -> u32 {
        32
    }
}

/// Handle to one element of a collection.
pub struct ElementProxy<C: Collection> {
    pub(crate) proxy: u32,
    pub(crate) index: C::Index,
}

impl<C: Collection> ElementProxy<C> {
    pub fn index(&self) -> C::Index {
        self.index
    }

    pub fn collection(&self) -> CollectionProxy<C> {
        CollectionProxy::new(self.proxy)
    }

    /// Route `msg` to the node currently holding this element.
    pub fn send<H: ElementHandler<C>>(&self, rt: &mut Runtime, msg: H::Msg) {
        rt.element_send::<C, H>(self.proxy, self.index, msg);
    }

    /// Contribute this element's value to the collection-wide reduction.
    /// Every live element must contribute; the combined value reaches
    /// `cb` once all of them have.
    pub fn contribute<O: ReduceOp>(
        &self,
        rt: &mut Runtime,
        value: O::Value,
        cb: Option<Callback<O::Value>>,
    ) {
        rt.collection_contribute::<C, O>(self.proxy, value, cb);
    }

    /// Resolve the element's current node and call back with it.
    pub fn get_location(&self, rt: &mut Runtime, cb: impl FnOnce(&mut Runtime, Node) + 'static) {
        rt.element_get_location::<C>(self.proxy, self.index, cb);
    }
}

impl<C: Collection> Clone for ElementProxy<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C: Collection> Copy for ElementProxy<C> {}

impl<C: Collection> std::fmt::Debug for ElementProxy<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ElementProxy({}, {:?})", self.proxy, self.index)
    }
}

impl<C: Collection> Serde for ElementProxy<C> {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.proxy.ser(writer);
        self.index.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            proxy: u32::de(reader)?,
            index: C::Index::de(reader)?,
        })
    }

    fn bit_length(&self) -> u32 {
        32 + self.index.bit_length()
    }
}
