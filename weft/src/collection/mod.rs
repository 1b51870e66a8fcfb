//! Migratable indexed collections.
//!
//! A collection is a distributed set of elements keyed by a typed dense
//! index. Every node holds the collection's record; each element lives on
//! exactly one node at a time, starting at the node its mapping assigns and
//! moving by migration. Element messages route through the location
//! directory; broadcasts fan node-first then over the local element map.

pub mod index;
pub mod mapping;
pub mod proxy;

pub(crate) mod manager;

use thiserror::Error;

use crate::collection::index::CollIndex;
use crate::epoch::Epoch;
use crate::runtime::Runtime;
use weft_serde::Serde;

/// A collection element type: user payload plus the serialization used for
/// migration. Construction runs on the element's initial node.
pub trait Collection: Serde + 'static {
    type Index: CollIndex;

    fn construct(rt: &mut Runtime, index: Self::Index) -> Self;
}

/// A handler addressed to one element (or broadcast over all of them).
pub trait ElementHandler<C: Collection>: 'static {
    type Msg: Serde + 'static;

    fn handle(elm: &mut C, rt: &mut Runtime, msg: Self::Msg);
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    #[error("collection proxy {0} is not known on this node")]
    UnknownProxy(u32),
    #[error("index {index} is outside the collection's bounds")]
    OutOfBounds { index: String },
    #[error("collection proxy {0} was destroyed")]
    Destroyed(u32),
    #[error("insertion attempted outside an open modification bracket")]
    NoOpenModification,
}

/// An open dynamic-modification bracket. Insertions are accounted to a
/// collective epoch; [`Runtime::finish_modification`] closes the bracket
/// and waits until every insertion (and its directory registration) landed.
pub struct InsertToken<C: Collection> {
    pub(crate) proxy: u32,
    pub(crate) epoch: Epoch,
    pub(crate) _marker: std::marker::PhantomData<fn(C)>,
}
