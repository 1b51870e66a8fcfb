//! # weft
//!
//! An active-message runtime over an MPI-like transport. A fixed set of
//! ranked nodes exchange handler-tagged messages addressed to plain nodes,
//! per-node singleton object groups, and migratable indexed collections.
//! Arbitrary causally-closed computations are bracketed by epochs whose
//! global quiescence is detected by a 4-counter wave (collective epochs) or
//! Dijkstra-Scholten (rooted epochs).

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

#[macro_use]
extern crate cfg_if;

pub use weft_serde::{
    BitCounter, BitReader, BitWrite, BitWriter, ConstBitLength, Serde, SerdeErr,
    SignedInteger, SignedVariableInteger, UnsignedInteger, UnsignedVariableInteger,
};

mod collection;
mod config;
mod constants;
mod epoch;
mod group;
mod handler;
mod key_generator;
mod location;
mod messaging;
mod objgroup;
mod pipe;
mod reduce;
mod runtime;
mod scheduler;
mod termination;
mod transport;
mod types;

pub use collection::index::{CollIndex, Index1D, Index2D, Index3D};
pub use collection::mapping::{dense_block_map, dense_round_robin_map, MapFn};
pub use collection::proxy::{CollectionProxy, ElementProxy};
pub use collection::{Collection, CollectionError, ElementHandler, InsertToken};
pub use config::RuntimeConfig;
pub use epoch::{Epoch, EpochCategory};
pub use group::region::Region;
pub use group::{GroupError, GroupId};
pub use handler::{ActiveHandler, HandlerId, HandlerKind};
pub use location::LocationError;
pub use messaging::envelope::{Envelope, EnvelopeFlags};
pub use objgroup::{ObjGroup, ObjGroupHandler, ObjGroupProxy};
pub use pipe::{Callback, CallbackKind, PipeId};
pub use reduce::{AndOp, MaxOp, MinOp, OrOp, PlusOp, ReduceOp};
pub use runtime::protocol::Protocol;
pub use runtime::Runtime;
pub use scheduler::{Priority, Progressable};
pub use transport::{Transport, TransportError};
pub use types::{Node, Tag, BROADCAST_DEST};

cfg_if! {
    if #[cfg(feature = "transport_local")] {
        pub use transport::local::{LocalNetwork, LocalTransport};
    }
}
