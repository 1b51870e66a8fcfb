//! Typed collection operations, monomorphized per element type through the
//! protocol's dispatch closures.
//!
//! The wire format for element traffic is shared with the untyped callback
//! path: a kind byte, the proxy id, the index, then the payload. Routing
//! consults the location directory; messages that outrun a migrating
//! element follow its tombstone for a bounded number of hops before
//! falling back to a home query.

use std::collections::HashMap;

use log::{info, warn};
use weft_serde::{BitReader, BitWrite, Serde, SerdeErr};

use crate::collection::index::CollIndex;
use crate::collection::manager::{CollectionRecord, LiveElement};
use crate::collection::mapping::MapFn;
use crate::collection::proxy::CollectionProxy;
use crate::collection::{Collection, ElementHandler, InsertToken};
use crate::pipe::{Callback, CallbackKind};
use crate::reduce::{ReduceOp, ReduceScope};
use crate::runtime::system::{
    CollectionMembersMsg, EntityMovedMsg, InsertGatherOp, COLLECTION_MEMBERS_TAG,
};
use crate::runtime::Runtime;
use crate::types::{Node, UniverseId};

// Wire kinds shared with `Runtime::fire_callback`.
const WIRE_DIRECT: u8 = 0;
const WIRE_BCAST: u8 = 1;

/// Element traffic: a routed message for one index, or a broadcast
/// delivered to every live element.
pub(crate) enum ElementWire<I: CollIndex> {
    Direct {
        proxy: u32,
        index: I,
        hops: u8,
        msg: Vec<u8>,
    },
    Bcast {
        proxy: u32,
        origin: Node,
        seq: u64,
        msg: Vec<u8>,
    },
}

impl<I: CollIndex> Serde for ElementWire<I> {
    fn ser(&self, writer: &mut dyn BitWrite) {
        match self {
            ElementWire::Direct {
                proxy,
                index,
                hops,
                msg,
            } => {
                WIRE_DIRECT.ser(writer);
                proxy.ser(writer);
                index.ser(writer);
                hops.ser(writer);
                msg.ser(writer);
            }
            ElementWire::Bcast {
                proxy,
                origin,
                seq,
                msg,
            } => {
                WIRE_BCAST.ser(writer);
                proxy.ser(writer);
                origin.ser(writer);
                seq.ser(writer);
                msg.ser(writer);
            }
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        match u8::de(reader)? {
            WIRE_DIRECT => Ok(ElementWire::Direct {
                proxy: u32::de(reader)?,
                index: I::de(reader)?,
                hops: u8::de(reader)?,
                msg: Vec::<u8>::de(reader)?,
            }),
            WIRE_BCAST => Ok(ElementWire::Bcast {
                proxy: u32::de(reader)?,
                origin: Node::de(reader)?,
                seq: u64::de(reader)?,
                msg: Vec::<u8>::de(reader)?,
            }),
            _ => Err(SerdeErr),
        }
    }

    fn bit_length(&self) -> u32 {
        8 + match self {
            ElementWire::Direct {
                proxy,
                index,
                hops,
                msg,
            } => proxy.bit_length() + index.bit_length() + hops.bit_length() + msg.bit_length(),
            ElementWire::Bcast {
                proxy,
                origin,
                seq,
                msg,
            } => proxy.bit_length() + origin.bit_length() + seq.bit_length() + msg.bit_length(),
        }
    }
}

/// A migrating element's state in flight.
struct MigrateWire<I: CollIndex> {
    proxy: u32,
    index: I,
    seen: Vec<(Node, u64)>,
    elm: Vec<u8>,
}

impl<I: CollIndex> Serde for MigrateWire<I> {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.proxy.ser(writer);
        self.index.ser(writer);
        self.seen.ser(writer);
        self.elm.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(MigrateWire {
            proxy: u32::de(reader)?,
            index: I::de(reader)?,
            seen: Vec::<(Node, u64)>::de(reader)?,
            elm: Vec::<u8>::de(reader)?,
        })
    }

    fn bit_length(&self) -> u32 {
        self.proxy.bit_length()
            + self.index.bit_length()
            + self.seen.bit_length()
            + self.elm.bit_length()
    }
}

struct InsertWire<I: CollIndex> {
    proxy: u32,
    index: I,
}

impl<I: CollIndex> Serde for InsertWire<I> {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.proxy.ser(writer);
        self.index.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(InsertWire {
            proxy: u32::de(reader)?,
            index: I::de(reader)?,
        })
    }

    fn bit_length(&self) -> u32 {
        self.proxy.bit_length() + self.index.bit_length()
    }
}

// Construction

pub(crate) fn make_collection<C: Collection>(
    rt: &mut Runtime,
    range: C::Index,
    map: MapFn<C::Index>,
    dynamic: bool,
) -> CollectionProxy<C> {
    let proxy = rt.collections.mint();
    let node = rt.node();
    let num_nodes = rt.num_nodes();
    rt.collections
        .install(proxy, CollectionRecord::<C>::new(range, map, dynamic));
    rt.location_mut(proxy as UniverseId);

    if dynamic {
        info!("node {}: insertable collection {} created", node, proxy);
        return CollectionProxy::new(proxy);
    }

    let (members, total) = rt
        .collections
        .record_mut::<C>(proxy)
        .expect("record just installed")
        .bulk_layout(num_nodes);

    let mut local = 0u64;
    for linear in 0..total {
        let index = C::Index::from_linear(&range, linear);
        if map(&index, &range, num_nodes) != node {
            continue;
        }
        let elm = C::construct(rt, index);
        rt.collections
            .record_mut::<C>(proxy)
            .expect("record installed")
            .insert_live(index, elm, HashMap::new());
        let entity = index.linearize(&range);
        rt.location_mut(proxy as UniverseId).register(entity);
        local += 1;
    }

    let meta = rt.collections.meta_mut(proxy).expect("meta installed");
    meta.members = members;
    meta.members_ready = true;
    meta.total = total;
    meta.live = local;
    info!(
        "node {}: collection {} constructed ({} local of {})",
        node, proxy, local, total
    );
    CollectionProxy::new(proxy)
}

/// Entity id and home node of an element, used by routing and callbacks.
pub(crate) fn element_identity<C: Collection>(
    rt: &mut Runtime,
    proxy: u32,
    index: C::Index,
) -> (u64, Node) {
    let num_nodes = rt.num_nodes();
    let Some(record) = rt.collections.record_mut::<C>(proxy) else {
        rt.fatal("unknown collection proxy");
    };
    let in_range = index.in_range(&record.range);
    let identity = (record.entity_of(&index), record.home_of(&index, num_nodes));
    if !in_range {
        let what = format!("index {:?} out of the collection's bounds", index);
        rt.fatal(&what);
    }
    identity
}

// Element sends

pub(crate) fn element_send<C: Collection, H: ElementHandler<C>>(
    rt: &mut Runtime,
    proxy: u32,
    index: C::Index,
    msg: H::Msg,
) {
    let handler = rt
        .protocol()
        .id_of_element_handler::<C, H>()
        .unwrap_or_else(|| rt.fatal("element handler is not registered"));
    let (entity, home) = element_identity::<C>(rt, proxy, index);
    let wire = ElementWire::<C::Index>::Direct {
        proxy,
        index,
        hops: 0,
        msg: msg.to_bytes(),
    }
    .to_bytes();
    rt.route_untyped(proxy as UniverseId, entity, home, handler, wire);
}

pub(crate) fn dispatch_element<C: Collection, H: ElementHandler<C>>(
    rt: &mut Runtime,
    reader: &mut BitReader,
) -> Result<(), SerdeErr> {
    match ElementWire::<C::Index>::de(reader)? {
        ElementWire::Direct {
            proxy,
            index,
            hops,
            msg,
        } => deliver_direct::<C, H>(rt, proxy, index, hops, msg),
        ElementWire::Bcast {
            proxy,
            origin,
            seq,
            msg,
        } => deliver_bcast::<C, H>(rt, proxy, origin, seq, msg),
    }
}

fn deliver_direct<C: Collection, H: ElementHandler<C>>(
    rt: &mut Runtime,
    proxy: u32,
    index: C::Index,
    hops: u8,
    msg: Vec<u8>,
) -> Result<(), SerdeErr> {
    if rt.collections.is_destroyed(proxy) {
        warn!("node {}: message for destroyed collection {}", rt.node(), proxy);
        return Ok(());
    }
    if !rt.collections.exists(proxy) {
        rt.fatal("message for unknown collection proxy");
    }

    let checked_out = rt
        .collections
        .record_mut::<C>(proxy)
        .expect("record exists")
        .checkout(&index);
    if let Some(live) = checked_out {
        return run_element::<C, H>(rt, proxy, index, live, &msg);
    }

    // not resident: follow the tombstone or re-resolve
    let handler = rt.current_handler();
    let departed = rt
        .collections
        .record_mut::<C>(proxy)
        .expect("record exists")
        .departed_to(&index);
    let (entity, home) = element_identity::<C>(rt, proxy, index);
    let universe = proxy as UniverseId;

    if let Some(to) = departed {
        if hops < rt.config().max_forward_hops {
            let wire = ElementWire::<C::Index>::Direct {
                proxy,
                index,
                hops: hops + 1,
                msg,
            }
            .to_bytes();
            rt.post_user(to, handler, wire);
        } else {
            // hop bound exhausted: park and ask the home
            let wire = ElementWire::<C::Index>::Direct {
                proxy,
                index,
                hops: 0,
                msg,
            }
            .to_bytes();
            rt.queue_buffered(universe, entity, handler, wire);
            if rt.location_mut(universe).lookup_needs_query(entity) {
                rt.send_where_is(home, universe, entity);
            }
        }
        return Ok(());
    }

    let wire = ElementWire::<C::Index>::Direct {
        proxy,
        index,
        hops,
        msg,
    }
    .to_bytes();
    rt.route_untyped(universe, entity, home, handler, wire);
    Ok(())
}

fn deliver_bcast<C: Collection, H: ElementHandler<C>>(
    rt: &mut Runtime,
    proxy: u32,
    origin: Node,
    seq: u64,
    msg: Vec<u8>,
) -> Result<(), SerdeErr> {
    if rt.collections.is_destroyed(proxy) {
        return Ok(());
    }
    if !rt.collections.exists(proxy) {
        rt.fatal("broadcast for unknown collection proxy");
    }
    let indices = rt
        .collections
        .record_mut::<C>(proxy)
        .expect("record exists")
        .live_indices();
    for index in indices {
        let Some(record) = rt.collections.record_mut::<C>(proxy) else {
            return Ok(()); // destroyed mid-broadcast by a handler
        };
        let Some(mut live) = record.checkout(&index) else {
            continue;
        };
        let seen = live.bcast_seen.get(&origin).copied().unwrap_or(0);
        if seen >= seq {
            record.reinsert(index, live);
            continue;
        }
        live.bcast_seen.insert(origin, seq);
        run_element::<C, H>(rt, proxy, index, live, &msg)?;
    }
    Ok(())
}

fn run_element<C: Collection, H: ElementHandler<C>>(
    rt: &mut Runtime,
    proxy: u32,
    index: C::Index,
    mut live: LiveElement<C>,
    msg_bytes: &[u8],
) -> Result<(), SerdeErr> {
    let msg = H::Msg::from_bytes(msg_bytes)?;
    let index_bytes = index.to_bytes();
    rt.push_element(proxy, index_bytes.clone());
    H::handle(&mut live.elm, rt, msg);
    rt.pop_element();

    match rt.take_migration(proxy, &index_bytes) {
        Some(dest) if dest != rt.node() => migrate_out::<C>(rt, proxy, index, live, dest),
        _ => {
            if let Some(record) = rt.collections.record_mut::<C>(proxy) {
                record.reinsert(index, live);
            }
        }
    }
    Ok(())
}

// Migration

fn migrate_out<C: Collection>(
    rt: &mut Runtime,
    proxy: u32,
    index: C::Index,
    live: LiveElement<C>,
    dest: Node,
) {
    let (entity, home) = element_identity::<C>(rt, proxy, index);
    let universe = proxy as UniverseId;
    info!(
        "node {}: migrating {:?} of collection {} to {}",
        rt.node(),
        index,
        proxy,
        dest
    );

    rt.collections
        .record_mut::<C>(proxy)
        .expect("record exists")
        .depart(index, dest);
    if let Some(meta) = rt.collections.meta_mut(proxy) {
        meta.live -= 1;
    }

    let wire = MigrateWire::<C::Index> {
        proxy,
        index,
        seen: live.bcast_seen.into_iter().collect(),
        elm: live.elm.to_bytes(),
    };
    let migrate_handler = rt
        .protocol()
        .collection_ids::<C>()
        .unwrap_or_else(|| rt.fatal("collection type is not registered"))
        .migrate;
    rt.post_user(dest, migrate_handler, wire.to_bytes());

    // directory updates
    {
        let loc = rt.location_mut(universe);
        loc.unregister(entity);
        loc.invalidate(entity);
    }
    if home == rt.node() {
        let (askers, pending) = {
            let loc = rt.location_mut(universe);
            loc.entity_migrated(entity, dest);
            (loc.release_queries(entity), loc.take_pending(entity))
        };
        for asker in askers {
            rt.send_location_info(asker, universe, entity, dest);
        }
        for route in pending {
            rt.repost_buffered(dest, route);
        }
    } else {
        let moved = EntityMovedMsg {
            universe,
            entity,
            node: dest,
        };
        let moved_handler = rt.sys_id::<EntityMovedMsg>();
        rt.post_user(home, moved_handler, moved.to_bytes());
        let pending = rt.location_mut(universe).take_pending(entity);
        for route in pending {
            rt.repost_buffered(dest, route);
        }
    }
}

pub(crate) fn dispatch_migrate<C: Collection>(
    rt: &mut Runtime,
    reader: &mut BitReader,
) -> Result<(), SerdeErr> {
    let wire = MigrateWire::<C::Index>::de(reader)?;
    let elm = C::from_bytes(&wire.elm)?;
    let seen: HashMap<Node, u64> = wire.seen.into_iter().collect();
    let proxy = wire.proxy;
    let index = wire.index;

    if rt.collections.is_destroyed(proxy) {
        warn!("node {}: migration into destroyed collection {}", rt.node(), proxy);
        return Ok(());
    }
    let Some(record) = rt.collections.record_mut::<C>(proxy) else {
        rt.fatal("migration for unknown collection proxy");
    };
    record.insert_live(index, elm, seen);
    if let Some(meta) = rt.collections.meta_mut(proxy) {
        meta.live += 1;
    }
    info!(
        "node {}: element {:?} of collection {} arrived",
        rt.node(),
        index,
        proxy
    );

    arrive_entity::<C>(rt, proxy, index);
    Ok(())
}

/// Directory work after an element lands here: register, answer parked
/// queries, drain parked messages in arrival order.
fn arrive_entity<C: Collection>(rt: &mut Runtime, proxy: u32, index: C::Index) {
    let (entity, home) = element_identity::<C>(rt, proxy, index);
    let universe = proxy as UniverseId;
    let node = rt.node();

    let (askers, pending) = {
        let loc = rt.location_mut(universe);
        loc.register(entity);
        (loc.release_queries(entity), loc.take_pending(entity))
    };
    for asker in askers {
        rt.send_location_info(asker, universe, entity, node);
    }
    for route in pending {
        rt.repost_buffered(node, route);
    }
    if home != node {
        let moved = EntityMovedMsg {
            universe,
            entity,
            node,
        };
        let moved_handler = rt.sys_id::<EntityMovedMsg>();
        rt.post_user(home, moved_handler, moved.to_bytes());
    }
}

// Broadcast

pub(crate) fn collection_broadcast<C: Collection, H: ElementHandler<C>>(
    rt: &mut Runtime,
    proxy: u32,
    msg: H::Msg,
) {
    let handler = rt
        .protocol()
        .id_of_element_handler::<C, H>()
        .unwrap_or_else(|| rt.fatal("element handler is not registered"));
    let origin = rt.node();
    let Some(meta) = rt.collections.meta_mut(proxy) else {
        rt.fatal("broadcast on unknown collection proxy");
    };
    meta.bcast_out += 1;
    let seq = meta.bcast_out;
    let wire = ElementWire::<C::Index>::Bcast {
        proxy,
        origin,
        seq,
        msg: msg.to_bytes(),
    }
    .to_bytes();
    rt.broadcast_user(handler, wire, true);
}

// Dynamic insertion

pub(crate) fn begin_modification<C: Collection>(rt: &mut Runtime, proxy: u32) -> InsertToken<C> {
    let epoch = rt.make_epoch_collective();
    let Some(meta) = rt.collections.meta_mut(proxy) else {
        rt.fatal("modification of unknown collection proxy");
    };
    meta.open_insert = Some(epoch);
    meta.members_ready = false;
    InsertToken {
        proxy,
        epoch,
        _marker: std::marker::PhantomData,
    }
}

pub(crate) fn insert_at<C: Collection>(
    rt: &mut Runtime,
    token: &InsertToken<C>,
    index: C::Index,
    node: Node,
) {
    let open = rt
        .collections
        .meta(token.proxy)
        .and_then(|meta| meta.open_insert);
    if open != Some(token.epoch) {
        rt.fatal("insertion outside an open modification bracket");
    }
    // validates bounds
    element_identity::<C>(rt, token.proxy, index);

    rt.push_epoch(token.epoch);
    if node == rt.node() {
        do_insert::<C>(rt, token.proxy, index);
    } else {
        let insert_handler = rt
            .protocol()
            .collection_ids::<C>()
            .unwrap_or_else(|| rt.fatal("collection type is not registered"))
            .insert;
        let wire = InsertWire::<C::Index> {
            proxy: token.proxy,
            index,
        };
        rt.post_user(node, insert_handler, wire.to_bytes());
    }
    rt.pop_epoch();
}

fn do_insert<C: Collection>(rt: &mut Runtime, proxy: u32, index: C::Index) {
    let elm = C::construct(rt, index);
    let Some(record) = rt.collections.record_mut::<C>(proxy) else {
        rt.fatal("insertion into unknown collection proxy");
    };
    record.insert_live(index, elm, HashMap::new());
    if let Some(meta) = rt.collections.meta_mut(proxy) {
        meta.live += 1;
        meta.total += 1;
    }
    arrive_entity::<C>(rt, proxy, index);
}

pub(crate) fn dispatch_insert<C: Collection>(
    rt: &mut Runtime,
    reader: &mut BitReader,
) -> Result<(), SerdeErr> {
    let wire = InsertWire::<C::Index>::de(reader)?;
    if rt.collections.is_destroyed(wire.proxy) {
        return Ok(());
    }
    do_insert::<C>(rt, wire.proxy, wire.index);
    Ok(())
}

pub(crate) fn finish_modification<C: Collection>(rt: &mut Runtime, token: InsertToken<C>) {
    if let Some(meta) = rt.collections.meta_mut(token.proxy) {
        meta.open_insert = None;
    }
    rt.finished_epoch(token.epoch);
    let epoch = token.epoch;
    rt.run_scheduler_while(|rt| !rt.epoch_terminated(epoch));

    // agree on which nodes host elements now
    let proxy = token.proxy;
    let mut counts = vec![0u64; rt.num_nodes() as usize];
    counts[rt.node() as usize] = rt
        .collections
        .meta(proxy)
        .map(|meta| meta.live)
        .unwrap_or(0);
    let members_handler = rt.sys_id::<CollectionMembersMsg>();
    let op = rt
        .protocol()
        .reduce_ops
        .id_of::<InsertGatherOp>()
        .expect("system op registered");
    let scope = ReduceScope::Group(crate::GroupId::WORLD);
    let seq = rt.reduce_seq(scope, COLLECTION_MEMBERS_TAG);
    let edges = rt.scope_edges(scope);
    rt.contribute_scoped(
        scope,
        COLLECTION_MEMBERS_TAG,
        seq,
        op,
        edges,
        (proxy, counts).to_bytes(),
        Some(CallbackKind::Broadcast {
            handler: members_handler,
            include_sender: true,
        }),
    );
    rt.run_scheduler_while(|rt| {
        !rt.collections
            .meta(proxy)
            .map(|meta| meta.members_ready)
            .unwrap_or(true)
    });
    info!(
        "node {}: collection {} modification finished ({} elements)",
        rt.node(),
        proxy,
        rt.collections.meta(proxy).map(|m| m.total).unwrap_or(0)
    );
}

// Reduction

pub(crate) fn collection_contribute<C: Collection, O: ReduceOp>(
    rt: &mut Runtime,
    proxy: u32,
    value: O::Value,
    cb: Option<Callback<O::Value>>,
) {
    let op = rt
        .protocol()
        .reduce_ops
        .id_of::<O>()
        .unwrap_or_else(|| rt.fatal("reduce operator is not registered"));
    let live = rt
        .collections
        .meta(proxy)
        .map(|meta| meta.live)
        .unwrap_or_else(|| rt.fatal("reduction on unknown collection proxy"));
    let scope = ReduceScope::Collection(proxy);
    let seq = rt.collection_reduce_seq(proxy, live);
    let edges = rt.scope_edges(scope);
    rt.contribute_scoped(
        scope,
        0,
        seq,
        op,
        edges,
        value.to_bytes(),
        cb.map(|c| c.kind().clone()),
    );
}

// Lookup

pub(crate) fn element_get_location<C: Collection>(
    rt: &mut Runtime,
    proxy: u32,
    index: C::Index,
    cb: Box<dyn FnOnce(&mut Runtime, Node) + 'static>,
) {
    let (entity, home) = element_identity::<C>(rt, proxy, index);
    let universe = proxy as UniverseId;
    if let Some((cb, node)) = rt.location_mut(universe).lookup(entity, cb) {
        rt.enqueue_run(Box::new(move |rt| cb(rt, node)));
        return;
    }
    if rt.location_mut(universe).lookup_needs_query(entity) {
        rt.send_where_is(home, universe, entity);
    }
}
