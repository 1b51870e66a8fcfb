//! The runtime: one per node, owning every manager and the scheduler loop.

pub(crate) mod collection_ops;
pub mod protocol;
pub(crate) mod system;

use std::any::Any;
use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Instant;

use log::{debug, info, trace, warn};
use weft_serde::{BitReader, BitWrite, BitWriter, Serde};

use crate::collection::manager::CollectionManager;
use crate::collection::mapping::MapFn;
use crate::collection::proxy::{CollectionProxy, ElementProxy};
use crate::collection::{Collection, ElementHandler, InsertToken};
use crate::config::RuntimeConfig;
use crate::epoch::{Epoch, EpochManager};
use crate::group::region::Region;
use crate::group::spanning_tree::SpanningTree;
use crate::group::{GroupEffect, GroupError, GroupId, GroupManager};
use crate::handler::{ActiveHandler, HandlerId};
use crate::location::{LocationEffect, LocationManager};
use crate::messaging::active::{ActiveMessenger, Polled};
use crate::messaging::envelope::Envelope;
use crate::objgroup::{ObjGroup, ObjGroupHandler, ObjGroupProxy};
use crate::pipe::{Callback, CallbackKind, PipeId, PipeManager};
use crate::reduce::{ReduceEdges, ReduceEffect, ReduceManager, ReduceOp, ReduceScope};
use crate::scheduler::{Delivery, Priority, Progressable, Scheduler, Task};
use crate::termination::{Receive, TermEffect, TerminationDetector};
use crate::transport::Transport;
use crate::types::{Node, Tag, UniverseId, BROADCAST_DEST};

use protocol::Protocol;
use system::{
    CollectionMembersMsg, DataCtrlMsg, DsAckMsg, EntityMovedMsg, EpochTerminatedMsg,
    GroupCoordinateMsg, GroupDestroyMsg, GroupGatherOp, GroupReadyMsg, GroupSetupAckMsg,
    GroupSetupMsg, LocationInfoMsg, PipeMsg, ReduceUpMsg, WaveAckMsg, WaveMsg, WhereIsMsg,
    GROUP_GATHER_TAG,
};

/// Context of the message currently being handled.
struct MsgContext {
    from: Node,
    tag: Option<Tag>,
    handler: HandlerId,
}

/// A message parked in a location manager while its target resolves. The
/// epoch was already produced for, so reposting must not produce again.
pub(crate) struct BufferedRoute {
    pub handler: HandlerId,
    pub epoch: Epoch,
    pub payload: Vec<u8>,
}

struct PendingMigration {
    proxy: u32,
    index: Vec<u8>,
    to: Node,
}

/// The per-node runtime. All user operations thread through a `&mut
/// Runtime`; handlers receive it as their first argument.
pub struct Runtime {
    config: RuntimeConfig,
    node: Node,
    num_nodes: Node,
    protocol: Rc<Protocol>,
    messenger: ActiveMessenger,
    scheduler: Scheduler,
    epochs: EpochManager,
    term: TerminationDetector,
    groups: GroupManager,
    reduces: ReduceManager,
    pipes: PipeManager,
    pub(crate) collections: CollectionManager,
    locations: std::collections::HashMap<UniverseId, LocationManager<BufferedRoute>>,
    obj_groups: Vec<Option<Box<dyn Any>>>,
    progressables: Vec<Box<dyn Progressable>>,
    ctx: Vec<MsgContext>,
    element_ctx: Vec<(u32, Vec<u8>)>,
    pending_migration: Option<PendingMigration>,
    /// Open collection-reduce round per proxy: (sequence, contributions
    /// still expected locally under it).
    collection_rounds: std::collections::HashMap<u32, (u64, u64)>,
    terminated_flag: bool,
    progress_active: bool,
    last_wave: Option<Instant>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig, protocol: Protocol, transport: Box<dyn Transport>) -> Self {
        let node = transport.node();
        let num_nodes = transport.num_nodes();
        info!("node {}/{}: runtime starting", node, num_nodes);
        Self {
            messenger: ActiveMessenger::new(
                transport,
                config.eager_threshold_bytes,
                config.fragment_bytes,
            ),
            config,
            node,
            num_nodes,
            protocol: Rc::new(protocol.lock()),
            scheduler: Scheduler::new(),
            epochs: EpochManager::new(node),
            term: TerminationDetector::new(node),
            groups: GroupManager::new(node, num_nodes),
            reduces: ReduceManager::new(),
            pipes: PipeManager::new(node),
            collections: CollectionManager::new(),
            locations: std::collections::HashMap::new(),
            obj_groups: Vec::new(),
            progressables: Vec::new(),
            ctx: Vec::new(),
            element_ctx: Vec::new(),
            pending_migration: None,
            collection_rounds: std::collections::HashMap::new(),
            terminated_flag: false,
            progress_active: false,
            last_wave: None,
        }
    }

    // Context

    pub fn node(&self) -> Node {
        self.node
    }

    pub fn num_nodes(&self) -> Node {
        self.num_nodes
    }

    /// Sender of the message whose handler is currently running; own node
    /// outside a handler.
    pub fn msg_from(&self) -> Node {
        self.ctx.last().map(|c| c.from).unwrap_or(self.node)
    }

    /// Tag of the current message, if it carried one.
    pub fn msg_tag(&self) -> Option<Tag> {
        self.ctx.last().and_then(|c| c.tag)
    }

    pub(crate) fn current_handler(&self) -> HandlerId {
        self.ctx
            .last()
            .map(|c| c.handler)
            .unwrap_or_else(|| self.fatal("no handler context"))
    }

    /// Innermost open epoch; the global bucket outside any bracket.
    pub fn current_epoch(&self) -> Epoch {
        self.epochs.current()
    }

    pub(crate) fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub(crate) fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub(crate) fn reduce_seq(&mut self, scope: ReduceScope, tag: Tag) -> u64 {
        self.reduces.next_seq(scope, tag)
    }

    pub(crate) fn enqueue_run(&mut self, f: Box<dyn FnOnce(&mut Runtime)>) {
        self.scheduler.enqueue(Priority::default(), Task::Run(f));
    }

    /// Abort with a diagnostic carrying node, epoch, and handler context.
    pub(crate) fn fatal(&self, what: &str) -> ! {
        let handler = self.ctx.last().map(|c| c.handler);
        panic!(
            "fatal on node {} (epoch {:?}, handler {:?}): {}",
            self.node,
            self.epochs.current(),
            handler,
            what
        );
    }

    // Send paths

    pub(crate) fn sys_id<H: ActiveHandler>(&self) -> HandlerId {
        self.protocol
            .id_of_handler::<H>()
            .unwrap_or_else(|| self.fatal("handler type is not registered"))
    }

    /// The one gate every outgoing message passes: termination accounting,
    /// the self-send bypass, and the transport hand-off.
    pub(crate) fn post_envelope(&mut self, to: Node, env: Envelope, payload: Vec<u8>, produce: bool) {
        if !env.is_system() {
            let epoch = env.term_epoch();
            if self.term.is_terminated(epoch) {
                warn!(
                    "node {}: dropping send into terminated {:?}",
                    self.node, epoch
                );
                return;
            }
            if produce {
                self.term.produce(epoch, 1);
            }
        }
        if to == self.node {
            self.accept_delivery(Delivery {
                env,
                from: self.node,
                buffer: payload,
                ds_engaging: false,
            });
        } else {
            self.messenger
                .post(to, env, payload)
                .unwrap_or_else(|e| self.fatal(&format!("transport send failed: {}", e)));
        }
    }

    /// User-level send under the current epoch.
    pub(crate) fn post_user(&mut self, to: Node, handler: HandlerId, payload: Vec<u8>) {
        let mut env = Envelope::new(to, handler);
        env.set_epoch(self.epochs.current());
        self.post_envelope(to, env, payload, true);
    }

    pub(crate) fn send_system<H: ActiveHandler>(&mut self, to: Node, msg: H::Msg) {
        let handler = self.sys_id::<H>();
        let mut env = Envelope::new(to, handler);
        env.set_system();
        self.post_envelope(to, env, msg.to_bytes(), false);
    }

    fn bcast_system<H: ActiveHandler>(&mut self, msg: H::Msg) {
        let handler = self.sys_id::<H>();
        let mut env = Envelope::new(BROADCAST_DEST, handler);
        env.set_system();
        env.set_bcast(self.node, self.node);
        env.set_deliver_bcast_to_sender(true);
        self.post_envelope(self.node, env, msg.to_bytes(), false);
    }

    pub(crate) fn broadcast_user(&mut self, handler: HandlerId, payload: Vec<u8>, include_sender: bool) {
        let mut env = Envelope::new(BROADCAST_DEST, handler);
        env.set_epoch(self.epochs.current());
        env.set_bcast(self.node, self.node);
        env.set_deliver_bcast_to_sender(include_sender);
        self.post_envelope(self.node, env, payload, true);
    }

    /// Send a message to a handler on `node`, owned by the call.
    pub fn send_msg<H: ActiveHandler>(&mut self, node: Node, msg: H::Msg) {
        self.post_user(node, self.sys_id::<H>(), msg.to_bytes());
    }

    /// Same, with a user tag for flow disambiguation.
    pub fn send_msg_tagged<H: ActiveHandler>(&mut self, node: Node, tag: Tag, msg: H::Msg) {
        let handler = self.sys_id::<H>();
        let mut env = Envelope::new(node, handler);
        env.set_epoch(self.epochs.current());
        env.set_tag(tag);
        self.post_envelope(node, env, msg.to_bytes(), true);
    }

    /// Send under an explicit epoch instead of the current one.
    pub fn send_msg_epoch<H: ActiveHandler>(&mut self, node: Node, epoch: Epoch, msg: H::Msg) {
        let handler = self.sys_id::<H>();
        let mut env = Envelope::new(node, handler);
        env.set_epoch(epoch);
        self.post_envelope(node, env, msg.to_bytes(), true);
    }

    /// Deliver `msg` on every node. The sending node delivers to itself
    /// only when `include_sender` is set; every broadcast site states its
    /// choice.
    pub fn broadcast_msg<H: ActiveHandler>(&mut self, msg: H::Msg, include_sender: bool) {
        self.broadcast_user(self.sys_id::<H>(), msg.to_bytes(), include_sender);
    }

    /// Untyped out-of-band transfer: announce then stream fragments.
    pub fn send_data(&mut self, dest: Node, tag: Tag, payload: &[u8]) {
        if dest == self.node {
            let action = self.messenger.data.take_action(tag, self.node, payload.to_vec());
            if let Some((action, from, payload)) = action {
                self.scheduler.enqueue(
                    Priority::default(),
                    Task::Run(Box::new(move |rt| action(rt, from, payload))),
                );
            }
            return;
        }
        let fragments = crate::messaging::data::DataManager::split(payload, self.config.fragment_bytes)
            .len() as u32;
        let ctrl = DataCtrlMsg {
            tag,
            len: payload.len() as u64,
            fragments,
        };
        let handler = self.sys_id::<DataCtrlMsg>();
        self.post_user(dest, handler, ctrl.to_bytes());
        self.messenger
            .post_fragments(dest, tag, payload)
            .unwrap_or_else(|e| self.fatal(&format!("transport send failed: {}", e)));
    }

    /// Receive half of an out-of-band transfer: run `action` when the
    /// stream under `tag` has fully arrived.
    pub fn recv_data_msg(
        &mut self,
        tag: Tag,
        action: impl FnOnce(&mut Runtime, Node, Vec<u8>) + 'static,
    ) {
        if let Some((action, from, payload)) = self.messenger.data.register_action(tag, Box::new(action)) {
            self.scheduler.enqueue(
                Priority::default(),
                Task::Run(Box::new(move |rt| action(rt, from, payload))),
            );
        }
    }

    // Epochs and termination

    pub fn make_epoch_rooted(&mut self) -> Epoch {
        let epoch = self.epochs.make_rooted();
        self.term.register(epoch);
        epoch
    }

    /// Collective call: every node must create collective epochs in the
    /// same order.
    pub fn make_epoch_collective(&mut self) -> Epoch {
        let epoch = self.epochs.make_collective();
        self.term.register(epoch);
        epoch
    }

    /// Declare that this node roots no further work in `epoch`.
    pub fn finished_epoch(&mut self, epoch: Epoch) {
        let effects = self.term.finished_epoch(epoch);
        self.run_term_effects(effects);
    }

    /// Run `action` on this node once `epoch` is globally quiet. Actions
    /// fire in registration order.
    pub fn add_action(&mut self, epoch: Epoch, action: impl FnOnce(&mut Runtime) + 'static) {
        if let Some(action) = self.term.add_action(epoch, Box::new(action)) {
            self.scheduler.enqueue(Priority::default(), Task::Run(action));
        }
    }

    pub fn epoch_terminated(&self, epoch: Epoch) -> bool {
        self.term.is_terminated(epoch)
    }

    pub fn push_epoch(&mut self, epoch: Epoch) {
        self.epochs.push(epoch);
    }

    pub fn pop_epoch(&mut self) -> Option<Epoch> {
        self.epochs.pop()
    }

    /// Open a rooted epoch around `f`, then drive the scheduler until the
    /// epoch is globally quiet. Top-level use only, never inside a
    /// handler.
    pub fn run_in_epoch_rooted(&mut self, f: impl FnOnce(&mut Runtime)) {
        let epoch = self.make_epoch_rooted();
        self.run_in_epoch(epoch, f);
    }

    /// Collective counterpart of [`run_in_epoch_rooted`]: every node calls
    /// it in the same order.
    ///
    /// [`run_in_epoch_rooted`]: Self::run_in_epoch_rooted
    pub fn run_in_epoch_collective(&mut self, f: impl FnOnce(&mut Runtime)) {
        let epoch = self.make_epoch_collective();
        self.run_in_epoch(epoch, f);
    }

    fn run_in_epoch(&mut self, epoch: Epoch, f: impl FnOnce(&mut Runtime)) {
        let done = Rc::new(Cell::new(false));
        let flag = done.clone();
        self.add_action(epoch, move |_| flag.set(true));
        self.epochs.push(epoch);
        f(self);
        self.epochs.pop();
        self.finished_epoch(epoch);
        self.run_scheduler_while(|_| !done.get());
    }

    fn apply_terminated(&mut self, epoch: Epoch) {
        debug!("node {}: {:?} terminated", self.node, epoch);
        let actions = self.term.apply_terminated(epoch);
        for action in actions {
            self.scheduler.enqueue(Priority::default(), Task::Run(action));
        }
        if epoch.is_global() {
            self.terminated_flag = true;
        }
    }

    fn run_term_effects(&mut self, effects: Vec<TermEffect>) {
        for effect in effects {
            match effect {
                TermEffect::WaveDown { to, epoch, wave } => {
                    self.send_system::<WaveMsg>(to, WaveMsg { epoch, wave });
                }
                TermEffect::WaveUp {
                    to,
                    epoch,
                    wave,
                    produced,
                    consumed,
                    finished,
                } => {
                    self.send_system::<WaveAckMsg>(
                        to,
                        WaveAckMsg {
                            epoch,
                            wave,
                            produced,
                            consumed,
                            finished,
                        },
                    );
                }
                TermEffect::DsAck { to, epoch, count } => {
                    self.send_system::<DsAckMsg>(to, DsAckMsg { epoch, count });
                }
                TermEffect::Terminated { epoch } => {
                    self.bcast_system::<EpochTerminatedMsg>(EpochTerminatedMsg { epoch });
                }
            }
        }
    }

    // Groups

    /// Create a group from a region description. The callback fires here,
    /// once, after every member wired up.
    pub fn new_group(
        &mut self,
        region: Region,
        is_static: bool,
        cb: impl FnOnce(&mut Runtime, GroupId) + 'static,
    ) -> GroupId {
        let (group, effects) = self.groups.new_rooted(&region, is_static, Box::new(cb));
        self.run_group_effects(effects);
        group
    }

    /// Collective group creation: every node states whether it belongs.
    /// The callback fires on each member once the group is wired up.
    pub fn new_group_collective(
        &mut self,
        in_group: bool,
        cb: impl FnOnce(&mut Runtime, GroupId) + 'static,
    ) -> GroupId {
        let (group, _) = self.groups.new_collective(in_group, Box::new(cb));
        let members = if in_group { vec![self.node] } else { Vec::new() };
        let coordinate = self.sys_id::<GroupCoordinateMsg>();
        let op = self
            .protocol
            .reduce_ops
            .id_of::<GroupGatherOp>()
            .expect("system op registered");
        let scope = ReduceScope::Group(GroupId::WORLD);
        let seq = self.reduces.next_seq(scope, GROUP_GATHER_TAG);
        let edges = self.world_reduce_edges();
        self.contribute_scoped(
            scope,
            GROUP_GATHER_TAG,
            seq,
            op,
            edges,
            (group.bits(), members).to_bytes(),
            Some(CallbackKind::Send {
                handler: coordinate,
                node: 0,
            }),
        );
        group
    }

    /// Fan `msg` over the group's spanning tree; every member delivers.
    /// A member sender delivers to itself only when `include_sender`.
    pub fn group_broadcast<H: ActiveHandler>(
        &mut self,
        group: GroupId,
        msg: H::Msg,
        include_sender: bool,
    ) -> Result<(), GroupError> {
        let root = self.groups.known_root(group)?;
        let handler = self.sys_id::<H>();
        let mut env = Envelope::new(BROADCAST_DEST, handler);
        env.set_epoch(self.epochs.current());
        env.set_group(group);
        env.set_bcast(root, self.node);
        env.set_deliver_bcast_to_sender(include_sender);
        self.post_envelope(root, env, msg.to_bytes(), true);
        Ok(())
    }

    /// Member-collective reduction over the group; the combined value
    /// reaches `cb` via the group's root.
    pub fn group_reduce<O: ReduceOp>(
        &mut self,
        group: GroupId,
        tag: Tag,
        value: O::Value,
        cb: Option<Callback<O::Value>>,
    ) -> Result<(), GroupError> {
        let op = self
            .protocol
            .reduce_ops
            .id_of::<O>()
            .unwrap_or_else(|| self.fatal("reduce operator is not registered"));
        let (parent, children) = self.groups.reduce_edges(group)?;
        let scope = ReduceScope::Group(group);
        let seq = self.reduces.next_seq(scope, tag);
        self.contribute_scoped(
            scope,
            tag,
            seq,
            op,
            ReduceEdges { parent, children },
            value.to_bytes(),
            cb.map(|c| c.kind().clone()),
        );
        Ok(())
    }

    /// Destroy a non-static group everywhere. Later sends fail stale.
    pub fn destroy_group(&mut self, group: GroupId) -> Result<(), GroupError> {
        let handler = self.sys_id::<GroupDestroyMsg>();
        if self.groups.is_member(group) {
            let children = self.groups.destroy(group)?;
            for child in children {
                self.post_user(child, handler, GroupDestroyMsg { group }.to_bytes());
            }
        } else {
            let root = self.groups.known_root(group)?;
            self.post_user(root, handler, GroupDestroyMsg { group }.to_bytes());
        }
        Ok(())
    }

    // Group wiring runs under the caller's epoch (the global bucket by
    // default) so quiescence detection waits for construction to settle.
    fn run_group_effects(&mut self, effects: Vec<GroupEffect>) {
        for effect in effects {
            match effect {
                GroupEffect::SendSetup {
                    to,
                    group,
                    members,
                    ack_to,
                } => {
                    let handler = self.sys_id::<GroupSetupMsg>();
                    let msg = GroupSetupMsg {
                        group,
                        members,
                        ack_to,
                    };
                    self.post_user(to, handler, msg.to_bytes());
                }
                GroupEffect::SendSetupAck { to, group } => {
                    let handler = self.sys_id::<GroupSetupAckMsg>();
                    self.post_user(to, handler, GroupSetupAckMsg { group }.to_bytes());
                }
                GroupEffect::SendReady { to, group } => {
                    let handler = self.sys_id::<GroupReadyMsg>();
                    self.post_user(to, handler, GroupReadyMsg { group }.to_bytes());
                }
                GroupEffect::FireCallback { group } => {
                    if let Some(cb) = self.groups.take_callback(group) {
                        self.scheduler.enqueue(
                            Priority::default(),
                            Task::Run(Box::new(move |rt| cb(rt, group))),
                        );
                    }
                }
            }
        }
    }

    // Reductions

    fn world_reduce_edges(&self) -> ReduceEdges {
        let (parent, children) = self
            .groups
            .reduce_edges(GroupId::WORLD)
            .expect("world group always exists");
        ReduceEdges { parent, children }
    }

    pub(crate) fn contribute_scoped(
        &mut self,
        scope: ReduceScope,
        tag: Tag,
        seq: u64,
        op: u32,
        edges: ReduceEdges,
        value: Vec<u8>,
        cb: Option<CallbackKind>,
    ) {
        let local_expected = self.local_expected_for(scope);
        let combine = self
            .protocol
            .reduce_ops
            .combine(op)
            .unwrap_or_else(|| self.fatal("unknown reduce operator id"));
        let effects = self
            .reduces
            .contribute((scope, tag, seq), op, edges, local_expected, value, cb, &*combine)
            .unwrap_or_else(|_| self.fatal("reduce value failed to decode"));
        self.run_reduce_effects(effects);
    }

    fn local_expected_for(&self, scope: ReduceScope) -> usize {
        match scope {
            ReduceScope::Group(_) => 1,
            ReduceScope::Collection(proxy) => self
                .collections
                .meta(proxy)
                .map(|m| m.live as usize)
                .unwrap_or(0),
        }
    }

    pub(crate) fn scope_edges(&self, scope: ReduceScope) -> ReduceEdges {
        match scope {
            ReduceScope::Group(group) => {
                let (parent, children) = self
                    .groups
                    .reduce_edges(group)
                    .unwrap_or_else(|e| self.fatal(&format!("reduce on unusable group: {}", e)));
                ReduceEdges { parent, children }
            }
            ReduceScope::Collection(proxy) => {
                let meta = self
                    .collections
                    .meta(proxy)
                    .unwrap_or_else(|| self.fatal("reduce on unknown collection"));
                let tree = SpanningTree::new(meta.members.clone());
                let root = tree.root().unwrap_or_else(|| self.fatal("empty collection group"));
                ReduceEdges {
                    parent: tree.parent_from(root, self.node),
                    children: tree.children_from(root, self.node).len(),
                }
            }
        }
    }

    fn run_reduce_effects(&mut self, effects: Vec<ReduceEffect>) {
        for effect in effects {
            match effect {
                ReduceEffect::SendUp {
                    to,
                    scope,
                    tag,
                    seq,
                    op,
                    value,
                    cb,
                } => {
                    // accounted: an epoch enclosing a reduction does not
                    // terminate before the root sees the value
                    let handler = self.sys_id::<ReduceUpMsg>();
                    let msg = ReduceUpMsg {
                        scope,
                        tag,
                        seq,
                        op,
                        value,
                        cb,
                    };
                    self.post_user(to, handler, msg.to_bytes());
                }
                ReduceEffect::Fire { cb, value } => self.fire_callback(cb, value),
            }
        }
    }

    // Callbacks

    pub fn make_send_callback<H: ActiveHandler>(&self, node: Node) -> Callback<H::Msg> {
        Callback::from_kind(CallbackKind::Send {
            handler: self.sys_id::<H>(),
            node,
        })
    }

    pub fn make_bcast_callback<H: ActiveHandler>(&self, include_sender: bool) -> Callback<H::Msg> {
        Callback::from_kind(CallbackKind::Broadcast {
            handler: self.sys_id::<H>(),
            include_sender,
        })
    }

    /// Anonymous callback: `f` runs on this node when the callback fires
    /// anywhere. Single-use unless `persist`.
    pub fn make_func_callback<M: Serde + 'static>(
        &mut self,
        persist: bool,
        mut f: impl FnMut(&mut Runtime, M) + 'static,
    ) -> Callback<M> {
        let pipe = self.pipes.register(
            Box::new(move |rt, _from, bytes| match M::from_bytes(bytes) {
                Ok(msg) => f(rt, msg),
                Err(_) => rt.fatal("callback value failed to decode"),
            }),
            persist,
        );
        Callback::from_kind(CallbackKind::Anon { pipe })
    }

    pub fn make_element_callback<C: Collection, H: ElementHandler<C>>(
        &mut self,
        element: ElementProxy<C>,
    ) -> Callback<H::Msg> {
        let handler = self
            .protocol
            .id_of_element_handler::<C, H>()
            .unwrap_or_else(|| self.fatal("element handler is not registered"));
        let (entity, home) = collection_ops::element_identity::<C>(self, element.proxy, element.index);
        Callback::from_kind(CallbackKind::ElementSend {
            handler,
            proxy: element.proxy,
            index: element.index.to_bytes(),
            entity,
            home,
        })
    }

    pub fn make_collection_bcast_callback<C: Collection, H: ElementHandler<C>>(
        &mut self,
        proxy: CollectionProxy<C>,
    ) -> Callback<H::Msg> {
        let handler = self
            .protocol
            .id_of_element_handler::<C, H>()
            .unwrap_or_else(|| self.fatal("element handler is not registered"));
        Callback::from_kind(CallbackKind::CollectionBcast {
            handler,
            proxy: proxy.id,
        })
    }

    pub fn make_obj_callback<O: ObjGroup, H: ObjGroupHandler<O>>(
        &mut self,
        proxy: ObjGroupProxy<O>,
        node: Node,
    ) -> Callback<H::Msg> {
        let handler = self
            .protocol
            .id_of_obj_handler::<O, H>()
            .unwrap_or_else(|| self.fatal("object-group handler is not registered"))
            .with_obj(proxy.idx);
        Callback::from_kind(CallbackKind::ObjGroupSend { handler, node })
    }

    pub(crate) fn fire_callback(&mut self, kind: CallbackKind, bytes: Vec<u8>) {
        match kind {
            CallbackKind::Anon { pipe } => {
                if pipe.node() == self.node {
                    self.invoke_pipe(pipe, self.node, &bytes);
                } else {
                    let handler = self.sys_id::<PipeMsg>();
                    let mut env = Envelope::new(pipe.node(), handler);
                    env.set_epoch(self.epochs.current());
                    env.set_callback();
                    let msg = PipeMsg {
                        pipe: pipe.bits(),
                        value: bytes,
                    };
                    self.post_envelope(pipe.node(), env, msg.to_bytes(), true);
                }
            }
            CallbackKind::Send { handler, node }
            | CallbackKind::ObjGroupSend { handler, node } => {
                self.post_user(node, handler, bytes);
            }
            CallbackKind::Broadcast {
                handler,
                include_sender,
            } => {
                self.broadcast_user(handler, bytes, include_sender);
            }
            CallbackKind::ElementSend {
                handler,
                proxy,
                index,
                entity,
                home,
            } => {
                let mut w = BitWriter::new();
                0u8.ser(&mut w); // direct wire kind
                proxy.ser(&mut w);
                for byte in &index {
                    w.write_byte(*byte);
                }
                0u8.ser(&mut w); // hops
                bytes.ser(&mut w);
                let wire = w.to_bytes();
                self.route_untyped(proxy as UniverseId, entity, home, handler, wire);
            }
            CallbackKind::CollectionBcast { handler, proxy } => {
                let Some(meta) = self.collections.meta_mut(proxy) else {
                    warn!("node {}: callback into unknown collection {}", self.node, proxy);
                    return;
                };
                meta.bcast_out += 1;
                let seq = meta.bcast_out;
                let mut w = BitWriter::new();
                1u8.ser(&mut w); // broadcast wire kind
                proxy.ser(&mut w);
                self.node.ser(&mut w);
                seq.ser(&mut w);
                bytes.ser(&mut w);
                self.broadcast_user(handler, w.to_bytes(), true);
            }
        }
    }

    fn invoke_pipe(&mut self, pipe: PipeId, from: Node, bytes: &[u8]) {
        let Some(mut entry) = self.pipes.take(pipe) else {
            warn!("node {}: {:?} has no live entry", self.node, pipe);
            return;
        };
        (entry.f)(self, from, bytes);
        if entry.persist {
            self.pipes.restore(pipe, entry);
        }
    }

    // Object groups

    /// Install a per-node singleton. Collective call: every node
    /// constructs its own instance in the same order.
    pub fn make_obj_group<O: ObjGroup>(&mut self, obj: O) -> ObjGroupProxy<O> {
        let idx = self.obj_groups.len();
        if idx > u8::MAX as usize {
            self.fatal("too many object groups");
        }
        self.obj_groups.push(Some(Box::new(obj)));
        ObjGroupProxy::new(idx as u8)
    }

    pub(crate) fn obj_group_send<O: ObjGroup, H: ObjGroupHandler<O>>(
        &mut self,
        idx: u8,
        node: Node,
        msg: H::Msg,
    ) {
        let handler = self
            .protocol
            .id_of_obj_handler::<O, H>()
            .unwrap_or_else(|| self.fatal("object-group handler is not registered"))
            .with_obj(idx);
        self.post_user(node, handler, msg.to_bytes());
    }

    pub(crate) fn obj_group_broadcast<O: ObjGroup, H: ObjGroupHandler<O>>(
        &mut self,
        idx: u8,
        msg: H::Msg,
    ) {
        let handler = self
            .protocol
            .id_of_obj_handler::<O, H>()
            .unwrap_or_else(|| self.fatal("object-group handler is not registered"))
            .with_obj(idx);
        self.broadcast_user(handler, msg.to_bytes(), true);
    }

    /// Borrow this node's instance of an object group (for inspection or
    /// direct mutation outside the message path).
    pub fn obj_local<O: ObjGroup>(&mut self, proxy: ObjGroupProxy<O>) -> &mut O {
        let idx = proxy.idx as usize;
        self.obj_groups
            .get_mut(idx)
            .and_then(|slot| slot.as_mut())
            .and_then(|obj| obj.downcast_mut::<O>())
            .unwrap_or_else(|| panic!("object group {} missing or of another type", idx))
    }

    pub(crate) fn take_obj(&mut self, idx: u8) -> Box<dyn Any> {
        self.obj_groups
            .get_mut(idx as usize)
            .and_then(Option::take)
            .unwrap_or_else(|| self.fatal("object group instance missing or re-entered"))
    }

    pub(crate) fn put_obj(&mut self, idx: u8, obj: Box<dyn Any>) {
        self.obj_groups[idx as usize] = Some(obj);
    }

    // Collections (thin wrappers over collection_ops)

    /// Build a bulk collection: every index in the range is constructed
    /// once, placed by `map`. Collective call.
    pub fn make_collection<C: Collection>(
        &mut self,
        range: C::Index,
        map: MapFn<C::Index>,
    ) -> CollectionProxy<C> {
        collection_ops::make_collection::<C>(self, range, map, false)
    }

    /// Build an empty collection accepting dynamic insertion. Collective
    /// call.
    pub fn make_collection_insertable<C: Collection>(
        &mut self,
        range: C::Index,
        map: MapFn<C::Index>,
    ) -> CollectionProxy<C> {
        collection_ops::make_collection::<C>(self, range, map, true)
    }

    /// Open a modification bracket. Collective call.
    pub fn begin_modification<C: Collection>(&mut self, proxy: CollectionProxy<C>) -> InsertToken<C> {
        collection_ops::begin_modification::<C>(self, proxy.id)
    }

    /// Insert an element at `node` under an open bracket.
    pub fn insert_at<C: Collection>(&mut self, token: &InsertToken<C>, index: C::Index, node: Node) {
        collection_ops::insert_at::<C>(self, token, index, node);
    }

    /// Close the bracket: drives the scheduler until every insertion and
    /// directory update landed everywhere. Collective call.
    pub fn finish_modification<C: Collection>(&mut self, token: InsertToken<C>) {
        collection_ops::finish_modification::<C>(self, token);
    }

    pub(crate) fn element_send<C: Collection, H: ElementHandler<C>>(
        &mut self,
        proxy: u32,
        index: C::Index,
        msg: H::Msg,
    ) {
        collection_ops::element_send::<C, H>(self, proxy, index, msg);
    }

    pub(crate) fn collection_broadcast<C: Collection, H: ElementHandler<C>>(
        &mut self,
        proxy: u32,
        msg: H::Msg,
    ) {
        collection_ops::collection_broadcast::<C, H>(self, proxy, msg);
    }

    pub(crate) fn collection_contribute<C: Collection, O: ReduceOp>(
        &mut self,
        proxy: u32,
        value: O::Value,
        cb: Option<Callback<O::Value>>,
    ) {
        collection_ops::collection_contribute::<C, O>(self, proxy, value, cb);
    }

    pub(crate) fn element_get_location<C: Collection>(
        &mut self,
        proxy: u32,
        index: C::Index,
        cb: impl FnOnce(&mut Runtime, Node) + 'static,
    ) {
        collection_ops::element_get_location::<C>(self, proxy, index, Box::new(cb));
    }

    pub(crate) fn collection_destroy(&mut self, proxy: u32) {
        let handler = self.sys_id::<system::CollectionDestroyMsg>();
        let msg = system::CollectionDestroyMsg { proxy };
        self.broadcast_user(handler, msg.to_bytes(), true);
    }

    /// The element whose handler is currently running.
    pub fn current_element<C: Collection>(&self) -> ElementProxy<C> {
        let Some((proxy, index)) = self.element_ctx.last() else {
            self.fatal("no element context (not inside an element handler)");
        };
        let index = C::Index::from_bytes(index)
            .unwrap_or_else(|_| self.fatal("element context index type mismatch"));
        ElementProxy {
            proxy: *proxy,
            index,
        }
    }

    /// Ask the runtime to migrate the currently-running element to `to`
    /// when its handler returns.
    pub fn migrate_current(&mut self, to: Node) {
        let Some((proxy, index)) = self.element_ctx.last() else {
            self.fatal("migrate_current outside an element handler");
        };
        self.pending_migration = Some(PendingMigration {
            proxy: *proxy,
            index: index.clone(),
            to,
        });
    }

    pub(crate) fn push_element(&mut self, proxy: u32, index: Vec<u8>) {
        self.element_ctx.push((proxy, index));
    }

    pub(crate) fn pop_element(&mut self) {
        self.element_ctx.pop();
    }

    pub(crate) fn take_migration(&mut self, proxy: u32, index: &[u8]) -> Option<Node> {
        let pending = self.pending_migration.take()?;
        if pending.proxy != proxy || pending.index != index {
            self.fatal("migration requested for an element that is not running");
        }
        Some(pending.to)
    }

    // Location plumbing

    pub(crate) fn location_mut(&mut self, universe: UniverseId) -> &mut LocationManager<BufferedRoute> {
        let node = self.node;
        let capacity = self.config.location_cache_capacity;
        self.locations
            .entry(universe)
            .or_insert_with(|| LocationManager::new(node, capacity))
    }

    /// Park a route behind an unresolved location. Produces for the epoch
    /// now so it cannot terminate while the message waits.
    pub(crate) fn queue_buffered(
        &mut self,
        universe: UniverseId,
        entity: u64,
        handler: HandlerId,
        payload: Vec<u8>,
    ) {
        let epoch = self.epochs.current();
        self.term.produce(epoch, 1);
        self.location_mut(universe).queue_pending(
            entity,
            BufferedRoute {
                handler,
                epoch,
                payload,
            },
        );
    }

    pub(crate) fn repost_buffered(&mut self, to: Node, route: BufferedRoute) {
        let mut env = Envelope::new(to, route.handler);
        env.set_epoch(route.epoch);
        // already produced for when it was queued
        self.post_envelope(to, env, route.payload, false);
    }

    /// Directory query, accounted under the current epoch so quiescence
    /// waits for the answer.
    pub(crate) fn send_where_is(&mut self, home: Node, universe: UniverseId, entity: u64) {
        let handler = self.sys_id::<WhereIsMsg>();
        let asker = self.node;
        let msg = WhereIsMsg {
            universe,
            entity,
            asker,
        };
        self.post_user(home, handler, msg.to_bytes());
    }

    /// Directory answer, accounted like the query.
    pub(crate) fn send_location_info(
        &mut self,
        to: Node,
        universe: UniverseId,
        entity: u64,
        node: Node,
    ) {
        let handler = self.sys_id::<LocationInfoMsg>();
        let msg = LocationInfoMsg {
            universe,
            entity,
            node,
        };
        self.post_user(to, handler, msg.to_bytes());
    }

    /// Route an element wire without knowing the element type (used by
    /// serialized callbacks).
    pub(crate) fn route_untyped(
        &mut self,
        universe: UniverseId,
        entity: u64,
        home: Node,
        handler: HandlerId,
        wire: Vec<u8>,
    ) {
        match self.location_mut(universe).resolve(entity, home) {
            LocationEffect::DeliverLocal => self.post_user(self.node, handler, wire),
            LocationEffect::Forward { to } => self.post_user(to, handler, wire),
            LocationEffect::QueryHome { home } => {
                self.queue_buffered(universe, entity, handler, wire);
                self.send_where_is(home, universe, entity);
            }
            LocationEffect::Queued => self.queue_buffered(universe, entity, handler, wire),
        }
    }

    // Scheduler loop

    /// Register a component to poll when the scheduler goes idle.
    pub fn register_progressable(&mut self, p: Box<dyn Progressable>) {
        self.progressables.push(p);
    }

    /// Enqueue a plain work unit at default priority.
    pub fn enqueue(&mut self, work: impl FnOnce(&mut Runtime) + 'static) {
        self.scheduler.enqueue(Priority::default(), Task::Run(Box::new(work)));
    }

    /// One scheduler iteration: run one ready work unit, or poll every
    /// progress source once.
    pub fn run_scheduler_once(&mut self) {
        if let Some(task) = self.scheduler.pop() {
            self.run_task(task);
            self.progress_active = true;
            return;
        }
        let mut active = self.progress_transport();
        active |= self.progress_termination();
        active |= self.progress_user();
        self.progress_active = active;
    }

    /// Drive the loop while `pred` holds.
    pub fn run_scheduler_while(&mut self, mut pred: impl FnMut(&mut Runtime) -> bool) {
        while pred(self) {
            self.run_scheduler_once();
        }
    }

    /// Drive the loop until the global no-epoch bucket is quiet.
    pub fn run_until_terminated(&mut self) {
        self.run_scheduler_while(|rt| !rt.is_terminated());
    }

    /// Queue empty and no progress source reported activity last tick.
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_empty() && !self.progress_active
    }

    /// Whether global quiescence has been detected.
    pub fn is_terminated(&self) -> bool {
        self.terminated_flag
    }

    /// Transport barrier, then teardown.
    pub fn finalize(mut self) {
        info!("node {}: finalizing", self.node);
        self.messenger.barrier();
    }

    /// Block in the transport barrier (collective).
    pub fn barrier(&mut self) {
        self.messenger.barrier();
    }

    fn progress_transport(&mut self) -> bool {
        let mut any = false;
        loop {
            match self.messenger.poll() {
                None => break,
                Some(Polled::Progressed) => any = true,
                Some(Polled::Deliver(delivery)) => {
                    any = true;
                    self.accept_delivery(delivery);
                }
                Some(Polled::Data { tag, from, payload }) => {
                    any = true;
                    if let Some((action, from, payload)) =
                        self.messenger.data.take_action(tag, from, payload)
                    {
                        self.scheduler.enqueue(
                            Priority::default(),
                            Task::Run(Box::new(move |rt| action(rt, from, payload))),
                        );
                    }
                }
            }
        }
        any
    }

    fn progress_termination(&mut self) -> bool {
        if self.node != 0 {
            return false;
        }
        if let Some(last) = self.last_wave {
            if last.elapsed() < self.config.wave_interval {
                return false;
            }
        }
        self.last_wave = Some(Instant::now());
        let children = self.groups.world_children_from(0);
        let effects = self.term.start_waves(&children);
        let active = !effects.is_empty();
        self.run_term_effects(effects);
        active
    }

    fn progress_user(&mut self) -> bool {
        if self.progressables.is_empty() {
            return false;
        }
        let mut progressables = std::mem::take(&mut self.progressables);
        let mut active = false;
        for p in progressables.iter_mut() {
            active |= p.progress(self);
        }
        self.progressables = progressables;
        active
    }

    fn accept_delivery(&mut self, mut delivery: Delivery) {
        if !delivery.env.is_system() {
            match self
                .term
                .on_receive(delivery.env.term_epoch(), delivery.from)
            {
                Receive::DropLeak => return,
                Receive::Accept { ds_engaging } => delivery.ds_engaging = ds_engaging,
            }
        }
        let priority = delivery.env.priority();
        self.scheduler.enqueue(priority, Task::Deliver(delivery));
    }

    fn run_task(&mut self, task: Task) {
        match task {
            Task::Run(f) => f(self),
            Task::Deliver(delivery) => self.run_delivery(delivery),
        }
    }

    fn run_delivery(&mut self, delivery: Delivery) {
        let env = &delivery.env;

        if env.is_bcast() {
            // forward down the spanning tree before local delivery
            let children = match env.group() {
                Some(group) => self.groups.bcast_children(group).unwrap_or_else(|e| {
                    warn!("node {}: dropping group broadcast: {}", self.node, e);
                    Vec::new()
                }),
                None => self.groups.world_children_from(env.bcast_root()),
            };
            for child in children {
                if !env.is_system() {
                    self.term.produce(env.term_epoch(), 1);
                }
                self.messenger
                    .post(child, env.clone(), delivery.buffer.clone())
                    .unwrap_or_else(|e| self.fatal(&format!("transport send failed: {}", e)));
            }
            let deliver_local =
                env.bcast_origin() != self.node || env.deliver_bcast_to_sender();
            if !deliver_local {
                if !env.is_system() {
                    let effects =
                        self.term
                            .consume(env.term_epoch(), delivery.from, delivery.ds_engaging);
                    self.run_term_effects(effects);
                }
                return;
            }
        }

        self.dispatch(delivery);
    }

    fn dispatch(&mut self, delivery: Delivery) {
        let Delivery {
            env,
            from,
            buffer,
            ds_engaging,
        } = delivery;
        let epoch = env.term_epoch();
        let protocol = self.protocol.clone();
        let record = protocol
            .handlers
            .get(env.handler())
            .unwrap_or_else(|e| self.fatal(&e.to_string()));
        trace!(
            "node {}: running '{}' from {}",
            self.node,
            record.trace_name,
            from
        );

        self.ctx.push(MsgContext {
            from,
            tag: env.tag(),
            handler: env.handler(),
        });
        self.epochs.push(epoch);
        let mut reader = BitReader::new(&buffer);
        let result = (record.dispatch)(self, &mut reader);
        self.epochs.pop();
        self.ctx.pop();
        if result.is_err() {
            self.fatal(&format!(
                "message for '{}' failed to decode",
                record.trace_name
            ));
        }

        if !env.is_system() {
            let effects = self.term.consume(epoch, from, ds_engaging);
            self.run_term_effects(effects);
        }
    }

    // System handler bodies

    pub(crate) fn sys_on_wave(&mut self, msg: WaveMsg) {
        let children = self.groups.world_children_from(0);
        let parent = self.msg_from();
        let effects = self.term.on_wave(msg.epoch, msg.wave, &children, parent);
        self.run_term_effects(effects);
    }

    pub(crate) fn sys_on_wave_ack(&mut self, msg: WaveAckMsg) {
        let parent = if self.node == 0 {
            None
        } else {
            self.groups.world_parent()
        };
        let effects = self.term.on_wave_ack(
            msg.epoch,
            msg.wave,
            msg.produced,
            msg.consumed,
            msg.finished,
            parent,
        );
        self.run_term_effects(effects);
    }

    pub(crate) fn sys_on_ds_ack(&mut self, msg: DsAckMsg) {
        let effects = self.term.on_ds_ack(msg.epoch, msg.count);
        self.run_term_effects(effects);
    }

    pub(crate) fn sys_where_is(&mut self, msg: WhereIsMsg) {
        if self.collections.is_destroyed(msg.universe as u32) {
            warn!(
                "node {}: where-is for destroyed universe {}",
                self.node, msg.universe
            );
            return;
        }
        let located = self.location_mut(msg.universe).where_is(msg.entity);
        match located {
            Ok(node) => {
                self.send_location_info(msg.asker, msg.universe, msg.entity, node);
            }
            Err(_) => {
                // not registered yet (insertion or migration in flight):
                // answer once it shows up
                self.location_mut(msg.universe).park_query(msg.entity, msg.asker);
            }
        }
    }

    pub(crate) fn sys_location_info(&mut self, msg: LocationInfoMsg) {
        let node = msg.node;
        let my_node = self.node;
        let (lookups, pending) = {
            let loc = self.location_mut(msg.universe);
            let lookups = loc.on_inform(msg.entity, node);
            let pending = if node != my_node {
                loc.take_pending(msg.entity)
            } else {
                // the entity is headed here; its arrival drains the queue
                VecDeque::new()
            };
            (lookups, pending)
        };
        for (cb, n) in lookups {
            self.scheduler
                .enqueue(Priority::default(), Task::Run(Box::new(move |rt| cb(rt, n))));
        }
        for route in pending {
            self.repost_buffered(node, route);
        }
    }

    pub(crate) fn sys_entity_moved(&mut self, msg: EntityMovedMsg) {
        let my_node = self.node;
        let (askers, pending) = {
            let loc = self.location_mut(msg.universe);
            loc.entity_migrated(msg.entity, msg.node);
            let askers = loc.release_queries(msg.entity);
            let pending = if msg.node != my_node {
                loc.take_pending(msg.entity)
            } else {
                VecDeque::new()
            };
            (askers, pending)
        };
        for asker in askers {
            self.send_location_info(asker, msg.universe, msg.entity, msg.node);
        }
        for route in pending {
            self.repost_buffered(msg.node, route);
        }
    }

    pub(crate) fn sys_data_ctrl(&mut self, msg: DataCtrlMsg) {
        let from = self.msg_from();
        self.messenger
            .data
            .expect_user(from, msg.tag, msg.len, msg.fragments)
            .unwrap_or_else(|e| self.fatal(&e.to_string()));
    }

    pub(crate) fn sys_pipe(&mut self, msg: PipeMsg) {
        let pipe = PipeId::from_bits(msg.pipe);
        if pipe.node() != self.node {
            self.fatal("pipe callback routed to the wrong node");
        }
        let from = self.msg_from();
        self.invoke_pipe(pipe, from, &msg.value);
    }

    pub(crate) fn sys_group_setup(&mut self, msg: GroupSetupMsg) {
        let effects = self.groups.install(msg.group, msg.members, msg.ack_to);
        self.run_group_effects(effects);
    }

    pub(crate) fn sys_group_ack(&mut self, msg: GroupSetupAckMsg) {
        let effects = self.groups.ack(msg.group);
        self.run_group_effects(effects);
    }

    pub(crate) fn sys_group_ready(&mut self, msg: GroupReadyMsg) {
        let effects = self.groups.ready(msg.group);
        self.run_group_effects(effects);
    }

    pub(crate) fn sys_group_destroy(&mut self, msg: GroupDestroyMsg) {
        match self.groups.destroy(msg.group) {
            Ok(children) => {
                let handler = self.sys_id::<GroupDestroyMsg>();
                for child in children {
                    self.post_user(child, handler, GroupDestroyMsg { group: msg.group }.to_bytes());
                }
            }
            Err(e) => debug!("node {}: group destroy: {}", self.node, e),
        }
    }

    pub(crate) fn sys_group_coordinate(&mut self, msg: GroupCoordinateMsg) {
        let group = GroupId::from_bits(msg.group_bits);
        let effects = self.groups.coordinate_collective(group, msg.members);
        self.run_group_effects(effects);
    }

    pub(crate) fn sys_reduce_up(&mut self, msg: ReduceUpMsg) {
        let key = (msg.scope, msg.tag, msg.seq);
        let edges = self.scope_edges(msg.scope);
        let local_expected = self.local_expected_for(msg.scope);
        let combine = self
            .protocol
            .reduce_ops
            .combine(msg.op)
            .unwrap_or_else(|| self.fatal("unknown reduce operator id"));
        let effects = self
            .reduces
            .on_up(key, msg.op, edges, local_expected, msg.value, msg.cb, &*combine)
            .unwrap_or_else(|_| self.fatal("reduce value failed to decode"));
        self.run_reduce_effects(effects);
    }

    pub(crate) fn sys_collection_members(&mut self, msg: CollectionMembersMsg) {
        let Some(meta) = self.collections.meta_mut(msg.proxy) else {
            return;
        };
        meta.members = msg
            .counts
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(node, _)| node as Node)
            .collect();
        meta.total = msg.counts.iter().sum();
        meta.members_ready = true;
    }

    pub(crate) fn sys_collection_destroy(&mut self, msg: system::CollectionDestroyMsg) {
        self.collections.destroy(msg.proxy);
        self.locations.remove(&(msg.proxy as UniverseId));
        self.collection_rounds.remove(&msg.proxy);
        info!("node {}: collection {} destroyed", self.node, msg.proxy);
    }

    /// Sequence for the open collection-reduce round, minted when a node's
    /// first element contributes and shared by its remaining ones.
    pub(crate) fn collection_reduce_seq(&mut self, proxy: u32, live: u64) -> u64 {
        if let Some((seq, remaining)) = self.collection_rounds.get_mut(&proxy) {
            if *remaining > 0 {
                *remaining -= 1;
                return *seq;
            }
        }
        let seq = self.reduces.next_seq(ReduceScope::Collection(proxy), 0);
        self.collection_rounds.insert(proxy, (seq, live.saturating_sub(1)));
        seq
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("node", &self.node)
            .field("num_nodes", &self.num_nodes)
            .field("queued", &self.scheduler.len())
            .field("terminated", &self.terminated_flag)
            .finish()
    }
}
