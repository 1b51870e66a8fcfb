//! The runtime's own wire protocol: termination waves and acks, location
//! queries, group wiring, reductions, pipes, and data-stream control.
//!
//! These are ordinary registered handlers occupying the first handler ids
//! on every node. Most of them run under the epoch of whatever caused
//! them, so quiescence detection waits for group wiring, reductions, and
//! directory traffic to settle. Only the detector's own messages (waves,
//! acks, the terminated verdict) carry the envelope's system bit and stay
//! outside the accounting.

use weft_serde::{BitReader, BitWrite, Serde, SerdeErr};

use crate::epoch::Epoch;
use crate::group::GroupId;
use crate::handler::ActiveHandler;
use crate::pipe::CallbackKind;
use crate::reduce::ReduceScope;
use crate::runtime::protocol::Protocol;
use crate::runtime::Runtime;
use crate::types::{Node, Tag, UniverseId};

/// Reserved world-reduction tags.
pub(crate) const GROUP_GATHER_TAG: Tag = 1;
pub(crate) const COLLECTION_MEMBERS_TAG: Tag = 2;

macro_rules! serde_struct {
    ($name:ident { $($field:ident: $type:ty),+ $(,)? }) => {
        impl Serde for $name {
            fn ser(&self, writer: &mut dyn BitWrite) {
                $( self.$field.ser(writer); )+
            }

            fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
                Ok($name {
                    $( $field: <$type>::de(reader)?, )+
                })
            }

            fn bit_length(&self) -> u32 {
                0 $( + self.$field.bit_length() )+
            }
        }
    };
}

// Termination

pub(crate) struct WaveMsg {
    pub epoch: Epoch,
    pub wave: u64,
}
serde_struct!(WaveMsg { epoch: Epoch, wave: u64 });

impl ActiveHandler for WaveMsg {
    type Msg = WaveMsg;

    fn handle(rt: &mut Runtime, msg: WaveMsg) {
        rt.sys_on_wave(msg);
    }
}

pub(crate) struct WaveAckMsg {
    pub epoch: Epoch,
    pub wave: u64,
    pub produced: u64,
    pub consumed: u64,
    pub finished: bool,
}
serde_struct!(WaveAckMsg {
    epoch: Epoch,
    wave: u64,
    produced: u64,
    consumed: u64,
    finished: bool,
});

impl ActiveHandler for WaveAckMsg {
    type Msg = WaveAckMsg;

    fn handle(rt: &mut Runtime, msg: WaveAckMsg) {
        rt.sys_on_wave_ack(msg);
    }
}

pub(crate) struct DsAckMsg {
    pub epoch: Epoch,
    pub count: u64,
}
serde_struct!(DsAckMsg { epoch: Epoch, count: u64 });

impl ActiveHandler for DsAckMsg {
    type Msg = DsAckMsg;

    fn handle(rt: &mut Runtime, msg: DsAckMsg) {
        rt.sys_on_ds_ack(msg);
    }
}

pub(crate) struct EpochTerminatedMsg {
    pub epoch: Epoch,
}
serde_struct!(EpochTerminatedMsg { epoch: Epoch });

impl ActiveHandler for EpochTerminatedMsg {
    type Msg = EpochTerminatedMsg;

    fn handle(rt: &mut Runtime, msg: EpochTerminatedMsg) {
        rt.apply_terminated(msg.epoch);
    }
}

// Location directory

pub(crate) struct WhereIsMsg {
    pub universe: UniverseId,
    pub entity: u64,
    pub asker: Node,
}
serde_struct!(WhereIsMsg {
    universe: UniverseId,
    entity: u64,
    asker: Node,
});

impl ActiveHandler for WhereIsMsg {
    type Msg = WhereIsMsg;

    fn handle(rt: &mut Runtime, msg: WhereIsMsg) {
        rt.sys_where_is(msg);
    }
}

pub(crate) struct LocationInfoMsg {
    pub universe: UniverseId,
    pub entity: u64,
    pub node: Node,
}
serde_struct!(LocationInfoMsg {
    universe: UniverseId,
    entity: u64,
    node: Node,
});

impl ActiveHandler for LocationInfoMsg {
    type Msg = LocationInfoMsg;

    fn handle(rt: &mut Runtime, msg: LocationInfoMsg) {
        rt.sys_location_info(msg);
    }
}

/// Home-record update after a migration or remote insertion. Not a system
/// message: it runs under the causing epoch so the directory is current
/// before the epoch terminates.
pub(crate) struct EntityMovedMsg {
    pub universe: UniverseId,
    pub entity: u64,
    pub node: Node,
}
serde_struct!(EntityMovedMsg {
    universe: UniverseId,
    entity: u64,
    node: Node,
});

impl ActiveHandler for EntityMovedMsg {
    type Msg = EntityMovedMsg;

    fn handle(rt: &mut Runtime, msg: EntityMovedMsg) {
        rt.sys_entity_moved(msg);
    }
}

// Out-of-band data

pub(crate) struct DataCtrlMsg {
    pub tag: Tag,
    pub len: u64,
    pub fragments: u32,
}
serde_struct!(DataCtrlMsg {
    tag: Tag,
    len: u64,
    fragments: u32,
});

impl ActiveHandler for DataCtrlMsg {
    type Msg = DataCtrlMsg;

    fn handle(rt: &mut Runtime, msg: DataCtrlMsg) {
        rt.sys_data_ctrl(msg);
    }
}

// Pipes

pub(crate) struct PipeMsg {
    pub pipe: u64,
    pub value: Vec<u8>,
}
serde_struct!(PipeMsg { pipe: u64, value: Vec<u8> });

impl ActiveHandler for PipeMsg {
    type Msg = PipeMsg;

    fn handle(rt: &mut Runtime, msg: PipeMsg) {
        rt.sys_pipe(msg);
    }
}

// Groups

pub(crate) struct GroupSetupMsg {
    pub group: GroupId,
    pub members: Vec<Node>,
    pub ack_to: Node,
}
serde_struct!(GroupSetupMsg {
    group: GroupId,
    members: Vec<Node>,
    ack_to: Node,
});

impl ActiveHandler for GroupSetupMsg {
    type Msg = GroupSetupMsg;

    fn handle(rt: &mut Runtime, msg: GroupSetupMsg) {
        rt.sys_group_setup(msg);
    }
}

pub(crate) struct GroupSetupAckMsg {
    pub group: GroupId,
}
serde_struct!(GroupSetupAckMsg { group: GroupId });

impl ActiveHandler for GroupSetupAckMsg {
    type Msg = GroupSetupAckMsg;

    fn handle(rt: &mut Runtime, msg: GroupSetupAckMsg) {
        rt.sys_group_ack(msg);
    }
}

pub(crate) struct GroupReadyMsg {
    pub group: GroupId,
}
serde_struct!(GroupReadyMsg { group: GroupId });

impl ActiveHandler for GroupReadyMsg {
    type Msg = GroupReadyMsg;

    fn handle(rt: &mut Runtime, msg: GroupReadyMsg) {
        rt.sys_group_ready(msg);
    }
}

pub(crate) struct GroupDestroyMsg {
    pub group: GroupId,
}
serde_struct!(GroupDestroyMsg { group: GroupId });

impl ActiveHandler for GroupDestroyMsg {
    type Msg = GroupDestroyMsg;

    fn handle(rt: &mut Runtime, msg: GroupDestroyMsg) {
        rt.sys_group_destroy(msg);
    }
}

/// Delivered to the world-reduction root with the gathered member list of
/// a collective group under construction.
pub(crate) struct GroupCoordinateMsg {
    pub group_bits: u64,
    pub members: Vec<Node>,
}
serde_struct!(GroupCoordinateMsg {
    group_bits: u64,
    members: Vec<Node>,
});

impl ActiveHandler for GroupCoordinateMsg {
    type Msg = GroupCoordinateMsg;

    fn handle(rt: &mut Runtime, msg: GroupCoordinateMsg) {
        rt.sys_group_coordinate(msg);
    }
}

// Reductions

pub(crate) struct ReduceUpMsg {
    pub scope: ReduceScope,
    pub tag: Tag,
    pub seq: u64,
    pub op: u32,
    pub value: Option<Vec<u8>>,
    pub cb: Option<CallbackKind>,
}
serde_struct!(ReduceUpMsg {
    scope: ReduceScope,
    tag: Tag,
    seq: u64,
    op: u32,
    value: Option<Vec<u8>>,
    cb: Option<CallbackKind>,
});

impl ActiveHandler for ReduceUpMsg {
    type Msg = ReduceUpMsg;

    fn handle(rt: &mut Runtime, msg: ReduceUpMsg) {
        rt.sys_reduce_up(msg);
    }
}

// Collections

/// Broadcast by the world-reduction root after a modification bracket
/// closes: which nodes host elements, and how many in total.
pub(crate) struct CollectionMembersMsg {
    pub proxy: u32,
    pub counts: Vec<u64>,
}
serde_struct!(CollectionMembersMsg {
    proxy: u32,
    counts: Vec<u64>,
});

impl ActiveHandler for CollectionMembersMsg {
    type Msg = CollectionMembersMsg;

    fn handle(rt: &mut Runtime, msg: CollectionMembersMsg) {
        rt.sys_collection_members(msg);
    }
}

pub(crate) struct CollectionDestroyMsg {
    pub proxy: u32,
}
serde_struct!(CollectionDestroyMsg { proxy: u32 });

impl ActiveHandler for CollectionDestroyMsg {
    type Msg = CollectionDestroyMsg;

    fn handle(rt: &mut Runtime, msg: CollectionDestroyMsg) {
        rt.sys_collection_destroy(msg);
    }
}

// Internal reduce operators

/// Gathers `(group bits, member list)` pairs for collective group
/// construction.
pub(crate) struct GroupGatherOp;

impl crate::reduce::ReduceOp for GroupGatherOp {
    type Value = (u64, Vec<Node>);

    fn combine(a: (u64, Vec<Node>), b: (u64, Vec<Node>)) -> (u64, Vec<Node>) {
        debug_assert_eq!(a.0, b.0);
        let mut members = a.1;
        members.extend(b.1);
        members.sort_unstable();
        members.dedup();
        (a.0, members)
    }
}

/// Gathers per-node element counts when a modification bracket closes.
pub(crate) struct InsertGatherOp;

impl crate::reduce::ReduceOp for InsertGatherOp {
    type Value = (u32, Vec<u64>);

    fn combine(a: (u32, Vec<u64>), b: (u32, Vec<u64>)) -> (u32, Vec<u64>) {
        debug_assert_eq!(a.0, b.0);
        debug_assert_eq!(a.1.len(), b.1.len());
        let counts = a.1.iter().zip(b.1.iter()).map(|(x, y)| x + y).collect();
        (a.0, counts)
    }
}

/// Install the runtime's own handlers and operators. Runs first inside
/// `Protocol::default`, so the system protocol occupies the same dense ids
/// on every node.
pub(crate) fn register_system_handlers(protocol: &mut Protocol) {
    protocol
        .add_handler::<WaveMsg>()
        .add_handler::<WaveAckMsg>()
        .add_handler::<DsAckMsg>()
        .add_handler::<EpochTerminatedMsg>()
        .add_handler::<WhereIsMsg>()
        .add_handler::<LocationInfoMsg>()
        .add_handler::<EntityMovedMsg>()
        .add_handler::<DataCtrlMsg>()
        .add_handler::<PipeMsg>()
        .add_handler::<GroupSetupMsg>()
        .add_handler::<GroupSetupAckMsg>()
        .add_handler::<GroupReadyMsg>()
        .add_handler::<GroupDestroyMsg>()
        .add_handler::<GroupCoordinateMsg>()
        .add_handler::<ReduceUpMsg>()
        .add_handler::<CollectionMembersMsg>()
        .add_handler::<CollectionDestroyMsg>()
        .add_reduce_op::<GroupGatherOp>()
        .add_reduce_op::<InsertGatherOp>();
}
