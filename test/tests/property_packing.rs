//! Packed-identifier properties: every field written into an envelope,
//! epoch, or handler id reads back unchanged, and bits outside a field are
//! untouched.

use proptest::prelude::*;

use weft::{
    Envelope, Epoch, GroupId, HandlerId, HandlerKind, Priority, Serde,
};

fn handler_strategy() -> impl Strategy<Value = HandlerId> {
    (any::<bool>(), 0u32..(1 << 21), any::<u8>()).prop_map(|(obj_group, id, obj)| {
        if obj_group {
            HandlerId::new(HandlerKind::ObjGroup, id, obj)
        } else {
            HandlerId::new(HandlerKind::Auto, id, 0)
        }
    })
}

proptest! {
    #[test]
    fn epoch_packing_bijection(
        rooted in any::<bool>(),
        node in 0u16..u16::MAX,
        scope in 0u8..16,
        seq in 0u64..(1u64 << 40),
    ) {
        let epoch = if rooted {
            Epoch::make_rooted(node, scope, seq)
        } else {
            Epoch::make_collective(scope, seq)
        };
        prop_assert_eq!(epoch.is_rooted(), rooted);
        prop_assert_eq!(epoch.scope(), scope);
        prop_assert_eq!(epoch.seq(), seq);
        if rooted {
            prop_assert_eq!(epoch.node(), node);
        }
        // full-bit equality and wire round-trip
        prop_assert_eq!(Epoch::from_bits(epoch.bits()), epoch);
        prop_assert_eq!(Epoch::from_bytes(&epoch.to_bytes()).unwrap(), epoch);
    }

    #[test]
    fn handler_id_packing_bijection(handler in handler_strategy()) {
        let back = HandlerId::from_bits(handler.bits());
        prop_assert_eq!(back, handler);
        prop_assert_eq!(back.id(), handler.id());
        prop_assert_eq!(back.obj(), handler.obj());
        prop_assert_eq!(back.is_auto(), handler.is_auto());
        prop_assert_eq!(back.is_obj_group(), handler.is_obj_group());
    }

    #[test]
    fn envelope_optional_fields_round_trip(
        handler in handler_strategy(),
        dest in 0u16..512,
        has_epoch in any::<bool>(),
        has_tag in any::<bool>(),
        has_group in any::<bool>(),
        is_put in any::<bool>(),
        epoch_seq in 0u64..(1u64 << 40),
        tag in any::<u32>(),
        put_len in any::<u32>(),
    ) {
        let mut env = Envelope::new(dest, handler);
        if has_epoch {
            env.set_epoch(Epoch::make_collective(0, epoch_seq));
        }
        if has_tag {
            env.set_tag(tag);
        }
        if has_group {
            env.set_group(GroupId::WORLD);
        }
        if is_put {
            env.set_put(9, u64::from(put_len), 3);
        }

        // each getter returns what was set, unset fields stay None
        prop_assert_eq!(env.epoch().is_some(), has_epoch);
        prop_assert_eq!(env.tag(), has_tag.then_some(tag));
        prop_assert_eq!(env.group(), has_group.then_some(GroupId::WORLD));
        prop_assert_eq!(env.put_tag(), is_put.then_some(9));
        prop_assert_eq!(env.dest(), dest);
        prop_assert_eq!(env.handler(), handler);
        prop_assert_eq!(env.priority(), Priority::default());

        // deterministic wire layout for this flag combination
        let back = Envelope::from_bytes(&env.to_bytes()).unwrap();
        prop_assert_eq!(back, env);
    }

    #[test]
    fn envelope_setters_leave_other_bits_alone(
        handler in handler_strategy(),
        tag in any::<u32>(),
        seq in 0u64..(1u64 << 40),
    ) {
        let mut env = Envelope::new(3, handler);
        env.set_epoch(Epoch::make_collective(0, seq));
        let flags_before = env.flags();
        env.set_tag(tag);
        // the tag setter adds exactly its own flag bit
        prop_assert_eq!(env.flags() & flags_before, flags_before);
        prop_assert_eq!(env.epoch(), Some(Epoch::make_collective(0, seq)));
    }
}
