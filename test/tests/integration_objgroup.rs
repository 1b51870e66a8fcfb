//! Object groups: per-node singletons addressed through member handlers.

use weft::{ObjGroupHandler, Protocol, Runtime};
use weft_test::helpers::{record, run_world, take_events};

struct Counter {
    total: i64,
}

struct Add;

impl ObjGroupHandler<Counter> for Add {
    type Msg = i64;

    fn handle(obj: &mut Counter, rt: &mut Runtime, amount: i64) {
        obj.total += amount;
        record(format!("add {} on {}", amount, rt.node()));
    }
}

fn protocol() -> Protocol {
    let mut protocol = Protocol::builder();
    protocol.add_obj_handler::<Counter, Add>();
    protocol
}

#[test]
fn obj_group_send_targets_one_instance() {
    let results = run_world(3, protocol, |mut rt| {
        let proxy = rt.make_obj_group(Counter { total: 0 });
        rt.run_in_epoch_collective(|rt| {
            if rt.node() == 0 {
                proxy.send::<Add>(rt, 2, 5);
                proxy.send::<Add>(rt, 2, 7);
            }
        });
        let total = rt.obj_local(proxy).total;
        rt.run_until_terminated();
        let events = take_events();
        rt.finalize();
        (total, events)
    });

    assert_eq!(results[2].0, 12);
    assert_eq!(results[0].0, 0);
    assert_eq!(results[2].1.len(), 2);
}

#[test]
fn obj_group_broadcast_reaches_every_instance() {
    let results = run_world(4, protocol, |mut rt| {
        let proxy = rt.make_obj_group(Counter { total: 0 });
        rt.run_in_epoch_collective(|rt| {
            if rt.node() == 1 {
                proxy.broadcast::<Add>(rt, 3);
            }
        });
        let total = rt.obj_local(proxy).total;
        rt.run_until_terminated();
        let events = take_events();
        rt.finalize();
        (total, events)
    });

    for (node, (total, events)) in results.iter().enumerate() {
        assert_eq!(*total, 3, "node {}", node);
        assert_eq!(events.len(), 1);
    }
}
