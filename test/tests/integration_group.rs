//! Collective groups: wiring, filtered membership, group broadcast
//! coverage, and group reductions.

use weft::{ActiveHandler, GroupId, PlusOp, Protocol, Runtime};
use weft_test::helpers::{has_event, record, run_world, take_events};

struct GroupSum;

impl ActiveHandler for GroupSum {
    type Msg = i64;

    fn handle(rt: &mut Runtime, sum: i64) {
        record(format!("gsum {}", sum));
        rt.broadcast_msg::<Done>((), true);
    }
}

struct Ping;

impl ActiveHandler for Ping {
    type Msg = ();

    fn handle(rt: &mut Runtime, _msg: ()) {
        record(format!("ping on {}", rt.node()));
    }
}

struct Done;

impl ActiveHandler for Done {
    type Msg = ();

    fn handle(_rt: &mut Runtime, _msg: ()) {
        record("done");
    }
}

fn protocol() -> Protocol {
    let mut protocol = Protocol::builder();
    protocol
        .add_handler::<GroupSum>()
        .add_handler::<Ping>()
        .add_handler::<Done>()
        .add_reduce_op::<PlusOp<i64>>();
    protocol
}

#[test]
fn odd_filter_group_reduces_to_its_root() {
    let n = 6u16;
    let results = run_world(n, protocol, |mut rt| {
        let odd = rt.node() % 2 == 1;
        rt.new_group_collective(odd, |rt, group| {
            record("wired");
            // every member contributes 1; the lowest member (node 1) is
            // the group root, and the callback forwards the sum there
            let cb = rt.make_send_callback::<GroupSum>(1);
            rt.group_reduce::<PlusOp<i64>>(group, 0, 1, Some(cb)).unwrap();
        });
        rt.run_scheduler_while(|_| !has_event("done"));
        rt.run_until_terminated();
        let events = take_events();
        rt.finalize();
        events
    });

    // the callback fired on every member, no non-member
    for (node, events) in results.iter().enumerate() {
        let wired = events.iter().filter(|e| *e == "wired").count();
        assert_eq!(wired, usize::from(node % 2 == 1), "node {}", node);
    }
    assert!(results[1].contains(&format!("gsum {}", i64::from(n / 2))));
}

#[test]
fn group_broadcast_covers_exactly_the_members() {
    let n = 6u16;
    let results = run_world(n, protocol, |mut rt| {
        let odd = rt.node() % 2 == 1;
        let group = rt.new_group_collective(odd, |rt, _| {
            record("wired");
            if rt.node() == 1 {
                rt.broadcast_msg::<Done>((), true);
            }
        });
        // the known root announces once the group is wired
        rt.run_scheduler_while(|_| !has_event("done"));
        rt.run_in_epoch_collective(|rt| {
            if rt.node() == 1 {
                rt.group_broadcast::<Ping>(group, (), true).unwrap();
            }
        });
        rt.run_until_terminated();
        let events = take_events();
        rt.finalize();
        events
    });

    for (node, events) in results.iter().enumerate() {
        let pings = events.iter().filter(|e| e.starts_with("ping")).count();
        assert_eq!(pings, usize::from(node % 2 == 1), "node {}", node);
    }
}

#[test]
fn rooted_group_fires_its_callback_on_the_creator() {
    let results = run_world(4, protocol, |mut rt| {
        if rt.node() == 0 {
            // node 0 creates a group it does not belong to
            let region = weft::Region::Range { lo: 1, hi: 4 };
            rt.new_group(region, false, |rt, group| {
                record("created");
                rt.group_broadcast::<Ping>(group, (), false).unwrap();
            });
            rt.run_scheduler_while(|_| !has_event("created"));
        }
        rt.run_until_terminated();
        let events = take_events();
        rt.finalize();
        events
    });

    assert_eq!(
        results[0].iter().filter(|e| *e == "created").count(),
        1
    );
    for node in 1..4 {
        assert!(results[node].contains(&format!("ping on {}", node)));
    }
}

#[test]
fn destroyed_groups_go_stale() {
    let results = run_world(2, protocol, |mut rt| {
        let group = rt.new_group_collective(true, |_, _| record("wired"));
        rt.run_scheduler_while(|_| !has_event("wired"));
        rt.barrier();
        if rt.node() == 0 {
            rt.destroy_group(group).unwrap();
            let stale = rt.group_broadcast::<Ping>(group, (), true);
            record(format!("stale {}", stale.is_err()));
        }
        rt.run_until_terminated();
        let events = take_events();
        rt.finalize();
        events
    });
    assert!(results[0].contains(&"stale true".to_string()));
}

#[test]
fn world_group_is_usable_immediately() {
    let results = run_world(3, protocol, |mut rt| {
        assert!(GroupId::WORLD.is_static());
        rt.run_in_epoch_collective(|rt| {
            if rt.node() == 2 {
                rt.group_broadcast::<Ping>(GroupId::WORLD, (), true).unwrap();
            }
        });
        rt.run_until_terminated();
        let events = take_events();
        rt.finalize();
        events
    });
    for (node, events) in results.iter().enumerate() {
        assert!(events.contains(&format!("ping on {}", node)));
    }
}
