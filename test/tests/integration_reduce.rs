//! World reductions: value correctness, overlapping sequences, and
//! callback endpoints.

use weft::{ActiveHandler, GroupId, PlusOp, Protocol, Runtime};
use weft_test::helpers::{count_events, has_event, record, run_world, take_events};

struct RootSum;

impl ActiveHandler for RootSum {
    type Msg = i64;

    fn handle(rt: &mut Runtime, sum: i64) {
        record(format!("sum {}", sum));
        rt.broadcast_msg::<Done>((), true);
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
        .add_handler::<RootSum>()
        .add_handler::<Done>()
        .add_reduce_op::<PlusOp<i64>>();
    protocol
}

#[test]
fn world_reduce_sums_every_contribution() {
    let n = 6u16;
    let results = run_world(n, protocol, |mut rt| {
        let cb = rt.make_send_callback::<RootSum>(0);
        rt.group_reduce::<PlusOp<i64>>(GroupId::WORLD, 0, i64::from(rt.node()), Some(cb))
            .unwrap();
        rt.run_scheduler_while(|_| !has_event("done"));
        rt.run_until_terminated();
        let events = take_events();
        rt.finalize();
        events
    });

    let expected = i64::from(n) * i64::from(n - 1) / 2;
    assert!(results[0].contains(&format!("sum {}", expected)));
    for events in &results {
        assert!(events.contains(&"done".to_string()));
    }
}

#[test]
fn overlapping_reductions_stay_separate() {
    let results = run_world(4, protocol, |mut rt| {
        let cb = rt.make_send_callback::<RootSum>(0);
        // two back-to-back reductions on the same (group, tag) pair
        rt.group_reduce::<PlusOp<i64>>(GroupId::WORLD, 5, 1, Some(cb.clone()))
            .unwrap();
        rt.group_reduce::<PlusOp<i64>>(GroupId::WORLD, 5, 10, Some(cb))
            .unwrap();
        // every node sees one done broadcast per completed reduction
        rt.run_scheduler_while(|_| count_events("done") < 2);
        rt.run_until_terminated();
        let events = take_events();
        rt.finalize();
        events
    });
    assert!(results[0].contains(&"sum 4".to_string()));
    assert!(results[0].contains(&"sum 40".to_string()));
}

#[test]
fn anonymous_callback_fires_on_its_owning_node() {
    let results = run_world(3, protocol, |mut rt| {
        let cb = if rt.node() == 2 {
            // only node 2 supplies the continuation; the reduction carries
            // it to the root
            Some(rt.make_func_callback::<i64>(false, |rt, sum| {
                record(format!("anon {}", sum));
                rt.broadcast_msg::<Done>((), true);
            }))
        } else {
            None
        };
        rt.group_reduce::<PlusOp<i64>>(GroupId::WORLD, 0, 1, cb).unwrap();
        rt.run_scheduler_while(|_| !has_event("done"));
        rt.run_until_terminated();
        let events = take_events();
        rt.finalize();
        events
    });
    // the closure ran on node 2, its registrar, with the full sum
    assert!(results[2].contains(&"anon 3".to_string()));
    assert!(!results[0].iter().any(|e| e.starts_with("anon")));
}
