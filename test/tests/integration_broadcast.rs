//! Broadcast coverage: one broadcast reaches every other node exactly
//! once, and the sender only when it asks to be included.

use weft::{ActiveHandler, Node, Protocol, Runtime};
use weft_test::helpers::{record, run_world, take_events};

struct Hello;

impl ActiveHandler for Hello {
    type Msg = Node;

    fn handle(rt: &mut Runtime, from: Node) {
        record(format!("{}: Hello from node {}", rt.node(), from));
    }
}

fn protocol() -> Protocol {
    let mut protocol = Protocol::builder();
    protocol.add_handler::<Hello>();
    protocol
}

fn world(n: Node, include_sender: bool) -> Vec<Vec<String>> {
    // the flag is plumbed through a sentinel handled inside `body`, so the
    // two cases share one body fn
    if include_sender {
        run_world(n, protocol, |mut rt| {
            if rt.node() == 0 {
                rt.broadcast_msg::<Hello>(0, true);
            }
            rt.run_until_terminated();
            let events = take_events();
            rt.finalize();
            events
        })
    } else {
        run_world(n, protocol, |mut rt| {
            if rt.node() == 0 {
                rt.broadcast_msg::<Hello>(0, false);
            }
            rt.run_until_terminated();
            let events = take_events();
            rt.finalize();
            events
        })
    }
}

#[test]
fn broadcast_reaches_every_other_node_exactly_once() {
    let n: Node = 6;
    let results = world(n, false);
    assert!(results[0].is_empty());
    for (node, events) in results.iter().enumerate().skip(1) {
        assert_eq!(events, &vec![format!("{}: Hello from node 0", node)]);
    }
}

#[test]
fn broadcast_includes_the_sender_on_request() {
    let n: Node = 4;
    let results = world(n, true);
    for (node, events) in results.iter().enumerate() {
        assert_eq!(events, &vec![format!("{}: Hello from node 0", node)]);
    }
}
