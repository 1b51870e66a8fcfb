//! Quiescence detection: collective epochs over an arbitrary message DAG,
//! and rooted epochs under Dijkstra-Scholten.

use weft::{ActiveHandler, Protocol, Runtime, Serde};
use weft_test::helpers::{record, run_world, take_events};

struct ChainMsg {
    ttl: u32,
}

impl Serde for ChainMsg {
    fn ser(&self, writer: &mut dyn weft::BitWrite) {
        self.ttl.ser(writer);
    }

    fn de(reader: &mut weft::BitReader) -> Result<Self, weft::SerdeErr> {
        Ok(ChainMsg {
            ttl: u32::de(reader)?,
        })
    }

    fn bit_length(&self) -> u32 {
        32
    }
}

struct Chain;

impl ActiveHandler for Chain {
    type Msg = ChainMsg;

    fn handle(rt: &mut Runtime, msg: ChainMsg) {
        record(format!("chain {}", msg.ttl));
        if msg.ttl > 0 {
            let next = fastrand::u16(0..rt.num_nodes());
            rt.send_msg::<Chain>(next, ChainMsg { ttl: msg.ttl - 1 });
        }
    }
}

fn protocol() -> Protocol {
    let mut protocol = Protocol::builder();
    protocol.add_handler::<Chain>();
    protocol
}

const SEEDS: u32 = 4;
const TTL: u32 = 3;

#[test]
fn collective_epoch_terminates_after_the_whole_dag_drains() {
    let n = 4;
    let results = run_world(n, protocol, |mut rt| {
        let epoch = rt.make_epoch_collective();
        rt.add_action(epoch, |_| record("quiet"));
        rt.push_epoch(epoch);
        for _ in 0..SEEDS {
            let to = fastrand::u16(0..rt.num_nodes());
            rt.send_msg::<Chain>(to, ChainMsg { ttl: TTL });
        }
        rt.pop_epoch();
        rt.finished_epoch(epoch);
        rt.run_until_terminated();
        let events = take_events();
        rt.finalize();
        events
    });

    let mut chains = 0usize;
    for events in &results {
        // the action fired exactly once per node, after every local consume
        assert_eq!(events.iter().filter(|e| *e == "quiet").count(), 1);
        assert_eq!(events.last().unwrap(), "quiet");
        chains += events.iter().filter(|e| e.starts_with("chain")).count();
    }
    // every seed runs TTL + 1 handlers somewhere in the cluster
    assert_eq!(chains, (n as u32 * SEEDS * (TTL + 1)) as usize);
}

#[test]
fn rooted_epoch_terminates_at_the_originator_only_after_descendants() {
    let results = run_world(4, protocol, |mut rt| {
        if rt.node() == 0 {
            let epoch = rt.make_epoch_rooted();
            rt.add_action(epoch, |_| record("quiet"));
            rt.push_epoch(epoch);
            for _ in 0..SEEDS {
                let to = fastrand::u16(0..rt.num_nodes());
                rt.send_msg::<Chain>(to, ChainMsg { ttl: TTL });
            }
            rt.pop_epoch();
            rt.finished_epoch(epoch);
        }
        rt.run_until_terminated();
        let events = take_events();
        rt.finalize();
        events
    });

    // action ran once, on the originator, after its local consumes
    assert_eq!(results[0].iter().filter(|e| *e == "quiet").count(), 1);
    assert_eq!(results[0].last().unwrap(), "quiet");

    let chains: usize = results
        .iter()
        .flatten()
        .filter(|e| e.starts_with("chain"))
        .count();
    assert_eq!(chains, (SEEDS * (TTL + 1)) as usize);
}
