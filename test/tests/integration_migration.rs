//! Element migration: state travels intact, in-flight messages are
//! observed exactly once, and the directory recovers after moves.

use weft::{
    dense_block_map, Collection, ElementHandler, Index1D, Node, Protocol, Runtime, Serde,
};
use weft_test::helpers::{record, run_world, take_events};

struct Worker {
    x: u32,
    test_val: f64,
    bumps: u32,
}

impl Serde for Worker {
    fn ser(&self, writer: &mut dyn weft::BitWrite) {
        self.x.ser(writer);
        self.test_val.ser(writer);
        self.bumps.ser(writer);
    }

    fn de(reader: &mut weft::BitReader) -> Result<Self, weft::SerdeErr> {
        Ok(Worker {
            x: u32::de(reader)?,
            test_val: f64::de(reader)?,
            bumps: u32::de(reader)?,
        })
    }

    fn bit_length(&self) -> u32 {
        32 + 64 + 32
    }
}

impl Collection for Worker {
    type Index = Index1D;

    fn construct(_rt: &mut Runtime, index: Index1D) -> Self {
        Worker {
            x: index.x(),
            test_val: f64::from(index.x()) * 29.3,
            bumps: 0,
        }
    }
}

struct MigrateNext;

impl ElementHandler<Worker> for MigrateNext {
    type Msg = ();

    fn handle(_elm: &mut Worker, rt: &mut Runtime, _msg: ()) {
        let next = (rt.node() + 1) % rt.num_nodes();
        rt.migrate_current(next);
    }
}

struct CheckVal;

impl ElementHandler<Worker> for CheckVal {
    type Msg = ();

    fn handle(elm: &mut Worker, rt: &mut Runtime, _msg: ()) {
        record(format!(
            "val {} {} on {}",
            elm.x,
            elm.test_val,
            rt.node()
        ));
    }
}

struct Bump;

impl ElementHandler<Worker> for Bump {
    type Msg = u32;

    fn handle(elm: &mut Worker, rt: &mut Runtime, stamp: u32) {
        elm.bumps += 1;
        record(format!("bump {} on {}", stamp, rt.node()));
    }
}

struct ReportBumps;

impl ElementHandler<Worker> for ReportBumps {
    type Msg = ();

    fn handle(elm: &mut Worker, rt: &mut Runtime, _msg: ()) {
        record(format!("bumps {} on {}", elm.bumps, rt.node()));
    }
}

fn protocol() -> Protocol {
    let mut protocol = Protocol::builder();
    protocol
        .add_collection::<Worker>()
        .add_element_handler::<Worker, MigrateNext>()
        .add_element_handler::<Worker, CheckVal>()
        .add_element_handler::<Worker, Bump>()
        .add_element_handler::<Worker, ReportBumps>();
    protocol
}

#[test]
fn migration_preserves_element_state() {
    let n: Node = 4;
    let m = 16u32;
    let results = run_world(n, protocol, |mut rt| {
        let proxy = rt.make_collection::<Worker>(Index1D(16), dense_block_map::<Index1D>);
        rt.run_in_epoch_collective(|rt| {
            if rt.node() == 0 {
                proxy.broadcast::<CheckVal>(rt, ());
            }
        });
        rt.run_in_epoch_collective(|rt| {
            if rt.node() == 0 {
                proxy.broadcast::<MigrateNext>(rt, ());
            }
        });
        rt.run_in_epoch_collective(|rt| {
            if rt.node() == 0 {
                proxy.broadcast::<CheckVal>(rt, ());
            }
        });
        rt.run_until_terminated();
        let events = take_events();
        rt.finalize();
        events
    });

    // every element reported its preserved value twice, once per phase
    for x in 0..m {
        let expected = f64::from(x) * 29.3;
        let sightings: Vec<(Node, &String)> = results
            .iter()
            .enumerate()
            .flat_map(|(node, events)| events.iter().map(move |e| (node as Node, e)))
            .filter(|(_, e)| e.starts_with(&format!("val {} {} ", x, expected)))
            .collect();
        assert_eq!(sightings.len(), 2, "element {}", x);

        // after the migration phase the element lives one node further on
        let home = (x * u32::from(n) / m) as Node;
        let migrated = (home + 1) % n;
        assert!(sightings
            .iter()
            .any(|(_, e)| e.ends_with(&format!("on {}", home))));
        assert!(sightings
            .iter()
            .any(|(_, e)| e.ends_with(&format!("on {}", migrated))));
    }
}

#[test]
fn in_flight_messages_survive_a_migration_exactly_once() {
    let n: Node = 3;
    const BUMPS: u32 = 6;
    let results = run_world(n, protocol, |mut rt| {
        let proxy = rt.make_collection::<Worker>(Index1D(3), dense_block_map::<Index1D>);
        let target = proxy.element(Index1D(0)); // homed on node 0

        // sends from node 2 race the migration requested via node 0
        rt.run_in_epoch_collective(|rt| {
            if rt.node() == 2 {
                for stamp in 0..BUMPS {
                    target.send::<Bump>(rt, stamp);
                }
            }
            if rt.node() == 0 {
                target.send::<MigrateNext>(rt, ());
            }
        });

        // the element now lives on node 1; ask it how many bumps it saw
        rt.run_in_epoch_collective(|rt| {
            if rt.node() == 2 {
                target.send::<ReportBumps>(rt, ());
            }
        });
        rt.run_until_terminated();
        let events = take_events();
        rt.finalize();
        events
    });

    let bumps: usize = results
        .iter()
        .flatten()
        .filter(|e| e.starts_with("bump "))
        .count();
    assert_eq!(bumps, BUMPS as usize, "each in-flight send observed once");

    let report: Vec<&String> = results
        .iter()
        .flatten()
        .filter(|e| e.starts_with("bumps "))
        .collect();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0], &format!("bumps {} on 1", BUMPS));
}
