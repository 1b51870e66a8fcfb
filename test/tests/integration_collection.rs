//! Collections: bulk construction, broadcast idempotence, element-wise
//! reduction, and staged insertion.

use weft::{
    dense_block_map, dense_round_robin_map, ActiveHandler, Collection, ElementHandler, Index1D,
    PlusOp, Protocol, Runtime, Serde,
};
use weft_test::helpers::{has_event, record, run_world, take_events};

struct Cell {
    x: u32,
}

impl Serde for Cell {
    fn ser(&self, writer: &mut dyn weft::BitWrite) {
        self.x.ser(writer);
    }

    fn de(reader: &mut weft::BitReader) -> Result<Self, weft::SerdeErr> {
        Ok(Cell { x: u32::de(reader)? })
    }

    fn bit_length(&self) -> u32 {
        32
    }
}

impl Collection for Cell {
    type Index = Index1D;

    fn construct(_rt: &mut Runtime, index: Index1D) -> Self {
        Cell { x: index.x() }
    }
}

struct Touch;

impl ElementHandler<Cell> for Touch {
    type Msg = ();

    fn handle(elm: &mut Cell, rt: &mut Runtime, _msg: ()) {
        record(format!("touch {} on {}", elm.x, rt.node()));
    }
}

struct DoReduce;

impl ElementHandler<Cell> for DoReduce {
    type Msg = ();

    fn handle(elm: &mut Cell, rt: &mut Runtime, _msg: ()) {
        let this = rt.current_element::<Cell>();
        let cb = rt.make_send_callback::<ColSum>(0);
        this.contribute::<PlusOp<i64>>(rt, i64::from(elm.x), Some(cb));
    }
}

struct ColSum;

impl ActiveHandler for ColSum {
    type Msg = i64;

    fn handle(rt: &mut Runtime, sum: i64) {
        record(format!("colsum {}", sum));
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
        .add_handler::<ColSum>()
        .add_handler::<Done>()
        .add_collection::<Cell>()
        .add_element_handler::<Cell, Touch>()
        .add_element_handler::<Cell, DoReduce>()
        .add_reduce_op::<PlusOp<i64>>();
    protocol
}

#[test]
fn bulk_broadcast_runs_once_per_element() {
    let n = 4u16;
    let m = 16u32;
    let results = run_world(n, protocol, |mut rt| {
        let proxy = rt.make_collection::<Cell>(Index1D(16), dense_block_map::<Index1D>);
        rt.run_in_epoch_collective(|rt| {
            if rt.node() == 0 {
                proxy.broadcast::<Touch>(rt, ());
            }
        });
        rt.run_until_terminated();
        let events = take_events();
        rt.finalize();
        events
    });

    let mut touched: Vec<u32> = results
        .iter()
        .flatten()
        .filter_map(|e| {
            e.strip_prefix("touch ")
                .and_then(|rest| rest.split(' ').next())
                .and_then(|x| x.parse().ok())
        })
        .collect();
    touched.sort_unstable();
    assert_eq!(touched, (0..m).collect::<Vec<u32>>());
    // block map: node k hosts exactly m / n elements
    for events in &results {
        assert_eq!(events.len(), (m / u32::from(n)) as usize);
    }
}

#[test]
fn element_send_crosses_nodes() {
    let results = run_world(2, protocol, |mut rt| {
        let proxy = rt.make_collection::<Cell>(Index1D(8), dense_block_map::<Index1D>);
        rt.run_in_epoch_collective(|rt| {
            if rt.node() == 0 {
                // index 6 lives on node 1 under the block map
                proxy.element(Index1D(6)).send::<Touch>(rt, ());
            }
        });
        rt.run_until_terminated();
        let events = take_events();
        rt.finalize();
        events
    });
    assert!(results[1].contains(&"touch 6 on 1".to_string()));
    assert!(results[0].is_empty());
}

#[test]
fn collection_reduce_sums_every_element() {
    let results = run_world(4, protocol, |mut rt| {
        let proxy = rt.make_collection::<Cell>(Index1D(16), dense_block_map::<Index1D>);
        rt.run_in_epoch_collective(|rt| {
            if rt.node() == 0 {
                proxy.broadcast::<DoReduce>(rt, ());
            }
        });
        rt.run_scheduler_while(|_| !has_event("done"));
        rt.run_until_terminated();
        let events = take_events();
        rt.finalize();
        events
    });
    // 0 + 1 + ... + 15
    assert!(results[0].contains(&"colsum 120".to_string()));
}

#[test]
fn staged_insert_constructs_exactly_the_inserted_set() {
    let n = 4u16;
    let results = run_world(n, protocol, |mut rt| {
        let proxy = rt.make_collection_insertable::<Cell>(Index1D(32), dense_round_robin_map::<Index1D>);
        let token = rt.begin_modification(proxy);
        if rt.node() == 0 {
            // even indices, placed round-robin
            for x in (0..32u32).step_by(2) {
                let node = ((x / 2) % u32::from(rt.num_nodes())) as u16;
                rt.insert_at(&token, Index1D(x), node);
            }
        }
        rt.finish_modification(token);

        rt.run_in_epoch_collective(|rt| {
            if rt.node() == 1 {
                proxy.broadcast::<Touch>(rt, ());
            }
        });
        rt.run_until_terminated();
        let events = take_events();
        rt.finalize();
        events
    });

    let touched: Vec<&String> = results.iter().flatten().collect();
    assert_eq!(touched.len(), 16);
    let mut xs: Vec<u32> = touched
        .iter()
        .filter_map(|e| {
            e.strip_prefix("touch ")
                .and_then(|rest| rest.split(' ').next())
                .and_then(|x| x.parse().ok())
        })
        .collect();
    xs.sort_unstable();
    assert_eq!(xs, (0..32u32).step_by(2).collect::<Vec<u32>>());
    // round-robin placement: four even indices per node
    for events in &results {
        assert_eq!(events.len(), 4);
    }
}
