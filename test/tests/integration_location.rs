//! The location directory as seen through `get_location`: resolution of
//! resident, remote, and migrated elements.

use weft::{
    dense_block_map, Collection, ElementHandler, Index1D, Protocol, Runtime, Serde,
};
use weft_test::helpers::{has_event, record, run_world, take_events};

struct Mover {
    x: u32,
}

impl Serde for Mover {
    fn ser(&self, writer: &mut dyn weft::BitWrite) {
        self.x.ser(writer);
    }

    fn de(reader: &mut weft::BitReader) -> Result<Self, weft::SerdeErr> {
        Ok(Mover { x: u32::de(reader)? })
    }

    fn bit_length(&self) -> u32 {
        32
    }
}

impl Collection for Mover {
    type Index = Index1D;

    fn construct(_rt: &mut Runtime, index: Index1D) -> Self {
        Mover { x: index.x() }
    }
}

struct Hop;

impl ElementHandler<Mover> for Hop {
    type Msg = u16;

    fn handle(_elm: &mut Mover, rt: &mut Runtime, dest: u16) {
        rt.migrate_current(dest);
    }
}

fn protocol() -> Protocol {
    let mut protocol = Protocol::builder();
    protocol
        .add_collection::<Mover>()
        .add_element_handler::<Mover, Hop>();
    protocol
}

#[test]
fn get_location_resolves_home_and_migrated_elements() {
    let results = run_world(3, protocol, |mut rt| {
        let proxy = rt.make_collection::<Mover>(Index1D(3), dense_block_map::<Index1D>);

        // resident element resolves synchronously to this node
        if rt.node() == 1 {
            proxy
                .element(Index1D(1))
                .get_location(&mut rt, |rt, node| {
                    record(format!("resident at {} (self {})", node, rt.node()));
                });
        }

        // move element 0 from node 0 to node 2
        rt.run_in_epoch_collective(|rt| {
            if rt.node() == 0 {
                proxy.element(Index1D(0)).send::<Hop>(rt, 2);
            }
        });

        // a third party asks the home where it went
        if rt.node() == 1 {
            proxy
                .element(Index1D(0))
                .get_location(&mut rt, |_rt, node| {
                    record(format!("migrated to {}", node));
                });
            rt.run_scheduler_while(|_| !has_event("migrated to 2"));
        }
        rt.run_until_terminated();
        let events = take_events();
        rt.finalize();
        events
    });

    assert!(results[1].contains(&"resident at 1 (self 1)".to_string()));
    assert!(results[1].contains(&"migrated to 2".to_string()));
}
