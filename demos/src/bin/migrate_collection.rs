//! Three bracketed phases: work, migrate every element one rank over,
//! work again. The second pass sees each element's preserved value.

use weft::{
    dense_block_map, Collection, ElementHandler, Index1D, Protocol, Runtime, Serde,
};
use weft_demos::{run_world, world_size};

const NUM_ELMS: u32 = 16;

struct Hello {
    x: u32,
    test_val: f64,
}

impl Serde for Hello {
    fn ser(&self, writer: &mut dyn weft::BitWrite) {
        self.x.ser(writer);
        self.test_val.ser(writer);
    }

    fn de(reader: &mut weft::BitReader) -> Result<Self, weft::SerdeErr> {
        Ok(Hello {
            x: u32::de(reader)?,
            test_val: f64::de(reader)?,
        })
    }

    fn bit_length(&self) -> u32 {
        32 + 64
    }
}

impl Collection for Hello {
    type Index = Index1D;

    fn construct(rt: &mut Runtime, index: Index1D) -> Self {
        println!("{}: Hello: index={}", rt.node(), index.x());
        Hello {
            x: index.x(),
            test_val: f64::from(index.x()) * 29.3,
        }
    }
}

struct DoWork;

impl ElementHandler<Hello> for DoWork {
    type Msg = ();

    fn handle(elm: &mut Hello, rt: &mut Runtime, _msg: ()) {
        println!("{}: idx={}: val={}", rt.node(), elm.x, elm.test_val);
    }
}

struct MigrateToNext;

impl ElementHandler<Hello> for MigrateToNext {
    type Msg = ();

    fn handle(elm: &mut Hello, rt: &mut Runtime, _msg: ()) {
        let next = (rt.node() + 1) % rt.num_nodes();
        println!("{}: migrateToNext: idx={}", rt.node(), elm.x);
        rt.migrate_current(next);
    }
}

fn protocol() -> Protocol {
    let mut protocol = Protocol::builder();
    protocol
        .add_collection::<Hello>()
        .add_element_handler::<Hello, DoWork>()
        .add_element_handler::<Hello, MigrateToNext>();
    protocol
}

fn main() {
    let num_nodes = world_size(4);
    if num_nodes < 2 {
        eprintln!("requires at least 2 nodes");
        return;
    }
    run_world(num_nodes, protocol, |mut rt| {
        let proxy = rt.make_collection::<Hello>(Index1D(NUM_ELMS), dense_block_map::<Index1D>);

        rt.run_in_epoch_collective(|rt| {
            if rt.node() == 0 {
                proxy.broadcast::<DoWork>(rt, ());
            }
        });
        rt.run_in_epoch_collective(|rt| {
            if rt.node() == 0 {
                proxy.broadcast::<MigrateToNext>(rt, ());
            }
        });
        rt.run_in_epoch_collective(|rt| {
            if rt.node() == 0 {
                proxy.broadcast::<DoWork>(rt, ());
            }
        });

        rt.run_until_terminated();
        rt.finalize();
    });
}
