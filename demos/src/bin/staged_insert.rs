//! Dynamic membership: node 0 inserts the even indices of a 32-wide range
//! round-robin, then a broadcast counts exactly the inserted elements.

use weft::{
    dense_round_robin_map, Collection, ElementHandler, Index1D, Protocol, Runtime, Serde,
};
use weft_demos::{run_world, world_size};

const NUM_ELMS: u32 = 32;

struct Hello {
    x: u32,
}

impl Serde for Hello {
    fn ser(&self, writer: &mut dyn weft::BitWrite) {
        self.x.ser(writer);
    }

    fn de(reader: &mut weft::BitReader) -> Result<Self, weft::SerdeErr> {
        Ok(Hello { x: u32::de(reader)? })
    }

    fn bit_length(&self) -> u32 {
        32
    }
}

impl Collection for Hello {
    type Index = Index1D;

    fn construct(rt: &mut Runtime, index: Index1D) -> Self {
        println!("{}: inserted element {}", rt.node(), index.x());
        Hello { x: index.x() }
    }
}

struct Greet;

impl ElementHandler<Hello> for Greet {
    type Msg = ();

    fn handle(elm: &mut Hello, rt: &mut Runtime, _msg: ()) {
        println!("{}: hello from element {}", rt.node(), elm.x);
    }
}

fn protocol() -> Protocol {
    let mut protocol = Protocol::builder();
    protocol
        .add_collection::<Hello>()
        .add_element_handler::<Hello, Greet>();
    protocol
}

fn main() {
    let num_nodes = world_size(4);
    run_world(num_nodes, protocol, |mut rt| {
        let proxy =
            rt.make_collection_insertable::<Hello>(Index1D(NUM_ELMS), dense_round_robin_map::<Index1D>);

        let token = rt.begin_modification(proxy);
        if rt.node() == 0 {
            for x in (0..NUM_ELMS).step_by(2) {
                let node = ((x / 2) % u32::from(rt.num_nodes())) as u16;
                rt.insert_at(&token, Index1D(x), node);
            }
        }
        rt.finish_modification(token);

        rt.run_in_epoch_collective(|rt| {
            if rt.node() == 0 {
                proxy.broadcast::<Greet>(rt, ());
            }
        });
        rt.run_until_terminated();
        rt.finalize();
    });
}
