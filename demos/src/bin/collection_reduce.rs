//! Every element of a 16-wide collection contributes its coordinate; the
//! root callback prints the sum (120).

use weft::{
    dense_block_map, ActiveHandler, Collection, ElementHandler, Index1D, PlusOp, Protocol,
    Runtime, Serde,
};
use weft_demos::{run_world, world_size};

const NUM_ELMS: u32 = 16;

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
        println!("{}: constructed element {}", rt.node(), index.x());
        Hello { x: index.x() }
    }
}

struct Contribute;

impl ElementHandler<Hello> for Contribute {
    type Msg = ();

    fn handle(elm: &mut Hello, rt: &mut Runtime, _msg: ()) {
        let this = rt.current_element::<Hello>();
        let cb = rt.make_send_callback::<PrintSum>(0);
        this.contribute::<PlusOp<i64>>(rt, i64::from(elm.x), Some(cb));
    }
}

struct PrintSum;

impl ActiveHandler for PrintSum {
    type Msg = i64;

    fn handle(rt: &mut Runtime, sum: i64) {
        println!("{}: reduction complete, sum = {}", rt.node(), sum);
    }
}

fn protocol() -> Protocol {
    let mut protocol = Protocol::builder();
    protocol
        .add_handler::<PrintSum>()
        .add_collection::<Hello>()
        .add_element_handler::<Hello, Contribute>()
        .add_reduce_op::<PlusOp<i64>>();
    protocol
}

fn main() {
    let num_nodes = world_size(4);
    run_world(num_nodes, protocol, |mut rt| {
        let proxy = rt.make_collection::<Hello>(Index1D(NUM_ELMS), dense_block_map::<Index1D>);
        rt.run_in_epoch_collective(|rt| {
            if rt.node() == 0 {
                proxy.broadcast::<Contribute>(rt, ());
            }
        });
        rt.run_until_terminated();
        rt.finalize();
    });
}
