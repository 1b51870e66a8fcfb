//! A message circles the ring twice; each handler forwards to the next
//! rank until the hop budget runs out.

use weft::{ActiveHandler, Node, Protocol, Runtime, Serde};
use weft_demos::{run_world, world_size};

const ROUNDS: u32 = 2;

struct RingMsg {
    from: Node,
    hop: u32,
}

impl Serde for RingMsg {
    fn ser(&self, writer: &mut dyn weft::BitWrite) {
        self.from.ser(writer);
        self.hop.ser(writer);
    }

    fn de(reader: &mut weft::BitReader) -> Result<Self, weft::SerdeErr> {
        Ok(RingMsg {
            from: Node::de(reader)?,
            hop: u32::de(reader)?,
        })
    }

    fn bit_length(&self) -> u32 {
        16 + 32
    }
}

struct Ring;

impl ActiveHandler for Ring {
    type Msg = RingMsg;

    fn handle(rt: &mut Runtime, msg: RingMsg) {
        println!("{}: hello from node {} (hop {})", rt.node(), msg.from, msg.hop);
        let num_nodes = rt.num_nodes();
        if msg.hop < ROUNDS * u32::from(num_nodes) {
            let next = (rt.node() + 1) % num_nodes;
            rt.send_msg::<Ring>(
                next,
                RingMsg {
                    from: rt.node(),
                    hop: msg.hop + 1,
                },
            );
        }
    }
}

fn protocol() -> Protocol {
    let mut protocol = Protocol::builder();
    protocol.add_handler::<Ring>();
    protocol.set_handler_trace_name::<Ring>("ring_handler");
    protocol
}

fn main() {
    let num_nodes = world_size(4);
    if num_nodes < 2 {
        eprintln!("requires at least 2 nodes");
        return;
    }
    run_world(num_nodes, protocol, |mut rt| {
        if rt.node() == 0 {
            let from = rt.num_nodes() - 1;
            rt.send_msg::<Ring>(0, RingMsg { from, hop: 1 });
        }
        rt.run_until_terminated();
        rt.finalize();
    });
}
