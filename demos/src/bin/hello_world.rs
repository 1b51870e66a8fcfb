//! Node 0 broadcasts a greeting; every other node prints it.

use weft::{ActiveHandler, Node, Protocol, Runtime};
use weft_demos::{run_world, world_size};

struct HelloMsg;

impl ActiveHandler for HelloMsg {
    type Msg = Node;

    fn handle(rt: &mut Runtime, from: Node) {
        println!("{}: Hello from node {}", rt.node(), from);
    }
}

fn protocol() -> Protocol {
    let mut protocol = Protocol::builder();
    protocol.add_handler::<HelloMsg>();
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
            rt.broadcast_msg::<HelloMsg>(rt.node(), false);
        }
        rt.run_until_terminated();
        rt.finalize();
    });
}
