//! A collective group of the odd-ranked nodes; each member contributes 1
//! and the group root prints the member count.

use weft::{ActiveHandler, PlusOp, Protocol, Runtime};
use weft_demos::{run_world, world_size};

struct PrintCount;

impl ActiveHandler for PrintCount {
    type Msg = i64;

    fn handle(rt: &mut Runtime, count: i64) {
        println!("{}: group reduction complete, members = {}", rt.node(), count);
        rt.broadcast_msg::<Finish>((), true);
    }
}

struct Finish;

impl ActiveHandler for Finish {
    type Msg = ();

    fn handle(rt: &mut Runtime, _msg: ()) {
        log::debug!("node {}: group demo finished", rt.node());
    }
}

fn protocol() -> Protocol {
    let mut protocol = Protocol::builder();
    protocol
        .add_handler::<PrintCount>()
        .add_handler::<Finish>()
        .add_reduce_op::<PlusOp<i64>>();
    protocol
}

fn main() {
    let num_nodes = world_size(4);
    if num_nodes < 2 {
        eprintln!("requires at least 2 nodes");
        return;
    }
    run_world(num_nodes, protocol, |mut rt| {
        let odd = rt.node() % 2 == 1;
        rt.new_group_collective(odd, |rt, group| {
            println!("{}: group {:?} is wired up", rt.node(), group);
            // node 1 is the lowest member, so it is the group root
            let cb = rt.make_send_callback::<PrintCount>(1);
            rt.group_reduce::<PlusOp<i64>>(group, 0, 1, Some(cb))
                .expect("group is live");
        });
        rt.run_until_terminated();
        rt.finalize();
    });
}
