//! Shared scaffolding for the demo binaries: an in-process world where
//! every node is a thread, sized by `WEFT_NODES` (default 4).

use weft::{LocalNetwork, Node, Protocol, Runtime, RuntimeConfig};

pub fn world_size(default: Node) -> Node {
    std::env::var("WEFT_NODES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Run `body` on every node of an in-process world.
pub fn run_world(num_nodes: Node, make_protocol: fn() -> Protocol, body: fn(Runtime)) {
    env_logger::init();
    let mut handles = Vec::new();
    for transport in LocalNetwork::new(num_nodes) {
        handles.push(std::thread::spawn(move || {
            let rt = Runtime::new(RuntimeConfig::default(), make_protocol(), Box::new(transport));
            body(rt);
        }));
    }
    for handle in handles {
        handle.join().expect("node panicked");
    }
}
