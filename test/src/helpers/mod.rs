use std::cell::RefCell;
use std::thread;

use weft::{LocalNetwork, Node, Protocol, Runtime, RuntimeConfig};

/// Run `body` on `num_nodes` in-process nodes, one thread each. Returns
/// each node's result, indexed by rank.
///
/// `body` owns its node's runtime; it normally drives the scheduler and
/// ends with [`Runtime::finalize`], whose barrier keeps every transport
/// endpoint alive until the whole world is done sending.
pub fn run_world<R: Send + 'static>(
    num_nodes: Node,
    make_protocol: fn() -> Protocol,
    body: fn(Runtime) -> R,
) -> Vec<R> {
    run_world_with_config(num_nodes, RuntimeConfig::default(), make_protocol, body)
}

pub fn run_world_with_config<R: Send + 'static>(
    num_nodes: Node,
    config: RuntimeConfig,
    make_protocol: fn() -> Protocol,
    body: fn(Runtime) -> R,
) -> Vec<R> {
    let mut handles = Vec::new();
    for transport in LocalNetwork::new(num_nodes) {
        let config = config.clone();
        handles.push(thread::spawn(move || {
            let rt = Runtime::new(config, make_protocol(), Box::new(transport));
            body(rt)
        }));
    }
    handles
        .into_iter()
        .map(|handle| handle.join().expect("node thread panicked"))
        .collect()
}

thread_local! {
    static EVENTS: RefCell<Vec<String>> = RefCell::new(Vec::new());
}

/// Append to this node's (thread's) event log.
pub fn record(event: impl Into<String>) {
    EVENTS.with(|events| events.borrow_mut().push(event.into()));
}

/// Drain this node's event log.
pub fn take_events() -> Vec<String> {
    EVENTS.with(|events| events.borrow_mut().drain(..).collect())
}

/// Whether this node recorded `event` (without draining).
pub fn has_event(event: &str) -> bool {
    EVENTS.with(|events| events.borrow().iter().any(|e| e == event))
}

/// Number of events recorded so far on this node.
pub fn event_count() -> usize {
    EVENTS.with(|events| events.borrow().len())
}

/// How many times this node recorded `event`.
pub fn count_events(event: &str) -> usize {
    EVENTS.with(|events| events.borrow().iter().filter(|e| *e == event).count())
}
