//! Epoch termination detection.
//!
//! Two algorithms coexist, chosen by the epoch id's bits: collective epochs
//! run the 4-counter wave over the world spanning tree, rooted epochs run
//! Dijkstra-Scholten from their originating node. Either way, the deciding
//! node broadcasts the verdict and every node fires the actions it
//! registered for the epoch, in FIFO order, exactly once.
//!
//! The detector itself is a state machine: the runtime feeds it message
//! events and executes the effects it returns. System messages (the waves
//! and acks themselves) are exempt from the accounting.

mod dijkstra_scholten;
mod wave;

use std::collections::{HashMap, HashSet};

use log::{debug, warn};

use dijkstra_scholten::DsState;
use wave::WaveState;

use crate::epoch::Epoch;
use crate::runtime::Runtime;
use crate::types::Node;

pub(crate) type TermAction = Box<dyn FnOnce(&mut Runtime)>;

/// Side effects the runtime executes for the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TermEffect {
    WaveDown {
        to: Node,
        epoch: Epoch,
        wave: u64,
    },
    WaveUp {
        to: Node,
        epoch: Epoch,
        wave: u64,
        produced: u64,
        consumed: u64,
        finished: bool,
    },
    DsAck {
        to: Node,
        epoch: Epoch,
        count: u64,
    },
    /// This node decided the epoch is globally quiet: broadcast the verdict
    /// and apply it locally.
    Terminated {
        epoch: Epoch,
    },
}

/// Verdict on an incoming non-system message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Receive {
    Accept { ds_engaging: bool },
    /// The message carries an epoch that already terminated: a protocol
    /// violation, logged and dropped.
    DropLeak,
}

enum Algo {
    Wave(WaveState),
    Ds(DsState),
}

struct EpochState {
    finished_local: bool,
    algo: Algo,
}

impl EpochState {
    fn synthesize(epoch: Epoch, node: Node) -> Self {
        if epoch.is_rooted() {
            Self {
                finished_local: false,
                algo: Algo::Ds(DsState::new(epoch.node() == node)),
            }
        } else {
            Self {
                finished_local: epoch.is_global(),
                algo: Algo::Wave(WaveState::new()),
            }
        }
    }
}

pub(crate) struct TerminationDetector {
    node: Node,
    states: HashMap<Epoch, EpochState>,
    actions: HashMap<Epoch, Vec<TermAction>>,
    terminated: HashSet<Epoch>,
}

impl TerminationDetector {
    pub fn new(node: Node) -> Self {
        let mut states = HashMap::new();
        states.insert(
            Epoch::global(),
            EpochState::synthesize(Epoch::global(), node),
        );
        Self {
            node,
            states,
            actions: HashMap::new(),
            terminated: HashSet::new(),
        }
    }

    fn state_mut(&mut self, epoch: Epoch) -> &mut EpochState {
        let node = self.node;
        self.states
            .entry(epoch)
            .or_insert_with(|| EpochState::synthesize(epoch, node))
    }

    /// True while any non-global epoch still has live state here. The
    /// global bucket refuses to terminate before everything nested inside
    /// it has.
    fn only_global_live(&self) -> bool {
        self.states.keys().all(|epoch| epoch.is_global())
    }

    fn local_finished(&self, epoch: Epoch) -> bool {
        let finished = self
            .states
            .get(&epoch)
            .map(|s| s.finished_local)
            .unwrap_or(false);
        if epoch.is_global() {
            finished && self.only_global_live()
        } else {
            finished
        }
    }

    pub fn is_terminated(&self, epoch: Epoch) -> bool {
        self.terminated.contains(&epoch)
    }

    // Producer/consumer accounting

    /// Explicit epoch registration at creation time.
    pub fn register(&mut self, epoch: Epoch) {
        self.state_mut(epoch);
    }

    pub fn produce(&mut self, epoch: Epoch, count: u64) {
        match &mut self.state_mut(epoch).algo {
            Algo::Wave(wave) => wave.produced += count,
            Algo::Ds(ds) => ds.produce(count),
        }
    }

    pub fn on_receive(&mut self, epoch: Epoch, from: Node) -> Receive {
        if self.terminated.contains(&epoch) {
            warn!(
                "node {}: dropping message from {} on terminated {:?}",
                self.node, from, epoch
            );
            return Receive::DropLeak;
        }
        match &mut self.state_mut(epoch).algo {
            Algo::Wave(_) => Receive::Accept { ds_engaging: false },
            Algo::Ds(ds) => Receive::Accept {
                ds_engaging: ds.on_receive(from),
            },
        }
    }

    /// A handler for a message under `epoch` finished running: the unique
    /// consume site.
    pub fn consume(&mut self, epoch: Epoch, from: Node, ds_engaging: bool) -> Vec<TermEffect> {
        let node = self.node;
        let state = self.state_mut(epoch);
        match &mut state.algo {
            Algo::Wave(wave) => {
                wave.consumed += 1;
                Vec::new()
            }
            Algo::Ds(ds) => {
                ds.on_consume();
                let mut effects = Vec::new();
                if !ds_engaging {
                    if from == node {
                        // a self-send acks itself
                        ds.on_ack(1);
                    } else {
                        effects.push(TermEffect::DsAck {
                            to: from,
                            epoch,
                            count: 1,
                        });
                    }
                }
                effects.extend(self.ds_settle(epoch));
                effects
            }
        }
    }

    pub fn on_ds_ack(&mut self, epoch: Epoch, count: u64) -> Vec<TermEffect> {
        if let Algo::Ds(ds) = &mut self.state_mut(epoch).algo {
            ds.on_ack(count);
        }
        self.ds_settle(epoch)
    }

    /// Disengage or terminate if this node's Dijkstra-Scholten obligations
    /// are cleared.
    fn ds_settle(&mut self, epoch: Epoch) -> Vec<TermEffect> {
        let Some(state) = self.states.get(&epoch) else {
            return Vec::new();
        };
        let Algo::Ds(ds) = &state.algo else {
            return Vec::new();
        };
        if ds.can_disengage() {
            let parent = ds.parent.expect("disengaging without a parent");
            self.states.remove(&epoch);
            debug!("node {}: disengaging from {:?}", self.node, epoch);
            return vec![TermEffect::DsAck {
                to: parent,
                epoch,
                count: 1,
            }];
        }
        if ds.root_quiet() && state.finished_local && !self.terminated.contains(&epoch) {
            return vec![TermEffect::Terminated { epoch }];
        }
        Vec::new()
    }

    /// The producer side will add no more roots to this epoch.
    pub fn finished_epoch(&mut self, epoch: Epoch) -> Vec<TermEffect> {
        self.state_mut(epoch).finished_local = true;
        if epoch.is_rooted() && epoch.node() == self.node {
            return self.ds_settle(epoch);
        }
        Vec::new()
    }

    // Wave plumbing. The world tree is rooted at node 0; only node 0 starts
    // waves and evaluates totals.

    /// Start a wave for every eligible collective epoch. Called on the wave
    /// root when the scheduler goes idle.
    pub fn start_waves(&mut self, world_children: &[Node]) -> Vec<TermEffect> {
        let candidates: Vec<Epoch> = self
            .states
            .iter()
            .filter(|(epoch, state)| {
                matches!(state.algo, Algo::Wave(ref w) if !w.wave_in_flight)
                    && state.finished_local
                    && !self.terminated.contains(epoch)
            })
            .map(|(epoch, _)| *epoch)
            .collect();

        let mut effects = Vec::new();
        for epoch in candidates {
            let finished = self.local_finished(epoch);
            let state = self.state_mut(epoch);
            let Algo::Wave(wave) = &mut state.algo else {
                continue;
            };
            wave.wave_no += 1;
            wave.wave_in_flight = true;
            let wave_no = wave.wave_no;
            if world_children.is_empty() {
                // single-node world: the wave is just the local counters
                let (p, c) = (wave.produced, wave.consumed);
                if wave.evaluate(p, c, finished) {
                    effects.push(TermEffect::Terminated { epoch });
                }
                continue;
            }
            wave.open(wave_no, world_children.len());
            for child in world_children {
                effects.push(TermEffect::WaveDown {
                    to: *child,
                    epoch,
                    wave: wave_no,
                });
            }
        }
        effects
    }

    /// A wave request arrived from our tree parent.
    pub fn on_wave(
        &mut self,
        epoch: Epoch,
        wave: u64,
        children: &[Node],
        parent: Node,
    ) -> Vec<TermEffect> {
        let finished = self.local_finished(epoch);
        let state = self.state_mut(epoch);
        let Algo::Wave(wave_state) = &mut state.algo else {
            return Vec::new();
        };
        if children.is_empty() {
            let (produced, consumed, fin) = wave_state.leaf_totals(finished);
            return vec![TermEffect::WaveUp {
                to: parent,
                epoch,
                wave,
                produced,
                consumed,
                finished: fin,
            }];
        }
        wave_state.open(wave, children.len());
        children
            .iter()
            .map(|child| TermEffect::WaveDown {
                to: *child,
                epoch,
                wave,
            })
            .collect()
    }

    /// A subtree answer arrived. `parent` is `None` on the wave root.
    pub fn on_wave_ack(
        &mut self,
        epoch: Epoch,
        wave: u64,
        produced: u64,
        consumed: u64,
        finished: bool,
        parent: Option<Node>,
    ) -> Vec<TermEffect> {
        let finished_local = self.local_finished(epoch);
        let state = self.state_mut(epoch);
        let Algo::Wave(wave_state) = &mut state.algo else {
            return Vec::new();
        };
        let Some((p, c, fin)) = wave_state.absorb(produced, consumed, finished, finished_local)
        else {
            return Vec::new();
        };
        match parent {
            Some(parent) => vec![TermEffect::WaveUp {
                to: parent,
                epoch,
                wave,
                produced: p,
                consumed: c,
                finished: fin,
            }],
            None => {
                if wave_state.evaluate(p, c, fin) {
                    vec![TermEffect::Terminated { epoch }]
                } else {
                    Vec::new()
                }
            }
        }
    }

    // Verdict application

    /// Mark the epoch terminated and hand back its actions in registration
    /// order.
    pub fn apply_terminated(&mut self, epoch: Epoch) -> Vec<TermAction> {
        self.states.remove(&epoch);
        self.terminated.insert(epoch);
        self.actions.remove(&epoch).unwrap_or_default()
    }

    /// Register an action to fire at quiescence. If the epoch already
    /// terminated the action is handed back to run immediately.
    pub fn add_action(&mut self, epoch: Epoch, action: TermAction) -> Option<TermAction> {
        if self.terminated.contains(&epoch) {
            return Some(action);
        }
        self.actions.entry(epoch).or_default().push(action);
        None
    }
}
