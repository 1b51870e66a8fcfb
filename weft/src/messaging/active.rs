//! The sending and receiving half of the runtime, minus handler dispatch.
//!
//! Outgoing messages pick between two paths: payloads up to the eager
//! threshold ride in the same transport send as their envelope; larger ones
//! go rendezvous, with the envelope announcing a minted data tag and the
//! payload following as fragments. Incoming transport packets are decoded
//! back into deliveries here; dispatch and termination accounting stay with
//! the runtime.

use log::trace;
use weft_serde::{BitReader, Serde};

use crate::constants::ACTIVE_TAG;
use crate::messaging::data::{CompletedData, DataManager};
use crate::messaging::envelope::Envelope;
use crate::scheduler::Delivery;
use crate::transport::{Transport, TransportError};
use crate::types::{Node, Tag};

/// One event surfaced by a progress poll.
pub(crate) enum Polled {
    /// A full active message is ready to run.
    Deliver(Delivery),
    /// A raw data stream completed.
    Data { tag: Tag, from: Node, payload: Vec<u8> },
    /// A packet was consumed without producing a runnable yet (rendezvous
    /// control or a mid-stream fragment).
    Progressed,
}

pub(crate) struct ActiveMessenger {
    transport: Box<dyn Transport>,
    pub data: DataManager,
    eager_threshold: usize,
    fragment_bytes: usize,
}

impl ActiveMessenger {
    pub fn new(transport: Box<dyn Transport>, eager_threshold: usize, fragment_bytes: usize) -> Self {
        Self {
            transport,
            data: DataManager::new(),
            eager_threshold,
            fragment_bytes,
        }
    }

    pub fn node(&self) -> Node {
        self.transport.node()
    }

    pub fn num_nodes(&self) -> Node {
        self.transport.num_nodes()
    }

    pub fn barrier(&mut self) {
        self.transport.barrier();
    }

    /// Send `env` + serialized payload to `to`, choosing eager or
    /// rendezvous by payload size. `to` may differ from `env.dest()` when
    /// forwarding a broadcast.
    pub fn post(&mut self, to: Node, mut env: Envelope, payload: Vec<u8>) -> Result<(), TransportError> {
        if payload.len() <= self.eager_threshold {
            let mut buffer = env.to_bytes();
            buffer.extend_from_slice(&payload);
            trace!("eager send to {} ({} bytes)", to, buffer.len());
            return self.transport.send(to, ACTIVE_TAG, buffer);
        }

        let tag = self.data.mint_tag();
        let fragments = DataManager::split(&payload, self.fragment_bytes);
        env.set_put(tag, payload.len() as u64, fragments.len() as u32);
        trace!(
            "rendezvous send to {} (tag {}, {} bytes, {} fragments)",
            to,
            tag,
            payload.len(),
            fragments.len()
        );
        self.transport.send(to, ACTIVE_TAG, env.to_bytes())?;
        for fragment in fragments {
            self.transport.send(to, tag, fragment)?;
        }
        // The send buffers are owned by the transport now; the tag is only
        // identifying the stream, safe to reuse after the last fragment.
        self.data.release_tag(tag);
        Ok(())
    }

    /// Raw fragments of a `send_data` transfer. The announcing control
    /// message is sent by the runtime beforehand.
    pub fn post_fragments(&mut self, to: Node, tag: Tag, payload: &[u8]) -> Result<u32, TransportError> {
        let fragments = DataManager::split(payload, self.fragment_bytes);
        let count = fragments.len() as u32;
        for fragment in fragments {
            self.transport.send(to, tag, fragment)?;
        }
        Ok(count)
    }

    /// Drain one transport packet, if any.
    pub fn poll(&mut self) -> Option<Polled> {
        let (from, tag, buffer) = self.transport.recv()?;

        if tag == ACTIVE_TAG {
            let mut reader = BitReader::new(&buffer);
            let env = match Envelope::de(&mut reader) {
                Ok(env) => env,
                Err(_) => {
                    // A malformed envelope cannot be attributed to any
                    // handler; this is unrecoverable.
                    panic!("node {}: undecodable envelope from {}", self.node(), from);
                }
            };

            if env.is_put() {
                self.data
                    .expect_envelope(from, env)
                    .unwrap_or_else(|e| panic!("node {}: {}", self.transport.node(), e));
                return Some(Polled::Progressed);
            }

            let env_bytes = (env.bit_length() as usize).div_ceil(8);
            let payload = buffer[env_bytes..].to_vec();
            return Some(Polled::Deliver(Delivery {
                env,
                from,
                buffer: payload,
                ds_engaging: false,
            }));
        }

        match self.data.on_fragment(from, tag, buffer) {
            Ok(Some(CompletedData { env: Some(env), payload })) => Some(Polled::Deliver(Delivery {
                env,
                from,
                buffer: payload,
                ds_engaging: false,
            })),
            Ok(Some(CompletedData { env: None, payload })) => {
                Some(Polled::Data { tag, from, payload })
            }
            Ok(None) => Some(Polled::Progressed),
            Err(e) => panic!("node {}: {}", self.transport.node(), e),
        }
    }
}

#[cfg(test)]
#[cfg(feature = "transport_local")]
mod tests {
    use super::*;
    use crate::handler::{HandlerId, HandlerKind};
    use crate::transport::local::LocalNetwork;

    fn pair(eager: usize, fragment: usize) -> (ActiveMessenger, ActiveMessenger) {
        let mut endpoints = LocalNetwork::new(2);
        let t1 = endpoints.pop().unwrap();
        let t0 = endpoints.pop().unwrap();
        (
            ActiveMessenger::new(Box::new(t0), eager, fragment),
            ActiveMessenger::new(Box::new(t1), eager, fragment),
        )
    }

    fn test_env() -> Envelope {
        Envelope::new(1, HandlerId::new(HandlerKind::Auto, 3, 0))
    }

    #[test]
    fn eager_send_arrives_in_one_poll() {
        let (mut m0, mut m1) = pair(1024, 64);
        m0.post(1, test_env(), vec![9, 8, 7]).unwrap();

        match m1.poll() {
            Some(Polled::Deliver(delivery)) => {
                assert_eq!(delivery.from, 0);
                assert_eq!(delivery.buffer, vec![9, 8, 7]);
                assert_eq!(delivery.env.handler(), test_env().handler());
            }
            _ => panic!("expected a delivery"),
        }
    }

    #[test]
    fn large_send_goes_rendezvous_and_reassembles() {
        let (mut m0, mut m1) = pair(16, 8);
        let payload: Vec<u8> = (0..64u8).collect();
        m0.post(1, test_env(), payload.clone()).unwrap();

        // control envelope
        assert!(matches!(m1.poll(), Some(Polled::Progressed)));
        // 8 fragments; the last completes the stream
        let mut delivered = None;
        for _ in 0..8 {
            match m1.poll() {
                Some(Polled::Progressed) => {}
                Some(Polled::Deliver(delivery)) => delivered = Some(delivery),
                _ => panic!("unexpected poll result"),
            }
        }
        let delivery = delivered.expect("stream did not complete");
        assert_eq!(delivery.buffer, payload);
        assert!(delivery.env.is_put());
    }

    #[test]
    fn poll_on_idle_transport_is_none() {
        let (_m0, mut m1) = pair(16, 8);
        assert!(m1.poll().is_none());
    }
}
