//! Shared ingress plumbing: turning parsed messages into envelopes and
//! placing them on the right partition queue(s).
//!
//! Many ingress threads (one per TCP connection, plus the UDP
//! receiver) feed the two input queues, so the producer endpoints sit
//! behind short mutexes; the serialised critical section is a single
//! ring push. The queue itself stays lock-free between "the ingress
//! side" and its processor.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;
use tickmatch_core::{partition_of, InputMessage};
use tickmatch_wire::{Framing, WireProtocol};

use crate::envelope::InputEnvelope;
use crate::queue::{push_or_yield, Producer};
use crate::registry::ClientRegistry;
use crate::stats::Stats;
use crate::user_map::UserClientMap;

/// Producer endpoint shared by the ingress threads.
pub type SharedInputProducer = Arc<Mutex<Producer<InputEnvelope>>>;

/// Handles every ingress worker needs, cheap to clone.
#[derive(Clone)]
pub struct IngressShared {
    /// One input queue per partition.
    pub inputs: Vec<SharedInputProducer>,
    pub registry: Arc<ClientRegistry>,
    pub user_map: Arc<UserClientMap>,
    pub stats: Arc<Stats>,
    pub shutdown: Arc<AtomicBool>,
}

impl IngressShared {
    /// Wrap one parsed message in an envelope and enqueue it.
    ///
    /// Messages carrying a symbol go to that symbol's partition.
    /// Symbol-less messages (Flush, and Cancel, whose target book only
    /// its owning partition knows) go to every partition; the
    /// partitions that don't own the target ignore them silently.
    ///
    /// Enqueueing spin-yields on a full queue rather than dropping.
    /// Returns `false` only when shutdown interrupted the wait.
    pub fn dispatch(&self, client_id: u32, seq: &mut u64, msg: InputMessage) -> bool {
        match msg {
            InputMessage::NewOrder(n) => self.user_map.bind(n.user_id, client_id),
            InputMessage::Cancel(c) => self.user_map.bind(c.user_id, client_id),
            InputMessage::Flush => {}
        }
        self.registry.note_received(client_id);
        Stats::bump(&self.stats.messages_in);

        let partitions = self.inputs.len();
        match msg.symbol() {
            Some(symbol) => {
                *seq += 1;
                let envelope = InputEnvelope {
                    client_id,
                    seq: *seq,
                    msg,
                };
                self.enqueue(partition_of(symbol, partitions), envelope)
            }
            None => {
                let mut delivered = true;
                for partition in 0..partitions {
                    *seq += 1;
                    let envelope = InputEnvelope {
                        client_id,
                        seq: *seq,
                        msg,
                    };
                    delivered &= self.enqueue(partition, envelope);
                }
                delivered
            }
        }
    }

    fn enqueue(&self, partition: usize, envelope: InputEnvelope) -> bool {
        let producer = self.inputs[partition].lock();
        push_or_yield(&producer, envelope, &self.shutdown)
    }
}

/// The wire protocol implied by a detected framing.
pub fn protocol_for(framing: Framing) -> WireProtocol {
    match framing {
        Framing::RawBinary | Framing::LengthPrefixedBinary => WireProtocol::Binary,
        Framing::Text => WireProtocol::Text,
    }
}
