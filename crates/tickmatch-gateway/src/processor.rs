//! Partition processor: drains an input queue into its own matching
//! engine and forwards every output, wrapped with the originator's
//! client id, to the partition's output queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tickmatch_core::MatchingEngine;
use tracing::{debug, info};

use crate::envelope::{InputEnvelope, OutputEnvelope};
use crate::queue::{push_or_yield, Consumer, Producer};
use crate::stats::Stats;

/// Envelopes taken per drain to amortise queue overhead. Outputs are
/// still published the moment each input produces them; batching never
/// reorders or delays within an input's outputs.
pub const BATCH_SIZE: usize = 32;

/// Nap when the input queue is empty.
const IDLE_NAP: Duration = Duration::from_micros(200);

pub struct Processor {
    partition: usize,
    input: Consumer<InputEnvelope>,
    output: Producer<OutputEnvelope>,
    stats: Arc<Stats>,
    shutdown: Arc<AtomicBool>,
}

impl Processor {
    pub fn new(
        partition: usize,
        input: Consumer<InputEnvelope>,
        output: Producer<OutputEnvelope>,
        stats: Arc<Stats>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Processor {
            partition,
            input,
            output,
            stats,
            shutdown,
        }
    }

    pub fn run(self) {
        let mut engine = MatchingEngine::new();
        let mut batch: Vec<InputEnvelope> = Vec::with_capacity(BATCH_SIZE);
        info!(partition = self.partition, "processor started");

        while !self.shutdown.load(Ordering::Relaxed) {
            batch.clear();
            while batch.len() < BATCH_SIZE {
                match self.input.pop() {
                    Some(envelope) => batch.push(envelope),
                    None => break,
                }
            }

            if batch.is_empty() {
                thread::sleep(IDLE_NAP);
                continue;
            }

            for envelope in &batch {
                let dropped_before = engine.dropped_inputs();

                for msg in engine.process_message(envelope.msg) {
                    let out = OutputEnvelope {
                        client_id: envelope.client_id,
                        msg,
                    };
                    // Full output queue: yield until the router makes
                    // room, never drop.
                    if !push_or_yield(&self.output, out, &self.shutdown) {
                        info!(partition = self.partition, "processor stopping mid-batch");
                        return;
                    }
                }

                if engine.dropped_inputs() != dropped_before {
                    Stats::bump(&self.stats.dropped_inputs);
                    debug!(
                        partition = self.partition,
                        client_id = envelope.client_id,
                        "input dropped as invalid or over capacity"
                    );
                }
            }
        }

        info!(
            partition = self.partition,
            open_orders = engine.open_orders(),
            symbols = engine.num_symbols(),
            "processor stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::spsc;
    use tickmatch_core::{InputMessage, NewOrder, OutputMessage, Side, Symbol};

    fn order(user: u32, price: u32, qty: u32, side: Side, oid: u32) -> InputMessage {
        InputMessage::NewOrder(NewOrder {
            user_id: user,
            symbol: Symbol::from_bytes(b"IBM"),
            price,
            quantity: qty,
            side,
            user_order_id: oid,
        })
    }

    #[test]
    fn outputs_carry_the_originating_client_and_preserve_order() {
        let (in_tx, in_rx) = spsc(64);
        let (out_tx, out_rx) = spsc(64);
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(Stats::new());

        let processor = Processor::new(0, in_rx, out_tx, stats, shutdown.clone());
        let handle = thread::spawn(move || processor.run());

        in_tx
            .push(InputEnvelope {
                client_id: 11,
                seq: 1,
                msg: order(1, 100, 50, Side::Buy, 1),
            })
            .unwrap();
        in_tx
            .push(InputEnvelope {
                client_id: 22,
                seq: 2,
                msg: order(2, 100, 50, Side::Sell, 2),
            })
            .unwrap();

        let mut outputs = Vec::new();
        while outputs.len() < 5 {
            match out_rx.pop() {
                Some(envelope) => outputs.push(envelope),
                None => thread::yield_now(),
            }
        }

        shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap();

        // First order: Ack + TOB for client 11; second: Ack, Trade,
        // eliminated TOB for client 22, in emission order.
        assert_eq!(outputs[0].client_id, 11);
        assert!(matches!(outputs[0].msg, OutputMessage::Ack(_)));
        assert_eq!(outputs[1].client_id, 11);
        assert!(matches!(outputs[1].msg, OutputMessage::TopOfBook(_)));
        assert_eq!(outputs[2].client_id, 22);
        assert!(matches!(outputs[2].msg, OutputMessage::Ack(_)));
        assert_eq!(outputs[3].client_id, 22);
        assert!(matches!(outputs[3].msg, OutputMessage::Trade(_)));
        assert_eq!(outputs[4].client_id, 22);
        assert!(matches!(outputs[4].msg, OutputMessage::TopOfBook(_)));
    }
}
