//! Output router: the single egress point.
//!
//! Drains the partitions' output queues in a fair round-robin and
//! addresses each envelope by message type:
//!
//! - Ack / CancelAck go to the originating client only.
//! - Trade goes to the buyer's and seller's clients (once, when they
//!   are the same client).
//! - TopOfBook is broadcast to every active client.
//!
//! Every output additionally goes to the multicast group in plain
//! binary. Per-client bytes follow the client's detected protocol, and
//! binary TCP clients get the same framing they spoke inbound.
//!
//! All sends happen on this one thread, which is what keeps each
//! client's stream in order. A send that cannot complete within its
//! bounded wait is counted and skipped; the client's own handler is
//! the only thing that removes it.

use std::io::{ErrorKind, Write};
use std::net::{TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tickmatch_core::OutputMessage;
use tickmatch_wire::{frame_output, Framing, WireProtocol};
use tracing::{debug, info, warn};

use crate::envelope::OutputEnvelope;
use crate::multicast::MulticastPublisher;
use crate::queue::Consumer;
use crate::registry::{ClientRegistry, Transport};
use crate::stats::Stats;
use crate::user_map::UserClientMap;

/// Nap when every queue is empty.
const IDLE_NAP: Duration = Duration::from_micros(200);

/// Write retries (each bounded by the socket write timeout) before a
/// TCP send is abandoned.
const MAX_WRITE_ATTEMPTS: u32 = 8;

pub struct OutputRouter {
    queues: Vec<Consumer<OutputEnvelope>>,
    registry: Arc<ClientRegistry>,
    user_map: Arc<UserClientMap>,
    stats: Arc<Stats>,
    shutdown: Arc<AtomicBool>,
    multicast: Option<MulticastPublisher>,
    udp_socket: Option<Arc<UdpSocket>>,
}

impl OutputRouter {
    pub fn new(
        queues: Vec<Consumer<OutputEnvelope>>,
        registry: Arc<ClientRegistry>,
        user_map: Arc<UserClientMap>,
        stats: Arc<Stats>,
        shutdown: Arc<AtomicBool>,
        multicast: Option<MulticastPublisher>,
        udp_socket: Option<Arc<UdpSocket>>,
    ) -> Self {
        OutputRouter {
            queues,
            registry,
            user_map,
            stats,
            shutdown,
            multicast,
            udp_socket,
        }
    }

    pub fn run(self) {
        info!(queues = self.queues.len(), "output router started");

        while !self.shutdown.load(Ordering::Relaxed) {
            // One envelope per queue per sweep keeps the drain fair;
            // neither partition can starve the other.
            let mut drained = false;
            for queue in &self.queues {
                if let Some(envelope) = queue.pop() {
                    self.route(&envelope);
                    drained = true;
                }
            }
            if !drained {
                thread::sleep(IDLE_NAP);
            }
        }

        info!("output router stopped");
    }

    /// Deliver one envelope to its unicast destination(s) and the
    /// multicast group.
    pub fn route(&self, envelope: &OutputEnvelope) {
        match &envelope.msg {
            OutputMessage::Ack(_) | OutputMessage::CancelAck(_) => {
                self.send_to_client(envelope.client_id, &envelope.msg);
            }
            OutputMessage::Trade(trade) => {
                let buyer = self.user_map.client_of(trade.user_id_buy);
                let seller = self.user_map.client_of(trade.user_id_sell);
                if let Some(buyer) = buyer {
                    self.send_to_client(buyer, &envelope.msg);
                }
                if let Some(seller) = seller {
                    if Some(seller) != buyer {
                        self.send_to_client(seller, &envelope.msg);
                    }
                }
            }
            OutputMessage::TopOfBook(_) => {
                for client_id in self.registry.active_ids() {
                    self.send_to_client(client_id, &envelope.msg);
                }
            }
        }

        if let Some(multicast) = &self.multicast {
            let frame = frame_output(&envelope.msg, Framing::RawBinary);
            if let Err(e) = multicast.send(&frame) {
                Stats::bump(&self.stats.send_errors);
                debug!(error = %e, "multicast send failed");
            }
        }
    }

    fn send_to_client(&self, client_id: u32, msg: &OutputMessage) {
        // Snapshot the addressing under the read lock, then send with
        // no lock held.
        let Some((transport, protocol, framing)) = self.registry.route_info(client_id) else {
            // Disconnected since the message was produced; drop it.
            return;
        };

        let framing = match (protocol, framing) {
            (WireProtocol::Binary, Some(framing)) => framing,
            (WireProtocol::Text, _) => Framing::Text,
            // Protocol not detected yet; nothing can be formatted.
            _ => return,
        };

        let bytes = frame_output(msg, framing);
        let result = match transport {
            Transport::Tcp(stream) => write_all_bounded(&stream, &bytes),
            Transport::Udp(peer) => match &self.udp_socket {
                Some(socket) => socket.send_to(&bytes, peer).map(|_| ()),
                None => return,
            },
        };

        match result {
            Ok(()) => {
                self.registry.note_sent(client_id);
                Stats::bump(&self.stats.messages_out);
            }
            Err(e) => {
                Stats::bump(&self.stats.send_errors);
                warn!(client_id, error = %e, "client send failed");
            }
        }
    }
}

/// Write the whole buffer, retrying partial writes. Each blocked write
/// waits at most the socket's write timeout and at most
/// [`MAX_WRITE_ATTEMPTS`] waits are spent in total, so a stuck client
/// cannot park the router.
fn write_all_bounded(stream: &TcpStream, mut buf: &[u8]) -> std::io::Result<()> {
    let mut attempts = 0u32;
    while !buf.is_empty() {
        match (&*stream).write(buf) {
            Ok(0) => return Err(ErrorKind::WriteZero.into()),
            Ok(n) => {
                buf = &buf[n..];
                attempts = 0;
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                attempts += 1;
                if attempts >= MAX_WRITE_ATTEMPTS {
                    return Err(e);
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
