//! UDP ingress: one socket, one receiver thread.
//!
//! Each datagram stands alone: identify (or create) the client entry
//! for the peer, detect its protocol from the first bytes if it is
//! new, then parse as many messages as the datagram holds. A parse
//! failure discards the remainder of that datagram only; receive
//! errors are logged and the loop continues.

use std::io::ErrorKind;
use std::net::{SocketAddrV4, UdpSocket};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use socket2::{Domain, Protocol, Socket, Type};
use tickmatch_wire::{detect_framing, parse_datagram};
use tracing::{debug, info, warn};

use crate::ingress::{protocol_for, IngressShared};
use crate::stats::Stats;

/// Receive timeout; bounds how long shutdown can go unobserved.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Kernel receive buffer request. Bursts arrive faster than the
/// receiver thread drains them, so oversize it well past the default.
const RECV_BUFFER_BYTES: usize = 4 * 1024 * 1024;

/// Largest datagram we accept.
const MAX_DATAGRAM: usize = 64 * 1024;

/// Bind the UDP socket with SO_REUSEADDR and an oversized receive
/// buffer.
pub fn bind(addr: SocketAddrV4) -> anyhow::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .context("creating UDP socket")?;
    socket
        .set_reuse_address(true)
        .context("setting SO_REUSEADDR")?;
    if let Err(e) = socket.set_recv_buffer_size(RECV_BUFFER_BYTES) {
        // The kernel may clamp or refuse; not fatal.
        warn!(error = %e, "could not grow the UDP receive buffer");
    }
    socket
        .bind(&addr.into())
        .with_context(|| format!("binding UDP socket on {addr}"))?;

    let socket: UdpSocket = socket.into();
    socket
        .set_read_timeout(Some(READ_TIMEOUT))
        .context("setting UDP read timeout")?;
    Ok(socket)
}

/// Receiver loop; one thread for the lifetime of the process.
pub fn run_receiver(socket: Arc<UdpSocket>, shared: IngressShared) {
    info!(addr = %socket.local_addr().map(|a| a.to_string()).unwrap_or_default(), "UDP receiver ready");

    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut seq = 0u64;

    while !shared.shutdown.load(Ordering::Relaxed) {
        match socket.recv_from(&mut buf) {
            Ok((0, _)) => {}
            Ok((len, peer)) => {
                let data = &buf[..len];
                let client_id = shared.registry.client_for_udp_peer(peer);

                let framing = match shared.registry.wire(client_id) {
                    Some((_, Some(framing))) => framing,
                    _ => match detect_framing(data) {
                        Some(detected) => {
                            shared
                                .registry
                                .set_wire(client_id, protocol_for(detected), detected);
                            debug!(client_id, %peer, ?detected, "UDP client protocol detected");
                            detected
                        }
                        None => {
                            Stats::bump(&shared.stats.decode_errors);
                            debug!(client_id, %peer, "unrecognisable datagram");
                            continue;
                        }
                    },
                };

                let (messages, errors) = parse_datagram(data, framing);
                Stats::add(&shared.stats.decode_errors, errors);

                for msg in messages {
                    if !shared.dispatch(client_id, &mut seq, msg) {
                        return;
                    }
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                warn!(error = %e, "UDP receive error");
                thread::sleep(Duration::from_millis(10));
            }
        }
    }

    info!("UDP receiver stopped");
}
