//! TCP ingress: listener and per-connection handlers.
//!
//! The listener accepts in a loop on a non-blocking socket so it can
//! observe the shutdown flag at a bounded interval. Each accepted
//! connection gets TCP_NODELAY, a short read timeout, an Unknown
//! protocol entry in the registry, and a handler thread of its own.
//!
//! The handler buffers the connection's bytes and runs the framing
//! state machine: undecided until the first bytes identify raw binary,
//! length-prefixed binary, or text, then frames are drained until EOF,
//! error, or shutdown. A connection that stalls or pours garbage
//! before identifying itself is disconnected.

use std::io::{ErrorKind, Read};
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener, TcpStream};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use socket2::{Domain, Protocol, Socket, Type};
use tickmatch_wire::{detect_framing, next_frame, Framing, NextFrame};
use tracing::{debug, info, warn};

use crate::ingress::{protocol_for, IngressShared};
use crate::stats::Stats;

/// Port-bump attempts when the configured port is taken.
const MAX_PORT_RETRIES: u16 = 3;

/// Poll interval of the accept loop.
const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Per-connection read timeout; bounds how long shutdown can go
/// unobserved.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Per-call write timeout used by the router's sends.
const WRITE_TIMEOUT: Duration = Duration::from_millis(100);

/// Read timeouts tolerated before an unidentified client is dropped.
const MAX_UNKNOWN_STALLS: u32 = 10;

/// Buffered garbage tolerated while the framing is still undecided.
const MAX_UNDETECTED_BYTES: usize = 64;

/// Bind the listener, bumping the port on AddrInUse up to
/// [`MAX_PORT_RETRIES`] times. Returns the listener and the port it
/// actually bound.
pub fn bind_with_retry(addr: Ipv4Addr, port: u16) -> anyhow::Result<(TcpListener, u16)> {
    let mut attempts: u16 = 0;
    let mut port = port;

    loop {
        attempts += 1;
        match bind_listener(SocketAddrV4::new(addr, port)) {
            Ok(listener) => return Ok((listener, port)),
            Err(e) if e.kind() == ErrorKind::AddrInUse && attempts < MAX_PORT_RETRIES => {
                warn!(
                    port,
                    attempt = attempts,
                    "TCP port in use, trying the next one"
                );
                port += 1;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("binding TCP listener on {addr}:{port}"))
            }
        }
    }
}

fn bind_listener(addr: SocketAddrV4) -> std::io::Result<TcpListener> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(128)?;
    let listener: TcpListener = socket.into();
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Accept loop; one thread for the lifetime of the process.
pub fn run_listener(listener: TcpListener, shared: IngressShared, max_clients: usize) {
    info!(addr = %listener.local_addr().map(|a| a.to_string()).unwrap_or_default(), "TCP listener ready");

    while !shared.shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if shared.registry.len() >= max_clients {
                    warn!(%peer, max_clients, "rejecting connection, client limit reached");
                    drop(stream);
                    continue;
                }

                if let Err(e) = configure_stream(&stream) {
                    warn!(%peer, error = %e, "failed to configure accepted socket");
                    continue;
                }

                let stream = Arc::new(stream);
                let client_id = shared.registry.register_tcp(stream.clone());
                info!(client_id, %peer, "accepted connection");

                let shared = shared.clone();
                let spawned = thread::Builder::new()
                    .name(format!("client-{client_id}"))
                    .spawn(move || run_client(client_id, stream, shared));
                if let Err(e) = spawned {
                    warn!(client_id, error = %e, "failed to spawn client handler");
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                warn!(error = %e, "accept failed");
                thread::sleep(ACCEPT_POLL);
            }
        }
    }

    info!("TCP listener stopped");
}

fn configure_stream(stream: &TcpStream) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))
}

/// Per-connection I/O loop. Exits on EOF, error, shutdown, or a client
/// that never identifies its protocol; always deregisters on the way
/// out, discarding any pending output for this client.
fn run_client(client_id: u32, stream: Arc<TcpStream>, shared: IngressShared) {
    let mut buf: Vec<u8> = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    let mut framing: Option<Framing> = None;
    let mut seq = 0u64;
    let mut stalls = 0u32;

    while !shared.shutdown.load(Ordering::Relaxed) {
        match (&*stream).read(&mut chunk) {
            Ok(0) => {
                debug!(client_id, "client closed the connection");
                break;
            }
            Ok(n) => {
                stalls = 0;
                buf.extend_from_slice(&chunk[..n]);

                if framing.is_none() {
                    match detect_framing(&buf) {
                        Some(detected) => {
                            framing = Some(detected);
                            shared
                                .registry
                                .set_wire(client_id, protocol_for(detected), detected);
                            debug!(client_id, ?detected, "framing detected");
                        }
                        None if buf.len() > MAX_UNDETECTED_BYTES => {
                            warn!(client_id, "unrecognisable first bytes, disconnecting");
                            break;
                        }
                        None => {}
                    }
                }

                if let Some(framing) = framing {
                    if !drain_buffer(client_id, &mut buf, framing, &mut seq, &shared) {
                        break;
                    }
                }
            }
            Err(e) if is_timeout(&e) => {
                stalls += 1;
                if framing.is_none() && stalls >= MAX_UNKNOWN_STALLS {
                    debug!(client_id, "no protocol within the stall budget, disconnecting");
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                debug!(client_id, error = %e, "read failed");
                break;
            }
        }
    }

    shared.registry.remove(client_id);
    info!(client_id, "client disconnected");
}

/// Pull every complete frame out of the buffer and dispatch it.
/// Returns `false` when shutdown interrupted an enqueue.
fn drain_buffer(
    client_id: u32,
    buf: &mut Vec<u8>,
    framing: Framing,
    seq: &mut u64,
    shared: &IngressShared,
) -> bool {
    let mut consumed = 0usize;
    let mut alive = true;

    while alive {
        match next_frame(&buf[consumed..], framing) {
            NextFrame::Msg(msg, n) => {
                consumed += n;
                alive = shared.dispatch(client_id, seq, msg);
            }
            NextFrame::Skip(n) => consumed += n,
            NextFrame::Error(n) => {
                consumed += n;
                Stats::bump(&shared.stats.decode_errors);
            }
            NextFrame::Incomplete => break,
        }
    }

    buf.drain(..consumed);
    alive
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
