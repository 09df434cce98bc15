//! Connected-client registry.
//!
//! Allocates stable ids, remembers each client's transport and
//! detected wire protocol, and answers the router's addressing
//! questions. Reads vastly outnumber writes (every routed message is a
//! lookup), so the table sits behind a read/write lock: concurrent
//! readers, serialised writers, never a torn entry.
//!
//! TCP clients are added on accept and removed by their own handler
//! thread. UDP clients are discovered per datagram and tracked in a
//! bounded table keyed by peer address; when the table is full the
//! least-recently-seen entry is evicted. An entry's id never changes
//! while the entry lives.

use std::collections::HashMap;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tickmatch_wire::{Framing, WireProtocol};
use tracing::debug;

/// Default cap on tracked UDP peers.
pub const DEFAULT_MAX_UDP_CLIENTS: usize = 1024;

/// How a client is reached.
#[derive(Debug, Clone)]
pub enum Transport {
    /// Shared write handle to the connection. The reading half lives
    /// in the client's handler thread; the router writes through this
    /// one, so per-client sends stay serialised on the router thread.
    Tcp(Arc<TcpStream>),

    /// Datagram peer address; sends go out through the shared UDP
    /// socket.
    Udp(SocketAddr),
}

/// One connected (or recently seen) client.
#[derive(Debug, Clone)]
pub struct ClientEntry {
    pub id: u32,
    pub transport: Transport,
    pub protocol: WireProtocol,
    pub framing: Option<Framing>,
    pub messages_in: u64,
    pub messages_out: u64,
    pub last_seen: Instant,
}

#[derive(Default)]
struct Inner {
    clients: HashMap<u32, ClientEntry>,
    udp_peers: HashMap<SocketAddr, u32>,
}

pub struct ClientRegistry {
    inner: RwLock<Inner>,
    next_id: AtomicU32,
    max_udp_clients: usize,

    // Monotonic lifetime counters.
    pub clients_added: AtomicU64,
    pub clients_removed: AtomicU64,
    pub udp_evictions: AtomicU64,
}

impl ClientRegistry {
    pub fn new(max_udp_clients: usize) -> Self {
        ClientRegistry {
            inner: RwLock::new(Inner::default()),
            next_id: AtomicU32::new(1),
            max_udp_clients,
            clients_added: AtomicU64::new(0),
            clients_removed: AtomicU64::new(0),
            udp_evictions: AtomicU64::new(0),
        }
    }

    fn allocate_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a freshly accepted TCP connection with an unknown
    /// protocol. Returns the new client id.
    pub fn register_tcp(&self, stream: Arc<TcpStream>) -> u32 {
        let id = self.allocate_id();
        let entry = ClientEntry {
            id,
            transport: Transport::Tcp(stream),
            protocol: WireProtocol::Unknown,
            framing: None,
            messages_in: 0,
            messages_out: 0,
            last_seen: Instant::now(),
        };
        self.inner.write().clients.insert(id, entry);
        self.clients_added.fetch_add(1, Ordering::Relaxed);
        id
    }

    /// Find or create the client entry for a UDP peer, refreshing its
    /// last-seen time. Evicts the least-recently-seen UDP client when
    /// the table is saturated.
    pub fn client_for_udp_peer(&self, peer: SocketAddr) -> u32 {
        let mut inner = self.inner.write();

        if let Some(&id) = inner.udp_peers.get(&peer) {
            if let Some(entry) = inner.clients.get_mut(&id) {
                entry.last_seen = Instant::now();
            }
            return id;
        }

        if inner.udp_peers.len() >= self.max_udp_clients {
            let victim = inner
                .udp_peers
                .iter()
                .min_by_key(|(_, id)| {
                    inner
                        .clients
                        .get(id)
                        .map(|e| e.last_seen)
                        .unwrap_or_else(Instant::now)
                })
                .map(|(&stale_peer, &stale_id)| (stale_peer, stale_id));
            if let Some((stale_peer, stale_id)) = victim {
                debug!(client_id = stale_id, peer = %stale_peer, "evicting stale UDP client");
                inner.udp_peers.remove(&stale_peer);
                inner.clients.remove(&stale_id);
                self.udp_evictions.fetch_add(1, Ordering::Relaxed);
                self.clients_removed.fetch_add(1, Ordering::Relaxed);
            }
        }

        let id = self.allocate_id();
        let entry = ClientEntry {
            id,
            transport: Transport::Udp(peer),
            protocol: WireProtocol::Unknown,
            framing: None,
            messages_in: 0,
            messages_out: 0,
            last_seen: Instant::now(),
        };
        inner.clients.insert(id, entry);
        inner.udp_peers.insert(peer, id);
        self.clients_added.fetch_add(1, Ordering::Relaxed);
        id
    }

    /// Remove a client; called by its handler thread on disconnect.
    pub fn remove(&self, id: u32) {
        let mut inner = self.inner.write();
        if let Some(entry) = inner.clients.remove(&id) {
            if let Transport::Udp(peer) = entry.transport {
                inner.udp_peers.remove(&peer);
            }
            self.clients_removed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record the wire protocol (and framing, for binary TCP clients)
    /// detected from a client's first bytes.
    pub fn set_wire(&self, id: u32, protocol: WireProtocol, framing: Framing) {
        if let Some(entry) = self.inner.write().clients.get_mut(&id) {
            entry.protocol = protocol;
            entry.framing = Some(framing);
        }
    }

    /// Detected protocol and framing for a client.
    pub fn wire(&self, id: u32) -> Option<(WireProtocol, Option<Framing>)> {
        self.inner
            .read()
            .clients
            .get(&id)
            .map(|e| (e.protocol, e.framing))
    }

    /// Everything the router needs to address one client, snapshotted
    /// so no lock is held during the send.
    pub fn route_info(&self, id: u32) -> Option<(Transport, WireProtocol, Option<Framing>)> {
        self.inner
            .read()
            .clients
            .get(&id)
            .map(|e| (e.transport.clone(), e.protocol, e.framing))
    }

    /// Ids of every active client, for broadcasts.
    pub fn active_ids(&self) -> Vec<u32> {
        self.inner.read().clients.keys().copied().collect()
    }

    /// Bump a client's inbound counter and last-seen time.
    pub fn note_received(&self, id: u32) {
        if let Some(entry) = self.inner.write().clients.get_mut(&id) {
            entry.messages_in += 1;
            entry.last_seen = Instant::now();
        }
    }

    /// Bump a client's outbound counter.
    pub fn note_sent(&self, id: u32) {
        if let Some(entry) = self.inner.write().clients.get_mut(&id) {
            entry.messages_out += 1;
        }
    }

    /// Number of active clients.
    pub fn len(&self) -> usize {
        self.inner.read().clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of tracked UDP peers.
    pub fn udp_len(&self) -> usize {
        self.inner.read().udp_peers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(n: u16) -> SocketAddr {
        format!("10.0.0.1:{}", 1000 + n).parse().unwrap()
    }

    #[test]
    fn udp_peer_ids_are_stable_across_datagrams() {
        let registry = ClientRegistry::new(8);
        let a = registry.client_for_udp_peer(peer(1));
        let b = registry.client_for_udp_peer(peer(2));
        assert_ne!(a, b);
        assert_eq!(registry.client_for_udp_peer(peer(1)), a);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn saturated_udp_table_evicts_the_least_recently_seen() {
        let registry = ClientRegistry::new(2);
        let a = registry.client_for_udp_peer(peer(1));
        let b = registry.client_for_udp_peer(peer(2));

        // Refresh peer 1 so peer 2 is the stale one.
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert_eq!(registry.client_for_udp_peer(peer(1)), a);

        let c = registry.client_for_udp_peer(peer(3));
        assert_eq!(registry.udp_len(), 2);
        assert!(registry.route_info(b).is_none());
        assert!(registry.route_info(a).is_some());
        assert!(registry.route_info(c).is_some());
        assert_eq!(registry.udp_evictions.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn wire_detection_sticks_to_the_entry() {
        let registry = ClientRegistry::new(8);
        let id = registry.client_for_udp_peer(peer(1));
        assert_eq!(registry.wire(id), Some((WireProtocol::Unknown, None)));

        registry.set_wire(id, WireProtocol::Binary, Framing::RawBinary);
        assert_eq!(
            registry.wire(id),
            Some((WireProtocol::Binary, Some(Framing::RawBinary)))
        );
    }

    #[test]
    fn tcp_clients_come_and_go_with_their_connections() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        let (accepted, _) = listener.accept().unwrap();

        let registry = ClientRegistry::new(8);
        let id = registry.register_tcp(Arc::new(accepted));
        assert_eq!(registry.len(), 1);
        assert!(matches!(
            registry.route_info(id),
            Some((Transport::Tcp(_), WireProtocol::Unknown, None))
        ));

        registry.remove(id);
        assert!(registry.is_empty());
        assert_eq!(registry.clients_removed.load(Ordering::Relaxed), 1);
        drop(client);
    }
}
