//! Market-data multicast publisher.
//!
//! One socket, written only by the router thread, sending every engine
//! output to the configured group in plain binary frames. TTL 1 keeps
//! the feed on the local segment; loopback stays on so same-host
//! subscribers (and tests) can hear it.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use anyhow::{ensure, Context};
use socket2::{Domain, Protocol, Socket, Type};

pub struct MulticastPublisher {
    socket: UdpSocket,
    target: SocketAddrV4,
}

impl MulticastPublisher {
    pub fn new(group: Ipv4Addr, port: u16) -> anyhow::Result<Self> {
        ensure!(group.is_multicast(), "{group} is not a multicast group");

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .context("creating multicast socket")?;
        socket
            .set_multicast_ttl_v4(1)
            .context("setting multicast TTL")?;
        socket
            .set_multicast_loop_v4(true)
            .context("enabling multicast loopback")?;
        socket
            .bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into())
            .context("binding multicast socket")?;

        Ok(MulticastPublisher {
            socket: socket.into(),
            target: SocketAddrV4::new(group, port),
        })
    }

    /// Publish one binary frame to the group.
    pub fn send(&self, frame: &[u8]) -> io::Result<usize> {
        self.socket.send_to(frame, self.target)
    }

    pub fn target(&self) -> SocketAddrV4 {
        self.target
    }
}
