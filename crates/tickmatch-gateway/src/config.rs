//! Gateway configuration.
//!
//! Everything is a CLI flag with a sensible default; `RUST_LOG`
//! controls log verbosity separately.

use std::net::{Ipv4Addr, SocketAddrV4};

use anyhow::ensure;
use clap::Parser;

use tickmatch_core::partition::DUAL_PARTITIONS;

/// Price-time-priority matching engine with a TCP/UDP/multicast front
/// end.
#[derive(Parser, Debug, Clone)]
#[command(name = "tickmatch", version)]
pub struct Config {
    /// Interface to bind the TCP and UDP sockets on.
    #[arg(long, default_value_t = Ipv4Addr::UNSPECIFIED)]
    pub bind_addr: Ipv4Addr,

    /// TCP listen port.
    #[arg(long, default_value_t = 1234)]
    pub tcp_port: u16,

    /// UDP receive port.
    #[arg(long, default_value_t = 1235)]
    pub udp_port: u16,

    /// Market-data multicast group.
    #[arg(long, default_value_t = Ipv4Addr::new(239, 255, 0, 1))]
    pub mcast_addr: Ipv4Addr,

    /// Market-data multicast port.
    #[arg(long, default_value_t = 1236)]
    pub mcast_port: u16,

    /// Run a single matching partition instead of the A-M / N-Z pair.
    #[arg(long)]
    pub single_processor: bool,

    /// Disable the TCP listener.
    #[arg(long)]
    pub no_tcp: bool,

    /// Disable the UDP receiver.
    #[arg(long)]
    pub no_udp: bool,

    /// Disable the multicast publisher.
    #[arg(long)]
    pub no_multicast: bool,

    /// Skip the startup banner.
    #[arg(long)]
    pub quiet: bool,

    /// Maximum simultaneously connected TCP clients.
    #[arg(long, default_value_t = 1024)]
    pub max_clients: usize,

    /// Maximum tracked UDP peers before LRU eviction kicks in.
    #[arg(long, default_value_t = 1024)]
    pub max_udp_clients: usize,
}

impl Config {
    /// Number of matching partitions to run.
    pub fn partitions(&self) -> usize {
        if self.single_processor {
            1
        } else {
            DUAL_PARTITIONS
        }
    }

    /// The multicast destination.
    pub fn multicast_target(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.mcast_addr, self.mcast_port)
    }

    /// Reject configurations that cannot run.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.no_multicast || self.mcast_addr.is_multicast(),
            "{} is not a multicast address",
            self.mcast_addr
        );
        ensure!(
            !(self.no_tcp && self.no_udp),
            "at least one of TCP and UDP ingress must stay enabled"
        );
        Ok(())
    }
}
