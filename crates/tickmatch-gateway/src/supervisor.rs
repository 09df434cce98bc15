//! Construction and lifecycle of the whole gateway.
//!
//! Builds the queues, registry, user map and sockets, then starts the
//! workers in dependency order: processors first, then the router,
//! then the TCP listener, then the UDP receiver. Shutdown is one
//! shared atomic flag, raised by SIGINT/SIGTERM or a fatal path; every
//! worker observes it within its own bounded poll interval, after
//! which the supervisor joins them and logs the final statistics.

use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Context;
use parking_lot::Mutex;
use tracing::info;

use crate::config::Config;
use crate::ingress::IngressShared;
use crate::multicast::MulticastPublisher;
use crate::processor::Processor;
use crate::queue::{spsc, DEFAULT_QUEUE_CAPACITY};
use crate::registry::ClientRegistry;
use crate::router::OutputRouter;
use crate::stats::Stats;
use crate::user_map::UserClientMap;
use crate::{tcp, udp};

/// How often the supervisor checks the shutdown flag.
const SUPERVISOR_POLL: Duration = Duration::from_millis(200);

/// Run the gateway until shutdown. Returns an error only for
/// configuration or startup failures; a signalled shutdown is a clean
/// return.
pub fn run(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
            .context("installing the shutdown signal handler")?;
    }

    let stats = Arc::new(Stats::new());
    let registry = Arc::new(ClientRegistry::new(config.max_udp_clients));
    let user_map = Arc::new(UserClientMap::new());
    let partitions = config.partitions();

    let mut workers: Vec<JoinHandle<()>> = Vec::new();
    let mut input_producers = Vec::with_capacity(partitions);
    let mut output_consumers = Vec::with_capacity(partitions);

    // Processors first; everything downstream assumes they are
    // draining.
    for partition in 0..partitions {
        let (input_tx, input_rx) = spsc(DEFAULT_QUEUE_CAPACITY);
        let (output_tx, output_rx) = spsc(DEFAULT_QUEUE_CAPACITY);
        input_producers.push(Arc::new(Mutex::new(input_tx)));
        output_consumers.push(output_rx);

        let processor = Processor::new(
            partition,
            input_rx,
            output_tx,
            stats.clone(),
            shutdown.clone(),
        );
        workers.push(
            thread::Builder::new()
                .name(format!("processor-{partition}"))
                .spawn(move || processor.run())
                .context("spawning processor")?,
        );
    }

    // The UDP socket is shared: the receiver reads it, the router
    // sends through it.
    let udp_socket = if config.no_udp {
        None
    } else {
        let addr = SocketAddrV4::new(config.bind_addr, config.udp_port);
        Some(Arc::new(udp::bind(addr)?))
    };

    let multicast = if config.no_multicast {
        None
    } else {
        Some(MulticastPublisher::new(config.mcast_addr, config.mcast_port)?)
    };

    let router = OutputRouter::new(
        output_consumers,
        registry.clone(),
        user_map.clone(),
        stats.clone(),
        shutdown.clone(),
        multicast,
        udp_socket.clone(),
    );
    workers.push(
        thread::Builder::new()
            .name("router".into())
            .spawn(move || router.run())
            .context("spawning router")?,
    );

    let shared = IngressShared {
        inputs: input_producers,
        registry: registry.clone(),
        user_map,
        stats: stats.clone(),
        shutdown: shutdown.clone(),
    };

    let mut tcp_port = None;
    if !config.no_tcp {
        let (listener, bound_port) = tcp::bind_with_retry(config.bind_addr, config.tcp_port)?;
        tcp_port = Some(bound_port);
        let shared = shared.clone();
        let max_clients = config.max_clients;
        workers.push(
            thread::Builder::new()
                .name("tcp-listener".into())
                .spawn(move || tcp::run_listener(listener, shared, max_clients))
                .context("spawning TCP listener")?,
        );
    }

    if let Some(socket) = udp_socket {
        let shared = shared.clone();
        workers.push(
            thread::Builder::new()
                .name("udp-receiver".into())
                .spawn(move || udp::run_receiver(socket, shared))
                .context("spawning UDP receiver")?,
        );
    }

    if !config.quiet {
        print_banner(&config, partitions, tcp_port);
    }
    info!("tickmatch up; Ctrl+C to shut down");

    while !shutdown.load(Ordering::Relaxed) {
        thread::sleep(SUPERVISOR_POLL);
    }

    info!("shutdown flag set, joining workers");
    for handle in workers {
        let _ = handle.join();
    }

    stats.log_summary();
    info!(
        clients_added = registry.clients_added.load(Ordering::Relaxed),
        clients_removed = registry.clients_removed.load(Ordering::Relaxed),
        udp_evictions = registry.udp_evictions.load(Ordering::Relaxed),
        "registry lifetime counters"
    );
    Ok(())
}

fn print_banner(config: &Config, partitions: usize, tcp_port: Option<u16>) {
    eprintln!("==============================================================");
    eprintln!("tickmatch - price-time-priority matching engine");
    eprintln!("==============================================================");
    eprintln!("Bind address:  {}", config.bind_addr);
    match tcp_port {
        Some(port) => eprintln!("TCP port:      {}", port),
        None => eprintln!("TCP:           disabled"),
    }
    if config.no_udp {
        eprintln!("UDP:           disabled");
    } else {
        eprintln!("UDP port:      {}", config.udp_port);
    }
    if config.no_multicast {
        eprintln!("Multicast:     disabled");
    } else {
        eprintln!("Multicast:     {}", config.multicast_target());
    }
    eprintln!("Partitions:    {}", partitions);
    eprintln!("Max clients:   {} TCP / {} UDP", config.max_clients, config.max_udp_clients);
    eprintln!("==============================================================");
}
