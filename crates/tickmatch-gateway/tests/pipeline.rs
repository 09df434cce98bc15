//! The full fabric end-to-end: dispatch through the partition queues,
//! two live processors, and the router, out to a real client socket.

use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tickmatch_core::{InputMessage, NewOrder, Side, Symbol};
use tickmatch_gateway::ingress::IngressShared;
use tickmatch_gateway::processor::Processor;
use tickmatch_gateway::queue::spsc;
use tickmatch_gateway::registry::ClientRegistry;
use tickmatch_gateway::router::OutputRouter;
use tickmatch_gateway::stats::Stats;
use tickmatch_gateway::user_map::UserClientMap;
use tickmatch_wire::{Framing, WireProtocol};

fn order(user: u32, symbol: &str, price: u32, qty: u32, side: Side, oid: u32) -> InputMessage {
    InputMessage::NewOrder(NewOrder {
        user_id: user,
        symbol: Symbol::from_bytes(symbol.as_bytes()),
        price,
        quantity: qty,
        side,
        user_order_id: oid,
    })
}

#[test]
fn orders_for_both_partitions_come_back_acked_in_per_symbol_order() {
    let shutdown = Arc::new(AtomicBool::new(false));
    let stats = Arc::new(Stats::new());
    let registry = Arc::new(ClientRegistry::new(16));
    let user_map = Arc::new(UserClientMap::new());

    // Two partitions of queues and processors.
    let mut input_producers = Vec::new();
    let mut output_consumers = Vec::new();
    let mut workers = Vec::new();
    for partition in 0..2 {
        let (input_tx, input_rx) = spsc(1024);
        let (output_tx, output_rx) = spsc(1024);
        input_producers.push(Arc::new(Mutex::new(input_tx)));
        output_consumers.push(output_rx);
        let processor = Processor::new(
            partition,
            input_rx,
            output_tx,
            stats.clone(),
            shutdown.clone(),
        );
        workers.push(thread::spawn(move || processor.run()));
    }

    // A text TCP client on loopback.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    client
        .set_read_timeout(Some(Duration::from_millis(100)))
        .unwrap();
    let (accepted, _) = listener.accept().unwrap();
    let client_id = registry.register_tcp(Arc::new(accepted));
    registry.set_wire(client_id, WireProtocol::Text, Framing::Text);

    let router = OutputRouter::new(
        output_consumers,
        registry.clone(),
        user_map.clone(),
        stats.clone(),
        shutdown.clone(),
        None,
        None,
    );
    workers.push(thread::spawn(move || router.run()));

    // Submit one order per partition, as if parsed by ingress.
    let shared = IngressShared {
        inputs: input_producers,
        registry,
        user_map,
        stats,
        shutdown: shutdown.clone(),
    };
    let mut seq = 0;
    assert!(shared.dispatch(client_id, &mut seq, order(1, "AAPL", 100, 1, Side::Buy, 1)));
    assert!(shared.dispatch(client_id, &mut seq, order(1, "ZZTOP", 200, 1, Side::Buy, 2)));

    // Each order produces an Ack and a top-of-book line.
    let mut received = String::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut chunk = [0u8; 1024];
    while received.lines().count() < 4 && Instant::now() < deadline {
        if let Ok(n) = client.read(&mut chunk) {
            received.push_str(std::str::from_utf8(&chunk[..n]).unwrap());
        }
    }

    shutdown.store(true, Ordering::Relaxed);
    for worker in workers {
        worker.join().unwrap();
    }

    let lines: Vec<&str> = received.lines().collect();
    assert_eq!(lines.len(), 4, "lines: {lines:?}");

    // Partition interleaving is unspecified, but per symbol the Ack
    // must precede the top-of-book update.
    for (symbol, ack, tob) in [
        ("AAPL", "A, AAPL, 1, 1", "B, AAPL, B, 100, 1"),
        ("ZZTOP", "A, ZZTOP, 1, 2", "B, ZZTOP, B, 200, 1"),
    ] {
        let per_symbol: Vec<&str> = lines
            .iter()
            .copied()
            .filter(|l| l.contains(symbol))
            .collect();
        assert_eq!(per_symbol, vec![ack, tob]);
    }
}
