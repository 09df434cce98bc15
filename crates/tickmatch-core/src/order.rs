//! Internal order representation used inside the order book.
//!
//! This type is **not** exposed over the wire; it's purely internal to
//! the tickmatch-core crate. Time priority within a price level is FIFO
//! by insertion, so the timestamp is metadata for observability rather
//! than an ordering key.

use std::sync::OnceLock;
use std::time::Instant;

use crate::messages::NewOrder;
use crate::order_type::OrderType;
use crate::side::Side;
use crate::symbol::Symbol;

/// A single order resting in, or matching against, the book.
#[derive(Debug, Clone, Copy)]
pub struct Order {
    // Order identification
    pub user_id: u32,
    pub user_order_id: u32,
    pub symbol: Symbol,

    // Order details
    pub price: u32,         // 0 = market, >0 = limit
    pub quantity: u32,      // original quantity
    pub remaining_qty: u32, // remaining unfilled quantity
    pub side: Side,
    pub order_type: OrderType,

    // Arrival time (monotonic nanoseconds since process start)
    pub timestamp_ns: u64,
}

impl Order {
    /// Construct an `Order` from a [`NewOrder`] message and a given
    /// arrival timestamp.
    pub fn from_new_order(msg: &NewOrder, timestamp_ns: u64) -> Self {
        Order {
            user_id: msg.user_id,
            user_order_id: msg.user_order_id,
            symbol: msg.symbol,
            price: msg.price,
            quantity: msg.quantity,
            remaining_qty: msg.quantity,
            side: msg.side,
            order_type: msg.order_type(),
            timestamp_ns,
        }
    }

    /// Construct from a `NewOrder` stamped with the current monotonic
    /// time.
    pub fn from_new_order_now(msg: &NewOrder) -> Self {
        Self::from_new_order(msg, monotonic_ns())
    }

    /// Returns `true` if the order is fully filled.
    pub fn is_filled(&self) -> bool {
        self.remaining_qty == 0
    }

    /// Fill the order by up to `qty` units; returns the quantity
    /// actually filled (`<= qty` and `<= remaining_qty`).
    pub fn fill(&mut self, qty: u32) -> u32 {
        let filled = qty.min(self.remaining_qty);
        self.remaining_qty -= filled;
        filled
    }
}

/// Monotonic nanoseconds since the first call in this process.
///
/// Unlike wall-clock time this can never go backwards, which keeps
/// per-book arrival stamps strictly non-decreasing.
pub fn monotonic_ns() -> u64 {
    static ANCHOR: OnceLock<Instant> = OnceLock::new();
    let anchor = *ANCHOR.get_or_init(Instant::now);
    anchor.elapsed().as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_ns_never_decreases() {
        let a = monotonic_ns();
        let b = monotonic_ns();
        assert!(b >= a);
    }

    #[test]
    fn fill_is_clamped_to_remaining() {
        let msg = NewOrder {
            user_id: 1,
            symbol: Symbol::from_bytes(b"IBM"),
            price: 100,
            quantity: 10,
            side: Side::Buy,
            user_order_id: 1,
        };
        let mut order = Order::from_new_order(&msg, 0);
        assert_eq!(order.fill(4), 4);
        assert_eq!(order.remaining_qty, 6);
        assert_eq!(order.fill(100), 6);
        assert!(order.is_filled());
    }
}
