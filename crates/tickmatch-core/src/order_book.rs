//! Single-symbol order book with price-time priority.
//!
//! - One instance per symbol.
//! - Bids: descending by price (best = highest).
//! - Asks: ascending by price (best = lowest).
//! - FIFO (time-priority) within each price level.
//!
//! Cancels are resolved through an id index `(user_id, user_order_id)
//! -> (side, price)` so a cancel touches only the level that actually
//! holds the order.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::messages::{NewOrder, OutputMessage};
use crate::order::Order;
use crate::order_type::OrderType;
use crate::side::Side;
use crate::symbol::Symbol;

/// Single-symbol order book.
#[derive(Debug)]
pub struct OrderBook {
    symbol: Symbol,

    /// Bids: price -> FIFO queue of orders at that price.
    ///
    /// `BTreeMap` keys sort ascending; the highest key is the best bid.
    bids: BTreeMap<u32, VecDeque<Order>>,

    /// Asks: price -> FIFO queue of orders at that price.
    ///
    /// `BTreeMap` keys sort ascending; the lowest key is the best ask.
    asks: BTreeMap<u32, VecDeque<Order>>,

    /// Resting-order index: `(user_id, user_order_id) -> (side, price)`.
    ///
    /// Invariant: an entry exists here iff the order is present in the
    /// level the entry points at.
    ids: HashMap<(u32, u32), (Side, u32)>,

    /// Previous top-of-book `(price, total_qty)` per side, for change
    /// detection. `(0, 0)` means the side was eliminated.
    prev_best_bid: (u32, u32),
    prev_best_ask: (u32, u32),
}

impl OrderBook {
    /// Create a new order book for the given symbol.
    pub fn new(symbol: Symbol) -> Self {
        OrderBook {
            symbol,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            ids: HashMap::new(),
            prev_best_bid: (0, 0),
            prev_best_ask: (0, 0),
        }
    }

    /// Returns the symbol of this book.
    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    /// Process a new order, returning output messages in the contract
    /// order: the Ack first, then trades in execution order, then any
    /// top-of-book updates.
    ///
    /// Invalid orders (zero quantity, or a `(user, order)` id that is
    /// already resting) produce no output at all.
    pub fn add_order(&mut self, msg: &NewOrder) -> Vec<OutputMessage> {
        if msg.quantity == 0 {
            return Vec::new();
        }
        if self.ids.contains_key(&(msg.user_id, msg.user_order_id)) {
            return Vec::new();
        }

        let mut outputs = Vec::new();
        let mut order = Order::from_new_order_now(msg);

        outputs.push(OutputMessage::ack(
            self.symbol,
            order.user_id,
            order.user_order_id,
        ));

        // Match against the opposing side.
        self.match_incoming(&mut order, &mut outputs);

        // Rest any remainder; market remainders are discarded.
        if order.remaining_qty > 0 && order.order_type == OrderType::Limit {
            self.rest_order(order);
        }

        self.emit_top_of_book_changes(&mut outputs);

        debug_assert!(self.no_crossed_levels(), "book crossed after add");
        outputs
    }

    /// Cancel an order by `(user_id, user_order_id)`.
    ///
    /// Unknown ids (including ids owned by a different user) are ignored
    /// without output. A successful cancel emits a CancelAck followed by
    /// a top-of-book update when the best level changed or emptied.
    pub fn cancel_order(&mut self, user_id: u32, user_order_id: u32) -> Vec<OutputMessage> {
        let key = (user_id, user_order_id);
        let Some(&(side, price)) = self.ids.get(&key) else {
            return Vec::new();
        };

        let levels = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let mut level_emptied = false;
        if let Some(queue) = levels.get_mut(&price) {
            if let Some(pos) = queue
                .iter()
                .position(|o| o.user_id == user_id && o.user_order_id == user_order_id)
            {
                queue.remove(pos);
            }
            level_emptied = queue.is_empty();
        }
        if level_emptied {
            levels.remove(&price);
        }
        self.ids.remove(&key);

        let mut outputs = vec![OutputMessage::cancel_ack(
            self.symbol,
            user_id,
            user_order_id,
        )];
        self.emit_top_of_book_changes(&mut outputs);
        outputs
    }

    /// Remove every resting order.
    ///
    /// Emits a CancelAck per removed order (Buy side first, price
    /// priority then time priority) followed by an eliminated
    /// top-of-book for each side that held orders.
    pub fn flush(&mut self) -> Vec<OutputMessage> {
        let mut outputs = Vec::new();

        for queue in self.bids.values().rev() {
            for order in queue {
                outputs.push(OutputMessage::cancel_ack(
                    self.symbol,
                    order.user_id,
                    order.user_order_id,
                ));
            }
        }
        for queue in self.asks.values() {
            for order in queue {
                outputs.push(OutputMessage::cancel_ack(
                    self.symbol,
                    order.user_id,
                    order.user_order_id,
                ));
            }
        }

        let had_bids = !self.bids.is_empty();
        let had_asks = !self.asks.is_empty();

        self.bids.clear();
        self.asks.clear();
        self.ids.clear();
        self.prev_best_bid = (0, 0);
        self.prev_best_ask = (0, 0);

        if had_bids {
            outputs.push(OutputMessage::top_of_book_eliminated(self.symbol, Side::Buy));
        }
        if had_asks {
            outputs.push(OutputMessage::top_of_book_eliminated(self.symbol, Side::Sell));
        }

        outputs
    }

    /// Best `(price, total_quantity)` for a side; `(0, 0)` when the side
    /// is eliminated.
    pub fn best(&self, side: Side) -> (u32, u32) {
        let level = match side {
            Side::Buy => self.bids.iter().next_back(),
            Side::Sell => self.asks.iter().next(),
        };
        level
            .map(|(price, queue)| (*price, Self::level_quantity(queue)))
            .unwrap_or((0, 0))
    }

    /// Whether `(user_id, user_order_id)` is currently resting here.
    pub fn has_order(&self, user_id: u32, user_order_id: u32) -> bool {
        self.ids.contains_key(&(user_id, user_order_id))
    }

    /// Number of resting orders.
    pub fn open_orders(&self) -> usize {
        self.ids.len()
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    /// Match an incoming order against the opposing side, appending a
    /// Trade per fill. Trade price is the resting order's price; buyer
    /// fields always describe the Buy side.
    fn match_incoming(&mut self, order: &mut Order, outputs: &mut Vec<OutputMessage>) {
        loop {
            if order.remaining_qty == 0 {
                break;
            }

            let level_price = match order.side {
                Side::Buy => self.asks.keys().next().copied(),
                Side::Sell => self.bids.keys().next_back().copied(),
            };
            let Some(level_price) = level_price else { break };

            let crosses = match order.order_type {
                OrderType::Market => true,
                OrderType::Limit => match order.side {
                    Side::Buy => order.price >= level_price,
                    Side::Sell => order.price <= level_price,
                },
            };
            if !crosses {
                break;
            }

            let opposing = match order.side {
                Side::Buy => &mut self.asks,
                Side::Sell => &mut self.bids,
            };
            let Some(queue) = opposing.get_mut(&level_price) else {
                break;
            };

            while order.remaining_qty > 0 {
                let Some(resting) = queue.front_mut() else { break };

                let qty = order.remaining_qty.min(resting.remaining_qty);
                let trade = match order.side {
                    Side::Buy => OutputMessage::trade(
                        self.symbol,
                        order.user_id,
                        order.user_order_id,
                        resting.user_id,
                        resting.user_order_id,
                        level_price,
                        qty,
                    ),
                    Side::Sell => OutputMessage::trade(
                        self.symbol,
                        resting.user_id,
                        resting.user_order_id,
                        order.user_id,
                        order.user_order_id,
                        level_price,
                        qty,
                    ),
                };
                outputs.push(trade);

                order.fill(qty);
                resting.fill(qty);

                if resting.is_filled() {
                    let key = (resting.user_id, resting.user_order_id);
                    queue.pop_front();
                    self.ids.remove(&key);
                }
            }

            let now_empty = queue.is_empty();
            if now_empty {
                opposing.remove(&level_price);
            }
        }
    }

    /// Append a remaining limit order to the tail of its price level and
    /// index it for cancels.
    fn rest_order(&mut self, order: Order) {
        let key = (order.user_id, order.user_order_id);
        self.ids.insert(key, (order.side, order.price));

        let levels = match order.side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        levels.entry(order.price).or_default().push_back(order);
    }

    /// Emit a top-of-book event for each side whose best level changed
    /// since the last emission.
    fn emit_top_of_book_changes(&mut self, outputs: &mut Vec<OutputMessage>) {
        let bid = self.best(Side::Buy);
        if bid != self.prev_best_bid {
            outputs.push(if bid == (0, 0) {
                OutputMessage::top_of_book_eliminated(self.symbol, Side::Buy)
            } else {
                OutputMessage::top_of_book(self.symbol, Side::Buy, bid.0, bid.1)
            });
            self.prev_best_bid = bid;
        }

        let ask = self.best(Side::Sell);
        if ask != self.prev_best_ask {
            outputs.push(if ask == (0, 0) {
                OutputMessage::top_of_book_eliminated(self.symbol, Side::Sell)
            } else {
                OutputMessage::top_of_book(self.symbol, Side::Sell, ask.0, ask.1)
            });
            self.prev_best_ask = ask;
        }
    }

    /// Sum of remaining quantity across all orders at one price level.
    fn level_quantity(queue: &VecDeque<Order>) -> u32 {
        queue.iter().map(|o| o.remaining_qty).sum()
    }

    /// True when no buy level prices at or above any sell level.
    fn no_crossed_levels(&self) -> bool {
        match (self.bids.keys().next_back(), self.asks.keys().next()) {
            (Some(&best_bid), Some(&best_ask)) => best_bid < best_ask,
            _ => true,
        }
    }
}
