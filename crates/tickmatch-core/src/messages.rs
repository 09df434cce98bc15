//! Message types used by the core matching engine.
//!
//! These are **transport-agnostic** logical messages:
//! - [`InputMessage`]: what the engine consumes.
//! - [`OutputMessage`]: what the engine produces.
//!
//! All output messages are symbol-aware so the routing layer can address
//! them without extra context, and every message is `Copy` so envelopes
//! move through the queues without touching the heap.
//!
//! Binary / CSV encoders live in the `tickmatch-wire` crate; this module
//! is purely logical.

use crate::order_type::OrderType;
use crate::side::Side;
use crate::symbol::Symbol;

/// A request into the matching engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMessage {
    /// New order: market (price = 0) or limit (price > 0).
    NewOrder(NewOrder),

    /// Cancel an existing order by `(user_id, user_order_id)`.
    Cancel(Cancel),

    /// Flush all order books and internal state.
    Flush,
}

impl InputMessage {
    /// The symbol this message routes by, if it has one. `Flush` is
    /// symbol-less and is delivered to every partition.
    pub fn symbol(&self) -> Option<Symbol> {
        match self {
            InputMessage::NewOrder(n) => Some(n.symbol),
            InputMessage::Cancel(_) | InputMessage::Flush => None,
        }
    }
}

/// An event emitted by the matching engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMessage {
    /// Acknowledgement of a new order.
    Ack(Ack),

    /// Acknowledgement of a cancel request.
    CancelAck(CancelAck),

    /// Trade event between a buyer and a seller.
    Trade(Trade),

    /// Top-of-book change.
    TopOfBook(TopOfBook),
}

/// New order message (input).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewOrder {
    /// User identifier (logical session / account).
    pub user_id: u32,

    /// Instrument symbol.
    pub symbol: Symbol,

    /// Price in integer ticks; `0` denotes a market order.
    pub price: u32,

    /// Original quantity.
    pub quantity: u32,

    /// Buy or Sell.
    pub side: Side,

    /// User-local order identifier (for cancelling later).
    pub user_order_id: u32,
}

impl NewOrder {
    /// Market vs limit, derived from the price.
    pub fn order_type(&self) -> OrderType {
        OrderType::from_price(self.price)
    }
}

/// Cancel message (input).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancel {
    pub user_id: u32,
    pub user_order_id: u32,
}

/// Acknowledgement of a new order (output).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub symbol: Symbol,
    pub user_id: u32,
    pub user_order_id: u32,
}

/// Acknowledgement of a cancel request (output).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelAck {
    pub symbol: Symbol,
    pub user_id: u32,
    pub user_order_id: u32,
}

/// Trade event (output).
///
/// Buyer fields always describe the Buy side of the fill regardless of
/// which order was resting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trade {
    pub symbol: Symbol,

    pub user_id_buy: u32,
    pub user_order_id_buy: u32,

    pub user_id_sell: u32,
    pub user_order_id_sell: u32,

    pub price: u32,
    pub quantity: u32,
}

/// Top-of-book event (output).
///
/// `price == 0 && total_quantity == 0` is the wire encoding of an
/// eliminated side; [`TopOfBook::eliminated`] spells that out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopOfBook {
    pub symbol: Symbol,

    /// Side this event refers to.
    pub side: Side,

    /// Best price; `0` when the side is eliminated.
    pub price: u32,

    /// Total quantity at the best price; `0` when eliminated.
    pub total_quantity: u32,
}

impl TopOfBook {
    /// True when the side holds no resting orders.
    pub fn eliminated(&self) -> bool {
        self.price == 0 && self.total_quantity == 0
    }
}

// -----------------------------------------------------------------------------
// Convenience constructors
// -----------------------------------------------------------------------------

impl OutputMessage {
    pub fn ack(symbol: Symbol, user_id: u32, user_order_id: u32) -> Self {
        OutputMessage::Ack(Ack {
            symbol,
            user_id,
            user_order_id,
        })
    }

    pub fn cancel_ack(symbol: Symbol, user_id: u32, user_order_id: u32) -> Self {
        OutputMessage::CancelAck(CancelAck {
            symbol,
            user_id,
            user_order_id,
        })
    }

    pub fn trade(
        symbol: Symbol,
        user_id_buy: u32,
        user_order_id_buy: u32,
        user_id_sell: u32,
        user_order_id_sell: u32,
        price: u32,
        quantity: u32,
    ) -> Self {
        OutputMessage::Trade(Trade {
            symbol,
            user_id_buy,
            user_order_id_buy,
            user_id_sell,
            user_order_id_sell,
            price,
            quantity,
        })
    }

    pub fn top_of_book(symbol: Symbol, side: Side, price: u32, total_quantity: u32) -> Self {
        OutputMessage::TopOfBook(TopOfBook {
            symbol,
            side,
            price,
            total_quantity,
        })
    }

    pub fn top_of_book_eliminated(symbol: Symbol, side: Side) -> Self {
        OutputMessage::TopOfBook(TopOfBook {
            symbol,
            side,
            price: 0,
            total_quantity: 0,
        })
    }
}
