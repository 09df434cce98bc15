//! tickmatch-core
//!
//! Pure matching engine logic:
//! - symbols, sides, order representation
//! - messages (input/output types)
//! - per-symbol order book with price-time priority
//! - multi-symbol matching engine
//! - symbol partitioning for the dual-processor model

pub mod matching_engine;
pub mod messages;
pub mod order;
pub mod order_book;
pub mod order_type;
pub mod partition;
pub mod side;
pub mod symbol;

pub use matching_engine::{MatchingEngine, DEFAULT_MAX_OPEN_ORDERS};
pub use messages::{Ack, Cancel, CancelAck, InputMessage, NewOrder, OutputMessage, TopOfBook, Trade};
pub use order::Order;
pub use order_book::OrderBook;
pub use order_type::OrderType;
pub use partition::{partition_of, DUAL_PARTITIONS};
pub use side::Side;
pub use symbol::Symbol;
