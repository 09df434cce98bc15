//! Binary encoding/decoding for engine messages.
//!
//! Layouts (network byte order, symbols 8-byte null-padded, no padding
//! between fields):
//!
//! ```text
//! Input (client -> server)
//! ------------------------
//! NewOrder  (27): magic 'N' user_id(4) symbol(8) price(4) qty(4) side('B'|'S') user_order_id(4)
//! Cancel    (10): magic 'C' user_id(4) user_order_id(4)
//! Flush     ( 2): magic 'F'
//!
//! Output (server -> client)
//! -------------------------
//! Ack       (18): magic 'A' symbol(8) user_id(4) user_order_id(4)
//! CancelAck (18): magic 'X' symbol(8) user_id(4) user_order_id(4)
//! Trade     (34): magic 'T' symbol(8) buy_user(4) buy_order(4) sell_user(4) sell_order(4) price(4) qty(4)
//! TopOfBook (19): magic 'B' symbol(8) side(1) price(4) qty(4)
//! ```
//!
//! A TopOfBook with `price == 0 && qty == 0` encodes an eliminated side.
//!
//! These functions work on exactly one message at the head of the
//! buffer; stream framing and resynchronisation live in [`crate::framing`].

use std::fmt;

use tickmatch_core::{
    Cancel, InputMessage, NewOrder, OutputMessage, Side, Symbol, TopOfBook,
};

use crate::wire_types::{
    input_frame_len, ACK_LEN, CANCEL_ACK_LEN, CANCEL_LEN, FLUSH_LEN, MAGIC, NEW_ORDER_LEN,
    TOP_OF_BOOK_LEN, TRADE_LEN, TYPE_ACK, TYPE_CANCEL, TYPE_CANCEL_ACK, TYPE_FLUSH,
    TYPE_NEW_ORDER, TYPE_TOP_OF_BOOK, TYPE_TRADE,
};

/// Errors that can arise when decoding a binary frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// Buffer too short for the expected fields.
    Truncated,
    /// First byte is not the protocol magic.
    BadMagic(u8),
    /// Unknown or unsupported message type byte.
    UnknownMessageType(u8),
    /// A field holds an invalid value (bad side, zero quantity, ...).
    InvalidField(&'static str),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::Truncated => write!(f, "buffer truncated"),
            WireError::BadMagic(b) => write!(f, "bad magic byte: 0x{:02X}", b),
            WireError::UnknownMessageType(t) => write!(f, "unknown message type: 0x{:02X}", t),
            WireError::InvalidField(field) => write!(f, "invalid field: {}", field),
        }
    }
}

impl std::error::Error for WireError {}

// ============================================================================
// INPUT: client -> server
// ============================================================================

/// Decode the input message at the head of `buf`.
///
/// `buf` must hold the whole frame; trailing bytes are ignored. Use
/// [`input_frame_len`] to find the frame boundary first.
pub fn decode_input(buf: &[u8]) -> Result<InputMessage, WireError> {
    if buf.len() < FLUSH_LEN {
        return Err(WireError::Truncated);
    }
    if buf[0] != MAGIC {
        return Err(WireError::BadMagic(buf[0]));
    }

    let type_byte = buf[1];
    let frame_len = input_frame_len(type_byte).ok_or(WireError::UnknownMessageType(type_byte))?;
    if buf.len() < frame_len {
        return Err(WireError::Truncated);
    }

    match type_byte {
        TYPE_NEW_ORDER => decode_new_order(buf),
        TYPE_CANCEL => decode_cancel(buf),
        TYPE_FLUSH => Ok(InputMessage::Flush),
        _ => unreachable!("input_frame_len filtered the type byte"),
    }
}

/// Encode a single input message, appending the frame to `out`.
pub fn encode_input(msg: &InputMessage, out: &mut Vec<u8>) {
    match msg {
        InputMessage::NewOrder(n) => encode_new_order(n, out),
        InputMessage::Cancel(c) => encode_cancel(c, out),
        InputMessage::Flush => {
            out.push(MAGIC);
            out.push(TYPE_FLUSH);
        }
    }
}

fn decode_new_order(buf: &[u8]) -> Result<InputMessage, WireError> {
    let user_id = read_u32_be(&buf[2..6]);
    let symbol = read_symbol(&buf[6..14]);
    let price = read_u32_be(&buf[14..18]);
    let quantity = read_u32_be(&buf[18..22]);
    let side = Side::from_byte(buf[22]).ok_or(WireError::InvalidField("side"))?;
    let user_order_id = read_u32_be(&buf[23..27]);

    if quantity == 0 {
        return Err(WireError::InvalidField("quantity"));
    }
    if symbol.is_empty() {
        return Err(WireError::InvalidField("symbol"));
    }

    Ok(InputMessage::NewOrder(NewOrder {
        user_id,
        symbol,
        price,
        quantity,
        side,
        user_order_id,
    }))
}

fn decode_cancel(buf: &[u8]) -> Result<InputMessage, WireError> {
    let user_id = read_u32_be(&buf[2..6]);
    let user_order_id = read_u32_be(&buf[6..10]);

    Ok(InputMessage::Cancel(Cancel {
        user_id,
        user_order_id,
    }))
}

fn encode_new_order(n: &NewOrder, out: &mut Vec<u8>) {
    out.reserve(NEW_ORDER_LEN);
    out.push(MAGIC);
    out.push(TYPE_NEW_ORDER);
    out.extend_from_slice(&n.user_id.to_be_bytes());
    out.extend_from_slice(n.symbol.as_wire());
    out.extend_from_slice(&n.price.to_be_bytes());
    out.extend_from_slice(&n.quantity.to_be_bytes());
    out.push(n.side.as_byte());
    out.extend_from_slice(&n.user_order_id.to_be_bytes());
}

fn encode_cancel(c: &Cancel, out: &mut Vec<u8>) {
    out.reserve(CANCEL_LEN);
    out.push(MAGIC);
    out.push(TYPE_CANCEL);
    out.extend_from_slice(&c.user_id.to_be_bytes());
    out.extend_from_slice(&c.user_order_id.to_be_bytes());
}

// ============================================================================
// OUTPUT: server -> client
// ============================================================================

/// Encode a single output message, appending the frame to `out`.
pub fn encode_output(msg: &OutputMessage, out: &mut Vec<u8>) {
    match msg {
        OutputMessage::Ack(a) => {
            out.reserve(ACK_LEN);
            out.push(MAGIC);
            out.push(TYPE_ACK);
            out.extend_from_slice(a.symbol.as_wire());
            out.extend_from_slice(&a.user_id.to_be_bytes());
            out.extend_from_slice(&a.user_order_id.to_be_bytes());
        }
        OutputMessage::CancelAck(c) => {
            out.reserve(CANCEL_ACK_LEN);
            out.push(MAGIC);
            out.push(TYPE_CANCEL_ACK);
            out.extend_from_slice(c.symbol.as_wire());
            out.extend_from_slice(&c.user_id.to_be_bytes());
            out.extend_from_slice(&c.user_order_id.to_be_bytes());
        }
        OutputMessage::Trade(t) => {
            out.reserve(TRADE_LEN);
            out.push(MAGIC);
            out.push(TYPE_TRADE);
            out.extend_from_slice(t.symbol.as_wire());
            out.extend_from_slice(&t.user_id_buy.to_be_bytes());
            out.extend_from_slice(&t.user_order_id_buy.to_be_bytes());
            out.extend_from_slice(&t.user_id_sell.to_be_bytes());
            out.extend_from_slice(&t.user_order_id_sell.to_be_bytes());
            out.extend_from_slice(&t.price.to_be_bytes());
            out.extend_from_slice(&t.quantity.to_be_bytes());
        }
        OutputMessage::TopOfBook(b) => {
            out.reserve(TOP_OF_BOOK_LEN);
            out.push(MAGIC);
            out.push(TYPE_TOP_OF_BOOK);
            out.extend_from_slice(b.symbol.as_wire());
            out.push(b.side.as_byte());
            out.extend_from_slice(&b.price.to_be_bytes());
            out.extend_from_slice(&b.total_quantity.to_be_bytes());
        }
    }
}

/// Decode the output message at the head of `buf`.
///
/// This is the client-side mirror of [`encode_output`]; the server uses
/// it only in tests.
pub fn decode_output(buf: &[u8]) -> Result<OutputMessage, WireError> {
    if buf.len() < 2 {
        return Err(WireError::Truncated);
    }
    if buf[0] != MAGIC {
        return Err(WireError::BadMagic(buf[0]));
    }

    let type_byte = buf[1];
    let frame_len = crate::wire_types::output_frame_len(type_byte)
        .ok_or(WireError::UnknownMessageType(type_byte))?;
    if buf.len() < frame_len {
        return Err(WireError::Truncated);
    }

    match type_byte {
        TYPE_ACK => Ok(OutputMessage::ack(
            read_symbol(&buf[2..10]),
            read_u32_be(&buf[10..14]),
            read_u32_be(&buf[14..18]),
        )),
        TYPE_CANCEL_ACK => Ok(OutputMessage::cancel_ack(
            read_symbol(&buf[2..10]),
            read_u32_be(&buf[10..14]),
            read_u32_be(&buf[14..18]),
        )),
        TYPE_TRADE => Ok(OutputMessage::trade(
            read_symbol(&buf[2..10]),
            read_u32_be(&buf[10..14]),
            read_u32_be(&buf[14..18]),
            read_u32_be(&buf[18..22]),
            read_u32_be(&buf[22..26]),
            read_u32_be(&buf[26..30]),
            read_u32_be(&buf[30..34]),
        )),
        TYPE_TOP_OF_BOOK => {
            let symbol = read_symbol(&buf[2..10]);
            let side = Side::from_byte(buf[10]).ok_or(WireError::InvalidField("side"))?;
            let price = read_u32_be(&buf[11..15]);
            let total_quantity = read_u32_be(&buf[15..19]);
            Ok(OutputMessage::TopOfBook(TopOfBook {
                symbol,
                side,
                price,
                total_quantity,
            }))
        }
        _ => unreachable!("output_frame_len filtered the type byte"),
    }
}

// -----------------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------------

fn read_u32_be(bytes: &[u8]) -> u32 {
    let mut arr = [0u8; 4];
    arr.copy_from_slice(&bytes[0..4]);
    u32::from_be_bytes(arr)
}

fn read_symbol(bytes: &[u8]) -> Symbol {
    let mut raw = [0u8; Symbol::LEN];
    raw.copy_from_slice(&bytes[0..Symbol::LEN]);
    Symbol::from_wire(raw)
}
