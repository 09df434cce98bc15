//! Line-oriented text protocol.
//!
//! Input lines (comma-separated, whitespace around commas tolerated):
//!
//! - New order: `N, user(int), symbol, price(int), qty(int), B|S, userOrderId(int)`
//! - Cancel:    `C, user(int), userOrderId(int)`
//! - Flush:     `F`
//!
//! Output lines:
//!
//! - Ack:       `A, symbol, user, userOrderId`
//! - CancelAck: `C, symbol, user, userOrderId`
//! - Trade:     `T, symbol, buyUser, buyOrderId, sellUser, sellOrderId, price, qty`
//! - TopOfBook: `B, symbol, B|S, price, qty` with `-` for both fields on
//!   an eliminated side.

use tickmatch_core::{Cancel, InputMessage, NewOrder, OutputMessage, Side, Symbol};

/// Parse a single text line into an [`InputMessage`].
///
/// Returns `None` for blank lines and comments (starting with `#`);
/// malformed lines also return `None` and the caller counts them as
/// decode errors.
pub fn parse_input_line(line: &str) -> Option<InputMessage> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let tokens: Vec<&str> = trimmed.split(',').map(str::trim).collect();

    match tokens[0] {
        "N" => parse_new_order(&tokens),
        "C" => parse_cancel(&tokens),
        "F" => (tokens.len() == 1).then_some(InputMessage::Flush),
        _ => None,
    }
}

/// True when a line deserves a decode-error count: non-blank,
/// non-comment, and unparseable.
pub fn line_is_noise(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with('#')
}

fn parse_new_order(tokens: &[&str]) -> Option<InputMessage> {
    if tokens.len() != 7 {
        return None;
    }

    let user_id = tokens[1].parse::<u32>().ok()?;
    let symbol = tokens[2].parse::<Symbol>().ok()?;
    let price = tokens[3].parse::<u32>().ok()?;
    let quantity = tokens[4].parse::<u32>().ok()?;
    if quantity == 0 {
        return None;
    }

    let side_token = tokens[5].as_bytes();
    if side_token.len() != 1 {
        return None;
    }
    let side = Side::from_byte(side_token[0])?;

    let user_order_id = tokens[6].parse::<u32>().ok()?;

    Some(InputMessage::NewOrder(NewOrder {
        user_id,
        symbol,
        price,
        quantity,
        side,
        user_order_id,
    }))
}

fn parse_cancel(tokens: &[&str]) -> Option<InputMessage> {
    if tokens.len() != 3 {
        return None;
    }

    let user_id = tokens[1].parse::<u32>().ok()?;
    let user_order_id = tokens[2].parse::<u32>().ok()?;

    Some(InputMessage::Cancel(Cancel {
        user_id,
        user_order_id,
    }))
}

/// Format an [`OutputMessage`] as a text line (without the trailing
/// newline).
pub fn format_output_line(msg: &OutputMessage) -> String {
    match msg {
        OutputMessage::Ack(a) => {
            format!("A, {}, {}, {}", a.symbol, a.user_id, a.user_order_id)
        }
        OutputMessage::CancelAck(c) => {
            format!("C, {}, {}, {}", c.symbol, c.user_id, c.user_order_id)
        }
        OutputMessage::Trade(t) => format!(
            "T, {}, {}, {}, {}, {}, {}, {}",
            t.symbol,
            t.user_id_buy,
            t.user_order_id_buy,
            t.user_id_sell,
            t.user_order_id_sell,
            t.price,
            t.quantity
        ),
        OutputMessage::TopOfBook(b) => {
            if b.eliminated() {
                format!("B, {}, {}, -, -", b.symbol, b.side.as_char())
            } else {
                format!(
                    "B, {}, {}, {}, {}",
                    b.symbol,
                    b.side.as_char(),
                    b.price,
                    b.total_quantity
                )
            }
        }
    }
}
