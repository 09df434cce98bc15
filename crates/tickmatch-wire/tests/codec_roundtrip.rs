//! Byte-exact layout checks and encode/decode round trips for both
//! codecs.

use tickmatch_core::{Cancel, InputMessage, NewOrder, OutputMessage, Side, Symbol};
use tickmatch_wire::{
    binary_codec, csv_codec,
    wire_types::{ACK_LEN, CANCEL_ACK_LEN, CANCEL_LEN, FLUSH_LEN, NEW_ORDER_LEN, TOP_OF_BOOK_LEN, TRADE_LEN},
};

fn sym(s: &str) -> Symbol {
    Symbol::from_bytes(s.as_bytes())
}

fn encode_in(msg: &InputMessage) -> Vec<u8> {
    let mut out = Vec::new();
    binary_codec::encode_input(msg, &mut out);
    out
}

fn encode_out(msg: &OutputMessage) -> Vec<u8> {
    let mut out = Vec::new();
    binary_codec::encode_output(msg, &mut out);
    out
}

fn sample_new_order() -> InputMessage {
    InputMessage::NewOrder(NewOrder {
        user_id: 1,
        symbol: sym("IBM"),
        price: 100,
        quantity: 50,
        side: Side::Buy,
        user_order_id: 1,
    })
}

#[test]
fn new_order_layout_is_bit_exact() {
    let bytes = encode_in(&sample_new_order());
    assert_eq!(
        bytes,
        vec![
            0x4D, b'N', // magic, type
            0, 0, 0, 1, // user_id
            b'I', b'B', b'M', 0, 0, 0, 0, 0, // symbol, null-padded
            0, 0, 0, 100, // price
            0, 0, 0, 50, // quantity
            b'B', // side
            0, 0, 0, 1, // user_order_id
        ]
    );
}

#[test]
fn frame_sizes_are_exact() {
    assert_eq!(encode_in(&sample_new_order()).len(), NEW_ORDER_LEN);
    assert_eq!(
        encode_in(&InputMessage::Cancel(Cancel {
            user_id: 7,
            user_order_id: 9,
        }))
        .len(),
        CANCEL_LEN
    );
    assert_eq!(encode_in(&InputMessage::Flush).len(), FLUSH_LEN);

    assert_eq!(encode_out(&OutputMessage::ack(sym("IBM"), 1, 2)).len(), ACK_LEN);
    assert_eq!(
        encode_out(&OutputMessage::cancel_ack(sym("IBM"), 1, 2)).len(),
        CANCEL_ACK_LEN
    );
    assert_eq!(
        encode_out(&OutputMessage::trade(sym("IBM"), 1, 1, 2, 2, 100, 50)).len(),
        TRADE_LEN
    );
    assert_eq!(
        encode_out(&OutputMessage::top_of_book(sym("IBM"), Side::Buy, 100, 50)).len(),
        TOP_OF_BOOK_LEN
    );
}

#[test]
fn binary_input_round_trips() {
    let messages = [
        sample_new_order(),
        InputMessage::NewOrder(NewOrder {
            user_id: u32::MAX,
            symbol: sym("ZZTOP"),
            price: 0,
            quantity: u32::MAX,
            side: Side::Sell,
            user_order_id: u32::MAX,
        }),
        InputMessage::Cancel(Cancel {
            user_id: 42,
            user_order_id: 4242,
        }),
        InputMessage::Flush,
    ];

    for msg in messages {
        let bytes = encode_in(&msg);
        assert_eq!(binary_codec::decode_input(&bytes).unwrap(), msg);
    }
}

#[test]
fn binary_output_round_trips() {
    let messages = [
        OutputMessage::ack(sym("IBM"), 1, 1),
        OutputMessage::cancel_ack(sym("ABCDEFGH"), 2, 3),
        OutputMessage::trade(sym("IBM"), 1, 1, 2, 2, 100, 50),
        OutputMessage::top_of_book(sym("IBM"), Side::Sell, 105, 50),
        OutputMessage::top_of_book_eliminated(sym("IBM"), Side::Buy),
    ];

    for msg in messages {
        let bytes = encode_out(&msg);
        assert_eq!(binary_codec::decode_output(&bytes).unwrap(), msg);
    }
}

#[test]
fn eliminated_top_of_book_is_all_zero_price_and_qty() {
    let bytes = encode_out(&OutputMessage::top_of_book_eliminated(sym("IBM"), Side::Sell));
    assert_eq!(&bytes[11..19], &[0u8; 8]);
}

#[test]
fn truncated_and_garbled_buffers_are_rejected() {
    let full = encode_in(&sample_new_order());
    for n in 0..full.len() {
        assert!(binary_codec::decode_input(&full[..n]).is_err());
    }

    let mut bad_magic = full.clone();
    bad_magic[0] = 0x4E;
    assert!(binary_codec::decode_input(&bad_magic).is_err());

    let mut bad_type = full.clone();
    bad_type[1] = b'Q';
    assert!(binary_codec::decode_input(&bad_type).is_err());

    let mut bad_side = full.clone();
    bad_side[22] = b'X';
    assert!(binary_codec::decode_input(&bad_side).is_err());

    let mut zero_qty = full;
    zero_qty[18..22].copy_from_slice(&[0, 0, 0, 0]);
    assert!(binary_codec::decode_input(&zero_qty).is_err());
}

#[test]
fn text_input_round_trips_through_the_formatter_grammar() {
    let parsed = csv_codec::parse_input_line("N, 1, IBM, 100, 50, B, 1").unwrap();
    assert_eq!(parsed, sample_new_order());

    assert_eq!(
        csv_codec::parse_input_line("C, 42, 4242").unwrap(),
        InputMessage::Cancel(Cancel {
            user_id: 42,
            user_order_id: 4242,
        })
    );
    assert_eq!(csv_codec::parse_input_line("F").unwrap(), InputMessage::Flush);

    // Whitespace around commas is tolerated.
    assert_eq!(
        csv_codec::parse_input_line("  N ,1,IBM , 100 ,50,  B , 1 ").unwrap(),
        sample_new_order()
    );
}

#[test]
fn text_rejects_malformed_lines() {
    for line in [
        "N, 1, IBM, 100, 50, B",          // missing order id
        "N, 1, IBM, 100, 0, B, 1",        // zero quantity
        "N, 1, IBM, 100, 50, X, 1",       // bad side
        "N, 1, TOOLONGSYM, 100, 50, B, 1", // symbol over 8 bytes
        "N, x, IBM, 100, 50, B, 1",       // non-numeric user
        "C, 1",                            // missing order id
        "F, 1",                            // flush takes no fields
        "Z, 1, 2",                         // unknown type
        "NO, 1, IBM, 100, 50, B, 1",       // type token must be a single letter
    ] {
        assert!(csv_codec::parse_input_line(line).is_none(), "accepted: {line}");
    }

    // Blank lines and comments are skipped, not errors.
    assert!(csv_codec::parse_input_line("").is_none());
    assert!(!csv_codec::line_is_noise(""));
    assert!(!csv_codec::line_is_noise("# comment"));
    assert!(csv_codec::line_is_noise("Z, 1"));
}

#[test]
fn text_output_lines_match_the_documented_grammar() {
    assert_eq!(
        csv_codec::format_output_line(&OutputMessage::ack(sym("IBM"), 1, 2)),
        "A, IBM, 1, 2"
    );
    assert_eq!(
        csv_codec::format_output_line(&OutputMessage::cancel_ack(sym("IBM"), 1, 2)),
        "C, IBM, 1, 2"
    );
    assert_eq!(
        csv_codec::format_output_line(&OutputMessage::trade(sym("IBM"), 1, 1, 2, 2, 100, 50)),
        "T, IBM, 1, 1, 2, 2, 100, 50"
    );
    assert_eq!(
        csv_codec::format_output_line(&OutputMessage::top_of_book(sym("IBM"), Side::Buy, 100, 50)),
        "B, IBM, B, 100, 50"
    );
    assert_eq!(
        csv_codec::format_output_line(&OutputMessage::top_of_book_eliminated(
            sym("IBM"),
            Side::Sell
        )),
        "B, IBM, S, -, -"
    );
}
