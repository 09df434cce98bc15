//! Stream framing: carving complete messages out of byte buffers.
//!
//! TCP delivers arbitrary chunks and UDP delivers whole datagrams that
//! may hold several messages; both ingress paths feed their bytes
//! through the scanners here. Three framings exist:
//!
//! - **Raw binary**: fixed-size frames dispatched by the type byte,
//!   resynchronised after garbage by skipping a single byte at a time
//!   until the next magic byte.
//! - **Length-prefixed binary**: a 4-byte big-endian payload length
//!   followed by a magic-led payload. Responses to such a client use
//!   the same framing.
//! - **Text**: lines split on `'\n'`, tolerant of `'\r'` and blank
//!   lines.

use tickmatch_core::InputMessage;

use crate::binary_codec::decode_input;
use crate::csv_codec::{line_is_noise, parse_input_line};
use crate::wire_types::{input_frame_len, FLUSH_LEN, MAGIC, MAX_FRAME_LEN, TYPE_CANCEL, TYPE_FLUSH, TYPE_NEW_ORDER};

/// Framing of a connection, decided once from its first bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    RawBinary,
    LengthPrefixedBinary,
    Text,
}

/// Outcome of scanning a buffer for its next message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextFrame {
    /// A complete message and the number of bytes it consumed.
    Msg(InputMessage, usize),
    /// The buffer holds only part of a message; read more bytes.
    Incomplete,
    /// Consumed bytes carrying nothing to act on (blank text line).
    Skip(usize),
    /// Consumed bytes that failed to decode; count one decode error.
    Error(usize),
}

/// Decide a connection's framing from the bytes seen so far.
///
/// `None` means undecided: either more bytes are needed or the client
/// has sent nothing recognisable yet (the caller disconnects such
/// clients after bounded stalls).
pub fn detect_framing(buf: &[u8]) -> Option<Framing> {
    let first = *buf.first()?;
    match first {
        MAGIC => Some(Framing::RawBinary),
        TYPE_NEW_ORDER | TYPE_CANCEL | TYPE_FLUSH => Some(Framing::Text),
        _ => {
            // A length-prefixed stream opens with a 4-byte big-endian
            // length; with MAX_FRAME_LEN small the first bytes are
            // zero, which no other framing starts with.
            if buf.len() < 5 {
                return None;
            }
            let len = read_len(buf);
            if (FLUSH_LEN..=MAX_FRAME_LEN).contains(&len) && buf[4] == MAGIC {
                Some(Framing::LengthPrefixedBinary)
            } else {
                None
            }
        }
    }
}

/// Scan for the next message under the given framing.
pub fn next_frame(buf: &[u8], framing: Framing) -> NextFrame {
    match framing {
        Framing::RawBinary => next_raw_frame(buf),
        Framing::LengthPrefixedBinary => next_length_prefixed_frame(buf),
        Framing::Text => next_text_frame(buf),
    }
}

/// Raw binary: fixed-size frames, one-byte skip to resynchronise.
pub fn next_raw_frame(buf: &[u8]) -> NextFrame {
    if buf.is_empty() {
        return NextFrame::Incomplete;
    }
    if buf[0] != MAGIC {
        return NextFrame::Error(1);
    }
    if buf.len() < 2 {
        return NextFrame::Incomplete;
    }
    let Some(frame_len) = input_frame_len(buf[1]) else {
        return NextFrame::Error(1);
    };
    if buf.len() < frame_len {
        return NextFrame::Incomplete;
    }
    match decode_input(&buf[..frame_len]) {
        Ok(msg) => NextFrame::Msg(msg, frame_len),
        Err(_) => NextFrame::Error(frame_len),
    }
}

/// Length-prefixed binary: 4-byte big-endian payload length, then a
/// magic-led payload.
pub fn next_length_prefixed_frame(buf: &[u8]) -> NextFrame {
    if buf.len() < 4 {
        return NextFrame::Incomplete;
    }
    let len = read_len(buf);
    if !(FLUSH_LEN..=MAX_FRAME_LEN).contains(&len) {
        // Implausible length word: the stream is out of sync, creep
        // forward one byte.
        return NextFrame::Error(1);
    }
    if buf.len() < 4 + len {
        return NextFrame::Incomplete;
    }
    let payload = &buf[4..4 + len];
    if payload[0] != MAGIC {
        return NextFrame::Error(1);
    }
    match decode_input(payload) {
        Ok(msg) => NextFrame::Msg(msg, 4 + len),
        Err(_) => NextFrame::Error(4 + len),
    }
}

/// Text: one message per line.
pub fn next_text_frame(buf: &[u8]) -> NextFrame {
    let Some(pos) = buf.iter().position(|&b| b == b'\n') else {
        return NextFrame::Incomplete;
    };
    let consumed = pos + 1;
    parse_text_segment(&buf[..pos], consumed)
}

fn parse_text_segment(segment: &[u8], consumed: usize) -> NextFrame {
    let Ok(line) = std::str::from_utf8(segment) else {
        return NextFrame::Error(consumed);
    };
    match parse_input_line(line) {
        Some(msg) => NextFrame::Msg(msg, consumed),
        None if line_is_noise(line) => NextFrame::Error(consumed),
        None => NextFrame::Skip(consumed),
    }
}

/// Parse every message out of a single datagram.
///
/// Messages are consumed until the datagram is exhausted or a parse
/// boundary fails; a failure (including a truncated final message)
/// discards the remainder. Returns the messages plus the decode-error
/// count.
pub fn parse_datagram(data: &[u8], framing: Framing) -> (Vec<InputMessage>, u64) {
    let mut messages = Vec::new();
    let mut errors = 0u64;
    let mut offset = 0usize;

    while offset < data.len() {
        let rest = &data[offset..];
        let step = match framing {
            Framing::Text if !rest.contains(&b'\n') => {
                // A datagram's final line may omit the newline.
                parse_text_segment(rest, rest.len())
            }
            _ => next_frame(rest, framing),
        };
        match step {
            NextFrame::Msg(msg, consumed) => {
                messages.push(msg);
                offset += consumed;
            }
            NextFrame::Skip(consumed) => offset += consumed,
            NextFrame::Incomplete => {
                // Truncated trailing message.
                errors += 1;
                break;
            }
            NextFrame::Error(_) => {
                errors += 1;
                break;
            }
        }
    }

    (messages, errors)
}

/// Encode one output message under a connection's framing.
pub fn frame_output(msg: &tickmatch_core::OutputMessage, framing: Framing) -> Vec<u8> {
    match framing {
        Framing::RawBinary => {
            let mut out = Vec::with_capacity(MAX_FRAME_LEN);
            crate::binary_codec::encode_output(msg, &mut out);
            out
        }
        Framing::LengthPrefixedBinary => {
            let mut payload = Vec::with_capacity(MAX_FRAME_LEN);
            crate::binary_codec::encode_output(msg, &mut payload);
            let mut out = Vec::with_capacity(4 + payload.len());
            out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
            out.extend_from_slice(&payload);
            out
        }
        Framing::Text => {
            let mut line = crate::csv_codec::format_output_line(msg);
            line.push('\n');
            line.into_bytes()
        }
    }
}

fn read_len(buf: &[u8]) -> usize {
    u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize
}
