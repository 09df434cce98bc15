//! tickmatch-wire
//!
//! Wire-level encoding/decoding for the matching engine.
//!
//! This crate turns logical engine messages (`tickmatch_core`
//! `InputMessage` / `OutputMessage`) into bytes and back again:
//!
//! - [`wire_types`]   : magic, type bytes, frame sizes, protocol detection
//! - [`binary_codec`] : packed binary wire protocol
//! - [`csv_codec`]    : line-oriented text protocol
//! - [`framing`]      : carving messages out of TCP streams and UDP datagrams

pub mod binary_codec;
pub mod csv_codec;
pub mod framing;
pub mod wire_types;

pub use binary_codec::{decode_input, decode_output, encode_input, encode_output, WireError};
pub use csv_codec::{format_output_line, parse_input_line};
pub use framing::{detect_framing, frame_output, next_frame, parse_datagram, Framing, NextFrame};
pub use wire_types::{detect_protocol, WireProtocol, MAGIC};
