//! Envelopes pair a message with its originator so routing needs no
//! other context.

use tickmatch_core::{InputMessage, OutputMessage};

/// A parsed client message heading for a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEnvelope {
    /// Registry id of the client that sent the message.
    pub client_id: u32,

    /// Per-ingress-source monotonic sequence number.
    pub seq: u64,

    pub msg: InputMessage,
}

/// An engine output heading for the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputEnvelope {
    /// Registry id of the client whose input produced this output.
    pub client_id: u32,

    pub msg: OutputMessage,
}
