//! Passive decoder for Siemens S7COMM-PLUS telegrams.
//!
//! Segments go through [`Dissector`] (or [`dissect_segment`] with a caller-owned
//! [`Conversations`] map), which splits the framing, reassembles fragments per connection
//! and decodes the data part into a [`Telegram`]. Recoverable failures are attached to the
//! telegram as diagnostics; undecoded bytes are kept as opaque regions.

pub mod protocol;
pub mod types;

pub use protocol::{
    codec::{Codec, TransportFrame},
    error::{Diagnostic, Error, Result},
    frame::{decode_segment, Body, Content, DataPart, Telegram},
    session::{dissect_segment, ConnectionKey, Conversations, Direction, Dissector, Segment},
};
pub use types::DecoderConfig;
