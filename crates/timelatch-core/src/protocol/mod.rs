//! Time-latch binary protocol
//!
//! Implements the fixed-layout packet codec: outbound trigger requests
//! and inbound timemark reports, both integrity-checked with a 7-bit
//! masked byte sum.
//!
//! Encoding and decoding are pure; frame detection in a byte stream is
//! the transport caller's job (see [`crate::transport::SerialChannel::lookup`]).

mod error;
mod packet;

pub use error::ProtocolError;
pub use packet::{masked_sum, TimemarkRecord, TriggerPacket};

/// Frame header shared by both packet types
pub const FRAME_HEADER: [u8; 3] = *b"$MC";

/// Frame terminator: CR LF
pub const FRAME_TERMINATOR: [u8; 2] = [0x0D, 0x0A];

/// Encoded size of a trigger request packet
pub const TRIGGER_LEN: usize = 13;

/// Encoded size of a timemark report packet
pub const TIMEMARK_LEN: usize = 22;
