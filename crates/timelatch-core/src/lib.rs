//! # Timelatch Core Library
//!
//! Communication library for serial-attached time-latch units. A
//! time-latch fires exposure trigger pulses on request and reports the
//! precise timestamp of each rising edge back over a fixed-layout binary
//! protocol.
//!
//! This library provides:
//! - A non-blocking serial channel with circular receive/send buffering
//!   and completion-handler dispatch ([`transport`])
//! - An event-loop keeper that runs all completions serialized on one
//!   dedicated worker thread ([`transport::EventLoopKeeper`])
//! - The binary packet codec for trigger requests and timemark responses,
//!   with masked-sum integrity checking ([`protocol`])
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use timelatch_core::protocol::TriggerPacket;
//! use timelatch_core::transport::SerialChannel;
//!
//! let chan = SerialChannel::create()?;
//! chan.register_read(Box::new(|chan, err| {
//!     // pull frames out of the receive buffer
//! }));
//! if chan.open("/dev/ttyUSB0", 115200) {
//!     let trigger = TriggerPacket::new(1000, 1000, 1);
//!     chan.write(&trigger.to_bytes());
//! }
//! ```

#![warn(missing_docs)]

pub mod protocol;
pub mod transport;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::protocol::{
        masked_sum, ProtocolError, TimemarkRecord, TriggerPacket, FRAME_HEADER, FRAME_TERMINATOR,
        TIMEMARK_LEN, TRIGGER_LEN,
    };
    pub use crate::transport::{
        list_ports, ChannelError, CompletionHandler, EventLoopKeeper, PortInfo, SerialChannel,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
