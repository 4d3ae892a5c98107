//! Asynchronous serial transport
//!
//! A non-blocking serial channel that decouples byte-stream arrival from
//! application-level frame consumption. Completed reads land in a
//! circular receive buffer; writes are served from a circular send
//! buffer; a completion handler per direction is invoked after each
//! read/write cycle. All completions run serialized on the worker thread
//! owned by [`EventLoopKeeper`].

mod channel;
mod error;
mod keeper;
mod ports;
mod ring;

pub use channel::{CompletionHandler, SerialChannel};
pub use error::ChannelError;
pub use keeper::EventLoopKeeper;
pub use ports::{list_ports, PortInfo};
pub(crate) use ring::ByteRing;

/// Default baud rate when the caller does not care
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Size of one asynchronous read, in bytes
pub const READ_CHUNK_SIZE: usize = 512;

/// Capacity of each ring buffer, a multiple of the read chunk
pub const RING_CAPACITY: usize = READ_CHUNK_SIZE * 5;
