//! Transport errors

use thiserror::Error;

/// Errors delivered to completion handlers or returned by channel setup.
///
/// The transport itself never retries and never panics on I/O failure;
/// recovery policy belongs to the registered handler (commonly: close
/// the channel and surface the failure upward).
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("device closed the stream")]
    Closed,
}
