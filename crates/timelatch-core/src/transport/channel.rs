//! Asynchronous serial channel
//!
//! Owns one serial device and the two circular buffers that decouple the
//! application from device timing. While open, the channel is always
//! either reading or closed: each completed read appends to the receive
//! ring, fires the registered read handler, and immediately re-arms the
//! next read. Writes are queued into the send ring and flushed by a
//! write cycle that re-arms itself until the ring is empty.
//!
//! All public operations are safe to call from any thread and none of
//! them block on I/O. Completion handlers run serialized on the keeper's
//! worker thread; they receive the channel as an argument so closures do
//! not need to capture it (which would keep the channel alive forever).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tokio_serial::SerialStream;
use tokio_util::sync::CancellationToken;

use super::{ByteRing, ChannelError, EventLoopKeeper, READ_CHUNK_SIZE, RING_CAPACITY};

/// Completion handler for one transfer direction.
///
/// Invoked after each read/write cycle with the channel and `None` on
/// success, or `Some(error)` when the cycle failed. The transport makes
/// no retry decision itself; handlers are expected to close the channel
/// on unrecoverable errors.
pub type CompletionHandler = Box<dyn FnMut(&Arc<SerialChannel>, Option<&ChannelError>) + Send>;

/// Single-slot handler storage; registering replaces the previous handler.
type HandlerSlot = Mutex<Option<Arc<Mutex<CompletionHandler>>>>;

/// Buffered asynchronous serial channel
pub struct SerialChannel {
    /// Event loop driving all reads, writes and handler invocations.
    /// Declared so it outlives the I/O tasks it runs.
    keeper: EventLoopKeeper,
    open: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
    recv_ring: Mutex<ByteRing>,
    send_ring: Mutex<ByteRing>,
    read_handler: HandlerSlot,
    write_handler: HandlerSlot,
    send_kick: Arc<Notify>,
}

impl SerialChannel {
    /// Create a closed channel with its own event-loop keeper.
    ///
    /// Fails only when the keeper's worker thread cannot be spawned.
    pub fn create() -> Result<Arc<Self>, ChannelError> {
        let keeper = EventLoopKeeper::start()?;
        Ok(Arc::new(Self {
            keeper,
            open: AtomicBool::new(false),
            cancel: Mutex::new(None),
            recv_ring: Mutex::new(ByteRing::new(RING_CAPACITY)),
            send_ring: Mutex::new(ByteRing::new(RING_CAPACITY)),
            read_handler: Mutex::new(None),
            write_handler: Mutex::new(None),
            send_kick: Arc::new(Notify::new()),
        }))
    }

    /// Open and configure the serial device, then arm the first read.
    ///
    /// Framing is fixed at 8 data bits, 1 stop bit, no parity. Idempotent
    /// when already open. Returns `false` on any OS-level open or
    /// configure error, leaving the channel closed; the error detail is
    /// logged rather than surfaced.
    pub fn open(self: &Arc<Self>, device: &str, baud_rate: u32) -> bool {
        if self.is_open() {
            return true;
        }

        let builder = tokio_serial::new(device, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .flow_control(tokio_serial::FlowControl::None);

        // SerialStream registers with the reactor at creation, so enter
        // the keeper's runtime context first.
        let _guard = self.keeper.handle().enter();
        match SerialStream::open(&builder) {
            Ok(stream) => {
                tracing::debug!(device, baud_rate, "serial device opened");
                self.attach(stream);
                true
            }
            Err(err) => {
                tracing::warn!(device, %err, "failed to open serial device");
                false
            }
        }
    }

    /// Arm the channel over an already-open bidirectional stream.
    ///
    /// This is the seam [`open`](Self::open) goes through and also serves
    /// mock devices (e.g. `tokio::io::duplex`) in tests.
    pub fn attach<S>(self: &Arc<Self>, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let token = CancellationToken::new();
        if let Some(old) = self.cancel.lock().replace(token.clone()) {
            old.cancel();
        }
        self.open.store(true, Ordering::SeqCst);

        let (reader, writer) = tokio::io::split(stream);
        self.keeper
            .handle()
            .spawn(read_cycle(Arc::downgrade(self), reader, token.clone()));
        self.keeper.handle().spawn(write_cycle(
            Arc::downgrade(self),
            self.send_kick.clone(),
            writer,
            token,
        ));
    }

    /// Close the device, implicitly cancelling in-flight operations.
    ///
    /// Idempotent and callable from any thread, including from within a
    /// completion handler. A handler may still observe one final
    /// error-bearing completion after close.
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        if let Some(token) = self.cancel.lock().take() {
            tracing::debug!("closing serial channel");
            token.cancel();
        }
    }

    /// Whether the channel is currently open
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Queue bytes for transmission, returning the count accepted.
    ///
    /// Copies up to the send ring's free capacity and kicks the write
    /// cycle if the ring was empty. Never blocks; excess bytes are
    /// dropped and the caller must resubmit the remainder after checking
    /// the returned count (a short count is a signal, not an error).
    pub fn write(&self, data: &[u8]) -> usize {
        if data.is_empty() || !self.is_open() {
            return 0;
        }

        let (accepted, was_empty) = {
            let mut ring = self.send_ring.lock();
            let was_empty = ring.is_empty();
            (ring.extend_to_free(data), was_empty)
        };
        if was_empty && accepted > 0 {
            self.send_kick.notify_one();
        }
        accepted
    }

    /// Copy up to `buf.len()` received bytes starting at `from`, then
    /// discard everything buffered up through `from + buf.len()`.
    ///
    /// A read is a consuming drain of the whole window, not just of the
    /// bytes returned: bytes before `from` are dropped too. That is the
    /// framing-skip contract callers rely on after [`lookup`](Self::lookup).
    /// Returns the count actually copied when fewer than requested
    /// remain.
    pub fn read(&self, buf: &mut [u8], from: usize) -> usize {
        if buf.is_empty() {
            return 0;
        }

        let mut ring = self.recv_ring.lock();
        let copied = ring.copy_from(from, buf);
        if copied > 0 {
            ring.drain_front(from + buf.len());
        }
        copied
    }

    /// Find the first occurrence of `flag` in the receive buffer at or
    /// after `from`, returning the index of its last byte.
    ///
    /// `None` when absent. Used to detect frame boundaries before
    /// [`read`](Self::read).
    pub fn lookup(&self, flag: &[u8], from: usize) -> Option<usize> {
        if flag.is_empty() {
            return None;
        }
        let ring = self.recv_ring.lock();
        ring.find(flag, from).map(|start| start + flag.len() - 1)
    }

    /// Install the read-completion handler, replacing any previous one
    pub fn register_read(&self, handler: CompletionHandler) {
        *self.read_handler.lock() = Some(Arc::new(Mutex::new(handler)));
    }

    /// Install the write-completion handler, replacing any previous one
    pub fn register_write(&self, handler: CompletionHandler) {
        *self.write_handler.lock() = Some(Arc::new(Mutex::new(handler)));
    }

    fn fire(slot: &HandlerSlot, chan: &Arc<SerialChannel>, err: Option<&ChannelError>) {
        // Clone the slot out so a handler can re-register or close
        // without deadlocking against its own invocation.
        let handler = slot.lock().clone();
        if let Some(handler) = handler {
            (handler.lock())(chan, err);
        }
    }
}

impl Drop for SerialChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Continuous read cycle: read, buffer, notify, re-arm.
async fn read_cycle<R>(chan: Weak<SerialChannel>, mut reader: R, token: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut scratch = [0u8; READ_CHUNK_SIZE];
    loop {
        let result = tokio::select! {
            _ = token.cancelled() => return,
            res = reader.read(&mut scratch) => res,
        };

        let Some(chan) = chan.upgrade() else { return };
        match result {
            Ok(0) => {
                SerialChannel::fire(&chan.read_handler, &chan, Some(&ChannelError::Closed));
                return;
            }
            Ok(n) => {
                chan.recv_ring.lock().extend_overwrite(&scratch[..n]);
                SerialChannel::fire(&chan.read_handler, &chan, None);
            }
            Err(err) => {
                let err = ChannelError::Io(err);
                SerialChannel::fire(&chan.read_handler, &chan, Some(&err));
                return;
            }
        }
    }
}

/// Write cycle: idle until kicked, then flush the send ring in FIFO
/// order, firing the write handler after each completed transfer.
async fn write_cycle<W>(
    chan: Weak<SerialChannel>,
    kick: Arc<Notify>,
    mut writer: W,
    token: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = kick.notified() => {}
        }

        loop {
            // Contiguous head of the ring, copied out so no lock is held
            // across the await.
            let chunk = {
                let Some(chan) = chan.upgrade() else { return };
                let ring = chan.send_ring.lock();
                ring.front_chunk().to_vec()
            };
            if chunk.is_empty() {
                break;
            }

            let result = tokio::select! {
                _ = token.cancelled() => return,
                res = writer.write(&chunk) => res,
            };

            let Some(chan) = chan.upgrade() else { return };
            match result {
                Ok(n) => {
                    chan.send_ring.lock().drain_front(n);
                    SerialChannel::fire(&chan.write_handler, &chan, None);
                }
                Err(err) => {
                    let err = ChannelError::Io(err);
                    SerialChannel::fire(&chan.write_handler, &chan, Some(&err));
                    return;
                }
            }
        }
    }
}
