//! Command-line driver for a serial-attached time-latch unit.
//!
//! Sends one exposure trigger request per cycle and logs every timemark
//! the unit reports back, until interrupted.

mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use timelatch_core::protocol::{TimemarkRecord, TriggerPacket, FRAME_TERMINATOR, TIMEMARK_LEN};
use timelatch_core::transport::{list_ports, SerialChannel};

use logging::{DayLog, Severity};

#[derive(Parser)]
#[command(name = "timelatch", version, about = "Exercise a serial-attached time-latch unit")]
struct Cli {
    /// Serial device of the time-latch unit (e.g. /dev/ttyUSB0)
    #[arg(required_unless_present = "list")]
    device: Option<String>,

    /// Baud rate
    #[arg(long, default_value_t = 115200)]
    baud: u32,

    /// Delay from trigger receipt to the first pulse, in milliseconds
    #[arg(long, default_value_t = 1000)]
    delay: u32,

    /// Pulse width in milliseconds
    #[arg(long, default_value_t = 1000)]
    width: u16,

    /// Pulses per trigger
    #[arg(long, default_value_t = 1)]
    count: u16,

    /// Write day-rotating log files under this directory instead of stdout
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Emit decoded timemarks as JSON lines
    #[arg(long)]
    json: bool,

    /// List available serial ports and exit
    #[arg(long)]
    list: bool,
}

/// Pull every complete frame out of the receive buffer and log it
fn consume_frames(chan: &Arc<SerialChannel>, log: &DayLog, json: bool) {
    while let Some(end) = chan.lookup(&FRAME_TERMINATOR, 0) {
        let mut frame = vec![0u8; end + 1];
        let got = chan.read(&mut frame, 0);
        let frame = &frame[..got];

        if frame.len() != TIMEMARK_LEN {
            log.write(
                Severity::Fault,
                &format!(
                    "malformed frame: expected {} bytes, got {} ({:02X?})",
                    TIMEMARK_LEN,
                    frame.len(),
                    frame
                ),
            );
            continue;
        }

        match TimemarkRecord::from_bytes(frame) {
            Ok(mark) if json => match serde_json::to_string(&mark) {
                Ok(line) => log.write(Severity::Info, &line),
                Err(err) => log.write(Severity::Fault, &format!("json encode failed: {}", err)),
            },
            Ok(mark) => log.write(
                Severity::Info,
                &format!(
                    "serial no = {:2}, time = {}, pulse width = {:.5}",
                    mark.serial_no,
                    mark.timestamp(),
                    mark.pulse_width()
                ),
            ),
            Err(err) => log.write(Severity::Fault, &format!("{} ({:02X?})", err, frame)),
        }
    }
}

/// Resolves when SIGINT or SIGTERM arrives
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("install SIGINT handler")?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await.context("install Ctrl+C handler")?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.list {
        for port in list_ports() {
            match port.product {
                Some(product) => println!("{}\t{}", port.name, product),
                None => println!("{}", port.name),
            }
        }
        return Ok(());
    }
    let Some(device) = cli.device else {
        bail!("device argument is required");
    };

    let log = Arc::new(match &cli.log_dir {
        Some(dir) => DayLog::to_dir(dir, "timelatch_").context("create log directory")?,
        None => DayLog::stdout(),
    });

    let chan = SerialChannel::create().context("start event loop worker")?;

    let read_log = log.clone();
    let json = cli.json;
    chan.register_read(Box::new(move |chan, err| {
        if let Some(err) = err {
            read_log.write(Severity::Fault, &format!("read error: {}", err));
            chan.close();
            return;
        }
        consume_frames(chan, &read_log, json);
    }));

    let write_log = log.clone();
    chan.register_write(Box::new(move |chan, err| {
        if let Some(err) = err {
            write_log.write(Severity::Fault, &format!("write error: {}", err));
            chan.close();
        } else {
            tracing::trace!("send cycle complete");
        }
    }));

    if !chan.open(&device, cli.baud) {
        bail!("failed to open device <{}>", device);
    }
    println!("Press Ctrl+C to exit");

    let trigger = TriggerPacket::new(cli.delay, cli.width, cli.count);
    let cycle_ms = (cli.delay as u64 + cli.width as u64) * cli.count as u64;
    let mut ticker = tokio::time::interval(Duration::from_millis(cycle_ms.max(100)));

    // Give the unit a moment to settle after the port toggles.
    tokio::time::sleep(Duration::from_secs(1)).await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            res = &mut shutdown => {
                res?;
                log.write(Severity::Info, "interrupted, shutting down");
                break;
            }
            _ = ticker.tick() => {
                if !chan.is_open() {
                    log.write(Severity::Fault, "channel closed, giving up");
                    break;
                }
                let frame = trigger.to_bytes();
                let sent = chan.write(&frame);
                log.write(
                    Severity::Info,
                    &format!(
                        "sending trigger: delay={}ms width={}ms count={}",
                        cli.delay, cli.width, cli.count
                    ),
                );
                if sent < frame.len() {
                    log.write(
                        Severity::Warn,
                        &format!("send buffer full, queued {}/{} bytes", sent, frame.len()),
                    );
                }
            }
        }
    }

    chan.close();
    Ok(())
}
