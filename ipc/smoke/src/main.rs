//! dplayer IPC Smoke Driver
//!
//! Drives one side of a named IPC channel from the command line, printing
//! lifecycle events as they arrive. Useful for poking at a running backend or
//! renderer process, or at another instance of this tool.
//!
//! # Usage
//!
//! ```bash
//! # Serve the "world" channel and echo whatever arrives
//! dplayer-ipc-smoke listen --channel world
//!
//! # Dial it from another terminal and send a greeting
//! dplayer-ipc-smoke dial --channel world --message hello
//!
//! # Stay passive: log operations without touching any socket
//! dplayer-ipc-smoke dial --no-connect
//!
//! # Verbose logging
//! RUST_LOG=debug dplayer-ipc-smoke listen
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dplayer_ipc::{Channel, Connector, IpcConfig, IpcEvent, Listener};

/// Which side of the channel to drive.
#[derive(Copy, Clone, Debug, ValueEnum)]
enum Role {
    /// Bind the channel socket and serve it.
    Listen,
    /// Dial the channel socket, retrying until it exists.
    Dial,
}

/// dplayer IPC smoke driver
#[derive(Parser, Debug)]
#[command(name = "dplayer-ipc-smoke")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Which side of the channel to drive
    #[arg(value_enum)]
    role: Role,

    /// Logical channel name (socket at /tmp/<name>.sock)
    #[arg(short = 'C', long, env = "DPLAYER_CHANNEL", default_value = "world")]
    channel: String,

    /// Message to send once connected
    #[arg(short, long, default_value = "hello")]
    message: String,

    /// Actively dial/bind the channel (default)
    #[arg(short = 'c', long)]
    connect: bool,

    /// Stay passive: log attempted operations without touching any socket
    #[arg(short = 'n', long)]
    no_connect: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "DPLAYER_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // clap validates the flags; the config layer interprets them.
    let config = IpcConfig::from_args(std::env::args());
    let channel = Channel::new(&args.channel);

    match args.role {
        Role::Dial => run_dial(channel, config, &args.message).await,
        Role::Listen => run_listen(channel, config).await,
    }
}

/// Dial the channel, send the message on every connect, print whatever comes
/// back.
async fn run_dial(channel: Channel, config: IpcConfig, message: &str) -> Result<()> {
    let (connector, mut events) = Connector::new(channel.clone(), config);
    connector.start_connecting();
    info!(channel = %channel, "dialing; press Ctrl-C to exit");

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(IpcEvent::Connected) => {
                    info!(message, "connected, sending");
                    connector.send(message.as_bytes());
                }
                Some(IpcEvent::Data(bytes)) => {
                    info!(payload = %String::from_utf8_lossy(&bytes), "received");
                }
                Some(IpcEvent::Disconnected) => warn!("disconnected, retrying"),
                Some(IpcEvent::Error(e)) => warn!(error = %e, "transport error"),
                None => break,
            },
        }
    }

    info!("bye");
    Ok(())
}

/// Serve the channel and echo every payload back to the peer.
async fn run_listen(channel: Channel, config: IpcConfig) -> Result<()> {
    let (listener, mut events) = Listener::bind(channel.clone(), config)
        .with_context(|| format!("failed to serve channel {channel}"))?;
    info!(channel = %channel, "listening; press Ctrl-C to exit");

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(IpcEvent::Connected) => info!("peer connected"),
                Some(IpcEvent::Data(bytes)) => {
                    info!(payload = %String::from_utf8_lossy(&bytes), "received, echoing back");
                    listener.send(bytes);
                }
                Some(IpcEvent::Disconnected) => info!("peer disconnected, awaiting next"),
                Some(IpcEvent::Error(e)) => warn!(error = %e, "transport error"),
                None => break,
            },
        }
    }

    info!("bye");
    Ok(())
}
