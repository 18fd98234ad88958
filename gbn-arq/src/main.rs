//! Entry point for `gbn-arq`.
//!
//! Parses CLI arguments and dispatches into either **send** or **receive**
//! mode.  All protocol work is delegated to library modules; `main.rs` owns
//! only process setup (logging, argument parsing, socket binding, exit code).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use gbn_arq::simulator::{FaultPlan, FaultyChannel};
use gbn_arq::{Channel, Receiver, Sender, TransferConfig, UdpChannel};

/// Reliable in-order message transfer over UDP (Go-Back-N ARQ).
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Send one message and wait for the receiver to confirm it.
    Send {
        /// Local address acknowledgments arrive on.
        #[arg(short, long, default_value = "0.0.0.0:4002")]
        bind: SocketAddr,
        /// Receiver's data address.
        #[arg(short, long, default_value = "127.0.0.1:4001")]
        to: SocketAddr,
        /// Message text to send.
        #[arg(short, long, conflicts_with = "file", required_unless_present = "file")]
        message: Option<String>,
        /// Send the contents of this file instead.
        #[arg(short, long)]
        file: Option<PathBuf>,
        #[command(flatten)]
        transfer: TransferArgs,
        #[command(flatten)]
        faults: FaultArgs,
    },
    /// Receive one message and print it (or write it to a file).
    Receive {
        /// Local address data frames arrive on.
        #[arg(short, long, default_value = "0.0.0.0:4001")]
        bind: SocketAddr,
        /// Sender's acknowledgment address.
        #[arg(short, long, default_value = "127.0.0.1:4002")]
        to: SocketAddr,
        /// Write the message here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
        #[command(flatten)]
        transfer: TransferArgs,
        #[command(flatten)]
        faults: FaultArgs,
    },
}

/// Protocol parameters; both sides must agree on `--chunk`.
#[derive(Args)]
struct TransferArgs {
    /// Window capacity (frames in flight).
    #[arg(long, default_value_t = 10)]
    window: usize,
    /// Payload bytes per data frame.
    #[arg(long, default_value_t = 988)]
    chunk: usize,
    /// Retransmission timeout in milliseconds.
    #[arg(long, default_value_t = 300)]
    rto_ms: u64,
    /// Back-off ceiling for the retransmission timeout in milliseconds.
    #[arg(long, default_value_t = 3000)]
    max_rto_ms: u64,
    /// Consecutive timeouts without progress before giving up.
    #[arg(long, default_value_t = 16)]
    max_retries: u32,
    /// Copies of the teardown acknowledgment the receiver sends.
    #[arg(long, default_value_t = 20)]
    burst: usize,
    /// Teardown frame resends before giving up.
    #[arg(long, default_value_t = 8)]
    teardown_retries: u32,
    /// Receiver: keep answering repeated teardown frames for this long (ms).
    #[arg(long, default_value_t = 0)]
    linger_ms: u64,
}

impl From<TransferArgs> for TransferConfig {
    fn from(args: TransferArgs) -> Self {
        Self {
            window: args.window,
            max_chunk: args.chunk,
            rto: Duration::from_millis(args.rto_ms),
            max_rto: Duration::from_millis(args.max_rto_ms),
            max_retries: args.max_retries,
            teardown_burst: args.burst,
            teardown_retries: args.teardown_retries,
            linger: Duration::from_millis(args.linger_ms),
        }
    }
}

/// Simulated network faults applied to this side's outbound datagrams.
#[derive(Args)]
struct FaultArgs {
    /// Probability of dropping an outbound datagram.
    #[arg(long, default_value_t = 0.0)]
    loss_rate: f64,
    /// Probability of flipping one bit of an outbound datagram.
    #[arg(long, default_value_t = 0.0)]
    corrupt_rate: f64,
    /// Seed for the fault simulator.
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

impl FaultArgs {
    fn plan(&self) -> Option<FaultPlan> {
        if self.loss_rate <= 0.0 && self.corrupt_rate <= 0.0 {
            return None;
        }
        Some(FaultPlan {
            loss_rate: self.loss_rate,
            corrupt_rate: self.corrupt_rate,
            seed: self.seed,
            ..FaultPlan::default()
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Send {
            bind,
            to,
            message,
            file,
            transfer,
            faults,
        } => {
            let payload = match (message, file) {
                (Some(text), _) => text.into_bytes(),
                (None, Some(path)) => std::fs::read(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                (None, None) => anyhow::bail!("either --message or --file is required"),
            };
            let channel = UdpChannel::bind(bind, to)
                .await
                .with_context(|| format!("binding {bind}"))?;
            log::info!("Sending {} bytes to {to}, listening for acks on {bind}", payload.len());
            match faults.plan() {
                Some(plan) => send(FaultyChannel::new(channel, plan), transfer.into(), payload).await,
                None => send(channel, transfer.into(), payload).await,
            }
        }
        Mode::Receive {
            bind,
            to,
            out,
            transfer,
            faults,
        } => {
            let channel = UdpChannel::bind(bind, to)
                .await
                .with_context(|| format!("binding {bind}"))?;
            log::info!("Receiving on {bind}, acknowledging to {to}");
            let message = match faults.plan() {
                Some(plan) => receive(FaultyChannel::new(channel, plan), transfer.into()).await?,
                None => receive(channel, transfer.into()).await?,
            };
            match out {
                Some(path) => std::fs::write(&path, &message)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => println!("{}", String::from_utf8_lossy(&message)),
            }
            Ok(())
        }
    }
}

async fn send<C: Channel>(channel: C, config: TransferConfig, payload: Vec<u8>) -> Result<()> {
    let report = Sender::new(channel, config)
        .transmit(payload)
        .await
        .context("transfer failed")?;
    log::info!(
        "Delivered {} frame(s): {} datagram(s) sent, {} retransmitted, peak window {}",
        report.frames,
        report.datagrams_sent,
        report.retransmissions,
        report.peak_in_flight
    );
    Ok(())
}

async fn receive<C: Channel>(channel: C, config: TransferConfig) -> Result<Vec<u8>> {
    Receiver::new(channel, config)
        .receive()
        .await
        .context("receive failed")
}
