//! `gbn-arq`: reliable, in-order transfer of one message over UDP using
//! Go-Back-N automatic repeat request.
//!
//! # Architecture
//!
//! ```text
//!   message                                              message
//!      │                                                    ▲
//!  ┌───▼──────────────────────┐              ┌──────────────┴───────────┐
//!  │ Sender                   │   DATA       │ Receiver                 │
//!  │  transmit loop ──────────┼─────────────▶│  ReceiverCursor          │
//!  │  acknowledge loop ◀──────┼──────────────┼─ (in-order acceptance)   │
//!  │  SendWindow + timer      │   ACK        │                          │
//!  └───┬──────────────────────┘              └──────────────┬───────────┘
//!      │ frame codec (CRC-32 checksummed)                   │
//!  ┌───▼────────────────────────────────────────────────────▼───────────┐
//!  │  Channel  (UdpChannel, or MemoryChannel / FaultyChannel in tests)  │
//!  └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`frame`]: wire format and checksum
//! - [`chunker`]: splitting a message into per-sequence payloads
//! - [`window`]: Go-Back-N send window
//! - [`timer`]: retransmission timer with back-off
//! - [`sender`]: transmit and acknowledge loops
//! - [`receiver`]: receiver state machine and driver
//! - [`state`]: finite-state-machine types
//! - [`channel`]: datagram channel trait and UDP implementation
//! - [`simulator`]: in-memory and fault-injecting channels for testing
//! - [`config`]: tunable parameters
//! - [`error`]: caller-facing errors

pub mod channel;
pub mod chunker;
pub mod config;
pub mod error;
pub mod frame;
pub mod receiver;
pub mod sender;
pub mod simulator;
pub mod state;
pub mod timer;
pub mod window;

pub use channel::{Channel, UdpChannel};
pub use config::TransferConfig;
pub use error::TransferError;
pub use receiver::Receiver;
pub use sender::{Sender, TransferReport};
