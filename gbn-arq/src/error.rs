//! Errors surfaced to the host application.

use thiserror::Error;

use crate::config::ConfigError;

/// Why a transfer did not complete.
///
/// Frame corruption and reordering never appear here; the protocol absorbs
/// them as loss.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The datagram channel failed (unreachable peer, exhausted resources).
    #[error("channel error: {0}")]
    Channel(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Message length or frame count does not fit the wire format.
    #[error("message of {0} bytes is too large for one transfer")]
    MessageTooLarge(usize),

    /// The timer expired too many times without the window moving.
    #[error("gave up after repeated timeouts with base={base}")]
    RetriesExhausted { base: u32 },

    /// Every teardown frame went unanswered.
    #[error("teardown not confirmed after {attempts} attempts")]
    TeardownNotConfirmed { attempts: u32 },

    /// Teardown arrived but the assembled message disagrees with its header.
    #[error("message length mismatch: declared {declared}, received {received}")]
    LengthMismatch { declared: u32, received: usize },

    /// A sender loop panicked or was cancelled.
    #[error("transfer task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}
