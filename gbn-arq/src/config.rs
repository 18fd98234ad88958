//! Tunable parameters for one transfer.
//!
//! Both endpoints take a [`TransferConfig`]; the sender uses the window,
//! timer and retry fields, the receiver the chunk size, burst and linger
//! fields.  Both sides must agree on `max_chunk`, since it bounds the size of
//! the datagrams the receiver is prepared to read.

use std::time::Duration;

use thiserror::Error;

use crate::frame::{HEADER_LEN, METADATA_LEN};

/// Largest UDP payload over IPv4.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Parameters shared by the sender and receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Maximum number of unacknowledged frames in flight (N).
    pub window: usize,
    /// Maximum payload bytes carried by one data frame.
    pub max_chunk: usize,
    /// Retransmission timeout before any back-off.
    pub rto: Duration,
    /// Ceiling for the doubled timeout after repeated expiries.
    pub max_rto: Duration,
    /// Consecutive expiries without progress before the sender gives up.
    pub max_retries: u32,
    /// Copies of the teardown acknowledgment the receiver emits.
    pub teardown_burst: usize,
    /// Timer-driven resends of the teardown frame before giving up.
    pub teardown_retries: u32,
    /// How long the receiver keeps answering a repeated teardown frame.
    ///
    /// `Duration::ZERO` closes the receiver as soon as the burst is out.
    pub linger: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            window: 10,
            max_chunk: 988,
            rto: Duration::from_millis(300),
            max_rto: Duration::from_secs(3),
            max_retries: 16,
            teardown_burst: 20,
            teardown_retries: 8,
            linger: Duration::ZERO,
        }
    }
}

impl TransferConfig {
    /// Check every field for a usable value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.max_chunk <= METADATA_LEN || self.max_datagram() > MAX_UDP_PAYLOAD {
            return Err(ConfigError::ChunkSize(self.max_chunk));
        }
        if self.rto.is_zero() || self.max_rto < self.rto {
            return Err(ConfigError::Timeout {
                rto: self.rto,
                max_rto: self.max_rto,
            });
        }
        if self.teardown_burst == 0 {
            return Err(ConfigError::ZeroBurst);
        }
        Ok(())
    }

    /// Largest datagram either side will put on the wire.
    pub fn max_datagram(&self) -> usize {
        HEADER_LEN + self.max_chunk
    }
}

/// Rejected configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("window capacity must be at least 1")]
    ZeroWindow,
    #[error("chunk size {0} must exceed the 4-byte length prefix and fit in one UDP datagram")]
    ChunkSize(usize),
    #[error("retransmission timeout {rto:?} must be non-zero and not exceed max_rto {max_rto:?}")]
    Timeout { rto: Duration, max_rto: Duration },
    #[error("teardown burst must send at least one acknowledgment")]
    ZeroBurst,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_thousand_byte_frames() {
        let config = TransferConfig::default();
        assert_eq!(config.max_datagram(), 1000);
        assert_eq!(config.window, 10);
        assert_eq!(config.teardown_burst, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_window_rejected() {
        let config = TransferConfig { window: 0, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroWindow));
    }

    #[test]
    fn chunk_must_fit_length_prefix() {
        let config = TransferConfig { max_chunk: 4, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::ChunkSize(4)));
        let config = TransferConfig { max_chunk: 5, ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn chunk_must_fit_udp() {
        let config = TransferConfig { max_chunk: MAX_UDP_PAYLOAD, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::ChunkSize(_))));
    }

    #[test]
    fn rto_above_ceiling_rejected() {
        let config = TransferConfig {
            rto: Duration::from_secs(5),
            max_rto: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Timeout { .. })));
    }

    #[test]
    fn zero_burst_rejected() {
        let config = TransferConfig { teardown_burst: 0, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroBurst));
    }
}
