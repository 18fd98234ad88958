//! Finite-state-machine types for both endpoints.
//!
//! The receiver walks a three-state machine; the sender's phase is derived
//! from its window and is used to pick the retry bound that applies when the
//! retransmission timer expires.
//!
//! ```text
//!  receiver:  AWAITING_METADATA ──seq 0──▶ RECEIVING ──empty frame──▶ DONE
//!
//!  sender:    SENDING ──last chunk sent──▶ DRAINING ──all acked──▶ TEARING_DOWN
//!                                                                      │
//!                                                      teardown ack    ▼
//!                                                                  COMPLETE
//! ```

use crate::window::SendWindow;

/// States of the receiver state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiverState {
    /// Waiting for sequence 0 and its message-length prefix.
    #[default]
    AwaitingMetadata,
    /// Metadata accepted; appending in-order chunks.
    Receiving,
    /// Teardown frame accepted.  Terminal.
    Done,
}

/// Where the sender is in a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderPhase {
    /// Data frames remain to be transmitted.
    Sending,
    /// Every data frame is out; waiting for the last acknowledgments.
    Draining,
    /// The teardown frame is in flight.
    TearingDown,
    /// Teardown acknowledged.
    Complete,
}

impl SenderPhase {
    /// Derive the phase from the window and the reserved teardown number.
    pub fn of(window: &SendWindow, teardown_seq: u32) -> Self {
        let next = window.next_seq();
        if next < teardown_seq {
            Self::Sending
        } else if next == teardown_seq {
            Self::Draining
        } else {
            Self::TearingDown
        }
    }
}

impl std::fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::AwaitingMetadata => "AWAITING_METADATA",
            Self::Receiving => "RECEIVING",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}

impl std::fmt::Display for SenderPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
