//! Go-Back-N send window.
//!
//! [`SendWindow`] tracks which sequence numbers are in flight and keeps the
//! already-encoded bytes of every unacknowledged frame so retransmissions
//! resend them verbatim.
//!
//! # Protocol contract
//!
//! - `base ≤ next_seq ≤ base + capacity` at all times.
//! - `buffered` holds exactly the frames for `[base, next_seq)`, oldest first.
//! - Acknowledgments are **cumulative** and name the last accepted sequence
//!   number: `ack = K` confirms every frame up to and including `K`.
//! - `ack == base − 1` is a duplicate: the receiver is still waiting for
//!   `base`.
//!
//! This module only manages state; the window is shared by the transmit and
//! acknowledge loops in [`crate::sender`], which serialise access through a
//! single lock.

use std::collections::VecDeque;

/// What an incoming acknowledgment did to the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// `base` moved forward by `acked` frames.
    Advanced { acked: u32 },
    /// The receiver is still waiting for `base`.
    Duplicate,
    /// Older than `base − 1`, or for a frame never sent.
    Stale,
}

/// Go-Back-N send-side state for one transfer.
///
/// # Sequence-number layout
///
/// ```text
///    base             next_seq      base + capacity
///      │                  │               │
///  ────┼──────────────────┼───────────────┼──────▶ seq space
///      │ <── in flight ──▶│ <── usable ──▶│
/// ```
#[derive(Debug)]
pub struct SendWindow {
    /// Oldest unacknowledged sequence number.
    base: u32,
    /// Sequence number of the next frame to transmit.
    next_seq: u32,
    /// Maximum number of frames in flight (N).
    capacity: usize,
    /// Encoded frames for `[base, next_seq)`; front is `base`.
    buffered: VecDeque<Vec<u8>>,
    /// Highest `next_seq - base` observed.
    peak_in_flight: usize,
    /// `base` value a fast retransmit already fired for.
    fast_retransmit_at: Option<u32>,
}

impl SendWindow {
    /// Create an empty window starting at sequence number 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "window capacity must be at least 1");
        Self {
            base: 0,
            next_seq: 0,
            capacity,
            buffered: VecDeque::with_capacity(capacity),
            peak_in_flight: 0,
            fast_retransmit_at: None,
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of frames awaiting acknowledgment.
    pub fn in_flight(&self) -> usize {
        self.buffered.len()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight
    }

    /// `true` while `next_seq < base + capacity`.
    pub fn can_send(&self) -> bool {
        self.buffered.len() < self.capacity
    }

    pub fn has_unacked(&self) -> bool {
        !self.buffered.is_empty()
    }

    /// Buffer the encoded frame for `next_seq` and advance `next_seq`.
    ///
    /// Returns the sequence number the frame occupies.  Check [`can_send`]
    /// first.
    ///
    /// [`can_send`]: Self::can_send
    pub fn push(&mut self, frame: Vec<u8>) -> u32 {
        debug_assert!(
            self.can_send(),
            "push on a full window ({} / {})",
            self.buffered.len(),
            self.capacity
        );
        let seq = self.next_seq;
        self.buffered.push_back(frame);
        self.next_seq += 1;
        self.peak_in_flight = self.peak_in_flight.max(self.buffered.len());
        seq
    }

    /// Apply a non-sentinel acknowledgment number.
    pub fn on_ack(&mut self, ack: i32) -> AckOutcome {
        let ack = i64::from(ack);
        let base = i64::from(self.base);

        if ack >= base && ack < i64::from(self.next_seq) {
            let acked = (ack - base + 1) as u32;
            self.buffered.drain(..acked as usize);
            self.base += acked;
            AckOutcome::Advanced { acked }
        } else if ack == base - 1 {
            AckOutcome::Duplicate
        } else {
            AckOutcome::Stale
        }
    }

    /// Claim the one fast retransmit allowed for the current `base`.
    ///
    /// Returns `false` if a duplicate acknowledgment already triggered a
    /// resend since `base` last moved.
    pub fn claim_fast_retransmit(&mut self) -> bool {
        if self.fast_retransmit_at == Some(self.base) {
            return false;
        }
        self.fast_retransmit_at = Some(self.base);
        true
    }

    /// Unacknowledged frames in ascending sequence order.
    pub fn unacked(&self) -> impl Iterator<Item = (u32, &[u8])> {
        let base = self.base;
        self.buffered
            .iter()
            .enumerate()
            .map(move |(i, frame)| (base + i as u32, frame.as_slice()))
    }
}
