//! Receiving half of a transfer.
//!
//! [`ReceiverCursor`] is the pure, single-threaded state machine: it takes
//! one raw datagram at a time and says which acknowledgment to send back.
//! [`Receiver`] drives it over a [`Channel`] and handles the teardown burst.
//!
//! - Only the frame numbered `expected_seq` is accepted.
//! - Anything else (corrupt, out of order, already accepted) is answered with
//!   a duplicate acknowledgment for `expected_seq − 1`, or [`NO_PROGRESS`]
//!   before sequence 0 has been accepted.
//! - The empty frame at `expected_seq` ends the transfer and is answered with
//!   a burst of [`TEARDOWN_ACK`]s.

use tokio::time::{timeout_at, Instant};

use crate::channel::Channel;
use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::frame::{decode_data, encode_ack, Metadata, NO_PROGRESS, TEARDOWN_ACK};
use crate::state::ReceiverState;

// ---------------------------------------------------------------------------
// ReceiverCursor
// ---------------------------------------------------------------------------

/// How the cursor treated one inbound datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// In-order data appended to the message.
    Accepted,
    /// The teardown frame; answer with the sentinel burst.
    Teardown,
    /// Valid frame with an unexpected sequence number.
    OutOfOrder,
    /// Failed the checksum or could not be parsed.
    Corrupt,
}

/// The acknowledgment to send in response to a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub ack: i32,
    pub disposition: Disposition,
}

/// Receive-side state for one transfer.
#[derive(Debug, Default)]
pub struct ReceiverCursor {
    state: ReceiverState,
    /// Next sequence number that will be accepted.
    expected_seq: u32,
    /// `messageLength` from the sequence-0 metadata.
    declared_len: Option<u32>,
    assembled: Vec<u8>,
}

impl ReceiverCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn expected_seq(&self) -> u32 {
        self.expected_seq
    }

    /// Highest sequence number accepted so far, or [`NO_PROGRESS`].
    pub fn last_acked(&self) -> i32 {
        match self.expected_seq {
            0 => NO_PROGRESS,
            n => (n - 1) as i32,
        }
    }

    pub fn assembled(&self) -> &[u8] {
        &self.assembled
    }

    /// Process one raw datagram.
    pub fn on_datagram(&mut self, datagram: &[u8]) -> Reply {
        let frame = match decode_data(datagram) {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("[gbn:rx] ← corrupt datagram ({e}); dup ACK {}", self.last_acked());
                return self.duplicate(Disposition::Corrupt);
            }
        };

        if frame.seq != self.expected_seq {
            log::trace!(
                "[gbn:rx] ← DATA seq={} out of order (expected {}); dup ACK {}",
                frame.seq,
                self.expected_seq,
                self.last_acked()
            );
            return self.duplicate(Disposition::OutOfOrder);
        }

        match self.state {
            ReceiverState::AwaitingMetadata => {
                let meta = match Metadata::parse(frame.payload) {
                    Ok(meta) => meta,
                    Err(e) => {
                        log::debug!("[gbn:rx] ← seq 0 rejected: {e}");
                        return self.duplicate(Disposition::Corrupt);
                    }
                };
                log::debug!(
                    "[gbn:rx] ← metadata: message_len={} initial={}B",
                    meta.message_len,
                    meta.initial.len()
                );
                self.declared_len = Some(meta.message_len);
                self.assembled.reserve(meta.message_len as usize);
                self.assembled.extend_from_slice(meta.initial);
                self.state = ReceiverState::Receiving;
                self.accept()
            }
            ReceiverState::Receiving if frame.is_teardown() => {
                log::debug!("[gbn:rx] ← TEARDOWN seq={}; {} bytes assembled", frame.seq, self.assembled.len());
                self.state = ReceiverState::Done;
                Reply {
                    ack: TEARDOWN_ACK,
                    disposition: Disposition::Teardown,
                }
            }
            ReceiverState::Receiving => {
                self.assembled.extend_from_slice(frame.payload);
                self.accept()
            }
            // Only a repeat of the teardown frame can still match.
            ReceiverState::Done if frame.is_teardown() => Reply {
                ack: TEARDOWN_ACK,
                disposition: Disposition::Teardown,
            },
            ReceiverState::Done => self.duplicate(Disposition::OutOfOrder),
        }
    }

    /// Hand over the message once teardown has been accepted.
    ///
    /// Fails if the assembled length disagrees with the declared length.
    pub fn into_message(self) -> Result<Vec<u8>, TransferError> {
        let declared = self.declared_len.unwrap_or(0);
        if self.state != ReceiverState::Done || self.assembled.len() != declared as usize {
            return Err(TransferError::LengthMismatch {
                declared,
                received: self.assembled.len(),
            });
        }
        Ok(self.assembled)
    }

    fn accept(&mut self) -> Reply {
        let ack = self.expected_seq as i32;
        self.expected_seq += 1;
        log::trace!("[gbn:rx] → ACK {ack}");
        Reply {
            ack,
            disposition: Disposition::Accepted,
        }
    }

    fn duplicate(&self, disposition: Disposition) -> Reply {
        Reply {
            ack: self.last_acked(),
            disposition,
        }
    }
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// Receives one message from a [`crate::sender::Sender`].
#[derive(Debug)]
pub struct Receiver<C> {
    channel: C,
    config: TransferConfig,
}

impl<C: Channel> Receiver<C> {
    pub fn new(channel: C, config: TransferConfig) -> Self {
        Self { channel, config }
    }

    /// Block until a complete message has been received and the teardown
    /// burst sent.  The channel is closed on return.
    pub async fn receive(self) -> Result<Vec<u8>, TransferError> {
        let result = match self.config.validate() {
            Ok(()) => self.run().await,
            Err(e) => Err(e.into()),
        };
        self.channel.close();
        result
    }

    async fn run(&self) -> Result<Vec<u8>, TransferError> {
        let max_datagram = self.config.max_datagram();
        // One spare byte to recognise oversized datagrams.
        let mut buf = vec![0u8; max_datagram + 1];
        let mut cursor = ReceiverCursor::new();

        while cursor.state() != ReceiverState::Done {
            let (n, _) = self.channel.recv(&mut buf).await?;
            self.respond(&mut cursor, &buf[..n], max_datagram).await?;
        }

        if !self.config.linger.is_zero() {
            let deadline = Instant::now() + self.config.linger;
            log::debug!("[gbn:rx] lingering for {:?}", self.config.linger);
            while let Ok(received) = timeout_at(deadline, self.channel.recv(&mut buf)).await {
                let (n, _) = received?;
                self.respond(&mut cursor, &buf[..n], max_datagram).await?;
            }
        }

        let message = cursor.into_message()?;
        log::info!("[gbn:rx] received {} bytes", message.len());
        Ok(message)
    }

    async fn respond(
        &self,
        cursor: &mut ReceiverCursor,
        datagram: &[u8],
        max_datagram: usize,
    ) -> Result<(), TransferError> {
        if datagram.len() > max_datagram {
            log::debug!("[gbn:rx] ← oversized datagram ({} bytes) dropped", datagram.len());
            self.channel.send(&encode_ack(cursor.last_acked())).await?;
            return Ok(());
        }
        let reply = cursor.on_datagram(datagram);
        if reply.disposition == Disposition::Teardown {
            return self.burst().await;
        }
        self.channel.send(&encode_ack(reply.ack)).await?;
        Ok(())
    }

    /// Send `teardown_burst` copies of the teardown acknowledgment.
    async fn burst(&self) -> Result<(), TransferError> {
        let ack = encode_ack(TEARDOWN_ACK);
        for _ in 0..self.config.teardown_burst {
            self.channel.send(&ack).await?;
        }
        log::debug!("[gbn:rx] → TEARDOWN_ACK x{}", self.config.teardown_burst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
