//! Wire-format definitions for data and acknowledgment frames.
//!
//! Every datagram exchanged between the two endpoints is either a data frame
//! (sender → receiver) or an acknowledgment frame (receiver → sender).  This
//! module is responsible for:
//! - Defining the on-wire binary layout of both frame types.
//! - Computing the CRC-32 integrity value that guards each frame.
//! - Decoding raw bytes back into frames, returning [`FrameError`] for
//!   truncated or corrupted input instead of panicking.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      Checksum (high, zero)                    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      Checksum (CRC-32)                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |            Sequence Number (u32) / Ack Number (i32)           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                 Payload ... (data frames only)                |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The checksum covers every byte after the checksum field.  The payload of
//! sequence number 0 starts with a 4-byte message length (see [`Metadata`]).
//! A data frame with an empty payload is the teardown signal.

use thiserror::Error;

/// Byte length of the checksum field.
pub const CHECKSUM_LEN: usize = 8;

/// Byte length of the fixed header shared by both frame types.
pub const HEADER_LEN: usize = CHECKSUM_LEN + 4;

/// Byte length of an acknowledgment frame on the wire.
pub const ACK_FRAME_LEN: usize = HEADER_LEN;

/// Byte length of the message-length prefix carried by sequence number 0.
pub const METADATA_LEN: usize = 4;

/// Ack number acknowledging the teardown frame.
pub const TEARDOWN_ACK: i32 = -2;

/// Ack number sent before anything has been accepted.
pub const NO_PROGRESS: i32 = -1;

// Byte offsets within a serialised frame.
const OFF_CHECKSUM: usize = 0;
const OFF_NUMBER: usize = CHECKSUM_LEN;
const OFF_PAYLOAD: usize = HEADER_LEN;

/// A decoded data frame borrowing its payload from the datagram buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFrame<'a> {
    pub seq: u32,
    pub payload: &'a [u8],
}

impl DataFrame<'_> {
    /// `true` for the zero-payload frame that closes a transfer.
    pub fn is_teardown(&self) -> bool {
        self.payload.is_empty()
    }
}

/// A decoded acknowledgment frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckFrame {
    pub ack: i32,
}

impl AckFrame {
    pub fn is_teardown(&self) -> bool {
        self.ack == TEARDOWN_ACK
    }
}

/// The sub-frame at the front of the sequence-0 payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata<'a> {
    /// Total length of the message being transferred.
    pub message_len: u32,
    /// The leading message bytes that fit after the length prefix.
    pub initial: &'a [u8],
}

impl<'a> Metadata<'a> {
    /// Split a sequence-0 payload into its length prefix and leading bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self, FrameError> {
        if payload.len() < METADATA_LEN {
            return Err(FrameError::MalformedMetadata(payload.len()));
        }
        Ok(Self {
            message_len: read_u32(payload, 0),
            initial: &payload[METADATA_LEN..],
        })
    }

    /// Serialise into a payload ready for [`encode_data`].
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(METADATA_LEN + self.initial.len());
        buf.extend_from_slice(&self.message_len.to_be_bytes());
        buf.extend_from_slice(self.initial);
        buf
    }
}

/// Errors that can arise when decoding a raw datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Datagram length is impossible for the expected frame type.
    #[error("datagram of {0} bytes has the wrong length for this frame type")]
    BadLength(usize),
    /// Stored checksum does not match the recomputed value.
    #[error("checksum mismatch")]
    ChecksumMismatch,
    /// Sequence-0 payload too short to hold the message length.
    #[error("metadata payload of {0} bytes is shorter than the length prefix")]
    MalformedMetadata(usize),
}

/// Serialise a data frame: `checksum(8) ‖ seq(4) ‖ payload`.
pub fn encode_data(seq: u32, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; HEADER_LEN + payload.len()];
    buf[OFF_NUMBER..OFF_PAYLOAD].copy_from_slice(&seq.to_be_bytes());
    buf[OFF_PAYLOAD..].copy_from_slice(payload);
    let sum = checksum(&buf[OFF_NUMBER..]);
    buf[OFF_CHECKSUM..OFF_NUMBER].copy_from_slice(&sum);
    buf
}

/// Parse and verify a data frame.
pub fn decode_data(buf: &[u8]) -> Result<DataFrame<'_>, FrameError> {
    if buf.len() < HEADER_LEN {
        return Err(FrameError::BadLength(buf.len()));
    }
    verify(buf)?;
    Ok(DataFrame {
        seq: read_u32(buf, OFF_NUMBER),
        payload: &buf[OFF_PAYLOAD..],
    })
}

/// Serialise an acknowledgment frame: `checksum(8) ‖ ack(4)`.
pub fn encode_ack(ack: i32) -> Vec<u8> {
    let mut buf = vec![0u8; ACK_FRAME_LEN];
    buf[OFF_NUMBER..].copy_from_slice(&ack.to_be_bytes());
    let sum = checksum(&buf[OFF_NUMBER..]);
    buf[OFF_CHECKSUM..OFF_NUMBER].copy_from_slice(&sum);
    buf
}

/// Parse and verify an acknowledgment frame.
pub fn decode_ack(buf: &[u8]) -> Result<AckFrame, FrameError> {
    if buf.len() != ACK_FRAME_LEN {
        return Err(FrameError::BadLength(buf.len()));
    }
    verify(buf)?;
    Ok(AckFrame {
        ack: read_u32(buf, OFF_NUMBER) as i32,
    })
}

/// Compare the stored checksum against one recomputed over `buf[8..]`.
fn verify(buf: &[u8]) -> Result<(), FrameError> {
    if buf[OFF_CHECKSUM..OFF_NUMBER] == checksum(&buf[OFF_NUMBER..]) {
        Ok(())
    } else {
        Err(FrameError::ChecksumMismatch)
    }
}

/// CRC-32 of `data`, left-padded with zeros into the 8-byte checksum field.
fn checksum(data: &[u8]) -> [u8; CHECKSUM_LEN] {
    u64::from(crc32fast::hash(data)).to_be_bytes()
}

#[inline]
fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}
