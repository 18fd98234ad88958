//! Splits an application message into data-frame payloads.
//!
//! Sequence number 0 carries the [`Metadata`] prefix (total message length)
//! followed by as many message bytes as fit; every later sequence number
//! carries the next raw slice of at most `max_chunk` bytes.  The sequence
//! number after the last data frame is reserved for the teardown frame.
//!
//! ```text
//!  seq 0                 seq 1            seq 2          seq N (teardown)
//! ┌─────┬────────────┐  ┌──────────────┐ ┌───────┐      ┌┐
//! │ len │ bytes 0..k │  │ bytes k..k+c │ │ ...   │      ││ (empty)
//! └─────┴────────────┘  └──────────────┘ └───────┘      └┘
//! ```

use crate::error::TransferError;
use crate::frame::{Metadata, METADATA_LEN};

/// Read-only view of the message that hands out per-sequence payloads.
#[derive(Debug)]
pub struct Chunker {
    message: Vec<u8>,
    max_chunk: usize,
    /// Message bytes that fit in sequence 0 after the length prefix.
    first_len: usize,
    /// Number of data frames, excluding teardown.
    frames: u32,
}

impl Chunker {
    /// Prepare `message` for frames of at most `max_chunk` payload bytes.
    ///
    /// `max_chunk` must exceed [`METADATA_LEN`]; [`crate::config::TransferConfig::validate`]
    /// guarantees this.
    pub fn new(message: Vec<u8>, max_chunk: usize) -> Result<Self, TransferError> {
        debug_assert!(max_chunk > METADATA_LEN);
        let len = message.len();
        if u32::try_from(len).is_err() {
            return Err(TransferError::MessageTooLarge(len));
        }

        let first_len = len.min(max_chunk - METADATA_LEN);
        let frames = 1 + (len - first_len).div_ceil(max_chunk);
        // Ack numbers are signed 32-bit and teardown takes one more number.
        let frames = match u32::try_from(frames) {
            Ok(n) if n < i32::MAX as u32 => n,
            _ => return Err(TransferError::MessageTooLarge(len)),
        };

        Ok(Self {
            message,
            max_chunk,
            first_len,
            frames,
        })
    }

    /// Number of data frames needed to carry the whole message.
    pub fn frame_count(&self) -> u32 {
        self.frames
    }

    /// Sequence number of the zero-payload teardown frame.
    pub fn teardown_seq(&self) -> u32 {
        self.frames
    }

    pub fn message_len(&self) -> usize {
        self.message.len()
    }

    /// Payload for data frame `seq`, or `None` past the last data frame.
    pub fn payload(&self, seq: u32) -> Option<Vec<u8>> {
        if seq >= self.frames {
            return None;
        }
        if seq == 0 {
            let meta = Metadata {
                message_len: self.message.len() as u32,
                initial: &self.message[..self.first_len],
            };
            return Some(meta.encode());
        }
        let start = self.first_len + (seq as usize - 1) * self.max_chunk;
        let end = (start + self.max_chunk).min(self.message.len());
        Some(self.message[start..end].to_vec())
    }
}
