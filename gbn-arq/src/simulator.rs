//! Network simulator for deterministic testing.
//!
//! Real networks drop, reorder, duplicate and corrupt datagrams.  To exercise
//! the recovery paths without depending on actual network conditions this
//! module provides:
//!
//! - [`memory_link`] builds a pair of in-process [`MemoryChannel`]s joined
//!   back to back.  Sending to a peer that has gone away silently loses the
//!   datagram, exactly like UDP.
//! - [`FaultyChannel`] wraps any [`Channel`] and applies a [`FaultPlan`] to
//!   every outbound datagram:
//!
//! | Fault        | Description                                             |
//! |--------------|---------------------------------------------------------|
//! | Loss         | Drop a datagram with probability `loss_rate`.           |
//! | Corruption   | Flip one random bit with probability `corrupt_rate`.    |
//! | Duplication  | Deliver a datagram twice with probability `duplicate_rate`. |
//! | Rules        | Drop or corrupt specific frames, a bounded number of times. |
//!
//! Randomness comes from a seeded `StdRng`, so a failing run can be replayed
//! with the same seed.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;

use crate::channel::{closed_error, Channel};
use crate::frame::CHECKSUM_LEN;

// ---------------------------------------------------------------------------
// In-memory link
// ---------------------------------------------------------------------------

/// One end of an in-process datagram link.
#[derive(Debug)]
pub struct MemoryChannel {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    /// Reported as the source of every received datagram.
    peer: SocketAddr,
    closed: AtomicBool,
}

/// Build two channels where whatever one sends, the other receives.
pub fn memory_link() -> (MemoryChannel, MemoryChannel) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    let addr = |port| SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port));
    let a = MemoryChannel {
        tx: a_tx,
        rx: tokio::sync::Mutex::new(a_rx),
        peer: addr(2),
        closed: AtomicBool::new(false),
    };
    let b = MemoryChannel {
        tx: b_tx,
        rx: tokio::sync::Mutex::new(b_rx),
        peer: addr(1),
        closed: AtomicBool::new(false),
    };
    (a, b)
}

impl Channel for MemoryChannel {
    async fn send(&self, datagram: &[u8]) -> io::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error());
        }
        // A vanished peer behaves like an unbound UDP port: the datagram is lost.
        let _ = self.tx.send(datagram.to_vec());
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error());
        }
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(datagram) => {
                let n = datagram.len().min(buf.len());
                buf[..n].copy_from_slice(&datagram[..n]);
                Ok((n, self.peer))
            }
            // Silence, not an error: the peer simply never sends again.
            None => std::future::pending().await,
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Fault model
// ---------------------------------------------------------------------------

/// Which datagrams a [`FaultRule`] applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMatch {
    /// The n-th datagram sent through the channel, counting from 0.
    Nth(usize),
    /// Frames whose sequence / ack field equals this value.
    Number(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultAction {
    Drop,
    /// Flip the lowest bit of the sequence / ack field.
    Corrupt,
}

/// A deterministic fault applied to the first `remaining` matching datagrams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultRule {
    pub matcher: FrameMatch,
    pub action: FaultAction,
    pub remaining: usize,
}

impl FaultRule {
    /// Drop the first data frame carrying `seq`.
    pub fn drop_seq(seq: u32) -> Self {
        Self::once(FrameMatch::Number(seq as i32), FaultAction::Drop)
    }

    /// Drop the first acknowledgment carrying `ack`.
    pub fn drop_ack(ack: i32) -> Self {
        Self::once(FrameMatch::Number(ack), FaultAction::Drop)
    }

    pub fn drop_nth(n: usize) -> Self {
        Self::once(FrameMatch::Nth(n), FaultAction::Drop)
    }

    /// Corrupt the first data frame carrying `seq`.
    pub fn corrupt_seq(seq: u32) -> Self {
        Self::once(FrameMatch::Number(seq as i32), FaultAction::Corrupt)
    }

    /// Apply the rule to the first `n` matches instead of one.
    pub fn times(mut self, n: usize) -> Self {
        self.remaining = n;
        self
    }

    fn once(matcher: FrameMatch, action: FaultAction) -> Self {
        Self {
            matcher,
            action,
            remaining: 1,
        }
    }

    fn matches(&self, index: usize, datagram: &[u8]) -> bool {
        if self.remaining == 0 {
            return false;
        }
        match self.matcher {
            FrameMatch::Nth(n) => n == index,
            FrameMatch::Number(number) => frame_number(datagram) == Some(number),
        }
    }
}

/// Configuration of the fault-injection model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    pub loss_rate: f64,
    pub corrupt_rate: f64,
    pub duplicate_rate: f64,
    pub seed: u64,
    pub rules: Vec<FaultRule>,
}

impl FaultPlan {
    /// No faults: a transparent pass-through.
    pub fn lossless() -> Self {
        Self::default()
    }

    /// Random loss at `loss_rate` with a fixed seed.
    pub fn lossy(loss_rate: f64, seed: u64) -> Self {
        Self {
            loss_rate,
            seed,
            ..Self::default()
        }
    }

    pub fn with_rule(mut self, rule: FaultRule) -> Self {
        self.rules.push(rule);
        self
    }
}

/// Counters of what the simulator did to the outbound stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStats {
    /// Datagrams handed to the channel by the protocol.
    pub offered: usize,
    pub dropped: usize,
    pub corrupted: usize,
    pub duplicated: usize,
}

#[derive(Debug)]
struct FaultState {
    plan: FaultPlan,
    rng: StdRng,
    stats: FaultStats,
}

/// What to do with one outbound datagram.
enum Verdict {
    Drop,
    Deliver { datagram: Vec<u8>, copies: usize },
}

/// A fault-injecting wrapper around another channel.
///
/// Faults are applied on send; receives pass straight through.
#[derive(Debug)]
pub struct FaultyChannel<C> {
    inner: C,
    state: Mutex<FaultState>,
}

impl<C: Channel> FaultyChannel<C> {
    pub fn new(inner: C, plan: FaultPlan) -> Self {
        let rng = StdRng::seed_from_u64(plan.seed);
        Self {
            inner,
            state: Mutex::new(FaultState {
                plan,
                rng,
                stats: FaultStats::default(),
            }),
        }
    }

    pub fn stats(&self) -> FaultStats {
        self.lock().stats
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FaultState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn judge(&self, datagram: &[u8]) -> Verdict {
        let mut guard = self.lock();
        let state = &mut *guard;
        let index = state.stats.offered;
        state.stats.offered += 1;

        let mut datagram = datagram.to_vec();

        if let Some(rule) = state
            .plan
            .rules
            .iter_mut()
            .find(|r| r.matches(index, &datagram))
        {
            rule.remaining -= 1;
            match rule.action {
                FaultAction::Drop => {
                    log::debug!("[sim] rule dropped datagram #{index}");
                    state.stats.dropped += 1;
                    return Verdict::Drop;
                }
                FaultAction::Corrupt => {
                    log::debug!("[sim] rule corrupted datagram #{index}");
                    if let Some(byte) = datagram.get_mut(CHECKSUM_LEN + 3) {
                        *byte ^= 0x01;
                    }
                    state.stats.corrupted += 1;
                    return Verdict::Deliver { datagram, copies: 1 };
                }
            }
        }

        if state.rng.random::<f64>() < state.plan.loss_rate {
            log::trace!("[sim] lost datagram #{index}");
            state.stats.dropped += 1;
            return Verdict::Drop;
        }

        if !datagram.is_empty() && state.rng.random::<f64>() < state.plan.corrupt_rate {
            let bit = state.rng.random_range(0..datagram.len() * 8);
            datagram[bit / 8] ^= 1 << (bit % 8);
            log::trace!("[sim] flipped bit {bit} of datagram #{index}");
            state.stats.corrupted += 1;
        }

        let copies = if state.rng.random::<f64>() < state.plan.duplicate_rate {
            state.stats.duplicated += 1;
            2
        } else {
            1
        };
        Verdict::Deliver { datagram, copies }
    }
}

impl<C: Channel> Channel for FaultyChannel<C> {
    async fn send(&self, datagram: &[u8]) -> io::Result<()> {
        match self.judge(datagram) {
            Verdict::Drop => Ok(()),
            Verdict::Deliver { datagram, copies } => {
                for _ in 0..copies {
                    self.inner.send(&datagram).await?;
                }
                Ok(())
            }
        }
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.recv(buf).await
    }

    fn close(&self) {
        self.inner.close();
    }
}

/// The big-endian number at bytes 8..12, if the datagram is long enough.
fn frame_number(datagram: &[u8]) -> Option<i32> {
    let field = datagram.get(CHECKSUM_LEN..CHECKSUM_LEN + 4)?;
    Some(i32::from_be_bytes([field[0], field[1], field[2], field[3]]))
}
