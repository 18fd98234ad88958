//! Sending half of a transfer: the transmit and acknowledge loops.
//!
//! # Architecture
//!
//! ```text
//!                  ┌────────────────────────── Shared ──────────────────────────┐
//!                  │  Mutex<SendWindow>   Notify   RetransmitTimer   watch<done> │
//!                  └──────▲──────────────────▲────────────────▲─────────────────┘
//!                         │                  │                │
//!   transmit_loop ────────┤  fill window,    │   wait for     │
//!   (tokio task)          │  send teardown   │   window space │
//!                         │                  │                │
//!   acknowledge_loop ─────┘  slide window,   └── notify_one   └── expired()
//!   (tokio task)             fast retransmit,
//!                            go back N on timeout
//! ```
//!
//! Both loops share one [`SendWindow`] behind a `tokio::sync::Mutex`.  The
//! lock is held across datagram sends so that a resend always observes a
//! consistent `[base, next_seq)` range.
//!
//! The transfer ends when the acknowledge loop sees the teardown sentinel:
//! it sets the `done` flag, both loops return, and the channel is closed.
//! Errors in either loop abort the other and are returned to the caller; the
//! channel is closed on every path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinSet;

use crate::channel::Channel;
use crate::chunker::Chunker;
use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::frame::{decode_ack, encode_data, ACK_FRAME_LEN};
use crate::state::SenderPhase;
use crate::timer::RetransmitTimer;
use crate::window::{AckOutcome, SendWindow};

/// Summary of a completed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferReport {
    /// Data frames the message was split into (teardown excluded).
    pub frames: u32,
    /// Every datagram put on the channel, retransmissions included.
    pub datagrams_sent: u64,
    /// Datagrams resent by fast retransmit or timer expiry.
    pub retransmissions: u64,
    /// Largest `next_seq − base` observed during the transfer.
    pub peak_in_flight: usize,
}

/// Sends one message reliably over an unreliable [`Channel`].
#[derive(Debug)]
pub struct Sender<C> {
    channel: C,
    config: TransferConfig,
}

impl<C: Channel> Sender<C> {
    pub fn new(channel: C, config: TransferConfig) -> Self {
        Self { channel, config }
    }

    /// Transfer `message` and wait for the receiver to confirm teardown.
    ///
    /// Consumes the sender; the channel is closed when this returns, whether
    /// the transfer succeeded or not.
    pub async fn transmit(self, message: impl Into<Vec<u8>>) -> Result<TransferReport, TransferError> {
        let Self { channel, config } = self;

        let prepared = config
            .validate()
            .map_err(TransferError::from)
            .and_then(|()| Chunker::new(message.into(), config.max_chunk));
        let chunker = match prepared {
            Ok(chunker) => chunker,
            Err(e) => {
                channel.close();
                return Err(e);
            }
        };

        log::debug!(
            "[gbn:tx] sending {} bytes in {} frame(s), window={}",
            chunker.message_len(),
            chunker.frame_count(),
            config.window
        );

        let shared = Arc::new(Shared::new(channel, &config, chunker.teardown_seq()));
        let frames = chunker.frame_count();
        let result = run(&shared, chunker).await;
        shared.channel.close();

        let report = shared.report(frames).await;
        match &result {
            Ok(()) => log::info!(
                "[gbn:tx] transfer complete: {} frame(s), {} datagram(s), {} retransmission(s)",
                report.frames,
                report.datagrams_sent,
                report.retransmissions
            ),
            Err(e) => log::warn!("[gbn:tx] transfer failed: {e}"),
        }
        result.map(|()| report)
    }
}

/// Spawn both loops and wait for them; the first failure cancels the other.
async fn run<C: Channel>(shared: &Arc<Shared<C>>, chunker: Chunker) -> Result<(), TransferError> {
    let mut tasks = JoinSet::new();
    tasks.spawn(transmit_loop(Arc::clone(shared), chunker));
    tasks.spawn(acknowledge_loop(Arc::clone(shared)));

    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.map_err(TransferError::from).and_then(|r| r);
        if let Err(e) = outcome {
            tasks.abort_all();
            return Err(e);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct Shared<C> {
    channel: C,
    window: Mutex<SendWindow>,
    /// Signalled by the acknowledge loop whenever `base` advances.
    window_open: Notify,
    timer: RetransmitTimer,
    /// Set once, when the teardown acknowledgment arrives.
    done: watch::Sender<bool>,
    teardown_seq: u32,
    max_retries: u32,
    teardown_retries: u32,
    datagrams_sent: AtomicU64,
    retransmissions: AtomicU64,
}

impl<C: Channel> Shared<C> {
    fn new(channel: C, config: &TransferConfig, teardown_seq: u32) -> Self {
        Self {
            channel,
            window: Mutex::new(SendWindow::new(config.window)),
            window_open: Notify::new(),
            timer: RetransmitTimer::new(config.rto, config.max_rto),
            done: watch::channel(false).0,
            teardown_seq,
            max_retries: config.max_retries,
            teardown_retries: config.teardown_retries,
            datagrams_sent: AtomicU64::new(0),
            retransmissions: AtomicU64::new(0),
        }
    }

    async fn report(&self, frames: u32) -> TransferReport {
        TransferReport {
            frames,
            datagrams_sent: self.datagrams_sent.load(Ordering::Relaxed),
            retransmissions: self.retransmissions.load(Ordering::Relaxed),
            peak_in_flight: self.window.lock().await.peak_in_flight(),
        }
    }

    async fn wait_done(&self) {
        let mut done = self.done.subscribe();
        loop {
            if *done.borrow_and_update() {
                return;
            }
            // `self` owns the sender half, so this cannot fail.
            if done.changed().await.is_err() {
                return;
            }
        }
    }

    async fn put(&self, frame: &[u8]) -> Result<(), TransferError> {
        self.channel.send(frame).await?;
        self.datagrams_sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Block until the window has room, then buffer and send `frame`.
    ///
    /// Returns `None` if the transfer completed while waiting.
    async fn send_new(&self, frame: Vec<u8>) -> Result<Option<u32>, TransferError> {
        loop {
            {
                let mut window = self.window.lock().await;
                if window.can_send() {
                    self.put(&frame).await?;
                    let seq = window.push(frame);
                    self.timer.arm_if_idle();
                    log::trace!(
                        "[gbn:tx] → DATA seq={seq} in_flight={}/{}",
                        window.in_flight(),
                        window.capacity()
                    );
                    return Ok(Some(seq));
                }
            }
            tokio::select! {
                () = self.window_open.notified() => {}
                () = self.wait_done() => return Ok(None),
            }
        }
    }

    /// Block until every buffered frame is acknowledged.
    async fn drain(&self) -> bool {
        loop {
            if !self.window.lock().await.has_unacked() {
                return true;
            }
            tokio::select! {
                () = self.window_open.notified() => {}
                () = self.wait_done() => return false,
            }
        }
    }

    /// Resend `[base, next_seq)` in ascending order.  Caller holds the lock.
    async fn go_back_n(&self, window: &SendWindow) -> Result<(), TransferError> {
        for (seq, frame) in window.unacked() {
            log::trace!("[gbn:tx] ↻ DATA seq={seq}");
            self.put(frame).await?;
            self.retransmissions.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn on_ack(&self, ack: i32) -> Result<(), TransferError> {
        let mut window = self.window.lock().await;
        match window.on_ack(ack) {
            AckOutcome::Advanced { acked } => {
                log::debug!("[gbn:ack] ← ACK {ack} (slid {acked}, base={})", window.base());
                self.timer.on_progress(window.has_unacked());
                self.window_open.notify_one();
            }
            AckOutcome::Duplicate => {
                if window.has_unacked() && window.claim_fast_retransmit() {
                    log::debug!(
                        "[gbn:ack] ← duplicate ACK {ack}; fast retransmit of {} frame(s) from base={}",
                        window.in_flight(),
                        window.base()
                    );
                    self.go_back_n(&window).await?;
                    self.timer.rearm();
                } else {
                    log::trace!("[gbn:ack] ← duplicate ACK {ack}");
                }
            }
            AckOutcome::Stale => log::trace!("[gbn:ack] ← stale ACK {ack} ignored"),
        }
        Ok(())
    }

    /// Accept a teardown acknowledgment if the teardown frame is out.
    async fn confirm_teardown(&self) -> bool {
        let window = self.window.lock().await;
        if SenderPhase::of(&window, self.teardown_seq) != SenderPhase::TearingDown {
            log::debug!("[gbn:ack] ← TEARDOWN_ACK before teardown was sent; ignored");
            return false;
        }
        self.timer.disarm();
        self.done.send_replace(true);
        log::debug!("[gbn:ack] ← TEARDOWN_ACK; {}", SenderPhase::Complete);
        true
    }

    async fn on_timeout(&self) -> Result<(), TransferError> {
        let window = self.window.lock().await;
        if !window.has_unacked() {
            self.timer.disarm();
            return Ok(());
        }

        let expiries = self.timer.on_expired();
        match SenderPhase::of(&window, self.teardown_seq) {
            SenderPhase::TearingDown if expiries > self.teardown_retries => {
                return Err(TransferError::TeardownNotConfirmed { attempts: expiries });
            }
            SenderPhase::Sending | SenderPhase::Draining if expiries > self.max_retries => {
                return Err(TransferError::RetriesExhausted { base: window.base() });
            }
            _ => {}
        }

        log::warn!(
            "[gbn:tx] timeout #{expiries}: going back to base={} ({} frame(s), next rto {:?})",
            window.base(),
            window.in_flight(),
            self.timer.current_rto()
        );
        self.go_back_n(&window).await
    }
}

// ---------------------------------------------------------------------------
// Loops
// ---------------------------------------------------------------------------

/// Fill the window with data frames, then send the teardown frame once
/// everything has been acknowledged.
async fn transmit_loop<C: Channel>(shared: Arc<Shared<C>>, chunker: Chunker) -> Result<(), TransferError> {
    let mut seq = 0;
    while let Some(payload) = chunker.payload(seq) {
        if shared.send_new(encode_data(seq, &payload)).await?.is_none() {
            return Ok(());
        }
        seq += 1;
    }

    log::debug!("[gbn:tx] all {seq} frame(s) sent; draining");
    if !shared.drain().await {
        return Ok(());
    }

    log::debug!("[gbn:tx] → TEARDOWN seq={}", shared.teardown_seq);
    if shared.send_new(encode_data(shared.teardown_seq, &[])).await?.is_some() {
        shared.wait_done().await;
    }
    Ok(())
}

/// Consume acknowledgments and timer expiries until teardown is confirmed.
async fn acknowledge_loop<C: Channel>(shared: Arc<Shared<C>>) -> Result<(), TransferError> {
    // One spare byte so an oversized datagram is seen as such, not truncated
    // into a plausible ack.
    let mut buf = [0u8; ACK_FRAME_LEN + 1];
    loop {
        tokio::select! {
            received = shared.channel.recv(&mut buf) => {
                let (n, _) = received?;
                let ack = match decode_ack(&buf[..n]) {
                    Ok(ack) => ack,
                    Err(e) => {
                        log::debug!("[gbn:ack] ← dropped ack datagram: {e}");
                        continue;
                    }
                };
                if ack.is_teardown() {
                    if shared.confirm_teardown().await {
                        return Ok(());
                    }
                    continue;
                }
                shared.on_ack(ack.ack).await?;
            }
            () = shared.timer.expired() => shared.on_timeout().await?,
        }
    }
}
