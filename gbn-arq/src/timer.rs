//! The single retransmission timer of a transfer.
//!
//! Go-Back-N needs exactly one timer, tied to the oldest unacknowledged
//! frame.  [`RetransmitTimer`] stores its deadline in a
//! `tokio::sync::watch` channel so the transmit loop can arm it while the
//! acknowledge loop waits on [`RetransmitTimer::expired`]; any change to the
//! deadline wakes the waiter and it re-evaluates.
//!
//! The timeout doubles on each consecutive expiry (exponential back-off) up
//! to a configurable maximum and returns to its base value whenever the
//! window makes progress.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct TimerState {
    /// `None` while no frame is outstanding.
    deadline: Option<Instant>,
    /// Timeout applied the next time the timer is armed.
    current_rto: Duration,
    /// Expiries since the window last moved.
    expiries: u32,
}

/// Shared retransmission timer.
///
/// All methods take `&self`; wrap in an `Arc` to share between tasks.
#[derive(Debug)]
pub struct RetransmitTimer {
    state: watch::Sender<TimerState>,
    initial_rto: Duration,
    max_rto: Duration,
}

impl RetransmitTimer {
    /// Construct a disarmed timer.
    pub fn new(initial_rto: Duration, max_rto: Duration) -> Self {
        let (state, _) = watch::channel(TimerState {
            deadline: None,
            current_rto: initial_rto,
            expiries: 0,
        });
        Self {
            state,
            initial_rto,
            max_rto,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.state.borrow().deadline.is_some()
    }

    /// Timeout the next arm or rearm will use.
    pub fn current_rto(&self) -> Duration {
        self.state.borrow().current_rto
    }

    /// Arm the timer unless it is already running.
    ///
    /// Called after every transmission: the first frame entering an empty
    /// window starts the clock, later frames leave it alone.
    pub fn arm_if_idle(&self) {
        self.state.send_if_modified(|s| {
            if s.deadline.is_some() {
                return false;
            }
            s.deadline = Some(Instant::now() + s.current_rto);
            true
        });
    }

    /// The window advanced: drop any back-off and restart (or stop) the clock.
    pub fn on_progress(&self, still_outstanding: bool) {
        let rto = self.initial_rto;
        self.state.send_modify(|s| {
            s.current_rto = rto;
            s.expiries = 0;
            s.deadline = still_outstanding.then(|| Instant::now() + rto);
        });
    }

    /// Record an expiry, double the timeout and rearm.
    ///
    /// Returns how many consecutive expiries have occurred without progress.
    pub fn on_expired(&self) -> u32 {
        let max = self.max_rto;
        let mut expiries = 0;
        self.state.send_modify(|s| {
            s.expiries += 1;
            s.current_rto = (s.current_rto * 2).min(max);
            s.deadline = Some(Instant::now() + s.current_rto);
            expiries = s.expiries;
        });
        expiries
    }

    /// Restart the clock after a resend that was not caused by expiry.
    pub fn rearm(&self) {
        self.state.send_modify(|s| {
            s.deadline = Some(Instant::now() + s.current_rto);
        });
    }

    pub fn disarm(&self) {
        self.state.send_if_modified(|s| s.deadline.take().is_some());
    }

    /// Resolve once the armed deadline passes.
    ///
    /// Never resolves while the timer stays disarmed.  Cancel-safe: dropping
    /// the future has no effect on the timer.
    pub async fn expired(&self) {
        let mut rx = self.state.subscribe();
        loop {
            let deadline = rx.borrow_and_update().deadline;
            match deadline {
                Some(at) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(at) => return,
                        _ = rx.changed() => {}
                    }
                }
                None => {
                    // The sender lives in `self`, so this cannot fail.
                    let _ = rx.changed().await;
                }
            }
        }
    }
}
