//! One-shot boundary timers.
//!
//! The sequence clock never sleeps or polls. When it needs to hear about the
//! next segment boundary it asks a [`BoundaryTimer`] to deliver a token after
//! a delay, and the host hands that token back to the clock's `fire`. Only the
//! most recently issued token is honoured, so a fire from a cancelled timer
//! is harmless even if the host could not stop it in time.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Identifies one arming of a boundary timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(pub(crate) u64);

impl TimerToken {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Host-provided single-shot timer.
///
/// Implementations must deliver `token` back to the owning clock, on the
/// clock's own execution context, no earlier than `delay` from now.
pub trait BoundaryTimer {
    fn arm(&mut self, token: TimerToken, delay: Duration);
    fn cancel(&mut self, token: TimerToken);
}

/// A timer that remembers what it was asked to do and never fires on its own.
///
/// The host polls [`ManualTimer::pending`] and calls the clock's `fire` when
/// it decides the delay has passed.
#[derive(Debug, Default, Clone)]
pub struct ManualTimer {
    pending: Option<PendingTimer>,
    armed: u64,
    cancelled: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimer {
    pub token: TimerToken,
    pub delay: Duration,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The one outstanding timer, if any.
    pub fn pending(&self) -> Option<PendingTimer> {
        self.pending
    }

    /// Remove and return the outstanding timer, as if it had just fired.
    pub fn take(&mut self) -> Option<PendingTimer> {
        self.pending.take()
    }

    pub fn armed_count(&self) -> u64 {
        self.armed
    }

    pub fn cancelled_count(&self) -> u64 {
        self.cancelled
    }
}

impl BoundaryTimer for ManualTimer {
    fn arm(&mut self, token: TimerToken, delay: Duration) {
        self.armed += 1;
        self.pending = Some(PendingTimer { token, delay });
    }

    fn cancel(&mut self, token: TimerToken) {
        if self.pending.map(|p| p.token) == Some(token) {
            self.pending = None;
            self.cancelled += 1;
        }
    }
}

/// Tokio-backed timer. Each arming spawns a sleeping task that sends its
/// token over a channel; cancelling aborts the task.
///
/// Arming must happen inside a tokio runtime.
#[derive(Debug)]
pub struct TokioTimer {
    tx: mpsc::UnboundedSender<TimerToken>,
    task: Option<(TimerToken, JoinHandle<()>)>,
}

impl TokioTimer {
    /// Create the timer and the receiver its fires arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerToken>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, task: None }, rx)
    }

    pub fn is_armed(&self) -> bool {
        self.task
            .as_ref()
            .is_some_and(|(_, handle)| !handle.is_finished())
    }
}

impl BoundaryTimer for TokioTimer {
    fn arm(&mut self, token: TimerToken, delay: Duration) {
        if let Some((_, previous)) = self.task.take() {
            previous.abort();
        }
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the owner shut down.
            let _ = tx.send(token);
        });
        self.task = Some((token, handle));
    }

    fn cancel(&mut self, token: TimerToken) {
        if self.task.as_ref().map(|(t, _)| *t) == Some(token) {
            if let Some((_, handle)) = self.task.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        if let Some((_, handle)) = self.task.take() {
            handle.abort();
        }
    }
}
