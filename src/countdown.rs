//! Cancellable 3-2-1 arming countdown.
//!
//! [`CountdownTimer::begin`] spawns a tokio task that emits
//! [`CountdownEvent::Tick`] for each remaining value and exactly one
//! [`CountdownEvent::Armed`] on natural completion, then goes inert until
//! `begin` is called again.  [`CountdownTimer::cancel`] is safe to call at
//! any time — before completion it stops the sequence and suppresses
//! `Armed`; after completion (or before any `begin`) it is a no-op.
//!
//! Events are sent into the caller's channel (the session controller's
//! internal event queue) so arming shares the same serialized timeline as
//! every other transition.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

// ---------------------------------------------------------------------------
// CountdownEvent
// ---------------------------------------------------------------------------

/// Events produced by a running countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownEvent {
    /// `n` intervals left before arming; the display shows this value.
    Tick(u32),
    /// Natural completion — playback and capture may now start together.
    Armed,
}

// ---------------------------------------------------------------------------
// CountdownError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CountdownError {
    /// `begin` while a countdown is still pending.
    #[error("countdown already running")]
    AlreadyRunning,
}

// ---------------------------------------------------------------------------
// CountdownTimer
// ---------------------------------------------------------------------------

/// Handle to at most one pending countdown task.
#[derive(Debug, Default)]
pub struct CountdownTimer {
    handle: Option<tokio::task::JoinHandle<()>>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl CountdownTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a countdown of `ticks` steps, one every `interval`.
    ///
    /// The first `Tick(ticks)` is emitted immediately so the display never
    /// shows a stale value; `Armed` follows `ticks` intervals later.  The
    /// event type `E` is whatever the receiving channel carries, as long as
    /// it can be built from a [`CountdownEvent`].
    pub fn begin<E>(
        &mut self,
        ticks: u32,
        interval: Duration,
        tx: mpsc::Sender<E>,
    ) -> Result<(), CountdownError>
    where
        E: From<CountdownEvent> + Send + 'static,
    {
        if self.is_pending() {
            return Err(CountdownError::AlreadyRunning);
        }

        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let mut remaining = ticks;
            if remaining > 0 {
                if tx.send(CountdownEvent::Tick(remaining).into()).await.is_err() {
                    return;
                }
            }

            let mut timer = tokio::time::interval(interval);
            timer.tick().await; // the immediate first tick

            loop {
                if remaining == 0 {
                    let _ = tx.send(CountdownEvent::Armed.into()).await;
                    return;
                }
                tokio::select! {
                    _ = &mut cancel_rx => {
                        log::debug!("countdown: cancelled at {remaining}");
                        return;
                    }
                    _ = timer.tick() => {
                        remaining -= 1;
                        if remaining == 0 {
                            let _ = tx.send(CountdownEvent::Armed.into()).await;
                            return;
                        }
                        if tx.send(CountdownEvent::Tick(remaining).into()).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        self.handle = Some(handle);
        self.cancel_tx = Some(cancel_tx);
        Ok(())
    }

    /// Abort a pending countdown.  No-op when nothing is pending.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            // Fails when the task already finished naturally — fine.
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// `true` while a countdown task is still running.
    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: Duration = Duration::from_millis(5);

    async fn collect(rx: &mut mpsc::Receiver<CountdownEvent>) -> Vec<CountdownEvent> {
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            let done = ev == CountdownEvent::Armed;
            events.push(ev);
            if done {
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn natural_completion_emits_ticks_then_armed_once() {
        let (tx, mut rx) = mpsc::channel::<CountdownEvent>(16);
        let mut timer = CountdownTimer::new();
        timer.begin(3, FAST, tx).expect("begin");

        let events = collect(&mut rx).await;
        assert_eq!(
            events,
            vec![
                CountdownEvent::Tick(3),
                CountdownEvent::Tick(2),
                CountdownEvent::Tick(1),
                CountdownEvent::Armed,
            ]
        );

        // The sender is dropped with the task; no further events exist.
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn cancel_mid_countdown_suppresses_armed() {
        let (tx, mut rx) = mpsc::channel::<CountdownEvent>(16);
        let mut timer = CountdownTimer::new();
        timer.begin(3, Duration::from_millis(50), tx).expect("begin");

        // First tick arrives immediately.
        assert_eq!(rx.recv().await, Some(CountdownEvent::Tick(3)));
        timer.cancel();

        // Channel closes without ever emitting Armed.
        let mut rest = Vec::new();
        while let Some(ev) = rx.recv().await {
            rest.push(ev);
        }
        assert!(!rest.contains(&CountdownEvent::Armed));
    }

    #[tokio::test]
    async fn cancel_after_completion_is_a_noop() {
        let (tx, mut rx) = mpsc::channel::<CountdownEvent>(16);
        let mut timer = CountdownTimer::new();
        timer.begin(1, FAST, tx).expect("begin");

        let events = collect(&mut rx).await;
        assert_eq!(events.last(), Some(&CountdownEvent::Armed));

        timer.cancel();
        timer.cancel(); // idempotent
    }

    #[tokio::test]
    async fn cancel_without_begin_is_a_noop() {
        let mut timer = CountdownTimer::new();
        timer.cancel();
        assert!(!timer.is_pending());
    }

    #[tokio::test]
    async fn begin_while_pending_is_rejected() {
        let (tx, _rx) = mpsc::channel::<CountdownEvent>(16);
        let mut timer = CountdownTimer::new();
        timer
            .begin(3, Duration::from_millis(200), tx.clone())
            .expect("begin");
        assert!(matches!(
            timer.begin(3, Duration::from_millis(200), tx),
            Err(CountdownError::AlreadyRunning)
        ));
        timer.cancel();
    }

    #[tokio::test]
    async fn begin_again_after_cancel_works() {
        let (tx, mut rx) = mpsc::channel::<CountdownEvent>(16);
        let mut timer = CountdownTimer::new();
        timer
            .begin(3, Duration::from_millis(200), tx.clone())
            .expect("begin");
        timer.cancel();

        timer.begin(1, FAST, tx).expect("second begin");
        // Drain until this run's Armed shows up.
        let events = collect(&mut rx).await;
        assert_eq!(events.last(), Some(&CountdownEvent::Armed));
    }

    #[tokio::test]
    async fn zero_ticks_arms_immediately() {
        let (tx, mut rx) = mpsc::channel::<CountdownEvent>(16);
        let mut timer = CountdownTimer::new();
        timer.begin(0, FAST, tx).expect("begin");
        assert_eq!(rx.recv().await, Some(CountdownEvent::Armed));
    }
}
