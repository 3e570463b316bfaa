//! The reset-on-bid countdown timer.
//!
//! A [`Timer`] is scoped to a single running [`crate::auction::Auction`] and
//! knows nothing about queues, bids, or teams: it emits one [`Event::Tick`]
//! per second counting down to `1`, then a single [`Event::Expired`], all
//! delivered over an `mpsc` channel back to the auction's own task. This
//! keeps time concerns out of the state machine and makes the state machine
//! trivially testable by feeding it synthetic timer events.
//!
//! Each `start`/`restart` spawns a fresh task scoped to its own
//! [`CancellationToken`], the same idiom the rest of the core uses for every
//! other cancellable background task (auto-delete, delayed-terminate).
//! Cancellation is observed at both the tick-send boundary and the
//! one-second sleep boundary, so a cancelled timer can never emit a
//! trailing `Expired` after `cancel` returns.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// An event emitted by a running [`Timer`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Event {
    /// The countdown now has `seconds` remaining, `seconds >= 1`.
    Tick(u64),
    /// The countdown reached zero without being cancelled or restarted.
    Expired,
}

/// A cancellable, restartable countdown.
pub(crate) struct Timer {
    events_tx: mpsc::Sender<Event>,
    running: Option<CancellationToken>,
}

impl Timer {
    pub(crate) fn new(events_tx: mpsc::Sender<Event>) -> Self {
        Self {
            events_tx,
            running: None,
        }
    }

    /// Whether a countdown is currently running. Used to assert invariant 4:
    /// "only one timer task is live per auction at any moment" holds
    /// trivially because `start`/`restart` always cancel any prior run
    /// first.
    pub(crate) fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Cancels any running countdown. A no-op if none is running.
    /// Idempotent, and guarantees no `Expired` event is emitted for the
    /// cancelled run.
    pub(crate) fn cancel(&mut self) {
        if let Some(token) = self.running.take() {
            token.cancel();
        }
    }

    /// Cancels any running countdown and starts a fresh one from
    /// `initial_seconds`.
    pub(crate) fn restart(&mut self, initial_seconds: u64) {
        self.cancel();
        let token = CancellationToken::new();
        self.running = Some(token.clone());

        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let mut remaining = initial_seconds;
            while remaining >= 1 {
                if events_tx.send(Event::Tick(remaining)).await.is_err() {
                    // auction task gone; nothing left to notify.
                    return;
                }
                tokio::select! {
                    biased;
                    () = token.cancelled() => return,
                    () = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
                remaining -= 1;
            }
            let _ = events_tx.send(Event::Expired).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::{
        Event,
        Timer,
    };

    #[tokio::test(start_paused = true)]
    async fn ticks_count_down_then_expires() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut timer = Timer::new(tx);
        timer.restart(3);

        assert_eq!(rx.recv().await, Some(Event::Tick(3)));
        assert_eq!(rx.recv().await, Some(Event::Tick(2)));
        assert_eq!(rx.recv().await, Some(Event::Tick(1)));
        assert_eq!(rx.recv().await, Some(Event::Expired));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_cancels_prior_run() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut timer = Timer::new(tx);
        timer.restart(5);
        assert_eq!(rx.recv().await, Some(Event::Tick(5)));

        // restart before the first run's next tick; only the new run's
        // events should ever arrive.
        timer.restart(2);
        assert_eq!(rx.recv().await, Some(Event::Tick(2)));
        assert_eq!(rx.recv().await, Some(Event::Tick(1)));
        assert_eq!(rx.recv().await, Some(Event::Expired));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(
            rx.try_recv().is_err(),
            "cancelled run must not emit a trailing event"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_suppresses_expiry() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut timer = Timer::new(tx);
        timer.restart(1);
        assert_eq!(rx.recv().await, Some(Event::Tick(1)));
        timer.cancel();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err(), "cancel must suppress expiry");
    }
}
