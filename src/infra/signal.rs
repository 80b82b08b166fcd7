//! One-shot completion signals with independent waiters
//!
//! A `Signal` is a boolean flag that can be set at most once and
//! observed by any number of subscribers. Each `SignalWaiter` owns its
//! own subscription: dropping a waiter mid-wait detaches only that
//! waiter and never resolves or disturbs the shared flag. Built on
//! `tokio::sync::watch` so a set is a level change, not an edge - a
//! waiter subscribing after the fact still observes it.

use tokio::sync::watch;

/// A single-assignment completion flag
#[derive(Debug)]
pub struct Signal {
    tx: watch::Sender<bool>,
}

impl Signal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Set the flag. Returns true if this call performed the transition,
    /// false if the flag was already set.
    pub fn set(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Subscribe a new independent waiter
    pub fn waiter(&self) -> SignalWaiter {
        SignalWaiter { rx: self.tx.subscribe() }
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscription to a `Signal`
#[derive(Debug, Clone)]
pub struct SignalWaiter {
    rx: watch::Receiver<bool>,
}

impl SignalWaiter {
    /// Wait until the signal sets.
    ///
    /// Returns true when the flag was set, false when the signal was
    /// dropped without ever firing (the wait was abandoned by the
    /// owner's teardown).
    pub async fn wait(mut self) -> bool {
        self.rx.wait_for(|fired| *fired).await.is_ok()
    }

    pub fn is_set(&self) -> bool {
        *self.rx.borrow()
    }
}
