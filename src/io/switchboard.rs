//! Switch and event one-shot waits
//!
//! The transit core never talks to hardware directly; it only consumes
//! the completion of a named switch activation or logical machine
//! event. The `Switchboard` hands out one-shot receivers that fire on
//! the next posting of that name. Whoever drives the machine (hardware
//! layer, simulation, tests) posts activations into it.

use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::oneshot;
use tracing::debug;

/// Dispatches named switch activations and machine events to parked waiters
#[derive(Debug, Default)]
pub struct Switchboard {
    /// Waiters parked on the next activation of a named switch
    switch_waiters: Mutex<HashMap<String, Vec<oneshot::Sender<()>>>>,
    /// Waiters parked on the next posting of a named event
    event_waiters: Mutex<HashMap<String, Vec<oneshot::Sender<()>>>>,
}

impl Switchboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the next activation of a named switch
    pub fn wait_for_switch(&self, switch: &str) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.switch_waiters.lock().entry(switch.to_string()).or_default().push(tx);
        rx
    }

    /// Wait for the next posting of a named machine event
    pub fn wait_for_event(&self, event: &str) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.event_waiters.lock().entry(event.to_string()).or_default().push(tx);
        rx
    }

    /// Post a switch activation, firing every parked waiter once
    pub fn post_switch(&self, switch: &str) {
        let waiters = self.switch_waiters.lock().remove(switch).unwrap_or_default();
        debug!(switch = %switch, waiters = %waiters.len(), "switch_posted");
        for tx in waiters {
            // Receiver may have been dropped; that waiter abandoned its wait
            let _ = tx.send(());
        }
    }

    /// Post a machine event, firing every parked waiter once
    pub fn post_event(&self, event: &str) {
        let waiters = self.event_waiters.lock().remove(event).unwrap_or_default();
        debug!(event = %event, waiters = %waiters.len(), "event_posted");
        for tx in waiters {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_switch_wait_fires_on_post() {
        let board = Switchboard::new();
        let rx = board.wait_for_switch("s_ramp_made");

        board.post_switch("s_ramp_made");

        assert!(rx.await.is_ok());
    }

    #[tokio::test]
    async fn test_event_wait_fires_on_post() {
        let board = Switchboard::new();
        let rx = board.wait_for_event("balldevice_captured");

        board.post_event("balldevice_captured");

        assert!(rx.await.is_ok());
    }

    #[tokio::test]
    async fn test_post_without_waiters_is_noop() {
        let board = Switchboard::new();
        board.post_switch("s_nobody_cares");
        board.post_event("e_nobody_cares");
    }

    #[tokio::test]
    async fn test_switch_and_event_namespaces_are_separate() {
        let board = Switchboard::new();
        let mut rx = board.wait_for_switch("shared_name");

        // Posting the same name as an event must not fire the switch waiter
        board.post_event("shared_name");
        assert!(rx.try_recv().is_err());

        board.post_switch("shared_name");
        assert!(rx.await.is_ok());
    }

    #[tokio::test]
    async fn test_all_parked_waiters_fire() {
        let board = Switchboard::new();
        let rx1 = board.wait_for_switch("s_plunger_lane");
        let rx2 = board.wait_for_switch("s_plunger_lane");

        board.post_switch("s_plunger_lane");

        assert!(rx1.await.is_ok());
        assert!(rx2.await.is_ok());
    }

    #[tokio::test]
    async fn test_waiter_fires_once_per_post() {
        let board = Switchboard::new();
        let rx = board.wait_for_switch("s_outhole");

        board.post_switch("s_outhole");
        assert!(rx.await.is_ok());

        // A fresh wait is required for the next activation
        let mut rx = board.wait_for_switch("s_outhole");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_waiter_is_tolerated() {
        let board = Switchboard::new();
        let rx1 = board.wait_for_switch("s_trough_1");
        let rx2 = board.wait_for_switch("s_trough_1");
        drop(rx1);

        board.post_switch("s_trough_1");

        assert!(rx2.await.is_ok());
    }
}
