//! One expected ball transit between two devices
//!
//! A `TransitRecord` tracks a single ball that left a source device and
//! is expected at a target device. It owns the confirm / timeout /
//! can-skip signaling for that ball and its `left_device -> arrived |
//! lost` lifecycle. Deadlines are armed by the owning device (or
//! re-armed by an external confirmation) and arbitrated by the target
//! coordinator's watcher task.

use crate::domain::error::TransitError;
use crate::domain::types::{ConfirmSource, DeviceId, TransitState};
use crate::infra::signal::{Signal, SignalWaiter};
use crate::io::switchboard::Switchboard;
use crate::services::coordinator::TransitCoordinator;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tokio::time::{Duration, Instant};
use tracing::{debug, error};
use uuid::Uuid;

/// Mutable state behind the record's lock.
///
/// Lock discipline: nothing is awaited and no collaborator is invoked
/// while this lock is held.
struct RecordInner {
    state: TransitState,
    /// Armed timeout deadline; `None` while unarmed or cancelled
    deadline: Option<Instant>,
    /// External confirmation bound to this transit, at most one
    confirm_source: Option<ConfirmSource>,
    /// Whether the bound external confirmation has fired
    externally_confirmed: bool,
    /// Coordinator currently holding this record in its pending set
    coordinator: Weak<TransitCoordinator>,
}

/// One ball expected to move from `source` to `target`
pub struct TransitRecord {
    id: Uuid,
    source: DeviceId,
    target: DeviceId,
    /// Ball-missing window re-armed after external confirmation,
    /// supplied by the owning device's configuration
    missing_timeout: Duration,
    confirm: Signal,
    timeout: Signal,
    can_skip: Signal,
    inner: Mutex<RecordInner>,
    weak_self: Weak<TransitRecord>,
}

impl TransitRecord {
    pub fn new(source: DeviceId, target: DeviceId, missing_timeout: Duration) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            id: Uuid::now_v7(),
            source,
            target,
            missing_timeout,
            confirm: Signal::new(),
            timeout: Signal::new(),
            can_skip: Signal::new(),
            inner: Mutex::new(RecordInner {
                state: TransitState::LeftDevice,
                deadline: None,
                confirm_source: None,
                externally_confirmed: false,
                coordinator: Weak::new(),
            }),
            weak_self: weak_self.clone(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source(&self) -> &DeviceId {
        &self.source
    }

    pub fn target(&self) -> &DeviceId {
        &self.target
    }

    pub fn state(&self) -> TransitState {
        self.inner.lock().state
    }

    /// Bind an external confirm to the next activation of a switch
    pub fn attach_confirm_switch(
        &self,
        switchboard: &Switchboard,
        switch: &str,
    ) -> Result<(), TransitError> {
        self.attach_external_confirm(
            ConfirmSource::Switch(switch.to_string()),
            switchboard.wait_for_switch(switch),
        )
    }

    /// Bind an external confirm to the next posting of a machine event
    pub fn attach_confirm_event(
        &self,
        switchboard: &Switchboard,
        event: &str,
    ) -> Result<(), TransitError> {
        self.attach_external_confirm(
            ConfirmSource::Event(event.to_string()),
            switchboard.wait_for_event(event),
        )
    }

    /// Bind exactly one external confirmation to this transit.
    ///
    /// Until `fired` resolves the transit cannot be attributed to a
    /// physical arrival. When it does resolve, the current deadline is
    /// cancelled, a fresh ball-missing window is armed and the confirm
    /// signal resolves.
    pub fn attach_external_confirm(
        &self,
        source: ConfirmSource,
        fired: oneshot::Receiver<()>,
    ) -> Result<(), TransitError> {
        {
            let mut inner = self.inner.lock();
            if let Some(existing) = &inner.confirm_source {
                return Err(TransitError::ConfirmAlreadyAttached {
                    from: self.source.clone(),
                    existing: existing.clone(),
                    requested: source,
                });
            }
            inner.confirm_source = Some(source.clone());
        }

        debug!(
            source = %self.source,
            target = %self.target,
            transit = %self.id,
            confirm = %source,
            "external_confirm_attached"
        );

        if let Some(record) = self.weak_self.upgrade() {
            tokio::spawn(async move {
                // An Err means the switchboard dropped the sender without
                // a posting; the transit then simply never becomes
                // eligible.
                if fired.await.is_ok() {
                    record.on_external_confirm();
                }
            });
        }
        Ok(())
    }

    /// The bound external confirmation fired
    fn on_external_confirm(&self) {
        let rearmed = {
            let mut inner = self.inner.lock();
            inner.externally_confirmed = true;
            if inner.state == TransitState::LeftDevice {
                // Two-stage timeout: the confirm window is over, the
                // ball-missing window starts now
                inner.deadline = Some(Instant::now() + self.missing_timeout);
                true
            } else {
                false
            }
        };
        self.confirm.set();
        if rearmed {
            debug!(
                source = %self.source,
                target = %self.target,
                transit = %self.id,
                missing_timeout_ms = %self.missing_timeout.as_millis(),
                "external_confirm_fired"
            );
            self.nudge_watcher();
        }
    }

    /// Arm or re-arm the timeout deadline.
    ///
    /// When the deadline is armed is decided by the owning device; an
    /// unarmed transit waits indefinitely for arrival or explicit loss.
    pub fn arm_timeout(&self, timeout: Duration) {
        {
            let mut inner = self.inner.lock();
            if inner.state != TransitState::LeftDevice {
                return;
            }
            inner.deadline = Some(Instant::now() + timeout);
        }
        self.nudge_watcher();
    }

    /// Tell other devices that this ball may have skipped the target's
    /// primary detector. Idempotent.
    pub fn mark_can_skip(&self) {
        self.can_skip.set();
    }

    /// True iff a physical arrival may be attributed to this transit
    pub fn can_arrive(&self) -> bool {
        let inner = self.inner.lock();
        inner.state == TransitState::LeftDevice
            && (inner.confirm_source.is_none() || inner.externally_confirmed)
    }

    /// Ball was detected at the target.
    ///
    /// Returns true if this call performed the transition; a record that
    /// already arrived, was lost or timed out is left untouched.
    pub fn resolve_arrived(&self) -> bool {
        let (transitioned, has_external) = {
            let mut inner = self.inner.lock();
            if inner.state != TransitState::LeftDevice {
                (false, false)
            } else {
                inner.state = TransitState::Arrived;
                inner.deadline = None;
                (true, inner.confirm_source.is_some())
            }
        };
        if !transitioned {
            return false;
        }
        // With an external confirm the confirm signal already resolved
        // on that path
        if !has_external {
            self.confirm.set();
        }
        self.detach_from_coordinator();
        true
    }

    /// Ball is known lost before its timeout (source-initiated early
    /// failure). Returns true if this call performed the transition.
    pub fn resolve_lost(&self) -> bool {
        let transitioned = {
            let mut inner = self.inner.lock();
            if inner.state != TransitState::LeftDevice {
                false
            } else {
                inner.state = TransitState::Lost;
                inner.deadline = None;
                true
            }
        };
        if !transitioned {
            return false;
        }
        self.detach_from_coordinator();
        true
    }

    pub fn wait_confirm(&self) -> SignalWaiter {
        self.confirm.waiter()
    }

    pub fn wait_timeout(&self) -> SignalWaiter {
        self.timeout.waiter()
    }

    pub fn wait_can_skip(&self) -> SignalWaiter {
        self.can_skip.waiter()
    }

    /// True iff the timeout fired through real expiry; a cancelled
    /// deadline never sets this
    pub fn is_timed_out(&self) -> bool {
        self.timeout.is_set()
    }

    pub(crate) fn bind_coordinator(&self, coordinator: Weak<TransitCoordinator>) {
        self.inner.lock().coordinator = coordinator;
    }

    pub(crate) fn unbind_coordinator(&self) {
        self.inner.lock().coordinator = Weak::new();
    }

    /// Earliest moment this record may expire, if armed
    pub(crate) fn deadline(&self) -> Option<Instant> {
        let inner = self.inner.lock();
        if inner.state == TransitState::LeftDevice {
            inner.deadline
        } else {
            None
        }
    }

    /// Transition to lost if the armed deadline has passed.
    ///
    /// Called by the watcher during an expiry sweep; resolves the
    /// timeout signal so `is_timed_out` and parked waiters observe it.
    pub(crate) fn expire_if_due(&self, now: Instant) -> bool {
        let expired = {
            let mut inner = self.inner.lock();
            match inner.deadline {
                Some(deadline) if inner.state == TransitState::LeftDevice && deadline <= now => {
                    inner.state = TransitState::Lost;
                    inner.deadline = None;
                    true
                }
                _ => false,
            }
        };
        if expired {
            self.timeout.set();
        }
        expired
    }

    fn detach_from_coordinator(&self) {
        let coordinator = {
            let mut inner = self.inner.lock();
            std::mem::replace(&mut inner.coordinator, Weak::new())
        };
        let (Some(coordinator), Some(me)) = (coordinator.upgrade(), self.weak_self.upgrade())
        else {
            return;
        };
        if let Err(err) = coordinator.unregister(&me) {
            // Unreachable under the pending-set invariant
            error!(error = %err, transit = %self.id, "transit_unregister_failed");
        }
    }

    fn nudge_watcher(&self) {
        let coordinator = self.inner.lock().coordinator.clone();
        if let Some(coordinator) = coordinator.upgrade() {
            coordinator.wake_watcher();
        }
    }
}

impl std::fmt::Debug for TransitRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitRecord")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("target", &self.target)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, sleep};

    fn record(missing_ms: u64) -> Arc<TransitRecord> {
        TransitRecord::new(
            DeviceId::new("trough"),
            DeviceId::new("playfield"),
            Duration::from_millis(missing_ms),
        )
    }

    /// Let spawned subscription tasks run
    async fn settle() {
        sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test]
    async fn test_new_record_is_eligible() {
        let record = record(1000);
        assert_eq!(record.state(), TransitState::LeftDevice);
        assert!(record.can_arrive());
        assert!(!record.is_timed_out());
        assert!(!record.wait_confirm().is_set());
    }

    #[tokio::test]
    async fn test_arrival_resolves_confirm_once() {
        let record = record(1000);

        assert!(record.resolve_arrived());
        assert_eq!(record.state(), TransitState::Arrived);
        assert!(record.wait_confirm().is_set());

        // Idempotent re-invocation
        assert!(!record.resolve_arrived());
        assert!(!record.resolve_lost());
        assert_eq!(record.state(), TransitState::Arrived);
    }

    #[tokio::test]
    async fn test_lost_does_not_confirm_or_time_out() {
        let record = record(1000);

        assert!(record.resolve_lost());
        assert_eq!(record.state(), TransitState::Lost);
        assert!(!record.wait_confirm().is_set());
        assert!(!record.is_timed_out());
        assert!(!record.can_arrive());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_deadline_never_expires() {
        let record = record(1000);
        record.arm_timeout(Duration::from_millis(50));
        assert!(record.resolve_arrived());

        advance(Duration::from_millis(200)).await;
        assert!(!record.expire_if_due(Instant::now()));
        assert!(!record.is_timed_out());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_if_due_respects_deadline() {
        let record = record(1000);
        record.arm_timeout(Duration::from_millis(100));

        assert!(!record.expire_if_due(Instant::now()));

        advance(Duration::from_millis(150)).await;
        assert!(record.expire_if_due(Instant::now()));
        assert_eq!(record.state(), TransitState::Lost);
        assert!(record.is_timed_out());

        // A second sweep finds nothing left to expire
        assert!(!record.expire_if_due(Instant::now()));
    }

    #[tokio::test]
    async fn test_attach_confirm_twice_fails() {
        let board = Switchboard::new();
        let record = record(1000);

        record.attach_confirm_switch(&board, "s_ramp_made").unwrap();
        let err = record.attach_confirm_event(&board, "ball_seen").unwrap_err();
        assert!(matches!(err, TransitError::ConfirmAlreadyAttached { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_confirm_gates_arrival() {
        let board = Switchboard::new();
        let record = record(500);
        record.attach_confirm_switch(&board, "s_ramp_made").unwrap();

        // Not eligible no matter how long it waits
        advance(Duration::from_secs(60)).await;
        assert!(!record.can_arrive());
        assert!(!record.wait_confirm().is_set());

        board.post_switch("s_ramp_made");
        settle().await;

        assert!(record.can_arrive());
        assert!(record.wait_confirm().is_set());
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_confirm_rearms_missing_window() {
        let board = Switchboard::new();
        let record = record(500);
        record.attach_confirm_switch(&board, "s_ramp_made").unwrap();
        record.arm_timeout(Duration::from_secs(10));

        board.post_switch("s_ramp_made");
        settle().await;

        // The old 10s window was replaced by the 500ms missing window
        let deadline = record.deadline().expect("deadline armed");
        assert!(deadline <= Instant::now() + Duration::from_millis(500));

        advance(Duration::from_millis(600)).await;
        assert!(record.expire_if_due(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_confirm_after_terminal_does_not_rearm() {
        let board = Switchboard::new();
        let record = record(500);
        record.attach_confirm_switch(&board, "s_ramp_made").unwrap();
        assert!(record.resolve_lost());

        board.post_switch("s_ramp_made");
        settle().await;

        assert!(record.deadline().is_none());
        assert!(!record.can_arrive());
    }

    #[tokio::test]
    async fn test_arrival_with_external_confirm_does_not_reconfirm() {
        let board = Switchboard::new();
        let record = record(500);
        record.attach_confirm_switch(&board, "s_ramp_made").unwrap();

        board.post_switch("s_ramp_made");
        record.wait_confirm().wait().await;

        // Confirm already resolved on the external path; arrival just
        // finishes the lifecycle
        assert!(record.resolve_arrived());
        assert_eq!(record.state(), TransitState::Arrived);
    }

    #[tokio::test]
    async fn test_mark_can_skip_is_idempotent() {
        let record = record(1000);
        let waiter = record.wait_can_skip();

        record.mark_can_skip();
        record.mark_can_skip();

        assert!(waiter.wait().await);
    }

    #[tokio::test]
    async fn test_arm_timeout_after_terminal_is_ignored() {
        let record = record(1000);
        assert!(record.resolve_arrived());

        record.arm_timeout(Duration::from_millis(10));
        assert!(record.deadline().is_none());
    }
}
