//! Pending-transit ownership and timeout arbitration for one device
//!
//! The `TransitCoordinator` holds the ordered set of transits expected
//! at one target device and runs a single background watcher task that
//! arbitrates their timeouts. Physical detections are matched against
//! the pending set in registration order; whatever cannot be matched is
//! reported to the device as an unexpected ball.

use crate::domain::error::TransitError;
use crate::domain::types::{ArrivalOutcome, DeviceId};
use crate::infra::metrics::Metrics;
use crate::services::device::{DeviceHandler, OutgoingBallTracker};
use crate::services::transit::TransitRecord;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::{watch, Notify};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Owns the pending transits of one target device
pub struct TransitCoordinator {
    target: DeviceId,
    /// Pending transits in registration order; insertion order is
    /// arrival-matching priority
    pending: Mutex<Vec<Arc<TransitRecord>>>,
    /// Wakes the watcher when the pending set or any deadline changes
    wake: Notify,
    device: Arc<dyn DeviceHandler>,
    /// Outgoing-transit bookkeeping, present only for devices with
    /// mechanical (sensor-skipping) ejects
    outgoing: Option<Arc<dyn OutgoingBallTracker>>,
    metrics: Arc<Metrics>,
    weak_self: Weak<TransitCoordinator>,
}

impl TransitCoordinator {
    pub fn new(
        target: DeviceId,
        device: Arc<dyn DeviceHandler>,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        Self::build(target, device, metrics, None)
    }

    /// Coordinator for a device with mechanical (sensor-skipping)
    /// ejects: can-skip transits are mirrored into the outgoing-transit
    /// bookkeeping
    pub fn with_mechanical_eject(
        target: DeviceId,
        device: Arc<dyn DeviceHandler>,
        metrics: Arc<Metrics>,
        outgoing: Arc<dyn OutgoingBallTracker>,
    ) -> Arc<Self> {
        Self::build(target, device, metrics, Some(outgoing))
    }

    fn build(
        target: DeviceId,
        device: Arc<dyn DeviceHandler>,
        metrics: Arc<Metrics>,
        outgoing: Option<Arc<dyn OutgoingBallTracker>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            target,
            pending: Mutex::new(Vec::new()),
            wake: Notify::new(),
            device,
            outgoing,
            metrics,
            weak_self: weak_self.clone(),
        })
    }

    pub fn target(&self) -> &DeviceId {
        &self.target
    }

    /// Number of transits not yet arrived or lost
    pub fn count_pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Add a transit to the pending set
    pub fn register(&self, record: &Arc<TransitRecord>) {
        debug!(
            source = %record.source(),
            target = %self.target,
            transit = %record.id(),
            "incoming_transit_registered"
        );

        record.bind_coordinator(self.weak_self.clone());
        self.pending.lock().push(Arc::clone(record));
        self.wake.notify_one();

        if let Some(outgoing) = &self.outgoing {
            let outgoing = Arc::clone(outgoing);
            let record = Arc::clone(record);
            let can_skip = record.wait_can_skip();
            tokio::spawn(async move {
                // wait() is false when the record was torn down with the
                // signal never fired; nothing to mirror then
                if can_skip.wait().await {
                    outgoing.add_incoming_ball_which_may_skip(record);
                }
            });
        }
    }

    /// Remove a transit from the pending set.
    ///
    /// Misuse guard: under correct usage every removal targets a record
    /// that is actually pending.
    pub fn unregister(&self, record: &Arc<TransitRecord>) -> Result<(), TransitError> {
        {
            let mut pending = self.pending.lock();
            let Some(idx) = pending.iter().position(|r| Arc::ptr_eq(r, record)) else {
                return Err(TransitError::RecordNotPending {
                    from: record.source().clone(),
                    target: self.target.clone(),
                });
            };
            pending.remove(idx);
        }

        record.unbind_coordinator();
        self.drop_skip_tracking(record);
        self.wake.notify_one();

        debug!(
            source = %record.source(),
            target = %self.target,
            transit = %record.id(),
            "incoming_transit_removed"
        );
        Ok(())
    }

    /// Match one physical ball detection against the pending set.
    ///
    /// Scans in registration order and consumes the first eligible
    /// transit; exactly one transit is resolved per detection.
    pub async fn on_physical_arrival(&self) -> ArrivalOutcome {
        loop {
            let candidate = {
                let pending = self.pending.lock();
                pending.iter().find(|r| r.can_arrive()).cloned()
            };

            let Some(record) = candidate else {
                debug!(target = %self.target, "unexpected_ball_received");
                self.metrics.record_unexpected_ball();
                self.device.unexpected_ball_received().await;
                return ArrivalOutcome::Unmatched;
            };

            // resolve_arrived detaches the record from this coordinator
            if record.resolve_arrived() {
                debug!(
                    source = %record.source(),
                    target = %self.target,
                    transit = %record.id(),
                    "expected_ball_received"
                );
                self.metrics.record_expected_ball();
                self.device.expected_ball_received().await;
                return ArrivalOutcome::Matched;
            }
            // Lost a race with the watcher over this record; rescan
        }
    }

    /// Wake the watcher to re-evaluate deadlines
    pub(crate) fn wake_watcher(&self) {
        self.wake.notify_one();
    }

    /// Background timeout watcher; one long-lived task per coordinator
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(target = %self.target, "transit_watcher_started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            // Create the wake future before reading deadlines so a nudge
            // arriving in between is not lost
            let wake = self.wake.notified();
            tokio::pin!(wake);

            match self.earliest_deadline() {
                Some(deadline) => {
                    tokio::select! {
                        _ = &mut wake => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                        _ = sleep_until(deadline) => {
                            self.sweep_expired().await;
                        }
                    }
                }
                // Nothing pending or nothing armed; idle until the set
                // or a deadline changes
                None => {
                    tokio::select! {
                        _ = &mut wake => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
            }
        }

        info!(target = %self.target, "transit_watcher_stopped");
    }

    /// Earliest armed deadline across all pending transits.
    ///
    /// Any record's deadline may be armed or re-armed out of order by
    /// external confirmation, so the minimum spans the whole set.
    fn earliest_deadline(&self) -> Option<Instant> {
        let snapshot: Vec<Arc<TransitRecord>> = self.pending.lock().clone();
        snapshot.iter().filter_map(|r| r.deadline()).min()
    }

    /// Expire every overdue transit in one pass.
    ///
    /// All expired records leave the pending set before the first loss
    /// notification fires, so a reentrant device handler never observes
    /// a timed-out transit still counted as pending. Notifications are
    /// then delivered sequentially in discovery order.
    async fn sweep_expired(&self) {
        let now = Instant::now();
        let snapshot: Vec<Arc<TransitRecord>> = self.pending.lock().clone();
        let expired: Vec<Arc<TransitRecord>> =
            snapshot.into_iter().filter(|r| r.expire_if_due(now)).collect();

        if expired.is_empty() {
            return;
        }

        {
            let mut pending = self.pending.lock();
            pending.retain(|r| !expired.iter().any(|e| Arc::ptr_eq(r, e)));
        }

        for record in &expired {
            record.unbind_coordinator();
            self.drop_skip_tracking(record);
            self.metrics.record_lost_ball();
            warn!(
                source = %record.source(),
                target = %self.target,
                transit = %record.id(),
                "incoming_transit_timed_out"
            );
        }

        for record in expired {
            self.device.lost_incoming_ball(record.source().clone()).await;
        }
    }

    /// Mirror a removal into the outgoing bookkeeping when the can-skip
    /// signal already fired for this transit
    fn drop_skip_tracking(&self, record: &Arc<TransitRecord>) {
        if let Some(outgoing) = &self.outgoing {
            if record.wait_can_skip().is_set() {
                outgoing.remove_incoming_ball_which_may_skip(record);
            }
        }
    }
}

impl std::fmt::Debug for TransitCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitCoordinator")
            .field("target", &self.target)
            .field("pending", &self.count_pending())
            .field("mechanical_eject", &self.outgoing.is_some())
            .finish()
    }
}
