//! Collaborator contracts of the owning ball device
//!
//! The transit core never ejects balls or reconciles machine-wide ball
//! counts; it reports what it arbitrated to the device through these
//! traits and otherwise stays out of the way.

use crate::domain::types::DeviceId;
use crate::services::transit::TransitRecord;
use async_trait::async_trait;
use std::sync::Arc;

/// Reactions of the owning device to arbitration outcomes
///
/// Each call is awaited to completion by the core before it proceeds;
/// in particular, loss notifications for a batch of simultaneously
/// expired transits are delivered one at a time.
#[async_trait]
pub trait DeviceHandler: Send + Sync {
    /// A physical detection was attributed to a pending transit
    async fn expected_ball_received(&self);

    /// A physical detection matched no pending transit
    async fn unexpected_ball_received(&self);

    /// A pending transit from `source` timed out without arriving
    async fn lost_incoming_ball(&self, source: DeviceId);
}

/// Outgoing-transit bookkeeping for sensor-skipping ejects
///
/// Only consulted when the target device is configured for mechanical
/// ejects: a ball that may bypass the primary detector has to be
/// tracked on the outgoing side as well.
pub trait OutgoingBallTracker: Send + Sync {
    /// Start tracking a transit whose ball may skip detection
    fn add_incoming_ball_which_may_skip(&self, record: Arc<TransitRecord>);

    /// Drop tracking for a transit leaving the pending set
    fn remove_incoming_ball_which_may_skip(&self, record: &Arc<TransitRecord>);
}
