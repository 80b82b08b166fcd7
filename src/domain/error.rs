//! Error types for transit tracking misuse
//!
//! These cover the programming-error class only: conditions that never
//! occur under correct usage and must surface at the call site.
//! Operational events (lost balls, unexpected arrivals) are reported
//! through device notifications, not errors.

use crate::domain::types::{ConfirmSource, DeviceId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransitError {
    /// A transit accepts exactly one external confirm source.
    #[error("external confirm {existing} already attached to transit from {from}, refusing {requested}")]
    ConfirmAlreadyAttached {
        from: DeviceId,
        existing: ConfirmSource,
        requested: ConfirmSource,
    },

    /// The record is not in this coordinator's pending set.
    #[error("transit from {from} is not pending at {target}")]
    RecordNotPending { from: DeviceId, target: DeviceId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransitError::ConfirmAlreadyAttached {
            from: DeviceId::new("trough"),
            existing: ConfirmSource::Switch("s_ramp_made".into()),
            requested: ConfirmSource::Event("ball_seen".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("switch:s_ramp_made"));
        assert!(msg.contains("event:ball_seen"));

        let err = TransitError::RecordNotPending {
            from: DeviceId::new("trough"),
            target: DeviceId::new("playfield"),
        };
        assert!(err.to_string().contains("not pending at playfield"));
    }
}
