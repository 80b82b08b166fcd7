//! Shared types for ball transit tracking

use std::fmt;
use std::sync::Arc;

/// Newtype wrapper for device names to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(pub Arc<str>);

impl DeviceId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Lifecycle of one ball transit
///
/// Transitions are monotonic: `LeftDevice` may move to `Arrived` or
/// `Lost`; both are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitState {
    /// Ball has left the source device and is on its way
    LeftDevice,
    /// Ball was detected at the target device
    Arrived,
    /// Ball never showed up before its timeout
    Lost,
}

impl TransitState {
    #[inline]
    pub fn as_str(&self) -> &str {
        match self {
            TransitState::LeftDevice => "left_device",
            TransitState::Arrived => "arrived",
            TransitState::Lost => "lost",
        }
    }

    /// Terminal states accept no further transitions
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransitState::LeftDevice)
    }
}

impl fmt::Display for TransitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of matching one physical ball detection against the pending set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrivalOutcome {
    /// Detection was attributed to a pending transit
    Matched,
    /// No eligible transit was pending
    Unmatched,
}

impl ArrivalOutcome {
    #[inline]
    pub fn as_str(&self) -> &str {
        match self {
            ArrivalOutcome::Matched => "matched",
            ArrivalOutcome::Unmatched => "unmatched",
        }
    }
}

/// External confirmation source bound to a transit
///
/// A transit with a confirm source cannot be attributed to a physical
/// detection until that source has fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmSource {
    /// A named physical switch activation
    Switch(String),
    /// A named logical machine event
    Event(String),
}

impl fmt::Display for ConfirmSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfirmSource::Switch(name) => write!(f, "switch:{name}"),
            ConfirmSource::Event(name) => write!(f, "event:{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_display() {
        let id = DeviceId::new("trough");
        assert_eq!(id.to_string(), "trough");
        assert_eq!(id.as_str(), "trough");
    }

    #[test]
    fn test_device_id_eq() {
        assert_eq!(DeviceId::new("trough"), DeviceId::from("trough"));
        assert_ne!(DeviceId::new("trough"), DeviceId::new("plunger_lane"));
    }

    #[test]
    fn test_transit_state_terminal() {
        assert!(!TransitState::LeftDevice.is_terminal());
        assert!(TransitState::Arrived.is_terminal());
        assert!(TransitState::Lost.is_terminal());
    }

    #[test]
    fn test_confirm_source_display() {
        assert_eq!(ConfirmSource::Switch("s_ramp_made".into()).to_string(), "switch:s_ramp_made");
        assert_eq!(
            ConfirmSource::Event("balldevice_captured".into()).to_string(),
            "event:balldevice_captured"
        );
    }
}
