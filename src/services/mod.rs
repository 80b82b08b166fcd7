//! Services - transit lifecycle and arbitration
//!
//! This module contains the core business logic:
//! - `transit` - One expected ball transit and its signaling surface
//! - `coordinator` - Pending-set ownership, arrival matching, and the
//!   background timeout watcher for one target device
//! - `device` - Collaborator contracts of the owning ball device

pub mod coordinator;
pub mod device;
pub mod transit;

// Re-export commonly used types
pub use coordinator::TransitCoordinator;
pub use device::{DeviceHandler, OutgoingBallTracker};
pub use transit::TransitRecord;
