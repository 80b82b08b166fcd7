//! IO - external signal sources
//!
//! This module contains the crate's view of the outside machine:
//! - `switchboard` - Named switch/event activations as one-shot waits

pub mod switchboard;

// Re-export commonly used types
pub use switchboard::Switchboard;
