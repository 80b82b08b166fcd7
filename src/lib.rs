//! Ball transit tracking for pinball machine control
//!
//! Tracks balls physically moving between devices and arbitrates, under
//! uncertainty and timeouts, whether a ball detected at a device belongs
//! to an expected transit, an externally-confirmed transit, or arrived
//! unexplained.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
