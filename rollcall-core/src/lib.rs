//! Rollcall Core - Shared Types
//!
//! Time sources and error types used by every governance component.
//! This crate holds no request-handling logic.

pub mod clock;
pub mod error;
pub mod identity;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{GovernanceError, GovernanceResult};
pub use identity::{ClientKey, Timestamp};
