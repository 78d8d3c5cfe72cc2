//! Service Layer
//!
//! Governance state lives here. Each service owns its own map, reads time
//! from an injected clock and exposes a `sweep_expired` entry point for its
//! background sweeper. The HTTP middleware only translates between requests
//! and these calls.

mod lockout;
mod rate_window;
mod response_cache;
mod speed_throttle;
mod window;

pub use lockout::*;
pub use rate_window::*;
pub use response_cache::*;
pub use speed_throttle::*;
pub use window::{RateCounter, WindowCounters};
