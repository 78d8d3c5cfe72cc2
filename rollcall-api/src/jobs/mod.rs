//! Background Jobs
//!
//! - `sweeper`: periodically removes expired cache entries, rate counters
//!   and lockout records
//!
//! Sweepers are spawned by [`Governance::start_sweepers`] at startup and
//! joined by [`Governance::shutdown`].
//!
//! [`Governance::start_sweepers`]: crate::state::Governance::start_sweepers
//! [`Governance::shutdown`]: crate::state::Governance::shutdown

pub mod sweeper;

pub use sweeper::{
    run_sweep, spawn_sweeper, sweep_task, Sweepable, SweeperHandle, SweeperMetrics,
    SweeperSnapshot,
};
