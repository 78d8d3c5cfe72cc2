//! Expiry Sweeper Background Task
//!
//! Every governance service drops expired state passively when it touches a
//! key. Keys that are never touched again would otherwise stay in memory
//! forever, so each service also gets a sweeper that calls its
//! [`Sweepable::sweep_expired`] on a fixed interval.
//!
//! ```ignore
//! let handle = spawn_sweeper(Arc::clone(&cache), Duration::from_secs(120));
//!
//! // On shutdown
//! let snapshot = handle.shutdown().await;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::constants::MIN_SWEEP_INTERVAL_MS;
use crate::telemetry::metrics;

/// A service holding state that can expire.
pub trait Sweepable: Send + Sync + 'static {
    /// Name used in logs and metric labels.
    fn component(&self) -> &str;

    /// Remove expired state, returning how many items were removed.
    fn sweep_expired(&self) -> usize;
}

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Default)]
pub struct SweeperMetrics {
    /// Completed sweep cycles.
    pub cycles: AtomicU64,
    /// Items removed across all cycles.
    pub removed: AtomicU64,
}

impl SweeperMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, component: &str) -> SweeperSnapshot {
        SweeperSnapshot {
            component: component.to_string(),
            cycles: self.cycles.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweeperSnapshot {
    pub component: String,
    pub cycles: u64,
    pub removed: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Run one sweep cycle against `target`.
pub fn run_sweep<S: Sweepable + ?Sized>(target: &S, stats: &SweeperMetrics) -> usize {
    let removed = target.sweep_expired();
    stats.cycles.fetch_add(1, Ordering::Relaxed);
    stats.removed.fetch_add(removed as u64, Ordering::Relaxed);

    if removed > 0 {
        tracing::info!(component = target.component(), removed, "Swept expired entries");
        if let Some(m) = metrics() {
            m.record_sweep_removed(target.component(), removed);
        }
    } else {
        tracing::trace!(component = target.component(), "Sweep found nothing to remove");
    }
    removed
}

/// Sweep `target` every `every` until the shutdown signal fires.
///
/// The first sweep happens one full interval after start. Ticks missed while
/// the runtime was busy are skipped rather than replayed.
pub async fn sweep_task<S: Sweepable + ?Sized>(
    target: Arc<S>,
    every: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> SweeperSnapshot {
    let every = every.max(Duration::from_millis(MIN_SWEEP_INTERVAL_MS));
    let stats = SweeperMetrics::new();

    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        component = target.component(),
        interval_ms = every.as_millis() as u64,
        "Sweeper started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // A dropped sender also means shutdown.
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                run_sweep(target.as_ref(), &stats);
            }
        }
    }

    let snapshot = stats.snapshot(target.component());
    tracing::info!(
        component = %snapshot.component,
        cycles = snapshot.cycles,
        removed = snapshot.removed,
        "Sweeper stopped"
    );
    snapshot
}

/// Handle to a running sweeper.
#[derive(Debug)]
pub struct SweeperHandle {
    component: String,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<SweeperSnapshot>,
}

impl SweeperHandle {
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Stop the sweeper and wait for it to finish.
    pub async fn shutdown(self) -> Option<SweeperSnapshot> {
        let _ = self.shutdown_tx.send(true);
        match self.join.await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::error!(component = %self.component, error = %e, "Sweeper task failed");
                None
            }
        }
    }
}

/// Spawn a sweeper for `target` on the current runtime.
pub fn spawn_sweeper<S: Sweepable>(target: Arc<S>, every: Duration) -> SweeperHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let component = target.component().to_string();
    let join = tokio::spawn(sweep_task(target, every, shutdown_rx));
    SweeperHandle {
        component,
        shutdown_tx,
        join,
    }
}
