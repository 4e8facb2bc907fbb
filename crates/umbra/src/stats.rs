use std::sync::{Arc, Once, RwLock};

use tracing::warn;

static POISON_WARNING: Once = Once::new();

/// Running totals since the engine was built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExposureStatsSnapshot {
    pub triggers_received: u64,
    pub triggers_ignored: u64,
    pub breaker_rejections: u64,
    pub scene_deferrals: u64,
    pub resolutions: u64,
    pub enqueued: u64,
    pub cancelled: u64,
    pub scene_passes: u64,
    pub applied: u64,
    pub unchanged: u64,
    pub stale_discarded: u64,
    pub skipped_invalid: u64,
    pub write_failures: u64,
}

impl ExposureStatsSnapshot {
    pub(crate) fn add_drain(&mut self, report: &crate::update::DrainReport) {
        self.applied = self.applied.saturating_add(report.applied as u64);
        self.unchanged = self.unchanged.saturating_add(report.unchanged as u64);
        self.stale_discarded = self.stale_discarded.saturating_add(report.stale as u64);
        let skipped = report.skipped_missing.saturating_add(report.skipped_dead) as u64;
        self.skipped_invalid = self.skipped_invalid.saturating_add(skipped);
        self.write_failures = self.write_failures.saturating_add(report.failed as u64);
    }
}

/// Cloneable read side of the engine's counters. The engine publishes a
/// whole snapshot after every `notify` and `tick`.
#[derive(Clone, Debug)]
pub struct StatsHandle {
    latest: Arc<RwLock<ExposureStatsSnapshot>>,
}

impl Default for StatsHandle {
    fn default() -> Self {
        Self {
            latest: Arc::new(RwLock::new(ExposureStatsSnapshot::default())),
        }
    }
}

impl StatsHandle {
    pub fn snapshot(&self) -> ExposureStatsSnapshot {
        *self.latest.read().unwrap_or_else(|poisoned| {
            note_poisoned("read");
            poisoned.into_inner()
        })
    }

    pub(crate) fn publish(&self, snapshot: ExposureStatsSnapshot) {
        let mut latest = self.latest.write().unwrap_or_else(|poisoned| {
            note_poisoned("write");
            poisoned.into_inner()
        });
        *latest = snapshot;
    }
}

// Counters stay valid after a poisoning panic; warns once per process.
fn note_poisoned(operation: &'static str) {
    POISON_WARNING.call_once(|| warn!(operation, "stats_lock_poisoned"));
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::update::DrainReport;

    fn poison_lock(lock: &RwLock<ExposureStatsSnapshot>) {
        thread::scope(|scope| {
            let _ = scope
                .spawn(|| {
                    let _guard = lock.write().expect("write guard");
                    panic!("poison stats lock");
                })
                .join();
        });
    }

    #[test]
    fn clones_share_published_values() {
        let handle = StatsHandle::default();
        let reader = handle.clone();
        handle.publish(ExposureStatsSnapshot {
            resolutions: 3,
            ..ExposureStatsSnapshot::default()
        });
        assert_eq!(reader.snapshot().resolutions, 3);
    }

    #[test]
    fn drain_reports_fold_into_totals() {
        let mut totals = ExposureStatsSnapshot::default();
        totals.add_drain(&DrainReport {
            drained: 5,
            applied: 2,
            stale: 1,
            skipped_missing: 1,
            skipped_dead: 1,
            ..DrainReport::default()
        });
        assert_eq!(totals.applied, 2);
        assert_eq!(totals.stale_discarded, 1);
        assert_eq!(totals.skipped_invalid, 2);
    }

    #[test]
    fn snapshot_recovers_after_poison_without_panic() {
        let handle = StatsHandle::default();
        poison_lock(handle.latest.as_ref());
        assert_eq!(handle.snapshot(), ExposureStatsSnapshot::default());
    }

    #[test]
    fn publish_recovers_after_poison_without_panic() {
        let handle = StatsHandle::default();
        poison_lock(handle.latest.as_ref());
        let expected = ExposureStatsSnapshot {
            applied: 7,
            ..ExposureStatsSnapshot::default()
        };
        handle.publish(expected);
        assert_eq!(handle.snapshot(), expected);
    }
}
