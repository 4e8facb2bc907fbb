use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::locks::EffectLocks;
use super::markers::{EffectSink, MarkerKind};
use crate::host::{ActorId, ActorStore, Host, HostError, LIGHT_LEVEL_TAG, UPDATING_TAG};
use crate::light::LightLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingOperation {
    pub actor: ActorId,
    pub target: LightLevel,
    pub enqueued_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Unchanged,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("{kind:?} marker for actor {actor} is already being added")]
    LockHeld { actor: ActorId, kind: MarkerKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelChange {
    pub actor: ActorId,
    pub previous: Option<LightLevel>,
    pub level: LightLevel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub drained: usize,
    pub applied: usize,
    pub unchanged: usize,
    pub stale: usize,
    pub skipped_missing: usize,
    pub skipped_dead: usize,
    pub failed: usize,
    pub changes: Vec<LevelChange>,
}

impl DrainReport {
    pub fn is_empty(&self) -> bool {
        self.drained == 0
    }
}

/// Queue of per-actor marker writes, applied outside the trigger that caused them.
#[derive(Debug)]
pub struct EffectReconciler {
    pending: BTreeMap<ActorId, PendingOperation>,
    drain_scheduled: bool,
    max_age: Duration,
    effects_enabled: bool,
    locks: EffectLocks,
}

impl EffectReconciler {
    pub fn new(max_age: Duration, effects_enabled: bool) -> Self {
        Self {
            pending: BTreeMap::new(),
            drain_scheduled: false,
            max_age,
            effects_enabled,
            locks: EffectLocks::default(),
        }
    }

    /// Replaces any pending entry for `actor` with a freshly stamped one.
    pub fn enqueue(&mut self, actor: ActorId, target: LightLevel, now: Instant) {
        self.pending.insert(
            actor,
            PendingOperation {
                actor,
                target,
                enqueued_at: now,
            },
        );
        if !self.drain_scheduled {
            self.drain_scheduled = true;
            debug!(actor_id = actor.0, "reconcile_drain_scheduled");
        }
    }

    pub fn cancel(&mut self, actor: ActorId) -> Option<PendingOperation> {
        self.pending.remove(&actor)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.drain_scheduled = false;
    }

    pub fn drain_scheduled(&self) -> bool {
        self.drain_scheduled
    }

    pub fn pending(&self, actor: ActorId) -> Option<&PendingOperation> {
        self.pending.get(&actor)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn locks(&self) -> &EffectLocks {
        &self.locks
    }

    /// Applies everything queued so far. Entries enqueued while draining wait
    /// for the next drain.
    pub fn drain<H: Host>(&mut self, host: &mut H, sink: &dyn EffectSink, now: Instant) -> DrainReport {
        let batch = std::mem::take(&mut self.pending);
        self.drain_scheduled = false;
        let mut report = DrainReport::default();

        for operation in batch.into_values() {
            report.drained = report.drained.saturating_add(1);
            let age = now.saturating_duration_since(operation.enqueued_at);
            if age > self.max_age {
                debug!(
                    actor_id = operation.actor.0,
                    age_ms = age.as_millis() as u64,
                    "reconcile_entry_stale"
                );
                report.stale = report.stale.saturating_add(1);
                continue;
            }
            let Some(actor) = host.actor(operation.actor) else {
                report.skipped_missing = report.skipped_missing.saturating_add(1);
                continue;
            };
            if !actor.is_alive() {
                report.skipped_dead = report.skipped_dead.saturating_add(1);
                continue;
            }

            let previous = host
                .tag(operation.actor, LIGHT_LEVEL_TAG)
                .as_deref()
                .and_then(LightLevel::parse);
            match self.apply(host, sink, operation.actor, operation.target) {
                Ok(ApplyOutcome::Applied) => {
                    report.applied = report.applied.saturating_add(1);
                    report.changes.push(LevelChange {
                        actor: operation.actor,
                        previous,
                        level: operation.target,
                    });
                }
                Ok(ApplyOutcome::Unchanged) => {
                    report.unchanged = report.unchanged.saturating_add(1);
                }
                Err(error) => {
                    warn!(
                        actor_id = operation.actor.0,
                        level = operation.target.as_str(),
                        error = %error,
                        "reconcile_failed"
                    );
                    report.failed = report.failed.saturating_add(1);
                }
            }
        }

        if !report.is_empty() {
            info!(
                drained = report.drained,
                applied = report.applied,
                stale = report.stale,
                failed = report.failed,
                "reconcile_drained"
            );
        }
        report
    }

    /// Brings one actor's markers and stored level in line with `target`.
    /// A second call with the same target is a no-op.
    pub fn apply<H: Host>(
        &self,
        host: &mut H,
        sink: &dyn EffectSink,
        actor: ActorId,
        target: LightLevel,
    ) -> Result<ApplyOutcome, ReconcileError> {
        let stored = host.tag(actor, LIGHT_LEVEL_TAG);
        let markers_match = !self.effects_enabled || sink.matches_level(&*host, actor, target);
        if stored.as_deref() == Some(target.as_str()) && markers_match {
            return Ok(ApplyOutcome::Unchanged);
        }

        host.set_tag(actor, UPDATING_TAG, "true")?;
        let written = self.write_effects(host, sink, actor, target);
        let cleared = host.clear_tag(actor, UPDATING_TAG);
        written?;
        cleared?;
        debug!(
            actor_id = actor.0,
            level = target.as_str(),
            sink = sink.name(),
            "effects_applied"
        );
        Ok(ApplyOutcome::Applied)
    }

    fn write_effects<H: Host>(
        &self,
        host: &mut H,
        sink: &dyn EffectSink,
        actor: ActorId,
        target: LightLevel,
    ) -> Result<(), ReconcileError> {
        if self.effects_enabled {
            let store: &mut dyn ActorStore = &mut *host;
            sink.remove_markers(store, actor)?;
            if let Some(kind) = MarkerKind::for_level(target) {
                let _guard = self
                    .locks
                    .try_acquire(actor, kind)
                    .ok_or(ReconcileError::LockHeld { actor, kind })?;
                sink.add_marker(store, actor, kind)?;
            }
        }
        host.set_tag(actor, LIGHT_LEVEL_TAG, target.as_str())?;
        Ok(())
    }
}
