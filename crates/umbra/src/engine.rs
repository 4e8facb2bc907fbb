use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, info};

use crate::geometry::Point;
use crate::host::{
    ActorId, ActorSnapshot, Emitter, Host, SceneView, TriggerEvent, TriggerKind, LIGHT_LEVEL_TAG,
    UPDATING_TAG,
};
use crate::light::{classify, probe_for, LightCatalog, LightLevel};
use crate::settings::ExposureSettings;
use crate::stats::{ExposureStatsSnapshot, StatsHandle};
use crate::update::{
    sink_for_style, CircuitBreaker, DrainReport, EffectReconciler, EffectSink, UpdateScheduler,
};

/// What `notify` did with a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Disabled,
    IgnoredUpdating,
    Debounced,
    Resolved(LightLevel),
    Rejected,
    Skipped,
    Forgotten,
    ScenePassRequested,
    SceneReset,
}

impl NotifyOutcome {
    pub fn kind(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::IgnoredUpdating => "ignored_updating",
            Self::Debounced => "debounced",
            Self::Resolved(_) => "resolved",
            Self::Rejected => "rejected",
            Self::Skipped => "skipped",
            Self::Forgotten => "forgotten",
            Self::ScenePassRequested => "scene_pass_requested",
            Self::SceneReset => "scene_reset",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub actors_resolved: usize,
    pub scene_actors_resolved: usize,
    pub scene_actors_deferred: usize,
    pub scene_pass_completed: bool,
    pub drain: DrainReport,
}

enum ResolveStep {
    Resolved(LightLevel),
    Skipped,
}

/// What an actor's own light contributes to everyone else's level.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CarriedLight {
    position: Point,
    elevation: f64,
    emitter: Emitter,
}

impl CarriedLight {
    fn of(snapshot: &ActorSnapshot) -> Option<Self> {
        if !snapshot.carries_active_light() {
            return None;
        }
        snapshot.light.map(|emitter| Self {
            position: snapshot.position,
            elevation: snapshot.elevation,
            emitter,
        })
    }
}

/// Owns all per-scene update state: timers, breaker, pending writes, counters.
/// Build one per scene; nothing here is global.
pub struct ExposureEngine {
    settings: ExposureSettings,
    scheduler: UpdateScheduler,
    breaker: CircuitBreaker,
    reconciler: EffectReconciler,
    sink: Box<dyn EffectSink>,
    carriers: HashMap<ActorId, CarriedLight>,
    totals: ExposureStatsSnapshot,
    stats: StatsHandle,
}

impl ExposureEngine {
    pub fn new(settings: ExposureSettings) -> Self {
        let sink = sink_for_style(settings.marker_style);
        Self::with_sink(settings, sink)
    }

    pub fn with_sink(settings: ExposureSettings, sink: Box<dyn EffectSink>) -> Self {
        info!(
            enabled = settings.enabled,
            effects_enabled = settings.effects_enabled,
            processing_delay_ms = settings.processing_delay_ms,
            sink = sink.name(),
            "exposure_engine_created"
        );
        Self {
            scheduler: UpdateScheduler::new(settings.processing_delay()),
            breaker: CircuitBreaker::new(settings.cooldown()),
            reconciler: EffectReconciler::new(settings.pending_max_age(), settings.effects_enabled),
            sink,
            carriers: HashMap::new(),
            totals: ExposureStatsSnapshot::default(),
            stats: StatsHandle::default(),
            settings,
        }
    }

    pub fn settings(&self) -> &ExposureSettings {
        &self.settings
    }

    pub fn stats(&self) -> StatsHandle {
        self.stats.clone()
    }

    pub fn pending_writes(&self) -> usize {
        self.reconciler.pending_len()
    }

    pub fn is_idle(&self) -> bool {
        !self.scheduler.has_pending_work() && !self.reconciler.drain_scheduled()
    }

    /// Observes one trigger. Never writes to the host; at most it resolves and
    /// queues a write for the next [`Self::tick`].
    pub fn notify<H: Host>(&mut self, event: TriggerEvent, host: &H, now: Instant) -> NotifyOutcome {
        self.totals.triggers_received = self.totals.triggers_received.saturating_add(1);
        let outcome = if !self.settings.enabled {
            NotifyOutcome::Disabled
        } else {
            match event.kind() {
                TriggerKind::Actor => match event.actor() {
                    Some(actor) => {
                        // A carried light moving, appearing or vanishing relights everyone.
                        if self.track_carrier(actor, host) {
                            debug!(actor_id = actor.0, "carried_light_changed");
                            self.scheduler.request_scene_pass(now);
                        }
                        if matches!(event, TriggerEvent::ActorRemoved { .. }) {
                            self.forget_actor(actor)
                        } else {
                            self.request_actor(actor, host, now)
                        }
                    }
                    None => NotifyOutcome::Skipped,
                },
                TriggerKind::Light | TriggerKind::Environment => self.request_scene(now),
                TriggerKind::Scene => {
                    self.reset_scene_state();
                    self.scheduler.request_scene_pass(now);
                    NotifyOutcome::SceneReset
                }
            }
        };
        if matches!(
            outcome,
            NotifyOutcome::Disabled | NotifyOutcome::IgnoredUpdating
        ) {
            self.totals.triggers_ignored = self.totals.triggers_ignored.saturating_add(1);
        }
        self.stats.publish(self.totals);
        outcome
    }

    /// Schedules (or, with no processing delay, performs) one actor's resolution.
    pub fn request_actor<H: Host>(&mut self, actor: ActorId, host: &H, now: Instant) -> NotifyOutcome {
        if host.tag(actor, UPDATING_TAG).is_some() {
            debug!(actor_id = actor.0, "trigger_ignored_while_updating");
            return NotifyOutcome::IgnoredUpdating;
        }
        if !self.scheduler.is_synchronous() {
            self.scheduler.debounce_actor(actor, now);
            return NotifyOutcome::Debounced;
        }
        if !self.enter_breaker(actor, now) {
            return NotifyOutcome::Rejected;
        }
        let catalog = LightCatalog::snapshot(host);
        match self.resolve_actor(host, &catalog, actor, now) {
            ResolveStep::Resolved(level) => NotifyOutcome::Resolved(level),
            ResolveStep::Skipped => NotifyOutcome::Skipped,
        }
    }

    pub fn request_scene(&mut self, now: Instant) -> NotifyOutcome {
        self.scheduler.request_scene_pass(now);
        NotifyOutcome::ScenePassRequested
    }

    /// The deferred half of the pipeline: due actor timers, one scene-pass
    /// batch, then every queued write.
    pub fn tick<H: Host>(&mut self, host: &mut H, now: Instant) -> TickReport {
        let mut report = TickReport::default();
        if !self.settings.enabled {
            return report;
        }

        let due = self.scheduler.take_due_actors(now);
        if !due.is_empty() {
            let catalog = LightCatalog::snapshot(&*host);
            for actor in due {
                if host.tag(actor, UPDATING_TAG).is_some() {
                    self.totals.triggers_ignored = self.totals.triggers_ignored.saturating_add(1);
                    continue;
                }
                if !self.enter_breaker(actor, now) {
                    continue;
                }
                if let ResolveStep::Resolved(_) = self.resolve_actor(&*host, &catalog, actor, now) {
                    report.actors_resolved += 1;
                }
            }
        }

        if self.scheduler.scene_pass_pending()
            && self.scheduler.begin_due_scene_pass(now, host.actor_ids())
        {
            self.refresh_carriers(&*host);
            self.totals.scene_passes = self.totals.scene_passes.saturating_add(1);
        }
        if self.scheduler.scene_pass_in_flight() {
            let batch = self
                .scheduler
                .next_scene_batch(self.settings.scene_pass_batch_size);
            if !batch.is_empty() {
                let catalog = LightCatalog::snapshot(&*host);
                for actor in batch {
                    if host.tag(actor, UPDATING_TAG).is_some() {
                        continue;
                    }
                    if !self.breaker.try_enter(actor, now) {
                        // Resolved too recently; picked up again once the cooldown lapses.
                        if let Some(retry_at) = self.breaker.retry_at(actor, now) {
                            self.scheduler.defer_actor(actor, retry_at);
                        }
                        self.totals.scene_deferrals = self.totals.scene_deferrals.saturating_add(1);
                        report.scene_actors_deferred += 1;
                        debug!(actor_id = actor.0, "scene_actor_deferred");
                        continue;
                    }
                    if let ResolveStep::Resolved(_) =
                        self.resolve_actor(&*host, &catalog, actor, now)
                    {
                        report.scene_actors_resolved += 1;
                    }
                }
            }
            if self.scheduler.finish_scene_pass(now) {
                report.scene_pass_completed = true;
                debug!(
                    scene_passes = self.totals.scene_passes,
                    "scene_pass_completed"
                );
            }
        }

        self.breaker.prune(now);
        if self.reconciler.drain_scheduled() {
            report.drain = self.reconciler.drain(host, self.sink.as_ref(), now);
            self.totals.add_drain(&report.drain);
        }
        self.stats.publish(self.totals);
        report
    }

    /// Direct query that bypasses scheduling and never touches stored state.
    pub fn classify_actor<S: SceneView + ?Sized>(&self, scene: &S, actor: ActorId) -> Option<LightLevel> {
        let snapshot = scene.actor(actor)?;
        if !snapshot.is_alive() {
            return None;
        }
        let catalog = LightCatalog::snapshot(scene);
        Some(classify(
            probe_for(&snapshot),
            &catalog,
            scene,
            self.settings.resolve_options(),
        ))
    }

    pub fn reset_scene_state(&mut self) {
        self.scheduler.reset();
        self.breaker.clear();
        self.carriers.clear();
        self.reconciler.clear();
        info!("scene_state_reset");
    }

    fn forget_actor(&mut self, actor: ActorId) -> NotifyOutcome {
        self.scheduler.cancel_actor(actor);
        self.breaker.forget(actor);
        if self.reconciler.cancel(actor).is_some() {
            self.totals.cancelled = self.totals.cancelled.saturating_add(1);
        }
        NotifyOutcome::Forgotten
    }

    /// Updates the remembered carried light; `true` when it changed.
    fn track_carrier<S: SceneView + ?Sized>(&mut self, actor: ActorId, scene: &S) -> bool {
        let current = scene.actor(actor).as_ref().and_then(CarriedLight::of);
        let previous = match current {
            Some(light) => self.carriers.insert(actor, light),
            None => self.carriers.remove(&actor),
        };
        previous != current
    }

    fn refresh_carriers<S: SceneView + ?Sized>(&mut self, scene: &S) {
        self.carriers = scene
            .actor_ids()
            .into_iter()
            .filter_map(|actor| {
                let light = CarriedLight::of(&scene.actor(actor)?)?;
                Some((actor, light))
            })
            .collect();
    }

    fn enter_breaker(&mut self, actor: ActorId, now: Instant) -> bool {
        if self.breaker.try_enter(actor, now) {
            return true;
        }
        debug!(actor_id = actor.0, "resolution_refused_by_breaker");
        self.totals.breaker_rejections = self.totals.breaker_rejections.saturating_add(1);
        false
    }

    fn resolve_actor<H: Host>(
        &mut self,
        host: &H,
        catalog: &LightCatalog,
        actor: ActorId,
        now: Instant,
    ) -> ResolveStep {
        let Some(snapshot) = host.actor(actor) else {
            self.reconciler.cancel(actor);
            self.totals.skipped_invalid = self.totals.skipped_invalid.saturating_add(1);
            return ResolveStep::Skipped;
        };
        if !snapshot.is_alive() {
            debug!(actor_id = actor.0, "actor_skipped_not_alive");
            self.totals.skipped_invalid = self.totals.skipped_invalid.saturating_add(1);
            return ResolveStep::Skipped;
        }

        let level = classify(
            probe_for(&snapshot),
            catalog,
            host,
            self.settings.resolve_options(),
        );
        self.totals.resolutions = self.totals.resolutions.saturating_add(1);

        if host.tag(actor, LIGHT_LEVEL_TAG).as_deref() == Some(level.as_str()) {
            if self.reconciler.cancel(actor).is_some() {
                self.totals.cancelled = self.totals.cancelled.saturating_add(1);
            }
        } else {
            self.reconciler.enqueue(actor, level, now);
            self.totals.enqueued = self.totals.enqueued.saturating_add(1);
        }
        ResolveStep::Resolved(level)
    }
}
