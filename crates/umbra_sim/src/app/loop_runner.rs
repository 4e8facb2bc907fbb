use std::collections::BTreeMap;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use umbra::{
    ActorId, ActorStore, ExposureEngine, ExposureSettings, LightLevel, SceneView, TriggerEvent,
    LIGHT_LEVEL_TAG,
};

use super::bootstrap::AppWiring;
use super::scenario::Scenario;

#[derive(Debug, Clone)]
pub(crate) struct SimConfig {
    pub(crate) tick: Duration,
    /// Simulated time kept running after the last step so queued work lands.
    pub(crate) settle: Duration,
    pub(crate) stats_log_interval: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(50),
            settle: Duration::from_millis(2000),
            stats_log_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordedChange {
    pub(crate) at_ms: u64,
    pub(crate) actor: ActorId,
    pub(crate) level: LightLevel,
}

#[derive(Debug, Default)]
pub(crate) struct SimReport {
    pub(crate) ticks: u64,
    pub(crate) steps_applied: usize,
    pub(crate) steps_skipped: usize,
    pub(crate) events_forwarded: u64,
    pub(crate) changes: Vec<RecordedChange>,
    pub(crate) final_levels: BTreeMap<ActorId, Option<LightLevel>>,
    pub(crate) marker_counts: BTreeMap<ActorId, usize>,
    pub(crate) marker_adds: BTreeMap<ActorId, usize>,
    pub(crate) events_left_over: usize,
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let report = run_scenario(app.scenario, app.settings, &app.config);
    if report.steps_skipped > 0 {
        warn!(steps_skipped = report.steps_skipped, "scenario_steps_skipped");
    }
    let classified = report
        .final_levels
        .values()
        .filter(|level| level.is_some())
        .count();
    info!(
        ticks = report.ticks,
        steps_applied = report.steps_applied,
        events_forwarded = report.events_forwarded,
        level_changes = report.changes.len(),
        last_change_ms = report.changes.last().map(|change| change.at_ms).unwrap_or(0),
        classified,
        markers = report.marker_counts.values().sum::<usize>(),
        marker_writes = report.marker_adds.values().sum::<usize>(),
        events_left_over = report.events_left_over,
        "simulation_finished"
    );
    ExitCode::SUCCESS
}

/// Drives the engine over simulated time. Every tick applies due steps,
/// forwards the host's queued events (including echoes of the engine's own
/// writes) into `notify`, then runs `tick`.
pub(crate) fn run_scenario(
    scenario: Scenario,
    settings: ExposureSettings,
    config: &SimConfig,
) -> SimReport {
    let last_step_ms = scenario.last_step_ms();
    let Scenario {
        name,
        mut scene,
        steps,
        ..
    } = scenario;
    let mut engine = ExposureEngine::new(settings);
    let stats = engine.stats();
    let origin = Instant::now();
    let tick_ms = config.tick.as_millis().max(1) as u64;
    let end_ms = last_step_ms.saturating_add(config.settle.as_millis() as u64);
    let stats_interval_ms = config.stats_log_interval.as_millis() as u64;

    let mut report = SimReport::default();
    let mut next_step = 0usize;
    let mut next_stats_ms = stats_interval_ms;
    let mut elapsed_ms = 0u64;

    info!(scenario = name.as_str(), end_ms, tick_ms, "simulation_started");
    engine.notify(TriggerEvent::SceneChanged, &scene, origin);

    while elapsed_ms <= end_ms {
        let now = origin + Duration::from_millis(elapsed_ms);

        while let Some(step) = steps.get(next_step).filter(|step| step.at_ms <= elapsed_ms) {
            if step.action.apply(&mut scene) {
                report.steps_applied += 1;
                debug!(at_ms = step.at_ms, action = step.action.kind(), "step_applied");
            } else {
                report.steps_skipped += 1;
                warn!(
                    at_ms = step.at_ms,
                    action = step.action.kind(),
                    "step_target_missing"
                );
            }
            next_step += 1;
        }

        for event in scene.drain_events() {
            let outcome = engine.notify(event, &scene, now);
            debug!(?event, outcome = outcome.kind(), "trigger_forwarded");
            report.events_forwarded = report.events_forwarded.saturating_add(1);
        }

        let tick = engine.tick(&mut scene, now);
        for change in &tick.drain.changes {
            info!(
                at_ms = elapsed_ms,
                actor_id = change.actor.0,
                from = change.previous.map(LightLevel::as_str).unwrap_or("none"),
                to = change.level.as_str(),
                "light_level_changed"
            );
            report.changes.push(RecordedChange {
                at_ms: elapsed_ms,
                actor: change.actor,
                level: change.level,
            });
        }

        if stats_interval_ms > 0 && elapsed_ms >= next_stats_ms {
            let snapshot = stats.snapshot();
            info!(
                at_ms = elapsed_ms,
                resolutions = snapshot.resolutions,
                breaker_rejections = snapshot.breaker_rejections,
                scene_deferrals = snapshot.scene_deferrals,
                applied = snapshot.applied,
                write_failures = snapshot.write_failures,
                "exposure_stats"
            );
            next_stats_ms = next_stats_ms.saturating_add(stats_interval_ms);
        }

        report.ticks += 1;
        elapsed_ms = elapsed_ms.saturating_add(tick_ms);
    }

    if !engine.is_idle() {
        warn!(pending_writes = engine.pending_writes(), "simulation_ended_with_pending_work");
    }

    for actor in scene.actor_ids() {
        let level = scene
            .tag(actor, LIGHT_LEVEL_TAG)
            .as_deref()
            .and_then(LightLevel::parse);
        let markers = scene.markers(actor).len();
        info!(
            actor_id = actor.0,
            level = level.map(LightLevel::as_str).unwrap_or("unclassified"),
            markers,
            "actor_summary"
        );
        report.final_levels.insert(actor, level);
        report.marker_counts.insert(actor, markers);
        report.marker_adds.insert(actor, scene.marker_add_count(actor));
    }
    report.events_left_over = scene.pending_event_count();
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    const TORCHLIT_HALL: &str = include_str!("../../scenarios/torchlit_hall.json");

    fn hall() -> Scenario {
        Scenario::from_json_str(TORCHLIT_HALL).expect("bundled scenario")
    }

    fn run_hall(settings: ExposureSettings) -> SimReport {
        run_scenario(hall(), settings, &SimConfig::default())
    }

    fn changes_for(report: &SimReport, actor: ActorId) -> Vec<LightLevel> {
        report
            .changes
            .iter()
            .filter(|change| change.actor == actor)
            .map(|change| change.level)
            .collect()
    }

    #[test]
    fn bundled_hall_reaches_expected_levels() {
        let report = run_hall(ExposureSettings::default());
        assert_eq!(report.steps_skipped, 0);
        assert_eq!(
            report.final_levels.get(&ActorId(1)),
            Some(&Some(LightLevel::Bright))
        );
        assert_eq!(
            report.final_levels.get(&ActorId(2)),
            Some(&Some(LightLevel::Dark))
        );
        assert_eq!(
            report.final_levels.get(&ActorId(3)),
            Some(&Some(LightLevel::Bright))
        );
    }

    #[test]
    fn each_change_is_written_exactly_once() {
        let report = run_hall(ExposureSettings::default());
        assert_eq!(changes_for(&report, ActorId(1)), vec![LightLevel::Bright]);
        assert_eq!(
            changes_for(&report, ActorId(2)),
            vec![
                LightLevel::Dark,
                LightLevel::Dim,
                LightLevel::Bright,
                LightLevel::Dark,
            ]
        );
        assert_eq!(
            changes_for(&report, ActorId(3)),
            vec![LightLevel::Dim, LightLevel::Bright]
        );
        // Dark, dim and dark again; bright adds nothing.
        assert_eq!(report.marker_adds.get(&ActorId(2)), Some(&3));
        assert_eq!(report.marker_counts.get(&ActorId(2)), Some(&1));
        assert_eq!(report.marker_counts.get(&ActorId(3)), Some(&0));
    }

    #[test]
    fn echoes_leave_the_host_quiet_at_the_end() {
        let report = run_hall(ExposureSettings::default());
        assert_eq!(report.events_left_over, 0);
        assert!(report.events_forwarded > 0);
    }

    #[test]
    fn debounced_run_converges_to_the_same_levels() {
        let report = run_hall(ExposureSettings {
            processing_delay_ms: 100,
            ..ExposureSettings::default()
        });
        assert_eq!(
            report.final_levels.get(&ActorId(2)),
            Some(&Some(LightLevel::Dark))
        );
        assert_eq!(
            report.final_levels.get(&ActorId(3)),
            Some(&Some(LightLevel::Bright))
        );
    }

    #[test]
    fn disabled_module_classifies_nothing() {
        let report = run_hall(ExposureSettings {
            enabled: false,
            ..ExposureSettings::default()
        });
        assert!(report.changes.is_empty());
        assert!(report.final_levels.values().all(Option::is_none));
    }
}
