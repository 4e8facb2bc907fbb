use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use umbra::{
    ActorId, ActorSnapshot, DoorState, Emitter, ExposureSettings, MemoryScene, Point, Region,
    SceneIllumination, SceneView, SettingsError, Wall,
};

#[derive(Debug, Error)]
pub(crate) enum SimError {
    #[error("read scenario {path}: {source}")]
    ReadScenario {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    ParseScenario(String),
    #[error("scenario step {index}: {reason}")]
    InvalidStep { index: usize, reason: String },
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

#[derive(Debug, Deserialize)]
pub(crate) struct Scenario {
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) settings: Option<ExposureSettings>,
    pub(crate) scene: MemoryScene,
    #[serde(default)]
    pub(crate) steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ScenarioStep {
    pub(crate) at_ms: u64,
    #[serde(flatten)]
    pub(crate) action: StepAction,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub(crate) enum StepAction {
    AddActor {
        actor: ActorId,
        x: f64,
        y: f64,
        #[serde(default)]
        elevation: f64,
        #[serde(default)]
        hit_points: Option<f64>,
        #[serde(default)]
        light: Option<Emitter>,
    },
    MoveActor {
        actor: ActorId,
        x: f64,
        y: f64,
        #[serde(default)]
        elevation: f64,
    },
    RemoveActor {
        actor: ActorId,
    },
    SetHitPoints {
        actor: ActorId,
        hit_points: Option<f64>,
    },
    SetLight {
        actor: ActorId,
        light: Emitter,
    },
    RemoveLight {
        actor: ActorId,
    },
    SetDarkness {
        darkness: f64,
    },
    SetGlobalLight {
        enabled: bool,
    },
    AddWall {
        wall: Wall,
    },
    SetDoor {
        wall: usize,
        door: DoorState,
    },
    AddRegion {
        region: Region,
    },
}

impl StepAction {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::AddActor { .. } => "add_actor",
            Self::MoveActor { .. } => "move_actor",
            Self::RemoveActor { .. } => "remove_actor",
            Self::SetHitPoints { .. } => "set_hit_points",
            Self::SetLight { .. } => "set_light",
            Self::RemoveLight { .. } => "remove_light",
            Self::SetDarkness { .. } => "set_darkness",
            Self::SetGlobalLight { .. } => "set_global_light",
            Self::AddWall { .. } => "add_wall",
            Self::SetDoor { .. } => "set_door",
            Self::AddRegion { .. } => "add_region",
        }
    }

    /// Applies the step; `false` when its target no longer exists.
    pub(crate) fn apply(&self, scene: &mut MemoryScene) -> bool {
        match self {
            Self::AddActor {
                actor,
                x,
                y,
                elevation,
                hit_points,
                light,
            } => {
                scene.add_actor(ActorSnapshot {
                    id: *actor,
                    position: Point::new(*x, *y),
                    elevation: *elevation,
                    hit_points: *hit_points,
                    light: *light,
                });
                true
            }
            Self::MoveActor {
                actor,
                x,
                y,
                elevation,
            } => scene.move_actor(*actor, Point::new(*x, *y), *elevation),
            Self::RemoveActor { actor } => scene.remove_actor(*actor),
            Self::SetHitPoints { actor, hit_points } => scene.set_hit_points(*actor, *hit_points),
            Self::SetLight { actor, light } => scene.set_actor_light(*actor, Some(*light)),
            Self::RemoveLight { actor } => scene.set_actor_light(*actor, None),
            Self::SetDarkness { darkness } => {
                scene.set_illumination(SceneIllumination {
                    darkness: *darkness,
                    ..scene.illumination()
                });
                true
            }
            Self::SetGlobalLight { enabled } => {
                scene.set_illumination(SceneIllumination {
                    global_light: *enabled,
                    ..scene.illumination()
                });
                true
            }
            Self::AddWall { wall } => {
                scene.add_wall(*wall);
                true
            }
            Self::SetDoor { wall, door } => scene.set_door(*wall, *door),
            Self::AddRegion { region } => {
                scene.add_region(region.clone());
                true
            }
        }
    }
}

impl Scenario {
    pub(crate) fn from_json_str(raw: &str) -> Result<Self, SimError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let scenario = match serde_path_to_error::deserialize::<_, Self>(&mut deserializer) {
            Ok(scenario) => scenario,
            Err(error) => {
                let path = error.path().to_string();
                let source = error.into_inner();
                return Err(if path.is_empty() || path == "." {
                    SimError::ParseScenario(format!("parse scenario json: {source}"))
                } else {
                    SimError::ParseScenario(format!("parse scenario json at {path}: {source}"))
                });
            }
        };
        scenario.validate()?;
        Ok(scenario)
    }

    pub(crate) fn load(path: &Path) -> Result<Self, SimError> {
        let raw = fs::read_to_string(path).map_err(|source| SimError::ReadScenario {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub(crate) fn validate(&self) -> Result<(), SimError> {
        if let Some(settings) = &self.settings {
            settings.validate()?;
        }
        let mut previous_at = 0u64;
        for (index, step) in self.steps.iter().enumerate() {
            if step.at_ms < previous_at {
                return Err(SimError::InvalidStep {
                    index,
                    reason: format!(
                        "at_ms {} is earlier than the previous step ({previous_at})",
                        step.at_ms
                    ),
                });
            }
            previous_at = step.at_ms;
            if let Some(reason) = invalid_reason(&step.action) {
                return Err(SimError::InvalidStep { index, reason });
            }
        }
        Ok(())
    }

    pub(crate) fn last_step_ms(&self) -> u64 {
        self.steps.last().map(|step| step.at_ms).unwrap_or(0)
    }
}

fn invalid_reason(action: &StepAction) -> Option<String> {
    match action {
        StepAction::AddActor { x, y, elevation, .. } | StepAction::MoveActor { x, y, elevation, .. }
            if !(x.is_finite() && y.is_finite() && elevation.is_finite()) =>
        {
            Some(format!("{} position must be finite", action.kind()))
        }
        StepAction::SetDarkness { darkness } if !(0.0..=1.0).contains(darkness) => {
            Some(format!("darkness {darkness} is outside 0..=1"))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const MINIMAL: &str = r#"{
        "name": "minimal",
        "scene": {
            "lights": [ { "id": 1, "position": { "x": 0.0, "y": 0.0 }, "dim": 20.0, "bright": 10.0 } ],
            "actors": [ { "id": 1, "position": { "x": 5.0, "y": 0.0 }, "hit_points": 4.0 } ]
        },
        "steps": [
            { "at_ms": 100, "action": "move_actor", "actor": 1, "x": 15.0, "y": 0.0 },
            { "at_ms": 200, "action": "set_darkness", "darkness": 0.4 },
            { "at_ms": 300, "action": "set_door", "wall": 0, "door": "open" }
        ]
    }"#;

    #[test]
    fn parses_steps_with_flattened_actions() {
        let scenario = Scenario::from_json_str(MINIMAL).expect("scenario");
        assert_eq!(scenario.name, "minimal");
        assert_eq!(scenario.steps.len(), 3);
        assert_eq!(scenario.steps[0].action.kind(), "move_actor");
        assert_eq!(scenario.last_step_ms(), 300);
        assert!(scenario.settings.is_none());
    }

    #[test]
    fn steps_mutate_the_scene_and_queue_events() {
        let mut scenario = Scenario::from_json_str(MINIMAL).expect("scenario");
        let steps = scenario.steps.clone();
        assert!(steps[0].action.apply(&mut scenario.scene));
        assert!(steps[1].action.apply(&mut scenario.scene));
        assert!(!steps[2].action.apply(&mut scenario.scene));

        let actor = scenario.scene.actor(ActorId(1)).expect("actor");
        assert_eq!(actor.position, Point::new(15.0, 0.0));
        assert_eq!(scenario.scene.illumination().darkness, 0.4);
        assert_eq!(scenario.scene.pending_event_count(), 2);
    }

    #[test]
    fn parse_errors_name_the_failing_path() {
        let raw = r#"{ "scene": {}, "steps": [ { "at_ms": 10, "action": "move_actor", "actor": 1, "x": "left", "y": 0.0 } ] }"#;
        let message = Scenario::from_json_str(raw)
            .expect_err("must fail")
            .to_string();
        assert!(message.starts_with("parse scenario json"), "{message}");
        assert!(message.contains("steps[0]"), "{message}");
    }

    #[test]
    fn out_of_order_steps_are_rejected_by_index() {
        let raw = r#"{ "scene": {}, "steps": [
            { "at_ms": 500, "action": "set_global_light", "enabled": true },
            { "at_ms": 100, "action": "set_global_light", "enabled": false }
        ] }"#;
        let error = Scenario::from_json_str(raw).expect_err("must fail");
        assert!(matches!(error, SimError::InvalidStep { index: 1, .. }));
    }

    #[test]
    fn darkness_out_of_range_is_rejected() {
        let raw = r#"{ "scene": {}, "steps": [ { "at_ms": 0, "action": "set_darkness", "darkness": 1.5 } ] }"#;
        let error = Scenario::from_json_str(raw).expect_err("must fail");
        assert!(error.to_string().contains("scenario step 0"));
    }

    #[test]
    fn embedded_settings_are_validated() {
        let raw = r#"{ "settings": { "scene_pass_batch_size": 0 }, "scene": {} }"#;
        let error = Scenario::from_json_str(raw).expect_err("must fail");
        assert!(matches!(error, SimError::Settings(_)));
    }

    #[test]
    fn load_reads_scenario_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(MINIMAL.as_bytes()).expect("write scenario");
        let scenario = Scenario::load(file.path()).expect("load");
        assert_eq!(scenario.scene.actor_ids(), vec![ActorId(1)]);
    }
}
