use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{GridMetrics, Point, Wall};
use crate::light::{LightOrigin, Region};

/// Persisted classification record on the actor.
pub const LIGHT_LEVEL_TAG: &str = "lightLevel";
/// Set while the reconciler is writing an actor's markers.
pub const UPDATING_TAG: &str = "lightLevelUpdating";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LightId(pub u64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Emitter {
    #[serde(default)]
    pub dim: f64,
    #[serde(default)]
    pub bright: f64,
    #[serde(default = "full_circle")]
    pub angle: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "default_luminosity")]
    pub luminosity: f64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn full_circle() -> f64 {
    360.0
}

fn default_luminosity() -> f64 {
    0.5
}

fn default_active() -> bool {
    true
}

impl Emitter {
    pub fn new(dim: f64, bright: f64) -> Self {
        Self {
            dim,
            bright,
            angle: full_circle(),
            rotation: 0.0,
            luminosity: default_luminosity(),
            active: true,
        }
    }

    pub fn with_cone(mut self, angle: f64, rotation: f64) -> Self {
        self.angle = angle;
        self.rotation = rotation;
        self
    }

    pub fn with_luminosity(mut self, luminosity: f64) -> Self {
        self.luminosity = luminosity;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmbientLight {
    pub id: LightId,
    pub position: Point,
    #[serde(default)]
    pub elevation: f64,
    #[serde(flatten)]
    pub emitter: Emitter,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActorSnapshot {
    pub id: ActorId,
    pub position: Point,
    pub elevation: f64,
    pub hit_points: Option<f64>,
    pub light: Option<Emitter>,
}

impl ActorSnapshot {
    pub fn is_alive(&self) -> bool {
        matches!(self.hit_points, Some(hp) if hp > 0.0)
    }

    pub fn carries_active_light(&self) -> bool {
        self.light.is_some_and(|light| light.active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneIllumination {
    #[serde(default)]
    pub global_light: bool,
    #[serde(default)]
    pub darkness: f64,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    1.0
}

impl Default for SceneIllumination {
    fn default() -> Self {
        Self {
            global_light: false,
            darkness: 0.0,
            threshold: default_threshold(),
        }
    }
}

impl SceneIllumination {
    pub fn global_light_applies(&self) -> bool {
        self.global_light && self.darkness <= self.threshold
    }
}

/// Status marker applied to an actor. `origin` identifies the integration that
/// owns it so removal never touches foreign markers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("actor {0} not found")]
    ActorNotFound(ActorId),
    #[error("write rejected for actor {actor}: {reason}")]
    WriteRejected { actor: ActorId, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TriggerEvent {
    ActorCreated { actor: ActorId },
    ActorMoved { actor: ActorId },
    ActorUpdated { actor: ActorId },
    ActorRemoved { actor: ActorId },
    LightCreated { source: LightOrigin },
    LightUpdated { source: LightOrigin },
    LightRemoved { source: LightOrigin },
    IlluminationChanged,
    WallsChanged,
    RegionsChanged,
    SceneChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Actor,
    Light,
    Environment,
    Scene,
}

impl TriggerEvent {
    pub fn kind(self) -> TriggerKind {
        match self {
            Self::ActorCreated { .. }
            | Self::ActorMoved { .. }
            | Self::ActorUpdated { .. }
            | Self::ActorRemoved { .. } => TriggerKind::Actor,
            Self::LightCreated { .. } | Self::LightUpdated { .. } | Self::LightRemoved { .. } => {
                TriggerKind::Light
            }
            Self::IlluminationChanged | Self::WallsChanged | Self::RegionsChanged => {
                TriggerKind::Environment
            }
            Self::SceneChanged => TriggerKind::Scene,
        }
    }

    pub fn actor(self) -> Option<ActorId> {
        match self {
            Self::ActorCreated { actor }
            | Self::ActorMoved { actor }
            | Self::ActorUpdated { actor }
            | Self::ActorRemoved { actor } => Some(actor),
            _ => None,
        }
    }
}

/// Read-only view of the scene the engine classifies against.
pub trait SceneView {
    fn grid(&self) -> GridMetrics;
    fn illumination(&self) -> SceneIllumination;
    fn ambient_lights(&self) -> &[AmbientLight];
    fn walls(&self) -> &[Wall];
    fn regions(&self) -> &[Region];
    fn actor_ids(&self) -> Vec<ActorId>;
    fn actor(&self, id: ActorId) -> Option<ActorSnapshot>;
}

/// Per-actor key/value tags and applied markers. Every write may fail.
pub trait ActorStore {
    fn tag(&self, actor: ActorId, key: &str) -> Option<String>;
    fn set_tag(&mut self, actor: ActorId, key: &str, value: &str) -> Result<(), HostError>;
    fn clear_tag(&mut self, actor: ActorId, key: &str) -> Result<(), HostError>;
    fn markers(&self, actor: ActorId) -> Vec<Marker>;
    fn add_marker(&mut self, actor: ActorId, marker: Marker) -> Result<(), HostError>;
    fn remove_marker(&mut self, actor: ActorId, marker_id: &str) -> Result<(), HostError>;
}

pub trait Host: SceneView + ActorStore {}

impl<T: SceneView + ActorStore + ?Sized> Host for T {}
