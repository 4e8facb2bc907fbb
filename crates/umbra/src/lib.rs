pub mod engine;
pub mod geometry;
pub mod host;
pub mod light;
pub mod memory;
pub mod settings;
mod stats;
pub mod update;

pub use engine::{ExposureEngine, NotifyOutcome, TickReport};
pub use geometry::{DoorState, ElevatedPoint, GridMetrics, Point, Wall};
pub use host::{
    ActorId, ActorSnapshot, ActorStore, AmbientLight, Emitter, Host, HostError, LightId, Marker,
    SceneIllumination, SceneView, TriggerEvent, TriggerKind, LIGHT_LEVEL_TAG, UPDATING_TAG,
};
pub use light::{
    classify, resolve_level, LightCatalog, LightLevel, LightOrigin, Region, RegionId, RegionShape,
    RegionSource, Resolution, ResolveError, ResolveOptions,
};
pub use memory::MemoryScene;
pub use settings::{ExposureSettings, MarkerStyle, SettingsError};
pub use stats::{ExposureStatsSnapshot, StatsHandle};
pub use update::{DrainReport, EffectSink, LevelChange, MarkerKind};
