use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::{ElevatedPoint, Point};
use crate::host::{ActorId, Emitter, LightId, SceneView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightOrigin {
    Ambient(LightId),
    Carried(ActorId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSource {
    pub origin: LightOrigin,
    pub position: Point,
    pub elevation: f64,
    pub dim_radius: f64,
    pub bright_radius: f64,
    pub cone_angle: f64,
    pub rotation: f64,
    pub luminosity: f64,
    pub active: bool,
}

impl LightSource {
    /// Builds a sanitized source; `None` when the emitter cannot be placed.
    pub fn from_emitter(
        origin: LightOrigin,
        position: Point,
        elevation: f64,
        emitter: &Emitter,
    ) -> Option<Self> {
        if !position.is_finite() || !elevation.is_finite() {
            return None;
        }
        Some(Self {
            origin,
            position,
            elevation,
            dim_radius: sanitize_radius(emitter.dim),
            bright_radius: sanitize_radius(emitter.bright),
            cone_angle: sanitize_cone(emitter.angle),
            rotation: if emitter.rotation.is_finite() {
                emitter.rotation
            } else {
                0.0
            },
            luminosity: if emitter.luminosity.is_finite() {
                emitter.luminosity.clamp(-1.0, 1.0)
            } else {
                0.0
            },
            active: emitter.active,
        })
    }

    pub fn elevated(&self) -> ElevatedPoint {
        ElevatedPoint::new(self.position, self.elevation)
    }

    pub fn max_radius(&self) -> f64 {
        self.dim_radius.max(self.bright_radius)
    }

    pub fn is_negative(&self) -> bool {
        self.luminosity < 0.0
    }
}

fn sanitize_radius(radius: f64) -> f64 {
    if radius.is_finite() && radius > 0.0 {
        radius
    } else {
        0.0
    }
}

fn sanitize_cone(angle: f64) -> f64 {
    if angle.is_finite() && angle > 0.0 && angle <= 360.0 {
        angle
    } else {
        360.0
    }
}

/// Every active emitter in the scene for one resolution pass, brightest first.
#[derive(Debug, Clone, Default)]
pub struct LightCatalog {
    sources: Vec<LightSource>,
}

impl LightCatalog {
    pub fn snapshot<S: SceneView + ?Sized>(scene: &S) -> Self {
        let mut sources = Vec::with_capacity(scene.ambient_lights().len());
        for light in scene.ambient_lights() {
            match LightSource::from_emitter(
                LightOrigin::Ambient(light.id),
                light.position,
                light.elevation,
                &light.emitter,
            ) {
                Some(source) => sources.push(source),
                None => debug!(light_id = light.id.0, "ambient_light_skipped_invalid"),
            }
        }
        for actor_id in scene.actor_ids() {
            let Some(actor) = scene.actor(actor_id) else {
                continue;
            };
            let Some(emitter) = actor.light else {
                continue;
            };
            match LightSource::from_emitter(
                LightOrigin::Carried(actor.id),
                actor.position,
                actor.elevation,
                &emitter,
            ) {
                Some(source) => sources.push(source),
                None => debug!(actor_id = actor.id.0, "carried_light_skipped_invalid"),
            }
        }
        Self::from_sources(sources)
    }

    pub fn from_sources(mut sources: Vec<LightSource>) -> Self {
        // Stable, so equal luminosity keeps host order.
        sources.sort_by(|a, b| b.luminosity.total_cmp(&a.luminosity));
        Self { sources }
    }

    pub fn sources(&self) -> &[LightSource] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
