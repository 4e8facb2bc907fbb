use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::catalog::LightCatalog;
use super::region::restricting_region;
use crate::geometry::{bearing_angle, distance_3d, has_occlusion, within_cone, ElevatedPoint};
use crate::host::{ActorSnapshot, SceneView};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LightLevel {
    Dark = 0,
    Dim = 1,
    Bright = 2,
}

impl LightLevel {
    pub fn rank(self) -> u8 {
        self as u8
    }

    /// Unexpected ranks fail open to `Bright`.
    pub fn from_rank(rank: u8) -> Self {
        match rank {
            0 => Self::Dark,
            1 => Self::Dim,
            _ => Self::Bright,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Dim => "dim",
            Self::Bright => "bright",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "dark" => Some(Self::Dark),
            "dim" => Some(Self::Dim),
            "bright" => Some(Self::Bright),
            _ => None,
        }
    }

    /// Reads a stored `lightLevel` tag; absent or unreadable records count as `Bright`.
    pub fn from_tag(tag: Option<&str>) -> Self {
        tag.and_then(Self::parse).unwrap_or(Self::Bright)
    }
}

impl fmt::Display for LightLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    pub global_illumination: bool,
    pub negative_lights: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            global_illumination: true,
            negative_lights: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub level: LightLevel,
    pub global_illumination_active: bool,
    pub contributing_sources: usize,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error("grid metrics are unusable (distance_units={distance_units}, pixel_size={pixel_size})")]
    InvalidGrid { distance_units: f64, pixel_size: f64 },
    #[error("probe position is not finite ({x}, {y}) at elevation {elevation}")]
    NonFiniteProbe { x: f64, y: f64, elevation: f64 },
}

pub fn probe_for(actor: &ActorSnapshot) -> ElevatedPoint {
    ElevatedPoint::new(actor.position, actor.elevation)
}

/// Classifies a single point against the scene.
///
/// Sources are visited in catalog order (brightest first). Positive bright bands
/// cannot lift a level already supplied by global illumination, but negative
/// sources may still pull it down; a negative source whose bright band covers the
/// probe therefore always wins over positive sources, since negatives sort last.
pub fn resolve_level<S: SceneView + ?Sized>(
    probe: ElevatedPoint,
    catalog: &LightCatalog,
    scene: &S,
    options: ResolveOptions,
) -> Result<Resolution, ResolveError> {
    let grid = scene.grid();
    if !grid.is_valid() {
        return Err(ResolveError::InvalidGrid {
            distance_units: grid.distance_units,
            pixel_size: grid.pixel_size,
        });
    }
    if !probe.point.is_finite() || !probe.elevation.is_finite() {
        return Err(ResolveError::NonFiniteProbe {
            x: probe.point.x,
            y: probe.point.y,
            elevation: probe.elevation,
        });
    }

    let mut level = LightLevel::Dark;
    let mut global_active = false;
    if options.global_illumination && scene.illumination().global_light_applies() {
        level = LightLevel::Bright;
        global_active = true;
        if let Some(region) = restricting_region(probe.point, probe.elevation, scene.regions()) {
            debug!(region_id = region.id.0, "global_illumination_vetoed");
            level = LightLevel::Dark;
            global_active = false;
        }
    }

    let mut contributing_sources = 0usize;
    if !global_active || options.negative_lights {
        for source in catalog.sources() {
            if !source.active {
                continue;
            }
            let distance = distance_3d(probe, source.elevated(), grid);
            if source.max_radius() < distance {
                continue;
            }
            if source.cone_angle < 360.0 {
                let bearing = bearing_angle(probe.point, source.position);
                if !within_cone(bearing, source.rotation, source.cone_angle) {
                    continue;
                }
            }
            if has_occlusion(source.position, probe.point, scene.walls()) {
                continue;
            }

            let negative = options.negative_lights && source.is_negative();
            let mut contributed = false;
            if source.dim_radius > 0.0 && distance <= source.dim_radius {
                level = if negative {
                    level.min(LightLevel::Dim)
                } else {
                    level.max(LightLevel::Dim)
                };
                contributed = true;
            }
            if source.bright_radius > 0.0 && distance <= source.bright_radius {
                if negative {
                    level = LightLevel::Dark;
                    contributed = true;
                } else if !global_active {
                    level = LightLevel::Bright;
                    contributed = true;
                }
            }
            if contributed {
                contributing_sources += 1;
            }
        }
    }

    Ok(Resolution {
        level,
        global_illumination_active: global_active,
        contributing_sources,
    })
}

/// Fail-open wrapper around [`resolve_level`].
pub fn classify<S: SceneView + ?Sized>(
    probe: ElevatedPoint,
    catalog: &LightCatalog,
    scene: &S,
    options: ResolveOptions,
) -> LightLevel {
    match resolve_level(probe, catalog, scene, options) {
        Ok(resolution) => resolution.level,
        Err(error) => {
            warn!(error = %error, "light_resolution_failed");
            LightLevel::Bright
        }
    }
}
