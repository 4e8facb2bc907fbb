use serde::{Deserialize, Serialize};

use crate::host::{ActorId, ActorStore, HostError, Marker};
use crate::light::LightLevel;
use crate::settings::MarkerStyle;

/// Marker owner tag written by every sink.
pub const MARKER_ORIGIN: &str = "umbra";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    Dim,
    Dark,
}

impl MarkerKind {
    /// Bright is the absence of any marker.
    pub fn for_level(level: LightLevel) -> Option<Self> {
        match level {
            LightLevel::Bright => None,
            LightLevel::Dim => Some(Self::Dim),
            LightLevel::Dark => Some(Self::Dark),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dim => "dim",
            Self::Dark => "dark",
        }
    }
}

/// Downstream marker format. Implementations decide what a marker looks like
/// and which of an actor's markers they own.
pub trait EffectSink {
    fn name(&self) -> &'static str;

    fn marker_for(&self, kind: MarkerKind) -> Marker;

    fn owns(&self, marker: &Marker) -> bool;

    fn add_marker(
        &self,
        store: &mut dyn ActorStore,
        actor: ActorId,
        kind: MarkerKind,
    ) -> Result<(), HostError> {
        store.add_marker(actor, self.marker_for(kind))
    }

    /// Removes every marker this sink owns; foreign markers are left alone.
    fn remove_markers(&self, store: &mut dyn ActorStore, actor: ActorId) -> Result<usize, HostError> {
        let owned: Vec<String> = store
            .markers(actor)
            .into_iter()
            .filter(|marker| self.owns(marker))
            .map(|marker| marker.id)
            .collect();
        for id in &owned {
            store.remove_marker(actor, id)?;
        }
        Ok(owned.len())
    }

    /// True when the actor's owned markers are exactly what `level` calls for.
    fn matches_level(&self, store: &dyn ActorStore, actor: ActorId, level: LightLevel) -> bool {
        let owned: Vec<Marker> = store
            .markers(actor)
            .into_iter()
            .filter(|marker| self.owns(marker))
            .collect();
        match MarkerKind::for_level(level) {
            None => owned.is_empty(),
            Some(kind) => {
                let expected = self.marker_for(kind);
                owned.len() == 1 && owned[0].id == expected.id
            }
        }
    }
}

/// Plain status icons keyed by well-known ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusIconSink;

impl StatusIconSink {
    pub const DIM_ID: &'static str = "umbra.dim";
    pub const DARK_ID: &'static str = "umbra.dark";
}

impl EffectSink for StatusIconSink {
    fn name(&self) -> &'static str {
        "status_icon"
    }

    fn marker_for(&self, kind: MarkerKind) -> Marker {
        let (id, label, icon) = match kind {
            MarkerKind::Dim => (Self::DIM_ID, "Dim Light", "icons/light-dim.svg"),
            MarkerKind::Dark => (Self::DARK_ID, "Darkness", "icons/light-dark.svg"),
        };
        Marker {
            id: id.to_string(),
            label: label.to_string(),
            icon: Some(icon.to_string()),
            origin: None,
        }
    }

    fn owns(&self, marker: &Marker) -> bool {
        marker.id == Self::DIM_ID || marker.id == Self::DARK_ID
    }
}

/// Rules-bearing effects recognised by their origin.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActiveEffectSink;

impl EffectSink for ActiveEffectSink {
    fn name(&self) -> &'static str {
        "active_effect"
    }

    fn marker_for(&self, kind: MarkerKind) -> Marker {
        let label = match kind {
            MarkerKind::Dim => "Lightly Obscured",
            MarkerKind::Dark => "Heavily Obscured",
        };
        Marker {
            id: format!("{MARKER_ORIGIN}-effect-{}", kind.as_str()),
            label: label.to_string(),
            icon: None,
            origin: Some(MARKER_ORIGIN.to_string()),
        }
    }

    fn owns(&self, marker: &Marker) -> bool {
        marker.origin.as_deref() == Some(MARKER_ORIGIN)
    }
}

pub fn sink_for_style(style: MarkerStyle) -> Box<dyn EffectSink> {
    match style {
        MarkerStyle::StatusIcon => Box::new(StatusIconSink),
        MarkerStyle::ActiveEffect => Box::new(ActiveEffectSink),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::host::ActorSnapshot;
    use crate::memory::MemoryScene;

    fn scene_with_actor() -> MemoryScene {
        let mut scene = MemoryScene::default();
        scene.add_actor(ActorSnapshot {
            id: ActorId(1),
            position: Point::new(0.0, 0.0),
            elevation: 0.0,
            hit_points: Some(5.0),
            light: None,
        });
        scene
    }

    fn foreign_marker() -> Marker {
        Marker {
            id: "blessed".to_string(),
            label: "Blessed".to_string(),
            icon: None,
            origin: Some("other".to_string()),
        }
    }

    #[test]
    fn style_selects_sink() {
        assert_eq!(sink_for_style(MarkerStyle::StatusIcon).name(), "status_icon");
        assert_eq!(
            sink_for_style(MarkerStyle::ActiveEffect).name(),
            "active_effect"
        );
    }

    #[test]
    fn remove_markers_keeps_foreign_markers() {
        for style in [MarkerStyle::StatusIcon, MarkerStyle::ActiveEffect] {
            let sink = sink_for_style(style);
            let mut scene = scene_with_actor();
            scene
                .add_marker(ActorId(1), foreign_marker())
                .expect("foreign marker");
            sink.add_marker(&mut scene, ActorId(1), MarkerKind::Dark)
                .expect("add marker");

            let removed = sink
                .remove_markers(&mut scene, ActorId(1))
                .expect("remove markers");
            assert_eq!(removed, 1);
            assert_eq!(scene.markers(ActorId(1)), vec![foreign_marker()]);
        }
    }

    #[test]
    fn matches_level_checks_owned_markers_only() {
        let sink = ActiveEffectSink;
        let mut scene = scene_with_actor();
        scene
            .add_marker(ActorId(1), foreign_marker())
            .expect("foreign marker");
        assert!(sink.matches_level(&scene, ActorId(1), LightLevel::Bright));
        assert!(!sink.matches_level(&scene, ActorId(1), LightLevel::Dim));

        sink.add_marker(&mut scene, ActorId(1), MarkerKind::Dim)
            .expect("add marker");
        assert!(sink.matches_level(&scene, ActorId(1), LightLevel::Dim));
        assert!(!sink.matches_level(&scene, ActorId(1), LightLevel::Dark));
        assert!(!sink.matches_level(&scene, ActorId(1), LightLevel::Bright));
    }

    #[test]
    fn status_icons_carry_icon_paths() {
        let marker = StatusIconSink.marker_for(MarkerKind::Dim);
        assert_eq!(marker.id, StatusIconSink::DIM_ID);
        assert!(marker.icon.is_some());
        assert!(MarkerKind::for_level(LightLevel::Bright).is_none());
    }
}
