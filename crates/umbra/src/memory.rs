use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::geometry::{DoorState, GridMetrics, Point, Wall};
use crate::host::{
    ActorId, ActorSnapshot, ActorStore, AmbientLight, Emitter, HostError, LightId, Marker,
    SceneIllumination, SceneView, TriggerEvent,
};
use crate::light::{LightOrigin, Region};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryActor {
    pub id: ActorId,
    pub position: Point,
    #[serde(default)]
    pub elevation: f64,
    #[serde(default)]
    pub hit_points: Option<f64>,
    #[serde(default)]
    pub light: Option<Emitter>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub markers: Vec<Marker>,
}

impl MemoryActor {
    fn snapshot(&self) -> ActorSnapshot {
        ActorSnapshot {
            id: self.id,
            position: self.position,
            elevation: self.elevation,
            hit_points: self.hit_points,
            light: self.light,
        }
    }
}

/// In-memory host scene. Every mutation, including writes made through
/// [`ActorStore`], queues the trigger event a live host would emit; drivers
/// forward [`MemoryScene::drain_events`] back into the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryScene {
    #[serde(default)]
    grid: GridMetrics,
    #[serde(default)]
    illumination: SceneIllumination,
    #[serde(default)]
    lights: Vec<AmbientLight>,
    #[serde(default)]
    walls: Vec<Wall>,
    #[serde(default)]
    regions: Vec<Region>,
    #[serde(default)]
    actors: Vec<MemoryActor>,
    #[serde(skip)]
    outbox: Vec<TriggerEvent>,
    #[serde(skip)]
    failing_writes: BTreeSet<ActorId>,
    #[serde(skip)]
    marker_adds: BTreeMap<ActorId, usize>,
}

impl MemoryScene {
    pub fn with_grid(grid: GridMetrics) -> Self {
        Self {
            grid,
            ..Self::default()
        }
    }

    pub fn drain_events(&mut self) -> Vec<TriggerEvent> {
        std::mem::take(&mut self.outbox)
    }

    pub fn pending_event_count(&self) -> usize {
        self.outbox.len()
    }

    pub fn set_grid(&mut self, grid: GridMetrics) {
        self.grid = grid;
        self.outbox.push(TriggerEvent::SceneChanged);
    }

    pub fn set_illumination(&mut self, illumination: SceneIllumination) {
        self.illumination = illumination;
        self.outbox.push(TriggerEvent::IlluminationChanged);
    }

    pub fn add_light(&mut self, light: AmbientLight) {
        let source = LightOrigin::Ambient(light.id);
        self.lights.retain(|existing| existing.id != light.id);
        self.lights.push(light);
        self.outbox.push(TriggerEvent::LightCreated { source });
    }

    pub fn update_light(&mut self, id: LightId, position: Point, emitter: Emitter) -> bool {
        let Some(light) = self.lights.iter_mut().find(|light| light.id == id) else {
            return false;
        };
        light.position = position;
        light.emitter = emitter;
        self.outbox.push(TriggerEvent::LightUpdated {
            source: LightOrigin::Ambient(id),
        });
        true
    }

    pub fn remove_light(&mut self, id: LightId) -> bool {
        let before = self.lights.len();
        self.lights.retain(|light| light.id != id);
        if self.lights.len() == before {
            return false;
        }
        self.outbox.push(TriggerEvent::LightRemoved {
            source: LightOrigin::Ambient(id),
        });
        true
    }

    pub fn add_wall(&mut self, wall: Wall) {
        self.walls.push(wall);
        self.outbox.push(TriggerEvent::WallsChanged);
    }

    pub fn set_door(&mut self, index: usize, door: DoorState) -> bool {
        let Some(wall) = self.walls.get_mut(index) else {
            return false;
        };
        wall.door = door;
        self.outbox.push(TriggerEvent::WallsChanged);
        true
    }

    pub fn add_region(&mut self, region: Region) {
        self.regions.push(region);
        self.outbox.push(TriggerEvent::RegionsChanged);
    }

    pub fn add_actor(&mut self, actor: ActorSnapshot) {
        self.actors.retain(|existing| existing.id != actor.id);
        self.actors.push(MemoryActor {
            id: actor.id,
            position: actor.position,
            elevation: actor.elevation,
            hit_points: actor.hit_points,
            light: actor.light,
            tags: BTreeMap::new(),
            markers: Vec::new(),
        });
        self.outbox
            .push(TriggerEvent::ActorCreated { actor: actor.id });
    }

    pub fn remove_actor(&mut self, id: ActorId) -> bool {
        let before = self.actors.len();
        self.actors.retain(|actor| actor.id != id);
        if self.actors.len() == before {
            return false;
        }
        self.outbox.push(TriggerEvent::ActorRemoved { actor: id });
        true
    }

    pub fn move_actor(&mut self, id: ActorId, position: Point, elevation: f64) -> bool {
        let Some(actor) = self.find_actor_mut(id) else {
            return false;
        };
        actor.position = position;
        actor.elevation = elevation;
        self.outbox.push(TriggerEvent::ActorMoved { actor: id });
        true
    }

    pub fn set_hit_points(&mut self, id: ActorId, hit_points: Option<f64>) -> bool {
        let Some(actor) = self.find_actor_mut(id) else {
            return false;
        };
        actor.hit_points = hit_points;
        self.outbox.push(TriggerEvent::ActorUpdated { actor: id });
        true
    }

    pub fn set_actor_light(&mut self, id: ActorId, light: Option<Emitter>) -> bool {
        let Some(actor) = self.find_actor_mut(id) else {
            return false;
        };
        let had_light = actor.light.is_some();
        actor.light = light;
        let source = LightOrigin::Carried(id);
        let event = match (had_light, light.is_some()) {
            (false, true) => TriggerEvent::LightCreated { source },
            (true, false) => TriggerEvent::LightRemoved { source },
            _ => TriggerEvent::LightUpdated { source },
        };
        self.outbox.push(event);
        true
    }

    /// Makes every later write against `id` fail.
    pub fn fail_writes_for(&mut self, id: ActorId) {
        self.failing_writes.insert(id);
    }

    pub fn allow_writes_for(&mut self, id: ActorId) {
        self.failing_writes.remove(&id);
    }

    pub fn marker_add_count(&self, id: ActorId) -> usize {
        self.marker_adds.get(&id).copied().unwrap_or(0)
    }

    pub fn actors(&self) -> &[MemoryActor] {
        &self.actors
    }

    pub fn find_actor(&self, id: ActorId) -> Option<&MemoryActor> {
        self.actors.iter().find(|actor| actor.id == id)
    }

    fn find_actor_mut(&mut self, id: ActorId) -> Option<&mut MemoryActor> {
        self.actors.iter_mut().find(|actor| actor.id == id)
    }

    fn writable_actor(&mut self, id: ActorId) -> Result<&mut MemoryActor, HostError> {
        if self.failing_writes.contains(&id) {
            return Err(HostError::WriteRejected {
                actor: id,
                reason: "writes disabled for actor".to_string(),
            });
        }
        self.find_actor_mut(id).ok_or(HostError::ActorNotFound(id))
    }
}

impl SceneView for MemoryScene {
    fn grid(&self) -> GridMetrics {
        self.grid
    }

    fn illumination(&self) -> SceneIllumination {
        self.illumination
    }

    fn ambient_lights(&self) -> &[AmbientLight] {
        &self.lights
    }

    fn walls(&self) -> &[Wall] {
        &self.walls
    }

    fn regions(&self) -> &[Region] {
        &self.regions
    }

    fn actor_ids(&self) -> Vec<ActorId> {
        self.actors.iter().map(|actor| actor.id).collect()
    }

    fn actor(&self, id: ActorId) -> Option<ActorSnapshot> {
        self.find_actor(id).map(MemoryActor::snapshot)
    }
}

impl ActorStore for MemoryScene {
    fn tag(&self, actor: ActorId, key: &str) -> Option<String> {
        self.find_actor(actor)?.tags.get(key).cloned()
    }

    fn set_tag(&mut self, actor: ActorId, key: &str, value: &str) -> Result<(), HostError> {
        let entry = self.writable_actor(actor)?;
        entry.tags.insert(key.to_string(), value.to_string());
        self.outbox.push(TriggerEvent::ActorUpdated { actor });
        Ok(())
    }

    fn clear_tag(&mut self, actor: ActorId, key: &str) -> Result<(), HostError> {
        let entry = self.writable_actor(actor)?;
        if entry.tags.remove(key).is_some() {
            self.outbox.push(TriggerEvent::ActorUpdated { actor });
        }
        Ok(())
    }

    fn markers(&self, actor: ActorId) -> Vec<Marker> {
        self.find_actor(actor)
            .map(|entry| entry.markers.clone())
            .unwrap_or_default()
    }

    fn add_marker(&mut self, actor: ActorId, marker: Marker) -> Result<(), HostError> {
        let entry = self.writable_actor(actor)?;
        entry.markers.push(marker);
        let count = self.marker_adds.entry(actor).or_insert(0);
        *count = count.saturating_add(1);
        self.outbox.push(TriggerEvent::ActorUpdated { actor });
        Ok(())
    }

    fn remove_marker(&mut self, actor: ActorId, marker_id: &str) -> Result<(), HostError> {
        let entry = self.writable_actor(actor)?;
        let before = entry.markers.len();
        entry.markers.retain(|marker| marker.id != marker_id);
        if entry.markers.len() != before {
            self.outbox.push(TriggerEvent::ActorUpdated { actor });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(id: u64) -> ActorSnapshot {
        ActorSnapshot {
            id: ActorId(id),
            position: Point::new(0.0, 0.0),
            elevation: 0.0,
            hit_points: Some(10.0),
            light: None,
        }
    }

    #[test]
    fn mutations_queue_trigger_events() {
        let mut scene = MemoryScene::default();
        scene.add_actor(actor(1));
        assert!(scene.move_actor(ActorId(1), Point::new(5.0, 5.0), 0.0));
        scene
            .set_tag(ActorId(1), "lightLevel", "dim")
            .expect("tag write");

        assert_eq!(
            scene.drain_events(),
            vec![
                TriggerEvent::ActorCreated { actor: ActorId(1) },
                TriggerEvent::ActorMoved { actor: ActorId(1) },
                TriggerEvent::ActorUpdated { actor: ActorId(1) },
            ]
        );
        assert_eq!(scene.pending_event_count(), 0);
    }

    #[test]
    fn carried_light_changes_are_light_events() {
        let mut scene = MemoryScene::default();
        scene.add_actor(actor(1));
        scene.drain_events();

        scene.set_actor_light(ActorId(1), Some(Emitter::new(10.0, 5.0)));
        scene.set_actor_light(ActorId(1), Some(Emitter::new(20.0, 5.0)));
        scene.set_actor_light(ActorId(1), None);
        let source = LightOrigin::Carried(ActorId(1));
        assert_eq!(
            scene.drain_events(),
            vec![
                TriggerEvent::LightCreated { source },
                TriggerEvent::LightUpdated { source },
                TriggerEvent::LightRemoved { source },
            ]
        );
    }

    #[test]
    fn failing_writes_reject_without_side_effects() {
        let mut scene = MemoryScene::default();
        scene.add_actor(actor(1));
        scene.drain_events();
        scene.fail_writes_for(ActorId(1));

        let marker = Marker {
            id: "m".to_string(),
            label: "M".to_string(),
            icon: None,
            origin: None,
        };
        assert!(matches!(
            scene.add_marker(ActorId(1), marker),
            Err(HostError::WriteRejected { .. })
        ));
        assert!(scene.markers(ActorId(1)).is_empty());
        assert_eq!(scene.marker_add_count(ActorId(1)), 0);
        assert_eq!(scene.pending_event_count(), 0);
    }

    #[test]
    fn writes_to_missing_actors_report_not_found() {
        let mut scene = MemoryScene::default();
        assert_eq!(
            scene.set_tag(ActorId(3), "k", "v"),
            Err(HostError::ActorNotFound(ActorId(3)))
        );
        assert!(scene.actor(ActorId(3)).is_none());
        assert!(scene.tag(ActorId(3), "k").is_none());
    }

    #[test]
    fn scene_loads_from_json() {
        let raw = r#"{
            "grid": { "distance_units": 5.0, "pixel_size": 100.0 },
            "illumination": { "global_light": true, "darkness": 0.3 },
            "lights": [ { "id": 1, "position": { "x": 0.0, "y": 0.0 }, "dim": 40.0, "bright": 20.0 } ],
            "walls": [ { "a": { "x": 1.0, "y": 0.0 }, "b": { "x": 1.0, "y": 5.0 }, "door": "closed" } ],
            "actors": [ { "id": 4, "position": { "x": 2.0, "y": 2.0 }, "hit_points": 7.0 } ]
        }"#;
        let scene: MemoryScene = serde_json::from_str(raw).expect("scene json");
        assert_eq!(scene.ambient_lights().len(), 1);
        assert_eq!(scene.ambient_lights()[0].emitter.angle, 360.0);
        assert_eq!(scene.walls()[0].door, DoorState::Closed);
        assert!(scene.walls()[0].blocks_sight);
        assert_eq!(scene.illumination().threshold, 1.0);
        let loaded = scene.actor(ActorId(4)).expect("actor");
        assert!(loaded.is_alive());
    }
}
