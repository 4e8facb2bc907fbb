use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::host::ActorId;

#[derive(Debug, Default)]
struct ScenePassState {
    due_at: Option<Instant>,
    in_flight: bool,
    rerun_requested: bool,
    remaining: VecDeque<ActorId>,
}

/// Coalesces trigger bursts into one recomputation per actor, plus a single
/// scene-wide pass that may span several ticks.
#[derive(Debug)]
pub struct UpdateScheduler {
    delay: Duration,
    actor_timers: BTreeMap<ActorId, Instant>,
    scene: ScenePassState,
}

impl UpdateScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            actor_timers: BTreeMap::new(),
            scene: ScenePassState::default(),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_synchronous(&self) -> bool {
        self.delay.is_zero()
    }

    /// Re-arms the actor's timer; earlier triggers in the window are superseded.
    pub fn debounce_actor(&mut self, actor: ActorId, now: Instant) {
        self.actor_timers.insert(actor, now + self.delay);
    }

    /// Arms the actor's timer for `at` unless a later one is already armed.
    pub fn defer_actor(&mut self, actor: ActorId, at: Instant) {
        self.actor_timers
            .entry(actor)
            .and_modify(|due_at| *due_at = (*due_at).max(at))
            .or_insert(at);
    }

    pub fn cancel_actor(&mut self, actor: ActorId) -> bool {
        self.actor_timers.remove(&actor).is_some()
    }

    pub fn take_due_actors(&mut self, now: Instant) -> Vec<ActorId> {
        let due: Vec<ActorId> = self
            .actor_timers
            .iter()
            .filter(|(_, due_at)| **due_at <= now)
            .map(|(actor, _)| *actor)
            .collect();
        for actor in &due {
            self.actor_timers.remove(actor);
        }
        due
    }

    pub fn pending_actor_count(&self) -> usize {
        self.actor_timers.len()
    }

    pub fn request_scene_pass(&mut self, now: Instant) {
        if self.scene.in_flight {
            self.scene.rerun_requested = true;
            return;
        }
        self.scene.due_at = Some(now + self.delay);
    }

    /// Starts the scene pass when its timer has expired and none is running.
    pub fn begin_due_scene_pass(&mut self, now: Instant, actors: Vec<ActorId>) -> bool {
        if self.scene.in_flight {
            return false;
        }
        match self.scene.due_at {
            Some(due_at) if due_at <= now => {}
            _ => return false,
        }
        self.scene.due_at = None;
        self.scene.in_flight = true;
        self.scene.remaining = actors.into();
        debug!(actor_count = self.scene.remaining.len(), "scene_pass_started");
        true
    }

    pub fn next_scene_batch(&mut self, batch_size: usize) -> Vec<ActorId> {
        let take = batch_size.min(self.scene.remaining.len());
        self.scene.remaining.drain(..take).collect()
    }

    /// Closes the running pass once its actors are exhausted. A request that
    /// arrived meanwhile re-arms one trailing pass.
    pub fn finish_scene_pass(&mut self, now: Instant) -> bool {
        if !self.scene.in_flight || !self.scene.remaining.is_empty() {
            return false;
        }
        self.scene.in_flight = false;
        if std::mem::take(&mut self.scene.rerun_requested) {
            self.scene.due_at = Some(now + self.delay);
            debug!("scene_pass_rerun_scheduled");
        }
        true
    }

    pub fn scene_pass_in_flight(&self) -> bool {
        self.scene.in_flight
    }

    pub fn scene_pass_pending(&self) -> bool {
        self.scene.due_at.is_some()
    }

    pub fn has_pending_work(&self) -> bool {
        !self.actor_timers.is_empty() || self.scene.in_flight || self.scene.due_at.is_some()
    }

    pub fn reset(&mut self) {
        self.actor_timers.clear();
        self.scene = ScenePassState::default();
    }
}

/// Refuses to resolve the same actor twice within `cooldown`.
#[derive(Debug)]
pub struct CircuitBreaker {
    cooldown: Duration,
    last_entry: HashMap<ActorId, Instant>,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_entry: HashMap::new(),
        }
    }

    pub fn try_enter(&mut self, actor: ActorId, now: Instant) -> bool {
        if let Some(last) = self.last_entry.get(&actor) {
            if now.saturating_duration_since(*last) < self.cooldown {
                return false;
            }
        }
        self.last_entry.insert(actor, now);
        true
    }

    /// When the actor's cooldown lapses; `None` if it may enter now.
    pub fn retry_at(&self, actor: ActorId, now: Instant) -> Option<Instant> {
        let ready_at = *self.last_entry.get(&actor)? + self.cooldown;
        (ready_at > now).then_some(ready_at)
    }

    pub fn prune(&mut self, now: Instant) {
        let cooldown = self.cooldown;
        self.last_entry
            .retain(|_, last| now.saturating_duration_since(*last) < cooldown);
    }

    pub fn forget(&mut self, actor: ActorId) {
        self.last_entry.remove(&actor);
    }

    pub fn clear(&mut self) {
        self.last_entry.clear();
    }

    pub fn tracked_count(&self) -> usize {
        self.last_entry.len()
    }
}
