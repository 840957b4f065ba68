//! The world: every actor, the shared part graph, and the clock
//!
//! Actors live in one registry keyed by id and take their turns in
//! roster order. The part graph is a single arena all actors allocate
//! from, so ownership of a physical thing is nothing more than which
//! actor's root it hangs under.

use ahash::AHashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::actors::Actor;
use crate::core::error::{EngineError, Result};
use crate::core::types::{ActorId, Millis, PartId, TickHandle};
use crate::hooks::HookRegistry;
use crate::interactions::interaction::Interaction;
use crate::parts::PartArena;
use crate::psyche::{builtin_damage, DamageProfile};
use crate::simulation::clock::TickClock;
use crate::templates::TemplateLibrary;

pub use crate::core::config::EngineConfig;

pub struct World {
    pub config: EngineConfig,
    pub clock: TickClock,
    pub arena: PartArena,
    pub actors: AHashMap<ActorId, Actor>,
    /// Tick order; joining the roster is what makes an actor live.
    pub roster: Vec<ActorId>,
    pub hooks: HookRegistry,
    pub profiles: Vec<DamageProfile>,
    pub templates: TemplateLibrary,
    /// Registration handles by actor, issued at enroll time.
    handles: AHashMap<ActorId, TickHandle>,
    /// Next handle serial; withdraw retires a handle for good.
    next_handle: u64,
    rng: ChaCha8Rng,
}

impl World {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_seed(config, 0)
    }

    /// Deterministic world for tests and replays.
    pub fn with_seed(config: EngineConfig, seed: u64) -> Self {
        let clock = TickClock::new(config.turn_based);
        Self {
            config,
            clock,
            arena: PartArena::new(),
            actors: AHashMap::new(),
            roster: Vec::new(),
            hooks: HookRegistry::new(),
            profiles: builtin_damage(),
            templates: TemplateLibrary::builtin(),
            handles: AHashMap::new(),
            next_handle: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn now(&self) -> Millis {
        self.clock.current
    }

    pub fn actor(&self, id: ActorId) -> Result<&Actor> {
        self.actors.get(&id).ok_or(EngineError::ActorNotFound(id))
    }

    pub fn actor_mut(&mut self, id: ActorId) -> Result<&mut Actor> {
        self.actors
            .get_mut(&id)
            .ok_or(EngineError::ActorNotFound(id))
    }

    /// Remove an actor for bilateral mutation. Callers check the actor
    /// back in before returning, on every path.
    pub fn checkout(&mut self, id: ActorId) -> Result<Actor> {
        self.actors.remove(&id).ok_or(EngineError::ActorNotFound(id))
    }

    pub fn checkin(&mut self, actor: Actor) {
        self.actors.insert(actor.id, actor);
    }

    fn enroll(&mut self, actor: Actor) -> ActorId {
        let id = actor.id;
        self.actors.insert(id, actor);
        self.roster.push(id);
        self.handles.insert(id, TickHandle(self.next_handle));
        self.next_handle += 1;
        id
    }

    pub fn spawn_character(&mut self, name: &str, root: PartId) -> ActorId {
        self.enroll(Actor::character(ActorId::new(), name, root))
    }

    pub fn spawn_item(&mut self, name: &str, root: PartId) -> ActorId {
        self.enroll(Actor::item(ActorId::new(), name, root))
    }

    pub fn spawn_medium(&mut self, name: &str, root: PartId) -> ActorId {
        self.enroll(Actor::medium(ActorId::new(), name, root))
    }

    /// Drop an actor from play. Its parts stay in the arena; bodies
    /// outlive the souls that drove them.
    pub fn withdraw(&mut self, id: ActorId) -> Option<Actor> {
        self.roster.retain(|&r| r != id);
        self.handles.remove(&id);
        self.actors.remove(&id)
    }

    /// Take an actor out of the turn order without dropping its record.
    /// The handle is retired; a suspended actor stays findable but never
    /// ticks.
    pub fn suspend(&mut self, id: ActorId) {
        self.roster.retain(|&r| r != id);
        self.handles.remove(&id);
    }

    /// Put a suspended actor back in the turn order under a fresh handle.
    /// No-op while the actor is still enrolled or already gone.
    pub fn resume(&mut self, id: ActorId) {
        if self.actors.contains_key(&id) && !self.roster.contains(&id) {
            self.roster.push(id);
            self.handles.insert(id, TickHandle(self.next_handle));
            self.next_handle += 1;
        }
    }

    /// The registration handle an actor was issued when it joined.
    pub fn handle_of(&self, id: ActorId) -> Option<TickHandle> {
        self.handles.get(&id).copied()
    }

    /// The actor whose graph a part hangs under, found by walking to the
    /// part's root.
    pub fn owner_of(&self, part: PartId) -> Option<ActorId> {
        let root = self.arena.find_root(part);
        self.actors
            .values()
            .find(|actor| actor.root == root)
            .map(|actor| actor.id)
    }

    pub fn actor_named(&self, name: &str) -> Option<ActorId> {
        self.actors
            .values()
            .find(|actor| actor.name == name)
            .map(|actor| actor.id)
    }

    /// Land a demand on an actor's queue.
    pub fn queue(&mut self, target: ActorId, interaction: Interaction) -> Result<()> {
        self.actor_mut(target)?.interactions.push(interaction);
        Ok(())
    }

    pub fn random(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Uniform roll in `0..max`, 0 when the range is empty.
    pub fn random_below(&mut self, max: usize) -> usize {
        if max == 0 {
            return 0;
        }
        self.rng.gen_range(0..max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parts::BodyPart;

    #[test]
    fn test_spawn_enrolls_in_roster_order() {
        let mut world = World::new(EngineConfig::default());
        let root_a = world.arena.alloc(BodyPart::new("Knife"));
        let root_b = world.arena.alloc(BodyPart::new("Stone"));
        let a = world.spawn_item("Knife", root_a);
        let b = world.spawn_item("Stone", root_b);
        assert_eq!(world.roster, vec![a, b]);
        world.withdraw(a);
        assert_eq!(world.roster, vec![b]);
        assert!(world.actor(a).is_err());
    }

    #[test]
    fn test_owner_found_from_nested_part() {
        let mut world = World::new(EngineConfig::default());
        let body = world.arena.alloc(BodyPart::new("Body"));
        let arm = world.arena.alloc(BodyPart::new("Arm"));
        world.arena.attach(body, arm);
        let who = world.spawn_character("Vesper", body);
        assert_eq!(world.owner_of(arm), Some(who));
    }

    #[test]
    fn test_handles_never_reused() {
        let mut world = World::new(EngineConfig::default());
        let root = world.arena.alloc(BodyPart::new("Knife"));
        let first = world.spawn_item("Knife", root);
        let issued = world.handle_of(first).unwrap();
        world.withdraw(first);
        assert!(world.handle_of(first).is_none());
        let again = world.spawn_item("Knife", root);
        assert_ne!(world.handle_of(again).unwrap(), issued);
    }

    #[test]
    fn test_suspend_parks_the_record_until_resume() {
        let mut world = World::new(EngineConfig::default());
        let root = world.arena.alloc(BodyPart::new("Knife"));
        let id = world.spawn_item("Knife", root);
        let issued = world.handle_of(id).unwrap();
        world.suspend(id);
        assert!(world.roster.is_empty());
        assert!(world.actor(id).is_ok());
        assert!(world.handle_of(id).is_none());
        world.resume(id);
        assert_eq!(world.roster, vec![id]);
        assert_ne!(world.handle_of(id).unwrap(), issued);
    }

    #[test]
    fn test_seeded_rolls_repeat() {
        let mut one = World::with_seed(EngineConfig::default(), 7);
        let mut two = World::with_seed(EngineConfig::default(), 7);
        let rolls: Vec<usize> = (0..4).map(|_| one.random_below(13)).collect();
        let again: Vec<usize> = (0..4).map(|_| two.random_below(13)).collect();
        assert_eq!(rolls, again);
    }
}
