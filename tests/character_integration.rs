//! Integration tests for birth, the console bindings, and death

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ember_veil::actors::character;
use ember_veil::core::types::PartId;
use ember_veil::hooks::names;
use ember_veil::interactions::ActionKind;
use ember_veil::parts::{BodyPart, ContainerSlot};
use ember_veil::psyche::PivotKind;
use ember_veil::stats::{IndicatorKind, Stat, StatType};
use ember_veil::world::{EngineConfig, World};

fn credits_held(world: &World, account: PartId) -> u32 {
    world
        .arena
        .container_search(account, ContainerSlot::Contains, "Credit")
        .into_iter()
        .filter_map(|id| world.arena.get(id))
        .map(|node| node.quantity)
        .sum()
}

/// Test 1: birth claims a factory body end to end: renamed root, wired
/// manipulators, a funded account on the torso, the standing affects
/// demand, and vital ceilings summed into the health indicator.
#[test]
fn test_birth_wires_a_factory_body() {
    let mut world = World::new(EngineConfig::default());
    let root = world.templates.spawn(&mut world.arena, "Humanoid").unwrap();
    let who = world.spawn_character("Vesper", root);

    let born = Arc::new(Mutex::new(Vec::new()));
    let born_log = Arc::clone(&born);
    world.hooks.observe(names::BIRTH, move |payload| {
        born_log.lock().unwrap().push((payload.actor, payload.part));
    });

    character::birth(&mut world, who, root).unwrap();

    assert_eq!(world.arena.get(root).unwrap().name, "Vesper");
    let actor = world.actor(who).unwrap();
    let state = actor.as_character().unwrap();
    assert_eq!(state.body, Some(root));
    let torso = state.torso.unwrap();
    assert_eq!(world.arena.get(torso).unwrap().name, "Body");
    let hands: Vec<String> = state
        .manipulators
        .iter()
        .filter_map(|id| world.arena.get(*id))
        .map(|node| node.name.clone())
        .collect();
    assert_eq!(hands, ["Left Hand", "Right Hand"]);
    assert_eq!(state.readied, vec![false, false]);
    assert_eq!(state.conscious, 1);
    assert!(!state.available);

    assert_eq!(state.accounts.len(), 1);
    let account = state.accounts[0];
    assert_eq!(world.arena.get(account).unwrap().parent, Some(torso));
    assert_eq!(credits_held(&world, account), 250);

    assert_eq!(actor.interactions.len(), 1);
    assert_eq!(actor.interactions[0].action(), &ActionKind::Affects);

    let health = state
        .soul
        .indicators
        .iter()
        .find(|indicator| indicator.kind == IndicatorKind::Health)
        .unwrap();
    assert_eq!(health.value(), 60.0);

    assert_eq!(*born.lock().unwrap(), vec![(Some(who), Some(root))]);
}

/// Test 2: the console bindings spend allocation budget, refuse an
/// overdraw untouched, deepen an analysed disorder, and fire the save
/// hook.
#[test]
fn test_console_allocation_and_save_binding() {
    let mut world = World::new(EngineConfig::default());
    let root = world.arena.alloc(BodyPart::new("Moth Shell"));
    let who = world.spawn_character("Moth", root);
    {
        let state = world.actor_mut(who).unwrap().as_character_mut().unwrap();
        state.conscious = 1;
        state.soul.stats.push(Stat::new("Strength"));
        state.soul.stats.alloc.push(StatType::new("Birth", 10.0));
        state.soul.disorders.push(Stat::new("Acute Stress"));
    }
    let saved = Arc::new(AtomicUsize::new(0));
    let saved_seen = Arc::clone(&saved);
    world.hooks.observe(names::CHARACTER_SAVE, move |_| {
        saved_seen.fetch_add(1, Ordering::SeqCst);
    });

    character::binding_down(&mut world, who, "m stats strength 3").unwrap();
    {
        let state = world.actor(who).unwrap().as_character().unwrap();
        assert_eq!(state.soul.stats.total_of("Strength"), 3.0);
        assert_eq!(state.soul.stats.remaining(), 7.0);
    }

    // an overdraw is refused without touching the books
    character::binding_down(&mut world, who, "m stats strength 20").unwrap();
    {
        let state = world.actor(who).unwrap().as_character().unwrap();
        assert_eq!(state.soul.stats.total_of("Strength"), 3.0);
        assert_eq!(state.soul.stats.remaining(), 7.0);
    }

    character::binding_down(&mut world, who, "m disorders acute stress 2").unwrap();
    {
        let state = world.actor(who).unwrap().as_character().unwrap();
        let pivots = state.pivots.get("acutestress").unwrap();
        assert_eq!(pivots.len(), 1);
        assert_eq!(pivots[0].kind, PivotKind::Analysed);
        assert_eq!(pivots[0].duration, 2.0);
        assert_eq!(pivots[0].target_to, Some(who));
    }

    character::binding_down(&mut world, who, "save").unwrap();
    assert_eq!(saved.load(Ordering::SeqCst), 1);
}

/// Test 3: death clears the working state, releases the body into the
/// vacated list, takes the soul off the turn order, and leaves it free
/// to bind another.
#[test]
fn test_death_releases_the_body() {
    let mut world = World::new(EngineConfig::default());
    let root = world.templates.spawn(&mut world.arena, "Humanoid").unwrap();
    let who = world.spawn_character("Vesper", root);
    character::birth(&mut world, who, root).unwrap();

    let ended = Arc::new(AtomicUsize::new(0));
    let ended_seen = Arc::clone(&ended);
    world.hooks.observe(names::DEATH, move |_| {
        ended_seen.fetch_add(1, Ordering::SeqCst);
    });

    character::death(&mut world, who).unwrap();

    let actor = world.actor(who).unwrap();
    assert!(actor.interactions.is_empty());
    assert!(actor.tracking.is_empty());
    let state = actor.as_character().unwrap();
    assert_eq!(state.conscious, 0);
    assert_eq!(state.body, None);
    assert_eq!(state.bound_bodies, vec![root]);
    assert!(state.available);
    assert!(state.manipulators.is_empty());
    assert_eq!(state.torso, None);
    assert_eq!(ended.load(Ordering::SeqCst), 1);
    assert!(!world.roster.contains(&who));

    // a fresh shell puts the soul back into play
    let shell = world.templates.spawn(&mut world.arena, "Humanoid").unwrap();
    character::birth(&mut world, who, shell).unwrap();
    assert!(world.roster.contains(&who));
    let state = world.actor(who).unwrap().as_character().unwrap();
    assert_eq!(state.body, Some(shell));
    assert_eq!(state.conscious, 1);
}
