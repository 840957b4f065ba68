//! Integration tests for impact resolution and magazine reloads

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ember_veil::abilities::mass_to_energy;
use ember_veil::actors::character;
use ember_veil::core::config::EngineConfig;
use ember_veil::core::types::PartId;
use ember_veil::hooks::names;
use ember_veil::interactions::impact::process_impact;
use ember_veil::interactions::{dispatch, ActionKind, Interaction};
use ember_veil::parts::{BodyPart, ContainerSlot, ItemContainer};
use ember_veil::stats::StatType;
use ember_veil::world::World;

fn limb(world: &mut World, name: &str, weight: f64, health: f64) -> PartId {
    let mut part = BodyPart::new(name);
    part.weight = weight;
    part.health = health;
    part.health_max = Some(health);
    world.arena.alloc(part)
}

fn club(world: &mut World) -> PartId {
    let mut cudgel = BodyPart::new("Cudgel");
    cudgel.weight = 5.0;
    world.arena.alloc(cudgel)
}

/// Test 1: a crushing hit drains the struck part to zero, lets the
/// excess through, and reports both impact brackets.
#[test]
fn test_crushing_hit_drains_the_part_and_lets_excess_through() {
    let mut world = World::new(EngineConfig::default());
    let part = limb(&mut world, "Forearm", 5.0, 100.0);
    let cudgel = club(&mut world);

    let openings = Arc::new(Mutex::new(Vec::new()));
    let openings_log = Arc::clone(&openings);
    world.hooks.observe(names::IMPACT_PART_PRE, move |payload| {
        openings_log
            .lock()
            .unwrap()
            .push((payload.part, payload.detail.clone()));
    });
    let closings = Arc::new(Mutex::new(Vec::new()));
    let closings_log = Arc::clone(&closings);
    world.hooks.observe(names::IMPACT_PART_POST, move |payload| {
        closings_log.lock().unwrap().push(payload.detail.clone());
    });

    let (through, accuracy) = process_impact(&mut world, 100.0, 1.0, cudgel, part, true).unwrap();

    // the part's whole ceiling absorbs less than the converted mass lands
    let total = 100.0 * mass_to_energy(5.0) * 1.0;
    let part_energy = mass_to_energy(5.0) / 100.0;
    let absorbed = 100.0 * part_energy;
    assert!(absorbed < total);
    assert_eq!(through, total - absorbed);
    assert_eq!(accuracy, 1.0);
    assert_eq!(world.arena.get(part).unwrap().health, 0.0);

    let openings = openings.lock().unwrap();
    assert_eq!(openings.len(), 1);
    assert_eq!(openings[0].0, Some(part));
    assert_eq!(openings[0].1["energy"].as_f64(), Some(100.0));
    assert_eq!(openings[0].1["accuracy"].as_f64(), Some(1.0));
    let closings = closings.lock().unwrap();
    assert_eq!(closings.len(), 1);
    assert_eq!(closings[0]["resisted"].as_f64(), Some(absorbed));
}

/// Test 2: a pellet too light to overwhelm the part is fully absorbed,
/// with the health loss floored to whole points.
#[test]
fn test_light_pellet_is_fully_absorbed_with_floored_damage() {
    let mut world = World::new(EngineConfig::default());
    let part = limb(&mut world, "Forearm", 1.0, 100.0);
    let mut pellet = BodyPart::new("Pellet");
    pellet.weight = 0.008;
    let pellet = world.arena.alloc(pellet);

    let (through, accuracy) = process_impact(&mut world, 100.0, 1.0, pellet, part, true).unwrap();

    let total = 100.0 * mass_to_energy(0.008) * 1.0;
    let part_energy = mass_to_energy(1.0) / 100.0;
    assert!(100.0 * part_energy > total);
    assert_eq!(through, 0.0);
    assert_eq!(accuracy, 1.0);
    assert_eq!(
        world.arena.get(part).unwrap().health,
        100.0 - (total / part_energy).floor()
    );
    assert!(world.arena.get(part).unwrap().health > 0.0);
}

/// Test 3: a ward holding charge quanta spends one to deflect the hit
/// outright, so the energy passes by without connecting.
#[test]
fn test_charged_ward_spends_a_quantum_to_deflect() {
    let mut world = World::new(EngineConfig::default());
    let part = limb(&mut world, "Forearm", 1.0, 40.0);
    let mut ward = BodyPart::new("Deflection Ward");
    ward.group = "Affect".into();
    ward.functions.push(StatType::new("Accuracy", 1.0));
    ward.contains = Some(ItemContainer::with_quantity(10));
    let ward = world.arena.alloc(ward);
    world.arena.attach(part, ward);
    let mut charge = BodyPart::new("Charge Quantum");
    charge.quantity = 3;
    let charge = world.arena.alloc(charge);
    world
        .arena
        .container_add(ward, ContainerSlot::Contains, charge)
        .unwrap();
    let cudgel = club(&mut world);

    let opened = Arc::new(AtomicUsize::new(0));
    let opened_seen = Arc::clone(&opened);
    world.hooks.observe(names::IMPACT_PART_PRE, move |_| {
        opened_seen.fetch_add(1, Ordering::SeqCst);
    });
    let closed = Arc::new(AtomicUsize::new(0));
    let closed_seen = Arc::clone(&closed);
    world.hooks.observe(names::IMPACT_PART_POST, move |_| {
        closed_seen.fetch_add(1, Ordering::SeqCst);
    });

    let (through, accuracy) = process_impact(&mut world, 100.0, 1.0, cudgel, part, false).unwrap();

    assert_eq!(through, 100.0);
    assert_eq!(accuracy, 0.0);
    assert_eq!(world.arena.stored(ward, ContainerSlot::Contains), 2);
    assert_eq!(world.arena.get(part).unwrap().health, 40.0);
    // a deflected hit opens the bracket but never closes it
    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(closed.load(Ordering::SeqCst), 0);
}

/// Test 4: reloading a factory sidearm reaches through the worn vest
/// to the fullest pouch magazine and stretches the swap to the priced
/// time.
#[test]
fn test_template_reload_draws_the_fullest_worn_magazine() {
    let mut world = World::new(EngineConfig::default());
    let root = world.templates.spawn(&mut world.arena, "Humanoid").unwrap();
    let who = world.spawn_character("Halvard", root);
    character::birth(&mut world, who, root).unwrap();
    let torso = world
        .actor(who)
        .unwrap()
        .as_character()
        .unwrap()
        .torso
        .unwrap();
    let vest = world
        .templates
        .spawn(&mut world.arena, "Armoured Vest")
        .unwrap();
    world
        .arena
        .container_add(torso, ContainerSlot::Wears, vest)
        .unwrap();

    let pouches = world.arena.find_name(vest, "Magazine Pouch", true);
    assert_eq!(pouches.len(), 2);
    let mags: Vec<PartId> = pouches
        .iter()
        .map(|pouch| {
            world
                .arena
                .container_search(*pouch, ContainerSlot::Contains, "Box Magazine")[0]
        })
        .collect();
    // drain the pouches unevenly so one clear winner remains
    world
        .arena
        .container_remove(mags[0], ContainerSlot::Contains, Some("9mm Round"), 1);
    world
        .arena
        .container_remove(mags[1], ContainerSlot::Contains, Some("9mm Round"), 8);
    assert_eq!(world.arena.stored(mags[0], ContainerSlot::Contains), 14);
    assert_eq!(world.arena.stored(mags[1], ContainerSlot::Contains), 7);

    let sidearm = world.templates.spawn(&mut world.arena, "Sidearm").unwrap();
    let picked = Arc::new(Mutex::new(Vec::new()));
    let picked_log = Arc::clone(&picked);
    world.hooks.observe(names::RELOAD_CONTAINER, move |payload| {
        picked_log
            .lock()
            .unwrap()
            .push((payload.part, payload.detail.clone()));
    });
    let activated = Arc::new(AtomicUsize::new(0));
    let activated_seen = Arc::clone(&activated);
    world.hooks.observe(names::RELOAD_ACTIVE, move |_| {
        activated_seen.fetch_add(1, Ordering::SeqCst);
    });

    let mut load = Interaction::new(Some(who), None, Some(sidearm), ActionKind::Reload);
    dispatch::dispatch(&mut world, who, &mut load).unwrap();

    let picked = picked.lock().unwrap();
    assert_eq!(picked.len(), 1);
    assert_eq!(picked[0].0, Some(mags[0]));
    assert_eq!(picked[0].1["feed"].as_str(), Some("Box Magazine"));
    assert_eq!(picked[0].1["holder"].as_u64(), Some(pouches[0].0 as u64));
    assert_eq!(picked[0].1["stored"].as_u64(), Some(14));
    // untrained hands pay essentially the full listed swap time
    assert!((load.action_frames - 1801.0).abs() < 1e-6);
    assert!(load.action_frames >= 700.0);
    assert_eq!(activated.load(Ordering::SeqCst), 1);
}
