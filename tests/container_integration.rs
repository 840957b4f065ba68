//! Integration tests for container packing, stacking, and capacity limits

use ember_veil::core::error::CapacityError;
use ember_veil::core::types::PartId;
use ember_veil::parts::{BodyPart, ContainerSlot, ItemContainer, PartArena};
use ember_veil::templates::TemplateLibrary;

fn field_pack(arena: &mut PartArena) -> PartId {
    let mut pack = BodyPart::new("Field Pack");
    pack.weight = 1.0;
    pack.contains = Some(ItemContainer::new(Some(0.05), Some(10.0)));
    let pack = arena.alloc(pack);
    arena.measure(pack);
    pack
}

fn loose_item(arena: &mut PartArena, name: &str, weight: f64, volume: f64) -> PartId {
    let mut part = BodyPart::new(name);
    part.weight = weight;
    part.volume = volume;
    arena.alloc(part)
}

/// Test 1: packing an item registers on the holder's loads and totals,
/// and unpacking restores the baseline exactly.
#[test]
fn test_pack_and_unpack_round_trips_measured_loads() {
    let mut arena = PartArena::new();
    let pack = field_pack(&mut arena);
    let tin = loose_item(&mut arena, "Ration Tin", 0.4, 0.002);

    let resident = arena
        .container_add(pack, ContainerSlot::Contains, tin)
        .unwrap();
    assert_eq!(resident, tin);
    {
        let node = arena.get(pack).unwrap();
        let held = node.contains.as_ref().unwrap();
        assert_eq!(held.quantity_load, 1);
        assert!((held.weight_load - 0.4).abs() < 1e-12);
        assert!((held.volume_load - 0.002).abs() < 1e-12);
        assert!((node.weight_total - 1.4).abs() < 1e-12);
    }
    assert_eq!(arena.get(tin).unwrap().parent, Some(pack));

    let removed = arena
        .container_remove(pack, ContainerSlot::Contains, Some("Ration Tin"), 1)
        .unwrap();
    assert_eq!(removed, tin);
    assert_eq!(arena.get(tin).unwrap().parent, None);
    let node = arena.get(pack).unwrap();
    let held = node.contains.as_ref().unwrap();
    assert!(held.items.is_empty());
    assert_eq!(held.quantity_load, 0);
    assert_eq!(held.weight_load, 0.0);
    assert_eq!(node.weight_total, 1.0);
}

/// Test 2: an overweight candidate bounces with the load it would have
/// made, and neither the holder nor the candidate changes.
#[test]
fn test_overweight_candidate_bounces_without_side_effects() {
    let mut arena = PartArena::new();
    let pack = field_pack(&mut arena);
    let feather = loose_item(&mut arena, "Feather Charm", 0.5, 0.0);
    arena
        .container_add(pack, ContainerSlot::Contains, feather)
        .unwrap();
    let anvil = loose_item(&mut arena, "Hand Anvil", 11.0, 0.0);

    let refused = arena.container_add(pack, ContainerSlot::Contains, anvil);
    assert_eq!(
        refused,
        Err(CapacityError::Weight {
            weight: 11.5,
            max: 10.0,
        })
    );
    let node = arena.get(pack).unwrap();
    let held = node.contains.as_ref().unwrap();
    assert_eq!(held.items, vec![feather]);
    assert!((held.weight_load - 0.5).abs() < 1e-12);
    assert_eq!(arena.get(anvil).unwrap().parent, None);
}

/// Test 3: same-name stacks merge on add, and a partial remove splits a
/// detached stack off while the resident keeps the rest.
#[test]
fn test_stacks_merge_on_add_and_split_on_partial_remove() {
    let mut arena = PartArena::new();
    let pack = field_pack(&mut arena);
    let mut first = BodyPart::new("Slug Round");
    first.weight = 0.01;
    first.quantity = 10;
    let first = arena.alloc(first);
    let mut second = BodyPart::new("Slug Round");
    second.weight = 0.01;
    second.quantity = 5;
    let second = arena.alloc(second);

    let resident = arena
        .container_add(pack, ContainerSlot::Contains, first)
        .unwrap();
    let merged = arena
        .container_add(pack, ContainerSlot::Contains, second)
        .unwrap();
    assert_eq!(resident, first);
    assert_eq!(merged, first);
    assert_eq!(arena.get(first).unwrap().quantity, 15);
    // the donor stack is emptied and detached for the sweep
    assert_eq!(arena.get(second).unwrap().quantity, 0);
    assert_eq!(arena.get(second).unwrap().parent, None);
    assert_eq!(arena.stored(pack, ContainerSlot::Contains), 15);

    let split = arena
        .container_remove(pack, ContainerSlot::Contains, Some("Slug Round"), 6)
        .unwrap();
    assert_ne!(split, first);
    assert_eq!(arena.get(split).unwrap().quantity, 6);
    assert_eq!(arena.get(split).unwrap().parent, None);
    assert_eq!(arena.get(first).unwrap().quantity, 9);
    assert_eq!(arena.stored(pack, ContainerSlot::Contains), 9);
}

/// Test 4: factory weapons come loaded, and their wells refuse overfill
/// by count and foreign goods by restriction.
#[test]
fn test_template_wells_enforce_count_and_restriction() {
    let library = TemplateLibrary::builtin();
    let mut arena = PartArena::new();

    let sidearm = library.spawn(&mut arena, "Sidearm").unwrap();
    let barrel = *arena
        .find_name(sidearm, "Gun Barrel", true)
        .first()
        .unwrap();
    assert_eq!(arena.stored(barrel, ContainerSlot::Contains), 15);
    let round = library.spawn(&mut arena, "9mm Round").unwrap();
    assert_eq!(
        arena.container_add(barrel, ContainerSlot::Contains, round),
        Err(CapacityError::Quantity {
            quantity: 16,
            max: 15,
        })
    );

    let vest = library.spawn(&mut arena, "Armoured Vest").unwrap();
    let pouch = *arena
        .find_name(vest, "Magazine Pouch", true)
        .first()
        .unwrap();
    let ration = library.spawn(&mut arena, "Ration Pack").unwrap();
    match arena.container_add(pouch, ContainerSlot::Contains, ration) {
        Err(CapacityError::Restricted(kinds)) => assert_eq!(kinds, vec!["Magazine".to_string()]),
        other => panic!("expected a restriction refusal, got {other:?}"),
    }
}
