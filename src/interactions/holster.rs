//! Readying and packing held items
//!
//! Both directions run as staged interactions priced by the matching
//! ability: the first resolution stamps the start and the timing, later
//! ones count the timing down, and the last one moves the item. Packing
//! transfers at the end (the hand is busy until the item is away);
//! drawing transfers at the start (the hand is busy settling its grip).
//! Empty hands stage the same timings as a focusing exercise, and
//! psychic constructs manifest and dissolve in place of moving.

use serde_json::json;
use tracing::warn;

use crate::core::constants::{
    TIME_ACTION_FOCUSING, TIME_ACTION_FUTURE_TACTICIAN, TIME_ACTION_HOLSTER,
    TIME_ACTION_UNHOLSTER,
};
use crate::core::error::Result;
use crate::core::types::{ActorId, PartId};
use crate::hooks::{self, HookPayload};
use crate::interactions::interaction::{ActionKind, Interaction};
use crate::parts::ContainerSlot;
use crate::world::World;

/// Effective action name and base time once the subject is known.
fn staging(world: &World, action: &ActionKind, subject: Option<PartId>) -> (String, f64) {
    let base = match action {
        ActionKind::Unholster => TIME_ACTION_UNHOLSTER,
        _ => TIME_ACTION_HOLSTER,
    };
    match subject {
        None => ("Focusing".to_string(), TIME_ACTION_FOCUSING),
        Some(part) => {
            let construct = world.arena.get(part).is_some_and(|p| p.kind == "Construct");
            if construct {
                ("Future Tactician".to_string(), TIME_ACTION_FUTURE_TACTICIAN)
            } else {
                (action.name().to_string(), base)
            }
        }
    }
}

/// Remove a whole part from the container currently holding it.
fn withdraw(world: &mut World, holder: PartId, part: PartId) -> Option<PartId> {
    let (name, quantity) = {
        let node = world.arena.get(part)?;
        (node.name.clone(), node.quantity.max(1))
    };
    world
        .arena
        .container_remove(holder, ContainerSlot::Contains, Some(&name), quantity)
}

fn stow(world: &mut World, source: PartId, destination: PartId, item: PartId) {
    if let Err(err) = world
        .arena
        .container_add(destination, ContainerSlot::Contains, item)
    {
        warn!(%err, "pack location refused item, returning it");
        if let Err(err) = world
            .arena
            .container_add(source, ContainerSlot::Contains, item)
        {
            warn!(%err, "item did not fit back either, left for the sweep");
        }
    }
}

pub fn resolve_holster(
    world: &mut World,
    owner: ActorId,
    interaction: &mut Interaction,
) -> Result<()> {
    let action = match interaction.action() {
        // acts normally translate the toggle; an untranslated one reads
        // as pack when holding and draw when empty
        ActionKind::ToggleHolster => {
            if interaction.item.is_some() {
                ActionKind::Holster
            } else {
                ActionKind::Unholster
            }
        }
        other => other.clone(),
    };
    match action {
        ActionKind::Unholster => resolve_unholster(world, owner, interaction),
        _ => resolve_pack(world, owner, interaction),
    }
}

/// Pack a held item away, or settle an empty hand.
fn resolve_pack(world: &mut World, owner: ActorId, interaction: &mut Interaction) -> Result<()> {
    let item = interaction.item;
    let (name, max_time) = staging(world, &ActionKind::Holster, item);
    let who = interaction.actor.unwrap_or(owner);
    interaction.cost = crate::actors::character::ability_cost(world, who, &name, interaction)?;
    if interaction.start == 0.0 {
        interaction.start = world.now();
        interaction.timing = (max_time - interaction.cost.amount_draw).max(0.0);
        interaction.action_frames = interaction.timing;
        world.hooks.handle(
            &hooks::ready(&name),
            &HookPayload::new()
                .actor(who)
                .detail(json!(interaction.timing)),
        );
        return Ok(());
    }
    if interaction.timing > 0.0 {
        interaction.timing -= world.clock.diff;
        return Ok(());
    }
    if let Some(item) = item {
        let construct = world.arena.get(item).is_some_and(|p| p.kind == "Construct");
        if let Some(hand) = interaction.part {
            let removed = withdraw(world, hand, item);
            // constructs dissolve rather than going anywhere
            if !construct {
                if let (Some(removed), Some(pack)) = (removed, interaction.target_part) {
                    stow(world, hand, pack, removed);
                }
            }
        }
    }
    world.hooks.handle(
        &hooks::finish(&name),
        &HookPayload::new().actor(who).detail(json!(interaction.start)),
    );
    Ok(())
}

/// Draw from a pack location into the manipulator. The transfer happens
/// on the first resolution; the timing that follows is the grip settling
/// before the item counts as readied.
fn resolve_unholster(
    world: &mut World,
    owner: ActorId,
    interaction: &mut Interaction,
) -> Result<()> {
    if interaction.start != 0.0 {
        return Ok(());
    }
    let container = interaction.item;
    let (name, max_time) = staging(world, &ActionKind::Unholster, container);
    let who = interaction.actor.unwrap_or(owner);
    interaction.cost = crate::actors::character::ability_cost(world, who, &name, interaction)?;
    if let (Some(container), Some(hand)) = (container, interaction.part) {
        let construct = world
            .arena
            .get(container)
            .is_some_and(|p| p.kind == "Construct");
        if construct {
            // the construct itself lands in the hand
            if let Err(err) = world
                .arena
                .container_add(hand, ContainerSlot::Contains, container)
            {
                warn!(%err, "manipulator refused construct");
            }
        } else if let Some(item) =
            world.arena.container_remove_first(container, ContainerSlot::Contains)
        {
            stow(world, container, hand, item);
        }
    }
    interaction.start = world.now();
    interaction.timing = (max_time - interaction.cost.amount_draw).max(0.0);
    interaction.action_frames = interaction.timing;
    world.hooks.handle(
        &hooks::ready(&name),
        &HookPayload::new()
            .actor(who)
            .detail(json!(interaction.timing)),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EngineConfig;
    use crate::parts::{BodyPart, ItemContainer};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn hand_and_holster(world: &mut World) -> (ActorId, PartId, PartId, PartId) {
        let mut hand = BodyPart::new("Right Hand");
        hand.contains = Some(ItemContainer::with_quantity(2));
        let hand = world.arena.alloc(hand);
        let mut holster = BodyPart::new("Hip Holster");
        holster.contains = Some(ItemContainer::with_quantity(1));
        let holster = world.arena.alloc(holster);
        let mut pistol = BodyPart::new("Pistol");
        pistol.weight = 1.1;
        let pistol = world.arena.alloc(pistol);
        world
            .arena
            .container_add(holster, ContainerSlot::Contains, pistol)
            .unwrap();
        let body = world.arena.alloc(BodyPart::new("Body"));
        let who = world.spawn_character("Rook", body);
        (who, hand, holster, pistol)
    }

    #[test]
    fn test_unholster_transfers_at_start_and_prices_timing() {
        let mut world = World::new(EngineConfig::default());
        let (who, hand, holster, pistol) = hand_and_holster(&mut world);
        let mut draw =
            Interaction::new(Some(who), Some(hand), Some(holster), ActionKind::Unholster);
        world.clock.advance(500.0);
        resolve_holster(&mut world, who, &mut draw).unwrap();
        let held = world
            .arena
            .get(hand)
            .unwrap()
            .contains
            .as_ref()
            .unwrap()
            .items
            .clone();
        assert_eq!(held, vec![pistol]);
        assert!(draw.start > 0.0);
        assert!(draw.timing > 0.0);
        // resolving again is a no-op
        resolve_holster(&mut world, who, &mut draw).unwrap();
        assert_eq!(
            world.arena.get(hand).unwrap().contains.as_ref().unwrap().items.len(),
            1
        );
    }

    #[test]
    fn test_holster_moves_item_only_after_timing_lapses() {
        let mut world = World::new(EngineConfig::default());
        let (who, hand, holster, pistol) = hand_and_holster(&mut world);
        let pistol = world
            .arena
            .container_remove(holster, ContainerSlot::Contains, Some("Pistol"), 1)
            .unwrap_or(pistol);
        world
            .arena
            .container_add(hand, ContainerSlot::Contains, pistol)
            .unwrap();
        let mut pack =
            Interaction::new(Some(who), Some(hand), Some(pistol), ActionKind::Holster);
        pack.target_part = Some(holster);
        world.clock.advance(100.0);
        resolve_holster(&mut world, who, &mut pack).unwrap();
        // staged, nothing moved yet
        assert_eq!(
            world.arena.get(hand).unwrap().contains.as_ref().unwrap().items.len(),
            1
        );
        // run the timing out
        while pack.timing > 0.0 {
            world.clock.advance(world.clock.current + 250.0);
            resolve_holster(&mut world, who, &mut pack).unwrap();
        }
        resolve_holster(&mut world, who, &mut pack).unwrap();
        assert!(world.arena.get(hand).unwrap().contains.as_ref().unwrap().items.is_empty());
        assert_eq!(
            world.arena.container_search(holster, ContainerSlot::Contains, "Pistol").len(),
            1
        );
    }

    #[test]
    fn test_empty_hand_stages_focusing() {
        let mut world = World::new(EngineConfig::default());
        let body = world.arena.alloc(BodyPart::new("Body"));
        let who = world.spawn_character("Sable", body);
        let hand = world.arena.alloc(BodyPart::new("Left Hand"));
        let seen = Arc::new(AtomicUsize::new(0));
        let observer = Arc::clone(&seen);
        world.hooks.observe(&hooks::ready("Focusing"), move |_| {
            observer.fetch_add(1, Ordering::SeqCst);
        });
        let mut settle = Interaction::new(Some(who), Some(hand), None, ActionKind::Holster);
        world.clock.advance(50.0);
        resolve_holster(&mut world, who, &mut settle).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(settle.timing <= TIME_ACTION_FOCUSING);
    }
}
