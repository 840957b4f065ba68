//! Magazine changes
//!
//! Reload never moves the magazines itself. It checks the reloader can
//! reach their pack, prices the swap from their familiarity with the
//! weapon, picks the fullest refill for each feed the weapon exposes,
//! and announces the choice through the "Reload Container" hook for the
//! shell to animate. The interaction's frame count stretches to cover
//! the priced time, and the feed containers swap stock when it lapses.

use ordered_float::OrderedFloat;
use serde_json::json;
use tracing::debug;

use crate::core::error::Result;
use crate::core::types::{ActorId, PartId};
use crate::hooks::{names, HookPayload};
use crate::interactions::interaction::Interaction;
use crate::parts::ContainerSlot;
use crate::world::World;

/// The character doing the reloading: an explicit target actor when the
/// swap is done for someone else, otherwise the initiating actor.
fn reloader(interaction: &Interaction, owner: ActorId) -> ActorId {
    interaction
        .targets
        .first()
        .copied()
        .or(interaction.actor)
        .unwrap_or(owner)
}

/// Fullest non-empty refill among the packed candidates of one holder.
fn pick_refill(world: &mut World, refills: &[PartId]) -> Option<PartId> {
    if refills.is_empty() {
        return None;
    }
    // several matching stacks in one pocket: any of them will do
    let candidate = refills[world.random_below(refills.len())];
    if world.arena.stored(candidate, ContainerSlot::Contains) > 0 {
        Some(candidate)
    } else {
        None
    }
}

/// How close a refill is to its own capacity; stored count when the
/// container is unbounded.
fn fill_ratio(world: &World, refill: PartId) -> f64 {
    let stored = world.arena.stored(refill, ContainerSlot::Contains) as f64;
    let capacity = world
        .arena
        .get(refill)
        .and_then(|part| part.contains.as_ref())
        .and_then(|container| container.quantity_max);
    match capacity {
        Some(max) if max > 0 => stored / f64::from(max),
        _ => stored,
    }
}

pub fn resolve_reload(
    world: &mut World,
    owner: ActorId,
    interaction: &mut Interaction,
) -> Result<()> {
    let Some(item) = interaction.item else {
        return Ok(());
    };
    let who = reloader(interaction, owner);
    let torso = world
        .actor(who)?
        .as_character()
        .and_then(|state| state.torso);
    let Some(torso) = torso else {
        world.hooks.handle(
            names::RELOAD_DISABLED,
            &HookPayload::new().actor(who).part(item),
        );
        return Ok(());
    };

    // priced by how accustomed the reloader is to this weapon
    let item_name = world.arena.node(item)?.name.clone();
    interaction.cost =
        crate::actors::character::ability_cost(world, who, &item_name, interaction)?;

    let feeds = world.arena.find_functions(item, &["Reload"]);
    let mut reload_time = 0.0;
    let mut reload_time_min = 0.0;
    for feed in feeds {
        let (feed_name, time, time_min) = {
            let node = world.arena.node(feed)?;
            (
                node.name.clone(),
                node.affect_ratio("Reload"),
                node.affect_ratio("Reload Min"),
            )
        };
        let packed = world.arena.find_packed(torso, &feed_name);
        if packed.is_empty() {
            debug!(feed = %feed_name, "no packed refill");
            world.hooks.handle(
                names::RELOAD_EMPTY,
                &HookPayload::new().actor(who).part(feed),
            );
            return Ok(());
        }
        reload_time += time;
        reload_time_min += time_min;
        // one candidate per pocket, fullest first
        let mut candidates: Vec<(PartId, PartId)> = Vec::new();
        for (holder, refills) in &packed {
            if let Some(refill) = pick_refill(world, refills) {
                candidates.push((*holder, refill));
            }
        }
        candidates.sort_by_key(|(_, refill)| {
            std::cmp::Reverse(OrderedFloat(fill_ratio(world, *refill)))
        });
        let Some((holder, refill)) = candidates.first().copied() else {
            world.hooks.handle(
                names::RELOAD_EMPTY,
                &HookPayload::new().actor(who).part(feed),
            );
            return Ok(());
        };
        world.hooks.handle(
            names::RELOAD_CONTAINER,
            &HookPayload::new().actor(who).part(refill).detail(json!({
                "feed": feed_name,
                "holder": holder.0,
                "stored": world.arena.stored(refill, ContainerSlot::Contains),
            })),
        );
    }

    // stretch the interaction to cover the swap
    interaction.action_frames += reload_time - interaction.cost.amount_draw;
    if interaction.action_frames < reload_time_min {
        interaction.action_frames = reload_time_min;
    }
    world.hooks.handle(
        names::RELOAD_ACTIVE,
        &HookPayload::new()
            .actor(who)
            .part(item)
            .detail(json!(interaction.action_frames)),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EngineConfig;
    use crate::interactions::interaction::ActionKind;
    use crate::parts::{BodyPart, ItemContainer};
    use crate::stats::StatType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn packed_character(world: &mut World) -> (ActorId, PartId) {
        let mut torso = BodyPart::new("Body");
        torso.wears = Some(ItemContainer::with_quantity(4));
        let torso = world.arena.alloc(torso);
        let vest = world.arena.alloc(BodyPart::new("Tactical Vest"));
        world
            .arena
            .container_add(torso, ContainerSlot::Wears, vest)
            .unwrap();
        // one magazine per pouch; same-named stacks in one pocket would merge
        for rounds in [15_u32, 27] {
            let mut pouch = BodyPart::new("Magazine Pouch");
            pouch.contains = Some(ItemContainer::with_quantity(2));
            let pouch = world.arena.alloc(pouch);
            world.arena.attach(vest, pouch);
            let mut magazine = BodyPart::new("Box Magazine");
            magazine.contains = Some(ItemContainer::with_quantity(30));
            let magazine = world.arena.alloc(magazine);
            let mut stack = BodyPart::new("9mm Round");
            stack.quantity = rounds;
            let stack = world.arena.alloc(stack);
            world
                .arena
                .container_add(magazine, ContainerSlot::Contains, stack)
                .unwrap();
            world
                .arena
                .container_add(pouch, ContainerSlot::Contains, magazine)
                .unwrap();
        }
        let who = world.spawn_character("Margolin", torso);
        if let Some(state) = world.actor_mut(who).unwrap().as_character_mut() {
            state.torso = Some(torso);
        }
        (who, torso)
    }

    fn weapon(world: &mut World) -> PartId {
        let gun = world.arena.alloc(BodyPart::new("Sidearm"));
        let mut well = BodyPart::new("Box Magazine");
        well.functions.push(StatType::new("Reload", 1.0));
        well.affect.push(StatType::new("Reload", 1800.0));
        well.affect.push(StatType::new("Reload Min", 700.0));
        let well = world.arena.alloc(well);
        world.arena.attach(gun, well);
        gun
    }

    #[test]
    fn test_reload_without_torso_is_disabled() {
        let mut world = World::new(EngineConfig::default());
        let root = world.arena.alloc(BodyPart::new("Shade"));
        let who = world.spawn_character("Shade", root);
        let gun = weapon(&mut world);
        let seen = Arc::new(AtomicUsize::new(0));
        let observer = Arc::clone(&seen);
        world.hooks.observe(names::RELOAD_DISABLED, move |_| {
            observer.fetch_add(1, Ordering::SeqCst);
        });
        let mut reload =
            Interaction::new(Some(who), None, Some(gun), ActionKind::Reload);
        resolve_reload(&mut world, who, &mut reload).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reload_picks_fullest_refill_and_stretches_frames() {
        let mut world = World::new(EngineConfig::default());
        let (who, _) = packed_character(&mut world);
        let gun = weapon(&mut world);
        let chosen = Arc::new(Mutex::new(0_u32));
        let observer = Arc::clone(&chosen);
        world.hooks.observe(names::RELOAD_CONTAINER, move |payload| {
            if let Some(stored) = payload.detail.get("stored").and_then(|v| v.as_u64()) {
                *observer.lock().unwrap() = stored as u32;
            }
        });
        let mut reload =
            Interaction::new(Some(who), None, Some(gun), ActionKind::Reload);
        resolve_reload(&mut world, who, &mut reload).unwrap();
        // half-full loses to the 90% pocket even though both would fit
        assert_eq!(*chosen.lock().unwrap(), 27);
        // untrained reloader pays close to the full listed time
        assert!(reload.action_frames >= 700.0);
    }

    #[test]
    fn test_reload_with_no_refills_reports_empty() {
        let mut world = World::new(EngineConfig::default());
        let mut torso = BodyPart::new("Body");
        torso.wears = Some(ItemContainer::with_quantity(4));
        let torso = world.arena.alloc(torso);
        let who = world.spawn_character("Ash", torso);
        if let Some(state) = world.actor_mut(who).unwrap().as_character_mut() {
            state.torso = Some(torso);
        }
        let gun = weapon(&mut world);
        let seen = Arc::new(AtomicUsize::new(0));
        let observer = Arc::clone(&seen);
        world.hooks.observe(names::RELOAD_EMPTY, move |_| {
            observer.fetch_add(1, Ordering::SeqCst);
        });
        let mut reload =
            Interaction::new(Some(who), None, Some(gun), ActionKind::Reload);
        resolve_reload(&mut world, who, &mut reload).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
