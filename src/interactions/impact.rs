//! Kinetic resolution: strikes, projectiles, and what they leave behind
//!
//! An impact interpolates the implement's velocity to the target range,
//! converts it to energy, and walks the chain of worn layers over the
//! struck part. Each layer's affects bleed accuracy and energy out of
//! the hit before the part itself takes the rest, and whatever the
//! implement carries - poisons, radiation, imbued charge - rubs off in
//! proportion to how long the pass-through took.

use serde_json::json;

use crate::abilities::calculator::{
    distance_ratio, impact_energy, impact_velocity, mass_to_energy,
};
use crate::core::constants::{AVERAGE_KILO_VOLUME, GRENADE_ACCUSTOMED_THRESHOLD, TIME_STEP};
use crate::core::error::Result;
use crate::core::types::{ActorId, PartId};
use crate::hooks::{self, names, HookPayload};
use crate::interactions::interaction::{ActionKind, Interaction};
use crate::parts::ContainerSlot;
use crate::world::World;

/// Affect kinds that transfer onto whatever an impact carries through.
const SPREAD_KINDS: [&str; 28] = [
    "Pharmaceutical",
    "Bacterial",
    "Phage",
    "Poison",
    "Toxin",
    "Radiation",
    "Cancer",
    "Nanotech",
    "Acid",
    "Alkaline",
    "Strength",
    "Reflex",
    "Endurance",
    "Metabolism",
    "Looks",
    "Luck",
    "Dexterity",
    "Willpower",
    "Belief",
    "Intelligence",
    "Charm",
    "Psychic",
    "Regeneration",
    "Immune",
    "Fertility",
    "Circulation",
    "White Blood Cells",
    "Platelets",
];

/// Affect-group nodes below `from` supplying a named function.
fn affect_nodes(world: &World, from: PartId, function: &str) -> Vec<PartId> {
    world
        .arena
        .find_functions(from, &[function])
        .into_iter()
        .filter(|id| world.arena.get(*id).is_some_and(|p| p.group == "Affect"))
        .collect()
}

/// Drive one hit through one part (or worn layer).
///
/// Accuracy is eaten first by the part's deflection affects; a hit
/// deflected to nothing passes its energy along untouched but can no
/// longer connect with anything deeper. What accuracy survives decides
/// the share of the implement's converted mass that lands, and the
/// part's protection affects and health absorb it quantum by quantum.
///
/// Returns the energy let through and the accuracy after this layer.
pub fn process_impact(
    world: &mut World,
    energy: f64,
    accuracy: f64,
    item: PartId,
    part: PartId,
    part_is_character: bool,
) -> Result<(f64, f64)> {
    world.hooks.handle(
        names::IMPACT_PART_PRE,
        &HookPayload::new()
            .part(part)
            .detail(json!({ "energy": energy, "accuracy": accuracy })),
    );
    let mut resist_accuracy = 0.0;
    let mut remaining = accuracy;
    for affect in affect_nodes(world, part, "Accuracy") {
        let stored = world.arena.stored(affect, ContainerSlot::Contains);
        if stored > 0 {
            let want = (remaining.max(0.0).ceil() as u32).min(stored);
            if want == 0 {
                continue;
            }
            if let Some(removed) =
                world
                    .arena
                    .container_remove(affect, ContainerSlot::Contains, None, want)
            {
                let quantity = world.arena.get(removed).map_or(0, |p| p.quantity);
                resist_accuracy += quantity as f64;
            }
        } else {
            let node = world.arena.node_mut(affect)?;
            if node.health <= remaining {
                resist_accuracy += node.health;
                node.health = 0.0;
            } else {
                resist_accuracy += remaining;
                node.health -= remaining;
            }
        }
        remaining = accuracy - resist_accuracy;
    }
    let mut accuracy = remaining;
    if accuracy <= 0.0 {
        return Ok((energy, 0.0));
    }
    if accuracy > 1.0 {
        accuracy = 1.0;
    } else {
        accuracy += world.random() * (1.0 - accuracy);
    }

    let item_weight = {
        let node = world.arena.node(item)?;
        if node.weight != 0.0 {
            node.weight
        } else {
            1.0
        }
    };
    let total_hit = energy * mass_to_energy(item_weight) * accuracy;
    let mut resist_hit = 0.0;
    let mut remaining = total_hit;
    let part_energy = {
        let node = world.arena.node(part)?;
        let weight = if node.weight != 0.0 { node.weight } else { 1.0 };
        let ceiling = node.health_ceiling();
        mass_to_energy(weight) / if ceiling != 0.0 { ceiling } else { 1.0 }
    };
    for affect in affect_nodes(world, item, "Impact") {
        let stored = world.arena.stored(affect, ContainerSlot::Contains);
        if stored > 0 {
            let want = ((remaining / part_energy).max(0.0) as u32).min(stored);
            if want > 0 {
                if let Some(removed) =
                    world
                        .arena
                        .container_remove(affect, ContainerSlot::Contains, None, want)
                {
                    let quantity = world.arena.get(removed).map_or(0, |p| p.quantity);
                    resist_hit += quantity as f64;
                }
            }
        } else if world.arena.get(affect).is_some_and(|p| p.kind == "Protection") {
            let node = world.arena.node_mut(affect)?;
            if node.health * part_energy < remaining {
                resist_hit += node.health * part_energy;
                node.health = 0.0;
            } else {
                resist_hit += remaining;
                node.health -= (remaining / part_energy).floor();
            }
        }
        remaining = total_hit - resist_hit;
    }
    if part_is_character {
        let node = world.arena.node_mut(part)?;
        if node.health * part_energy < remaining {
            resist_hit += node.health * part_energy;
            node.health = 0.0;
        } else {
            resist_hit += remaining;
            node.health -= (remaining / part_energy).floor();
        }
    }
    world.hooks.handle(
        names::IMPACT_PART_POST,
        &HookPayload::new()
            .part(part)
            .detail(json!({ "resisted": resist_hit })),
    );
    Ok((total_hit - resist_hit, accuracy))
}

/// Rub a share of the implement's contagious affects onto a part.
fn process_spread(world: &mut World, ratio: f64, item: PartId, part: PartId) -> Result<()> {
    let affects: Vec<PartId> = world
        .arena
        .node(item)?
        .connections
        .iter()
        .copied()
        .filter(|id| {
            world.arena.get(*id).is_some_and(|p| {
                p.group == "Affect" && SPREAD_KINDS.contains(&p.kind.as_str())
            })
        })
        .collect();
    for affect in affects {
        let stored = world.arena.stored(affect, ContainerSlot::Contains);
        if stored > 0 {
            let amount = ((stored as f64 * ratio).ceil() as u32).min(stored);
            if amount == 0 {
                continue;
            }
            let Some(removed) =
                world
                    .arena
                    .container_remove(affect, ContainerSlot::Contains, None, amount)
            else {
                continue;
            };
            let Some(dropped) = world.arena.duplicate_shell(affect) else {
                continue;
            };
            let _ = world
                .arena
                .container_add(dropped, ContainerSlot::Contains, removed);
            world.arena.attach(part, dropped);
            if world.arena.stored(affect, ContainerSlot::Contains) == 0 {
                world.arena.unlink(item, affect);
            }
        } else {
            let health = world.arena.node(affect)?.health;
            let amount = (health * ratio).ceil();
            if amount < health {
                let Some(portion) = world.arena.duplicate_shell(affect) else {
                    continue;
                };
                if let Some(node) = world.arena.get_mut(portion) {
                    node.health = amount;
                }
                world.arena.attach(part, portion);
            } else if health <= 0.0 {
                // spent affects migrate wholesale
                world.arena.unlink(item, affect);
                world.arena.attach(part, affect);
            } else {
                // a full-strength transfer leaves the affect shared
                // between carrier and target
                world.arena.link(part, affect);
            }
        }
    }
    Ok(())
}

/// Spread scaled by how long the pass-through dwelt in the part: slower
/// exits leave more behind, and a fully absorbed hit leaves everything.
fn spread_from_velocity(
    world: &mut World,
    velocity: f64,
    energy: f64,
    item: PartId,
    part: PartId,
) -> Result<()> {
    let weight = {
        let node = world.arena.node(part)?;
        if node.weight != 0.0 {
            node.weight
        } else {
            1.0
        }
    };
    let time = velocity / weight * AVERAGE_KILO_VOLUME;
    let ratio = if energy == 0.0 { 1.0 } else { time / TIME_STEP };
    process_spread(world, ratio, item, part)
}

/// Resolve an impact landing on a body part.
pub fn resolve_impact(
    world: &mut World,
    owner: ActorId,
    interaction: &mut Interaction,
) -> Result<()> {
    let (Some(item), Some(part)) = (interaction.item, interaction.part) else {
        return Ok(());
    };
    // the shell may know the range better than the interaction does
    let payload = HookPayload::new()
        .actor(owner)
        .part(part)
        .detail(json!(interaction.distance_km));
    if let Some(answer) = world
        .hooks
        .handle(names::DISTANCE_KM, &payload)
        .and_then(|v| v.as_f64())
    {
        interaction.distance_km = answer;
    }

    let (velocity_0, velocity_152, item_weight) = {
        let node = world.arena.node(item)?;
        (
            node.affect_ratio("Velocity 0"),
            node.affect_ratio("Velocity 152.4"),
            node.weight,
        )
    };
    let velocity = impact_velocity(interaction.distance_km, velocity_0, velocity_152);
    let energy = impact_energy(item_weight, velocity);
    world.hooks.handle(
        names::IMPACT_ENERGY,
        &HookPayload::new().actor(owner).detail(json!(energy)),
    );

    let action_name = interaction.action_name().to_string();
    // worn layers that answer the action soak the hit before the part
    let mut chain: Vec<PartId> = Vec::new();
    for wearer in world.arena.list_holds(part, ContainerSlot::Wears, true) {
        let garments: Vec<PartId> = world
            .arena
            .get(wearer)
            .and_then(|p| p.wears.as_ref())
            .map(|c| c.items.clone())
            .unwrap_or_default();
        for garment in garments {
            if !world
                .arena
                .find(garment, crate::parts::FindBy::Functions, &[&action_name], true)
                .is_empty()
            {
                chain.push(garment);
            }
        }
    }
    chain.push(part);

    let impact_affect: f64 = affect_nodes(world, item, "Impact")
        .into_iter()
        .filter_map(|id| world.arena.get(id))
        .map(|node| node.affect_ratio("Health"))
        .sum();
    let mut through = energy + impact_affect;
    let mut accuracy = interaction.distance_ratio.unwrap_or_else(|| {
        distance_ratio(interaction.distance_km, interaction.cost.accustomed, 0.0)
    });
    let last = chain.len().saturating_sub(1);
    let weight = if item_weight != 0.0 { item_weight } else { 1.0 };
    for (index, layer) in chain.iter().enumerate() {
        let (passed, kept_accuracy) =
            process_impact(world, through, accuracy, item, *layer, index == last)?;
        through = passed;
        accuracy = kept_accuracy;
        let energy_diff = (energy - through).max(0.0);
        let exit_velocity = (energy_diff / weight * 2.0).sqrt();
        spread_from_velocity(world, exit_velocity, through, item, *layer)?;
    }
    world.hooks.handle(
        &hooks::through(&action_name),
        &HookPayload::new()
            .actor(owner)
            .part(part)
            .detail(json!(through - impact_affect)),
    );
    Ok(())
}

/// Resolve a throw: externalise the held part as a free item with the
/// thrower's motion plus whatever telekinetic help applies.
pub fn resolve_throw(
    world: &mut World,
    owner: ActorId,
    interaction: &mut Interaction,
) -> Result<()> {
    let Some(item) = interaction.item else {
        return Ok(());
    };
    world.hooks.handle(
        names::POSITION_VECTOR,
        &HookPayload::new().actor(owner).part(item),
    );
    let accuracy = interaction.distance_ratio.unwrap_or_else(|| {
        distance_ratio(interaction.distance_km, interaction.cost.accustomed, 0.0)
    });

    // telekinetic throwing classes scale the release speed by familiarity
    let mut ratio = 1.0;
    let group = world.arena.node(item)?.group.clone();
    if group == "Telekinesis" {
        if let Some(actor_id) = interaction.actor {
            ratio = crate::actors::character::ability_cost(world, actor_id, &group, &interaction)?
                .accustomed;
        }
    }
    // primed throwables arm themselves on the way out of a practiced hand
    if !world.arena.find_functions(item, &["Prime"]).is_empty() {
        if let Some(actor_id) = interaction.actor {
            let accustomed =
                crate::actors::character::ability_cost(world, actor_id, "Grenade Priming", &interaction)?
                    .accustomed;
            if accustomed > GRENADE_ACCUSTOMED_THRESHOLD {
                let prime = Interaction::new(
                    Some(actor_id),
                    interaction.part,
                    Some(item),
                    ActionKind::Prime,
                )
                .at(world.now());
                crate::actors::character::interact(world, actor_id, prime)?;
            }
        }
    }

    let speed = world.arena.node(item)?.affect_ratio("Velocity 0") * ratio;
    // the part leaves the hand and stands as its own actor
    let (name, quantity, parent) = {
        let node = world.arena.node(item)?;
        (node.name.clone(), node.quantity.max(1), node.parent)
    };
    if let Some(holder) = parent {
        world
            .arena
            .container_remove(holder, ContainerSlot::Contains, Some(&name), quantity);
    }
    let thrown = world.spawn_item(&name, item);
    if let Some(state) = world.actor_mut(thrown)?.as_item_mut() {
        state.velocity = speed;
    }
    world.hooks.handle(
        names::THROW_ACCURACY,
        &HookPayload::new()
            .actor(owner)
            .target(thrown)
            .detail(json!(accuracy)),
    );
    Ok(())
}
