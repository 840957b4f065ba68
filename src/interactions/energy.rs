//! The psychic channel: charging, manifestation, imbuing, cleansing
//!
//! Everything here moves quanta of stored charge - "Psytron" stacks -
//! between indicator pools and part containers. A charge draws a pool
//! down and banks it in a store, or lifts banked charge back into a
//! pool; a construct spends banked charge to manifest a connection
//! blueprint as a real part; imbuing trickles charge out of batteries
//! into affect carriers riding a target; cleansing pulls it back off.
//! Whatever leaks in transit leaves through the source's waste affects
//! as spawned residue.

use std::collections::VecDeque;

use ahash::AHashSet;
use serde_json::json;

use crate::abilities::calculator::{distance_difficulty, mass_to_energy, MediumProfile};
use crate::core::constants::IMBUING_ENERGY_RATIO;
use crate::core::error::Result;
use crate::core::types::{ActorId, PartId};
use crate::hooks::{names, HookPayload};
use crate::interactions::interaction::{ActionKind, Interaction};
use crate::parts::{BodyPart, ContainerSlot, ItemContainer};
use crate::stats::{search_key, IndicatorKind};
use crate::world::World;

/// Which side of an ability cost a success check reads: the continuous
/// per-millisecond rates, or the one-off draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessForm {
    Ms,
    Draw,
}

/// An end of a charge transfer: a character's indicator pool, or a
/// part whose container banks quanta.
#[derive(Debug, Clone, Copy)]
enum Endpoint {
    Pool(IndicatorKind),
    Store(PartId),
}

fn draw_kind(name: &str) -> Option<IndicatorKind> {
    let key = search_key(name);
    IndicatorKind::DEFAULT
        .into_iter()
        .find(|kind| search_key(&kind.to_string()) == key)
}

/// The cost figure a stat's draw entry is measured against.
fn expectation(cost: &crate::abilities::AbilityCost, kind: IndicatorKind, form: SuccessForm) -> f64 {
    match (kind, form) {
        (IndicatorKind::Energy, SuccessForm::Ms) => cost.energy_ms,
        (IndicatorKind::Energy, SuccessForm::Draw) => cost.energy_draw,
        (IndicatorKind::Fatigue, SuccessForm::Ms) => cost.fatigue_ms,
        (IndicatorKind::Fatigue, SuccessForm::Draw) => cost.fatigue_draw,
        (IndicatorKind::Concentration, SuccessForm::Ms) => cost.concentration_ms,
        (IndicatorKind::Concentration, SuccessForm::Draw) => cost.concentration_draw,
        _ => 1.0,
    }
}

/// Imbued accuracy riding the acting part, added to familiarity when
/// ranging an action.
fn accuracy_bonus(world: &World, part: Option<PartId>) -> f64 {
    let Some(part) = part else {
        return 0.0;
    };
    world
        .arena
        .find_imbued(part, Some("Accuracy"))
        .into_iter()
        .filter_map(|id| world.arena.get(id))
        .map(|node| node.affect_ratio("Accuracy"))
        .sum()
}

fn medium_profile(world: &World, interaction: &Interaction) -> Option<MediumProfile> {
    let medium = interaction.medium?;
    let actor = world.actors.get(&medium)?;
    let node = world.arena.get(actor.root)?;
    Some(MediumProfile {
        requires: node.requires.clone(),
        circulation: node.circulation,
    })
}

/// Distance success ratio for the interaction, resolved once and cached
/// on it. Without a bridging medium the range cannot be crossed at all.
pub fn resolve_distance(world: &mut World, who: ActorId, interaction: &mut Interaction) -> f64 {
    if let Some(ratio) = interaction.distance_ratio {
        return ratio;
    }
    let profile = medium_profile(world, interaction);
    if profile.is_none() {
        world
            .hooks
            .handle(names::DISTANCE_NO_MEDIUM, &HookPayload::new().actor(who));
    } else if let Some(answer) = world.hooks.handle(
        names::DISTANCE_KM,
        &HookPayload::new()
            .actor(who)
            .detail(json!(interaction.distance_km)),
    ) {
        if let Some(km) = answer.as_f64() {
            interaction.distance_km = km;
        }
    }
    let ratio = distance_difficulty(
        profile.as_ref(),
        interaction.distance_km,
        interaction.cost.accustomed,
        accuracy_bonus(world, interaction.part),
    );
    interaction.distance_ratio = Some(ratio);
    ratio
}

/// Success of an ability as the share of its expected indicator draws
/// the character could actually supply, attenuated by range.
///
/// The ability's skill names the stats backing it; each of those stats
/// lists the indicators it draws against. Every listed indicator is
/// drawn its expected share and the ratio of supplied to expected, times
/// the distance ratio, is the success.
pub fn process_success(
    world: &mut World,
    who: ActorId,
    action: &str,
    interaction: &mut Interaction,
    form: SuccessForm,
) -> Result<f64> {
    interaction.cost = crate::actors::character::ability_cost(world, who, action, interaction)?;
    let action_key = search_key(action);
    let mut draws: Vec<(IndicatorKind, f64)> = Vec::new();
    {
        let actor = world.actor(who)?;
        if let Some(state) = actor.as_character() {
            let soul = &state.soul;
            let stats: Vec<String> = soul
                .ability(action)
                .and_then(|ability| {
                    ability.group_link.as_ref().or_else(|| ability.extra.get("Skill"))
                })
                .and_then(|skill| soul.skills.find(skill))
                .and_then(|skill| skill.extra.get("Stat"))
                .map(|joined| joined.split('|').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default();
            for name in &stats {
                let Some(stat) = soul.stats.find(name) else {
                    continue;
                };
                for other in &stat.draw {
                    if other.search == action_key {
                        continue;
                    }
                    let Some(kind) = draw_kind(&other.name) else {
                        continue;
                    };
                    let mut expect = expectation(&interaction.cost, kind, form);
                    if form == SuccessForm::Ms {
                        expect *= world.clock.diff;
                    }
                    expect *= other.ratio / stats.len() as f64;
                    draws.push((kind, expect));
                }
            }
        }
    }
    let mut supplied = 0.0;
    let mut expected = 0.0;
    for (kind, expect) in draws {
        expected += expect;
        if let Some(state) = world.actor_mut(who)?.as_character_mut() {
            supplied += state.indicator_draw(kind, expect);
        }
    }
    let distance = resolve_distance(world, who, interaction);
    let supplied = if supplied == 0.0 { 1.0 } else { supplied };
    let expected = if expected == 0.0 { 1.0 } else { expected };
    Ok(supplied / expected * distance)
}

/// A fresh stack instantiated from the template library, or a bare
/// energy blob when no template carries the name.
pub(crate) fn template_stack(world: &mut World, name: &str, quantity: u32) -> PartId {
    let stack = match world.templates.spawn(&mut world.arena, name) {
        Some(id) => id,
        None => {
            let mut blob = BodyPart::new(name);
            blob.kind = "Energy".into();
            world.arena.alloc(blob)
        }
    };
    if let Some(node) = world.arena.get_mut(stack) {
        node.quantity = quantity;
    }
    stack
}

/// The charge carrier every psychic transaction is denominated in.
pub fn energy_stack(world: &mut World, quantity: u32) -> PartId {
    template_stack(world, "Psytron", quantity)
}

/// Charge flows between an indicator pool and a banked store, in either
/// direction. The rate divides across every charge the character keeps
/// running at once; a negative rate reverses the flow.
pub fn resolve_psy_charge(
    world: &mut World,
    owner: ActorId,
    interaction: &mut Interaction,
) -> Result<()> {
    let action = interaction.action_name().to_string();
    let who = interaction.actor.unwrap_or(owner);
    let source = match (interaction.part, interaction.indicator) {
        (Some(part), _) => Endpoint::Store(part),
        (None, Some(kind)) => Endpoint::Pool(kind),
        (None, None) => {
            world
                .hooks
                .handle(names::PSY_CHARGE_NO_SOURCE, &HookPayload::new().actor(owner));
            return Ok(());
        }
    };
    let target = match (interaction.item, interaction.indicator) {
        (Some(part), _) => Endpoint::Store(part),
        (None, Some(kind)) => Endpoint::Pool(kind),
        (None, None) => {
            world
                .hooks
                .handle(names::PSY_CHARGE_NO_TARGET, &HookPayload::new().actor(owner));
            return Ok(());
        }
    };
    if let Some(answer) = world.hooks.handle(
        names::DISTANCE_KM,
        &HookPayload::new()
            .actor(owner)
            .detail(json!(interaction.distance_km)),
    ) {
        if let Some(km) = answer.as_f64() {
            interaction.distance_km = km;
        }
    }
    if matches!(source, Endpoint::Pool(_)) {
        interaction.cost =
            crate::actors::character::ability_cost(world, who, &action, interaction)?;
    }
    let total_charging = world
        .actor(who)?
        .interactions
        .iter()
        .filter(|i| matches!(i.action(), ActionKind::PsyCharge))
        .count();
    if total_charging == 0 {
        world
            .hooks
            .handle(names::PSY_CHARGE_NOPE, &HookPayload::new().actor(owner));
        return Ok(());
    }
    let mut primary = interaction.cost.amount_ms * world.clock.diff / total_charging as f64;
    if primary == 0.0 {
        world
            .hooks
            .handle(names::PSY_CHARGE_NOPE, &HookPayload::new().actor(owner));
        return Ok(());
    }
    let (mut source, mut target) = (source, target);
    if primary < 0.0 {
        std::mem::swap(&mut source, &mut target);
        primary = -primary;
    }

    // lift the charge out of the source
    let moving: Option<PartId> = match source {
        Endpoint::Pool(kind) => {
            let success = process_success(world, who, &action, interaction, SuccessForm::Ms)?;
            let drawn = world
                .actor_mut(who)?
                .as_character_mut()
                .map(|state| state.indicator_draw(kind, primary * success))
                .unwrap_or(0.0);
            Some(energy_stack(world, (drawn / IMBUING_ENERGY_RATIO) as u32))
        }
        Endpoint::Store(part) => {
            if world.arena.node(part)?.function_named(&action).is_some() {
                let lift = primary as u32;
                if lift > 0 {
                    world
                        .arena
                        .container_remove(part, ContainerSlot::Contains, Some("Psytron"), lift)
                } else {
                    None
                }
            } else {
                world.hooks.handle(
                    names::PSY_CHARGE_NO_SOURCE,
                    &HookPayload::new().actor(owner).part(part),
                );
                None
            }
        }
    };
    let quantity = moving
        .and_then(|id| world.arena.get(id))
        .map_or(0, |node| node.quantity);
    let Some(moving) = moving.filter(|_| quantity > 0) else {
        world
            .hooks
            .handle(names::PSY_CHARGE_NO_CHARGE, &HookPayload::new().actor(owner));
        return Ok(());
    };

    // land it in the target
    match target {
        Endpoint::Pool(kind) => {
            let value = quantity as f64 * IMBUING_ENERGY_RATIO;
            if let Some(state) = world.actor_mut(who)?.as_character_mut() {
                state.indicator_restore(kind, value.floor());
            }
        }
        Endpoint::Store(part) => {
            if world.arena.node(part)?.function_named(&action).is_none() {
                world.hooks.handle(
                    names::PSY_CHARGE_NO_TARGET,
                    &HookPayload::new().actor(owner).part(part),
                );
                return Ok(());
            }
            let spare = world
                .arena
                .get(part)
                .and_then(|node| node.contains.as_ref())
                .and_then(|c| c.quantity_remaining())
                .unwrap_or(u32::MAX);
            // what the target cannot hold goes back where it came from
            let overflow = quantity.saturating_sub(spare);
            let mut giveback = None;
            if overflow > 0 {
                if let Some(node) = world.arena.get_mut(moving) {
                    node.quantity = spare;
                }
                giveback = world.arena.duplicate_shell(moving);
                if let Some(id) = giveback {
                    if let Some(node) = world.arena.get_mut(id) {
                        node.quantity = overflow;
                    }
                }
            }
            if world
                .arena
                .container_add(part, ContainerSlot::Contains, moving)
                .is_err()
            {
                world.hooks.handle(
                    names::PSY_CHARGE_NO_TARGET,
                    &HookPayload::new().actor(owner).part(part),
                );
            }
            if let (Some(id), Endpoint::Store(origin)) = (giveback, source) {
                let _ = world
                    .arena
                    .container_add(origin, ContainerSlot::Contains, id);
            }
        }
    }
    Ok(())
}

/// Manifest a focus part's construct blueprints as real parts inside
/// its own store, paying banked charge for each body and wasting the
/// share an imperfect pass lets slip.
pub fn resolve_construct(
    world: &mut World,
    owner: ActorId,
    interaction: &mut Interaction,
) -> Result<()> {
    let action = interaction.action_name().to_string();
    let who = interaction.actor.unwrap_or(owner);
    let Some(part) = interaction.part else {
        return Ok(());
    };
    if world
        .arena
        .get(part)
        .and_then(|node| node.contains.as_ref())
        .is_none()
    {
        return Ok(());
    }
    let mut required = 0.0;
    let mut blueprints: Vec<PartId> = Vec::new();
    for connection in world.arena.node(part)?.connections.clone() {
        let Some(node) = world.arena.get(connection) else {
            continue;
        };
        if node.kind != "Construct" {
            continue;
        }
        required += node
            .contains
            .as_ref()
            .and_then(|c| c.quantity_max)
            .unwrap_or(0) as f64;
        blueprints.push(connection);
    }
    let pool = world
        .actor(who)?
        .as_character()
        .map(|state| state.indicator_pool(IndicatorKind::Energy))
        .unwrap_or(0.0);
    if required > pool / IMBUING_ENERGY_RATIO {
        return Ok(());
    }
    if let Some(answer) = world.hooks.handle(
        names::DISTANCE_KM,
        &HookPayload::new()
            .actor(owner)
            .detail(json!(interaction.distance_km)),
    ) {
        if let Some(km) = answer.as_f64() {
            interaction.distance_km = km;
        }
    }
    let success = process_success(world, who, &action, interaction, SuccessForm::Draw)?;
    let draw = interaction.cost.amount_draw;
    if let Some(state) = world.actor_mut(who)?.as_character_mut() {
        state.indicator_draw(IndicatorKind::Energy, draw);
    }
    for blueprint in blueprints {
        let Some(shell) = world.arena.duplicate_shell(blueprint) else {
            continue;
        };
        let capacity = world
            .arena
            .get(shell)
            .and_then(|node| node.contains.as_ref())
            .and_then(|c| c.quantity_max)
            .unwrap_or(0) as f64;
        let fill = (capacity * success) as u32;
        let energy = if fill > 0 {
            world
                .arena
                .container_remove(part, ContainerSlot::Contains, Some("Psytron"), fill)
        } else {
            None
        };
        match world.arena.container_add(part, ContainerSlot::Contains, shell) {
            Ok(manifested) => {
                if let Some(energy) = energy {
                    if world
                        .arena
                        .container_add(manifested, ContainerSlot::Contains, energy)
                        .is_err()
                    {
                        let _ = world.arena.container_add(part, ContainerSlot::Contains, energy);
                        world.hooks.handle(
                            names::WASTE_ENERGY,
                            &HookPayload::new().actor(owner).part(manifested),
                        );
                    }
                }
            }
            Err(_) => {
                if let Some(energy) = energy {
                    let _ = world.arena.container_add(part, ContainerSlot::Contains, energy);
                }
                world.hooks.handle(
                    names::WASTE_ENERGY,
                    &HookPayload::new().actor(owner).part(part),
                );
            }
        }
        // the missed share of the manifest boils off
        let spill = (capacity * (1.0 - success)) as u32;
        if spill > 0 {
            if let Some(waste) =
                world
                    .arena
                    .container_remove(part, ContainerSlot::Contains, Some("Psytron"), spill)
            {
                let lost = world.arena.get(waste).map_or(0, |node| node.quantity);
                world.hooks.handle(
                    names::WASTE_ENERGY,
                    &HookPayload::new().actor(owner).part(waste).detail(json!(lost)),
                );
            }
        }
    }
    Ok(())
}

/// Trickle battery charge into the affects an imbuing tool is set to
/// apply. The first pass seats each affect on the target; following
/// passes fill them at a rate bounded by the tool's circulation, the
/// target's capacity, and what the batteries still hold.
pub fn resolve_imbue(
    world: &mut World,
    owner: ActorId,
    interaction: &mut Interaction,
) -> Result<()> {
    let action = interaction.action_name().to_string();
    let who = interaction.actor.unwrap_or(owner);
    let (Some(source), Some(target)) = (interaction.part, interaction.item) else {
        return Ok(());
    };
    let mut apply: Vec<PartId> = Vec::new();
    for node in world.arena.find_functions(source, &[&action]) {
        for connection in world.arena.node(node)?.connections.clone() {
            if world
                .arena
                .get(connection)
                .is_some_and(|p| p.group == "Affect")
            {
                apply.push(connection);
            }
        }
    }
    if apply.is_empty() {
        return Ok(());
    }
    let batteries = world.arena.find_kind(source, "Battery", true);
    let available: u32 = batteries
        .iter()
        .map(|b| world.arena.stored(*b, ContainerSlot::Contains))
        .sum();
    interaction.cost = crate::actors::character::ability_cost(world, who, &action, interaction)?;
    let accustomed = interaction.cost.accustomed.max(1.0);
    let rate = interaction.cost.amount_ms.max(IMBUING_ENERGY_RATIO);
    let circulation = world.arena.node(source)?.circulation;
    let mut per_ms = world.clock.diff * rate * circulation;

    let affected = world.arena.find_group(target, "Affect", true);
    let filled: u32 = affected
        .iter()
        .map(|a| world.arena.stored(*a, ContainerSlot::Contains))
        .sum();
    let fill_max: u32 = affected
        .iter()
        .filter_map(|a| world.arena.get(*a))
        .filter_map(|p| p.contains.as_ref())
        .filter_map(|c| c.quantity_max)
        .sum();
    let ceiling =
        mass_to_energy(world.arena.node(target)?.weight) * IMBUING_ENERGY_RATIO * accustomed;
    let cap = ceiling.min(fill_max as f64).min(available as f64);
    if cap - filled as f64 <= per_ms {
        per_ms = (cap - filled as f64).max(0.0);
    }

    // drain the pooled charge, batteries in turn
    let mut pool: u32 = 0;
    let mut want = per_ms as u32;
    for battery in &batteries {
        if want == 0 {
            break;
        }
        let take = want.min(world.arena.stored(*battery, ContainerSlot::Contains));
        if take == 0 {
            continue;
        }
        if let Some(stack) =
            world
                .arena
                .container_remove(*battery, ContainerSlot::Contains, None, take)
        {
            let got = world.arena.get(stack).map_or(0, |node| node.quantity);
            pool += got;
            want -= got.min(want);
        }
    }

    let mut waste = 0.0;
    let share = pool as f64 / apply.len() as f64;
    for affect in apply {
        let key = world.arena.node(affect)?.search.clone();
        let existing = world
            .arena
            .node(target)?
            .connections
            .iter()
            .copied()
            .find(|c| world.arena.get(*c).is_some_and(|p| p.search == key));
        let effect = match existing {
            Some(found) => found,
            None => {
                let Some(shell) = world.arena.duplicate_shell(affect) else {
                    continue;
                };
                world.arena.attach(target, shell);
                shell
            }
        };
        let mut quanta = share;
        if circulation < 1.0 {
            waste += quanta * (1.0 - circulation);
            quanta -= quanta * (1.0 - circulation);
        }
        waste += quanta.fract();
        if quanta as u32 == 0 {
            continue;
        }
        let stack = energy_stack(world, quanta as u32);
        if world
            .arena
            .container_add(effect, ContainerSlot::Contains, stack)
            .is_err()
        {
            waste += quanta.floor();
        }
    }
    externalise_waste(world, waste, source)?;
    Ok(())
}

/// Strip imbued affects off a part, an even share of the cleansing rate
/// from each; an affect bled dry comes off the part entirely.
pub fn resolve_cleansing(
    world: &mut World,
    owner: ActorId,
    interaction: &mut Interaction,
) -> Result<()> {
    let action = interaction.action_name().to_string();
    let who = interaction.actor.unwrap_or(owner);
    let Some(target) = interaction.part else {
        return Ok(());
    };
    {
        let node = world.arena.node(target)?;
        if node.kind == "Construct" || node.group == "Affect" {
            world.hooks.handle(
                names::CLEANSING_FAILURE,
                &HookPayload::new().actor(owner).part(target),
            );
            return Ok(());
        }
    }
    let mut affects: Vec<PartId> = Vec::new();
    let mut seen = AHashSet::new();
    for carrier in world.arena.find_imbued(target, None) {
        for connection in world.arena.node(carrier)?.connections.clone() {
            if !world
                .arena
                .get(connection)
                .is_some_and(|p| p.is_construct_affect())
            {
                continue;
            }
            if seen.insert(connection) {
                affects.push(connection);
            }
        }
    }
    if affects.is_empty() {
        return Ok(());
    }
    interaction.cost = crate::actors::character::ability_cost(world, who, &action, interaction)?;
    let max_rate = interaction.cost.energy_ms * world.clock.diff;
    let share = (max_rate / affects.len() as f64) as u32;
    let mut waste = 0.0;
    for affect in affects {
        let got = if share > 0 {
            world
                .arena
                .container_remove(affect, ContainerSlot::Contains, None, share)
                .and_then(|id| world.arena.get(id))
                .map_or(0, |node| node.quantity)
        } else {
            0
        };
        if world.arena.stored(affect, ContainerSlot::Contains) < 1 {
            if let Some(parent) = world.arena.node(affect)?.parent {
                world.arena.unlink(parent, affect);
                world.arena.node_mut(affect)?.parent = None;
            }
        }
        if got < share {
            waste += (share - got) as f64;
        }
    }
    externalise_waste(world, waste, target)?;
    Ok(())
}

/// Seat candidate affects from a sample tray onto a tool's imbue heads,
/// one distinct candidate per head.
pub fn resolve_imbue_select(
    world: &mut World,
    owner: ActorId,
    interaction: &mut Interaction,
) -> Result<()> {
    let (Some(target), Some(tray)) = (interaction.part, interaction.item) else {
        return Ok(());
    };
    let mut independent: AHashSet<String> = AHashSet::new();
    let mut apply: VecDeque<PartId> = VecDeque::new();
    for candidate in world.arena.node(tray)?.connections.clone() {
        let Some(node) = world.arena.get(candidate) else {
            continue;
        };
        if independent.contains(&node.search) {
            continue;
        }
        if node.group != "Affect" && node.kind != "Construct" {
            continue;
        }
        independent.insert(node.search.clone());
        apply.push_back(candidate);
    }
    if apply.is_empty() {
        world.hooks.handle(
            names::IMBUE_SELECT_FAILED,
            &HookPayload::new().actor(owner).part(tray),
        );
        return Ok(());
    }
    for head in world.arena.find_functions(target, &["Imbue"]) {
        let Some(selection) = apply.pop_front() else {
            break;
        };
        let key = world.arena.node(selection)?.search.clone();
        let already = world
            .arena
            .node(head)?
            .connections
            .iter()
            .copied()
            .any(|c| world.arena.get(c).is_some_and(|p| p.search == key));
        if already {
            continue;
        }
        let Some(shell) = world.arena.duplicate_shell(selection) else {
            continue;
        };
        world.arena.attach(head, shell);
    }
    Ok(())
}

/// Push wasted quanta out through the source's waste affects as spawned
/// residue items, one product per affect entry, scaled by its ratio.
pub fn externalise_waste(world: &mut World, waste: f64, source: PartId) -> Result<Vec<ActorId>> {
    if waste <= 0.0 {
        return Ok(Vec::new());
    }
    let waste_key = search_key("Waste");
    let outputs: Vec<(String, f64)> = world
        .arena
        .node(source)?
        .affect
        .iter()
        .filter(|a| a.search == waste_key)
        .map(|a| (a.name.clone(), a.ratio))
        .collect();
    let mut spawned = Vec::new();
    for (name, ratio) in outputs {
        let quanta = (waste * ratio) as u32;
        if quanta == 0 {
            continue;
        }
        let product = match world.templates.spawn(&mut world.arena, &name) {
            Some(id) => id,
            None => {
                let mut blob = BodyPart::new(&name);
                blob.kind = "Energy".into();
                blob.contains = Some(ItemContainer::with_quantity(u32::MAX));
                world.arena.alloc(blob)
            }
        };
        let carrier = world
            .arena
            .get(product)
            .and_then(|node| node.contains.as_ref())
            .and_then(|c| c.restrict.first().cloned())
            .unwrap_or_else(|| "Psytron".to_string());
        let stack = template_stack(world, &carrier, quanta);
        let _ = world
            .arena
            .container_add(product, ContainerSlot::Contains, stack);
        let residue = world.spawn_item(&name, product);
        world.hooks.handle(
            names::POSITION_VECTOR,
            &HookPayload::new().actor(residue).part(source),
        );
        spawned.push(residue);
    }
    Ok(spawned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EngineConfig;
    use crate::stats::StatType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn store(world: &mut World, name: &str, cap: u32, charge: u32) -> PartId {
        let mut part = BodyPart::new(name);
        part.functions.push(StatType::new("Psy Charge", 1.0));
        part.contains = Some(ItemContainer::with_quantity(cap));
        let part = world.arena.alloc(part);
        if charge > 0 {
            let mut stack = BodyPart::new("Psytron");
            stack.quantity = charge;
            let stack = world.arena.alloc(stack);
            world
                .arena
                .container_add(part, ContainerSlot::Contains, stack)
                .unwrap();
        }
        part
    }

    fn banked(world: &World, part: PartId) -> u32 {
        world
            .arena
            .container_search(part, ContainerSlot::Contains, "Psytron")
            .into_iter()
            .filter_map(|id| world.arena.get(id))
            .map(|node| node.quantity)
            .sum()
    }

    fn charging_character(world: &mut World, charge: &Interaction) -> ActorId {
        let root = world.arena.alloc(BodyPart::new("Channeler"));
        let who = world.spawn_character("Channeler", root);
        world
            .actor_mut(who)
            .unwrap()
            .interactions
            .push(charge.clone());
        who
    }

    #[test]
    fn test_psy_charge_moves_rated_quanta_between_stores() {
        let mut world = World::new(EngineConfig::default());
        world.clock.diff = 1000.0;
        let from = store(&mut world, "Psy Cell", 50, 30);
        let into = store(&mut world, "Psy Focus", 50, 0);
        let mut charge = Interaction::new(None, Some(from), Some(into), ActionKind::PsyCharge);
        charge.cost.amount_ms = 0.004;
        let who = charging_character(&mut world, &charge);
        charge.actor = Some(who);
        resolve_psy_charge(&mut world, who, &mut charge).unwrap();
        assert_eq!(banked(&world, from), 26);
        assert_eq!(banked(&world, into), 4);
    }

    #[test]
    fn test_psy_charge_overflow_returns_to_source() {
        let mut world = World::new(EngineConfig::default());
        world.clock.diff = 1000.0;
        let from = store(&mut world, "Psy Cell", 50, 30);
        let into = store(&mut world, "Sliver", 3, 0);
        let mut charge = Interaction::new(None, Some(from), Some(into), ActionKind::PsyCharge);
        charge.cost.amount_ms = 0.01;
        let who = charging_character(&mut world, &charge);
        charge.actor = Some(who);
        resolve_psy_charge(&mut world, who, &mut charge).unwrap();
        assert_eq!(banked(&world, into), 3);
        assert_eq!(banked(&world, from), 27);
    }

    #[test]
    fn test_psy_charge_without_channel_reports_nope() {
        let mut world = World::new(EngineConfig::default());
        world.clock.diff = 1000.0;
        let from = store(&mut world, "Psy Cell", 50, 30);
        let into = store(&mut world, "Psy Focus", 50, 0);
        let root = world.arena.alloc(BodyPart::new("Idle"));
        let who = world.spawn_character("Idle", root);
        let seen = Arc::new(AtomicUsize::new(0));
        let observer = Arc::clone(&seen);
        world.hooks.observe(names::PSY_CHARGE_NOPE, move |_| {
            observer.fetch_add(1, Ordering::SeqCst);
        });
        let mut charge = Interaction::new(Some(who), Some(from), Some(into), ActionKind::PsyCharge);
        charge.cost.amount_ms = 0.004;
        resolve_psy_charge(&mut world, who, &mut charge).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(banked(&world, from), 30);
    }

    #[test]
    fn test_psy_charge_negative_rate_reverses_flow() {
        let mut world = World::new(EngineConfig::default());
        world.clock.diff = 1000.0;
        let from = store(&mut world, "Psy Cell", 50, 30);
        let into = store(&mut world, "Psy Focus", 50, 12);
        let mut charge = Interaction::new(None, Some(from), Some(into), ActionKind::PsyCharge);
        charge.cost.amount_ms = -0.004;
        let who = charging_character(&mut world, &charge);
        charge.actor = Some(who);
        resolve_psy_charge(&mut world, who, &mut charge).unwrap();
        assert_eq!(banked(&world, into), 8);
        assert_eq!(banked(&world, from), 34);
    }

    #[test]
    fn test_psy_charge_restores_an_indicator_pool() {
        let mut world = World::new(EngineConfig::default());
        world.clock.diff = 1000.0;
        let from = store(&mut world, "Psy Cell", 5000, 2000);
        let mut charge = Interaction::new(None, Some(from), None, ActionKind::PsyCharge);
        charge.indicator = Some(IndicatorKind::Energy);
        charge.cost.amount_ms = 1.0;
        let who = charging_character(&mut world, &charge);
        charge.actor = Some(who);
        if let Some(state) = world.actor_mut(who).unwrap().as_character_mut() {
            if let Some(energy) = state.soul.indicator_mut(IndicatorKind::Energy) {
                energy.offset = 50.0;
            }
        }
        resolve_psy_charge(&mut world, who, &mut charge).unwrap();
        assert_eq!(banked(&world, from), 1000);
        let value = world
            .actor(who)
            .unwrap()
            .as_character()
            .unwrap()
            .indicator_pool(IndicatorKind::Energy);
        assert!((value - 52.0).abs() < 1e-9);
    }

    #[test]
    fn test_construct_manifests_blueprint_inside_focus() {
        let mut world = World::new(EngineConfig::default());
        world.clock.diff = 1000.0;
        let mut focus = BodyPart::new("Psy Focus");
        focus.contains = Some(ItemContainer::with_quantity(200));
        let focus = world.arena.alloc(focus);
        let mut stack = BodyPart::new("Psytron");
        stack.quantity = 100;
        let stack = world.arena.alloc(stack);
        world
            .arena
            .container_add(focus, ContainerSlot::Contains, stack)
            .unwrap();
        let mut blade = BodyPart::new("Psy Blade");
        blade.kind = "Construct".into();
        blade.contains = Some(ItemContainer::with_quantity(10));
        let blade = world.arena.alloc(blade);
        world.arena.attach(focus, blade);
        let who = world.spawn_character("Kael", focus);
        let mut manifest = Interaction::new(Some(who), Some(focus), None, ActionKind::Construct);
        manifest.distance_ratio = Some(1.0);
        resolve_construct(&mut world, who, &mut manifest).unwrap();
        let manifested = world
            .arena
            .container_search(focus, ContainerSlot::Contains, "Psy Blade");
        assert_eq!(manifested.len(), 1);
        assert_eq!(world.arena.stored(manifested[0], ContainerSlot::Contains), 10);
        assert_eq!(banked(&world, focus), 90);
    }

    #[test]
    fn test_imbue_seats_then_fills_the_affect() {
        let mut world = World::new(EngineConfig::default());
        world.clock.diff = 1000.0;
        let tool = world.arena.alloc(BodyPart::new("Psyfiller"));
        let mut head = BodyPart::new("Filler Head");
        head.functions.push(StatType::new("Imbue", 1.0));
        let head = world.arena.alloc(head);
        world.arena.attach(tool, head);
        let mut brand = BodyPart::new("Ember Brand");
        brand.group = "Affect".into();
        brand.kind = "Construct".into();
        brand.contains = Some(ItemContainer::with_quantity(60));
        let brand = world.arena.alloc(brand);
        world.arena.attach(head, brand);
        let mut battery = BodyPart::new("Psy Battery");
        battery.kind = "Battery".into();
        battery.contains = Some(ItemContainer::with_quantity(100));
        let battery = world.arena.alloc(battery);
        world.arena.attach(tool, battery);
        let mut fuel = BodyPart::new("Psytron");
        fuel.quantity = 40;
        let fuel = world.arena.alloc(fuel);
        world
            .arena
            .container_add(battery, ContainerSlot::Contains, fuel)
            .unwrap();
        let mut blade = BodyPart::new("Blade");
        blade.weight = 1.0;
        let blade = world.arena.alloc(blade);
        let who = world.spawn_character("Sefa", tool);

        let mut imbue = Interaction::new(Some(who), Some(tool), Some(blade), ActionKind::Imbue);
        resolve_imbue(&mut world, who, &mut imbue).unwrap();
        let seated: Vec<PartId> = world
            .arena
            .node(blade)
            .unwrap()
            .connections
            .clone();
        assert_eq!(seated.len(), 1);
        assert_eq!(world.arena.stored(seated[0], ContainerSlot::Contains), 0);

        resolve_imbue(&mut world, who, &mut imbue).unwrap();
        let filled = world.arena.stored(seated[0], ContainerSlot::Contains);
        assert!(filled > 0);
        assert_eq!(filled + banked(&world, battery), 40);
    }

    #[test]
    fn test_cleansing_refuses_construct_matter() {
        let mut world = World::new(EngineConfig::default());
        let mut wisp = BodyPart::new("Wisp");
        wisp.group = "Affect".into();
        let wisp = world.arena.alloc(wisp);
        let root = world.arena.alloc(BodyPart::new("Cleanser"));
        let who = world.spawn_character("Cleanser", root);
        let seen = Arc::new(AtomicUsize::new(0));
        let observer = Arc::clone(&seen);
        world.hooks.observe(names::CLEANSING_FAILURE, move |_| {
            observer.fetch_add(1, Ordering::SeqCst);
        });
        let mut cleanse = Interaction::new(Some(who), Some(wisp), None, ActionKind::Cleansing);
        resolve_cleansing(&mut world, who, &mut cleanse).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cleansing_prunes_spent_affects() {
        let mut world = World::new(EngineConfig::default());
        world.clock.diff = 1000.0;
        let arm = world.arena.alloc(BodyPart::new("Arm"));
        let mut spent = BodyPart::new("Rust Bloom");
        spent.group = "Affect".into();
        spent.kind = "Construct".into();
        spent.contains = Some(ItemContainer::with_quantity(30));
        let spent = world.arena.alloc(spent);
        world.arena.attach(arm, spent);
        let mut live = BodyPart::new("Ember Brand");
        live.group = "Affect".into();
        live.kind = "Construct".into();
        live.contains = Some(ItemContainer::with_quantity(30));
        let live = world.arena.alloc(live);
        world.arena.attach(arm, live);
        let mut fuel = BodyPart::new("Psytron");
        fuel.quantity = 20;
        let fuel = world.arena.alloc(fuel);
        world
            .arena
            .container_add(live, ContainerSlot::Contains, fuel)
            .unwrap();
        let who = world.spawn_character("Scover", arm);
        let mut cleanse = Interaction::new(Some(who), Some(arm), None, ActionKind::Cleansing);
        resolve_cleansing(&mut world, who, &mut cleanse).unwrap();
        let remaining = &world.arena.node(arm).unwrap().connections;
        assert!(!remaining.contains(&spent));
        assert!(remaining.contains(&live));
        assert_eq!(world.arena.node(spent).unwrap().parent, None);
    }

    #[test]
    fn test_imbue_select_assigns_one_candidate_per_head() {
        let mut world = World::new(EngineConfig::default());
        let tray = world.arena.alloc(BodyPart::new("Sample Tray"));
        let mut brand = BodyPart::new("Ember Brand");
        brand.group = "Affect".into();
        let brand = world.arena.alloc(brand);
        world.arena.attach(tray, brand);
        let mut again = BodyPart::new("Ember Brand");
        again.group = "Affect".into();
        let again = world.arena.alloc(again);
        world.arena.attach(tray, again);
        let mut blade = BodyPart::new("Psy Blade");
        blade.kind = "Construct".into();
        let blade = world.arena.alloc(blade);
        world.arena.attach(tray, blade);
        let pebble = world.arena.alloc(BodyPart::new("Pebble"));
        world.arena.attach(tray, pebble);

        let tool = world.arena.alloc(BodyPart::new("Psyfiller"));
        for name in ["Head A", "Head B"] {
            let mut head = BodyPart::new(name);
            head.functions.push(StatType::new("Imbue", 1.0));
            let head = world.arena.alloc(head);
            world.arena.attach(tool, head);
        }
        let who = world.spawn_character("Fitter", tool);
        let mut select = Interaction::new(Some(who), Some(tool), Some(tray), ActionKind::ImbueSelect);
        resolve_imbue_select(&mut world, who, &mut select).unwrap();

        let heads = world.arena.find_functions(tool, &["Imbue"]);
        assert_eq!(heads.len(), 2);
        let first: Vec<String> = world.arena.node(heads[0]).unwrap().connections.iter()
            .filter_map(|c| world.arena.get(*c))
            .map(|p| p.name.clone())
            .collect();
        let second: Vec<String> = world.arena.node(heads[1]).unwrap().connections.iter()
            .filter_map(|c| world.arena.get(*c))
            .map(|p| p.name.clone())
            .collect();
        assert_eq!(first, vec!["Ember Brand".to_string()]);
        assert_eq!(second, vec!["Psy Blade".to_string()]);
    }

    #[test]
    fn test_imbue_select_with_no_candidates_fails() {
        let mut world = World::new(EngineConfig::default());
        let tray = world.arena.alloc(BodyPart::new("Sample Tray"));
        let pebble = world.arena.alloc(BodyPart::new("Pebble"));
        world.arena.attach(tray, pebble);
        let tool = world.arena.alloc(BodyPart::new("Psyfiller"));
        let who = world.spawn_character("Fitter", tool);
        let seen = Arc::new(AtomicUsize::new(0));
        let observer = Arc::clone(&seen);
        world.hooks.observe(names::IMBUE_SELECT_FAILED, move |_| {
            observer.fetch_add(1, Ordering::SeqCst);
        });
        let mut select = Interaction::new(Some(who), Some(tool), Some(tray), ActionKind::ImbueSelect);
        resolve_imbue_select(&mut world, who, &mut select).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_externalise_waste_scales_by_affect_ratio() {
        let mut world = World::new(EngineConfig::default());
        let mut reactor = BodyPart::new("Reactor");
        reactor.affect.push(StatType::new("Waste", 0.5));
        let reactor = world.arena.alloc(reactor);
        let residue = externalise_waste(&mut world, 10.0, reactor).unwrap();
        assert_eq!(residue.len(), 1);
        let root = world.actor(residue[0]).unwrap().root;
        assert_eq!(world.arena.stored(root, ContainerSlot::Contains), 5);
        assert!(externalise_waste(&mut world, 0.0, reactor)
            .unwrap()
            .is_empty());
    }
}
