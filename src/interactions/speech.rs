//! Conversation resolvers: understanding, leverage, and search returns
//!
//! Communication runs on the listener's queue. By the time a demand lands
//! here the medium has already duplicated it to every conscious target, so
//! `owner` is the side doing the hearing and `interaction.actor` the side
//! doing the talking. Understanding is scored per damage-profile axis; the
//! conversation piece carries the thresholds it must clear in `requires`.

use serde_json::json;
use tracing::debug;

use crate::abilities::calculator::AbilityCost;
use crate::actors::{character, medium};
use crate::core::error::Result;
use crate::core::types::ActorId;
use crate::hooks::{names, HookPayload};
use crate::interactions::interaction::{ActionKind, Interaction};
use crate::psyche::feedback::{self, UnderstandingAxis};
use crate::psyche::profile::{profile_named, UNDERSTANDING_DISORDERS, UNDERSTANDING_EMOTES};
use crate::psyche::{PivotKind, PsycheLeverage, PsychePivot};
use crate::stats::search_key;
use crate::world::World;

/// Score the six understanding axes for `target` listening to `source`.
///
/// Theatrical delivery is measured on the listener: an emote only lands as
/// hard as the audience is equipped to read it.
pub fn understanding_between(
    world: &World,
    source: ActorId,
    target: ActorId,
    emoting: &[f64],
) -> Vec<f64> {
    let axes = understanding_axes(world, source, target);
    let theatrical = character::ability_profile(world, target, "Theatrical").amount_draw;
    feedback::understanding(&axes, theatrical, emoting)
}

fn understanding_axes(world: &World, source: ActorId, target: ActorId) -> Vec<UnderstandingAxis> {
    let mut axes = Vec::with_capacity(6);
    for name in UNDERSTANDING_EMOTES.iter().chain(UNDERSTANDING_DISORDERS.iter()) {
        let Some(profile) = profile_named(&world.profiles, name) else {
            continue;
        };
        let projected: Vec<AbilityCost> = profile
            .functions
            .iter()
            .map(|f| character::ability_profile(world, source, &f.name))
            .collect();
        let deflected: Vec<AbilityCost> = profile
            .resistance
            .iter()
            .map(|r| character::ability_profile(world, target, &r.name))
            .collect();
        let disorder_total = if UNDERSTANDING_DISORDERS.contains(name) {
            standing_disorder(world, source, name) + standing_disorder(world, target, name)
        } else {
            0.0
        };
        axes.push(UnderstandingAxis {
            name: name.to_string(),
            source_draw: AbilityCost::merge_average(&projected, profile.functions.len())
                .amount_draw,
            target_draw: AbilityCost::merge_average(&deflected, profile.resistance.len())
                .amount_draw,
            disorder_total,
        });
    }
    axes
}

fn standing_disorder(world: &World, who: ActorId, name: &str) -> f64 {
    world
        .actor(who)
        .ok()
        .and_then(|actor| actor.as_character())
        .map(|state| state.soul.disorders.total_of(name))
        .unwrap_or(0.0)
}

/// Split a conversation piece's requirements into per-axis thresholds and
/// leverage gates. Numeric entries fill the axis thresholds in order; the
/// rest are gates, either a bare leverage name or `name:floor`.
fn parse_requires(requires: &[String], axes: usize) -> (Vec<f64>, Vec<(String, f64)>) {
    let mut thresholds = Vec::new();
    let mut gates = Vec::new();
    for req in requires {
        if thresholds.len() < axes {
            if let Ok(value) = req.trim().parse::<f64>() {
                thresholds.push(value);
                continue;
            }
        }
        let (name, floor) = match req.split_once(':') {
            Some((name, floor)) => (name.trim(), floor.trim().parse::<f64>().unwrap_or(0.0)),
            None => (req.trim(), 0.0),
        };
        if !name.is_empty() {
            gates.push((name.to_string(), floor));
        }
    }
    (thresholds, gates)
}

/// A negative threshold wants the score held at or below it; a
/// non-negative one wants the score to reach it.
fn thresholds_met(scores: &[f64], thresholds: &[f64]) -> bool {
    scores.iter().zip(thresholds).all(|(score, req)| {
        if *req < 0.0 {
            *score <= *req
        } else {
            *score >= *req
        }
    })
}

fn gate_open(world: &World, target: ActorId, source: ActorId, gates: &[(String, f64)]) -> bool {
    world
        .actor(target)
        .ok()
        .and_then(|actor| actor.as_character())
        .map(|state| {
            gates.iter().any(|(name, floor)| {
                state
                    .leveraged
                    .iter()
                    .filter(|l| l.name == *name || l.related.as_deref() == Some(name.as_str()))
                    .any(|l| l.aware_from(source) > *floor)
            })
        })
        .unwrap_or(false)
}

/// Resolve a communication demand on the listening character's queue.
///
/// Every axis threshold must pass, then any one leverage gate must open.
/// On success the piece's follow-on actions go back out through the same
/// medium, aimed at the speaker and riding the same tracker.
pub fn resolve_communication(
    world: &mut World,
    owner: ActorId,
    interaction: &mut Interaction,
) -> Result<()> {
    let Some(item) = interaction.item else {
        return Ok(());
    };
    let Some(source) = interaction.actor else {
        return Ok(());
    };
    if !is_character(world, source) || !is_character(world, owner) {
        return Ok(());
    }

    let scores = understanding_between(world, source, owner, &interaction.emoting);
    let (thresholds, gates) = {
        let node = world.arena.node(item)?;
        parse_requires(&node.requires, scores.len())
    };
    if !thresholds_met(&scores, &thresholds) {
        let payload = HookPayload::new()
            .actor(source)
            .target(owner)
            .part(item)
            .detail(json!({ "understanding": scores }));
        world.hooks.handle(names::COMMUNICATION_FAILED, &payload);
        return Ok(());
    }
    if !gates.is_empty() && !gate_open(world, owner, source, &gates) {
        let held: Vec<&str> = gates.iter().map(|(name, _)| name.as_str()).collect();
        let payload = HookPayload::new()
            .actor(source)
            .target(owner)
            .part(item)
            .detail(json!({ "understanding": scores, "gates": held }));
        world
            .hooks
            .handle(names::COMMUNICATION_FAILED_LEVERAGE, &payload);
        return Ok(());
    }

    let connections: Vec<u32> = world
        .arena
        .node(item)?
        .connections
        .iter()
        .map(|c| c.0)
        .collect();
    let payload = HookPayload::new()
        .actor(source)
        .target(owner)
        .part(item)
        .detail(json!({ "understanding": scores, "connections": connections }));
    world.hooks.handle(names::COMMUNICATION_SUCCESS, &payload);

    // Follow-on actions ride behind the opener in the action tuple.
    let followups: Vec<ActionKind> = interaction.actions.iter().skip(1).cloned().collect();
    for action in followups {
        let mut reply = Interaction::new(Some(owner), None, None, action).at(world.now());
        reply.targets = vec![source];
        reply.medium = interaction.medium;
        if let Some(tracker) = interaction.tracker {
            reply = reply.tracked(tracker);
        }
        match interaction.medium {
            Some(via) if world.actor(via).is_ok() => medium::interact(world, via, reply)?,
            _ => {
                debug!(actor = ?owner, "reply dropped, no medium to carry it");
            }
        }
    }
    Ok(())
}

/// Resolve a leverage demand on the targeted character's queue.
///
/// A cleared threshold gate lands an Explored pivot on every disorder or
/// phobia the piece's functions name, and files the piece on the target's
/// leverage ledger so later conversations can trade on it.
pub fn resolve_leverage(
    world: &mut World,
    owner: ActorId,
    interaction: &mut Interaction,
) -> Result<()> {
    let Some(item) = interaction.item else {
        return Ok(());
    };
    let Some(source) = interaction.actor else {
        return Ok(());
    };
    if !is_character(world, source) || !is_character(world, owner) {
        return Ok(());
    }

    let scores = understanding_between(world, source, owner, &interaction.emoting);
    let (thresholds, _) = {
        let node = world.arena.node(item)?;
        parse_requires(&node.requires, scores.len())
    };
    if !thresholds_met(&scores, &thresholds) {
        let payload = HookPayload::new()
            .actor(source)
            .target(owner)
            .part(item)
            .detail(json!({ "emoting": interaction.emoting }));
        world.hooks.handle(names::LEVERAGE_FAILED, &payload);
        return Ok(());
    }

    let (name, duration, functions) = {
        let node = world.arena.node(item)?;
        let functions: Vec<String> = node.functions.iter().map(|f| f.name.clone()).collect();
        (node.name.clone(), node.action_time, functions)
    };
    let now = world.now();
    let understood: f64 = scores.iter().sum();

    if let Some(state) = world.actor_mut(owner)?.as_character_mut() {
        let psychotic = state.soul.disorders.total_of("Psychotic");
        let mut pivot = PsychePivot::new(PivotKind::Explored, duration, understood * psychotic)
            .from_actor(source)
            .to_actor(owner)
            .at(now);
        pivot.related = Some(name.clone());
        for stat in &functions {
            let known = state.soul.disorders.find(stat).is_some()
                || state.soul.phobias.find(stat).is_some();
            if known {
                state
                    .pivots
                    .entry(search_key(stat))
                    .or_default()
                    .push(pivot.clone());
            }
        }
        let held = match state.leveraged.iter().position(|l| l.name == name) {
            Some(held) => held,
            None => {
                let mut fresh = PsycheLeverage::new(&name, now);
                fresh.related = Some(name.clone());
                state.leveraged.push(fresh);
                state.leveraged.len() - 1
            }
        };
        state.leveraged[held].enforce(pivot);
    }

    let payload = HookPayload::new()
        .actor(source)
        .target(owner)
        .part(item)
        .detail(json!({ "understanding": scores, "related": name }));
    world.hooks.handle(names::LEVERAGE_SUCCESS, &payload);
    Ok(())
}

/// Resolve a search supply coming back from a medium. The found actors
/// travel in `targets`; divined souls are banked on the searcher.
pub fn resolve_search(
    world: &mut World,
    owner: ActorId,
    interaction: &mut Interaction,
) -> Result<()> {
    let action = interaction.action().clone();
    let found = interaction.targets.clone();
    if action == ActionKind::SoulDivining && !found.is_empty() {
        if let Some(state) = world.actor_mut(owner)?.as_character_mut() {
            for soul in &found {
                if !state.souls.contains(soul) {
                    state.souls.push(*soul);
                }
            }
        }
    }
    let listed: Vec<String> = found.iter().map(|a| a.0.to_string()).collect();
    let payload = HookPayload::new()
        .actor(owner)
        .detail(json!({ "found": listed }));
    world.hooks.handle(action.name(), &payload);
    Ok(())
}

fn is_character(world: &World, who: ActorId) -> bool {
    world
        .actor(who)
        .ok()
        .and_then(|actor| actor.as_character())
        .is_some()
}
