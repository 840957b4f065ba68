//! Character actors: demands, willingness, feedback, and key bindings
//!
//! A character is a soul driving a body graph. Demands enter through
//! [`interact`], which prices them, annotates actuation time through the
//! supplying item and the body, and lets the psyche refuse anything it
//! cannot stomach. The per-tick pass in [`tick`] advances the queue,
//! retires finished work into delayed feedback, consolidates continuous
//! indicator drains from whatever is running, and turns held keys into
//! movement, melee guards, and holster work.
//!
//! Completion is never instant knowledge: a finished interaction sits in
//! the feedback queue until the character's analysis catches up, and only
//! then lands practice time and psyche pivots.

use serde_json::json;
use tracing::{debug, warn};

use crate::abilities::calculator::{as_ability, AbilityCost, AbilityInputs};
use crate::abilities::ease::ease_mult;
use crate::actors::bindings::{resolve_movement, BodyVector, MovementUpdate};
use crate::core::constants::{FEEDBACK_MS, JUMP_WAIT, MELEE_BLOCK_WAIT};
use crate::core::error::{EngineError, Result};
use crate::core::types::{ActorId, PartId, TrackerId};
use crate::hooks::{self, names, HookPayload};
use crate::interactions::interaction::{ActionKind, Interaction};
use crate::interactions::{dispatch, energy};
use crate::parts::ContainerSlot;
use crate::psyche::feedback;
use crate::psyche::pivot::{PivotKind, PsychePivot};
use crate::stats::{search_key, IndicatorKind, Stat};
use crate::world::World;

/// What an [`act`] request aims at: a specific body part, or an indicator
/// pool standing in for one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActFocus {
    Part(PartId),
    Indicator(IndicatorKind),
}

/// Price an ability draw for one interaction.
///
/// The ability is looked up across the soul's groups by name; a name the
/// soul has never heard of prices as a blank stat, so unskilled attempts
/// cost full freight rather than failing. Non-characters price as free.
pub fn ability_cost(
    world: &World,
    who: ActorId,
    name: &str,
    interaction: &Interaction,
) -> Result<AbilityCost> {
    let actor = world.actor(who)?;
    let Some(state) = actor.as_character() else {
        return Ok(AbilityCost::default());
    };
    let soul = &state.soul;
    let blank;
    let ability = match soul.ability(name) {
        Some(stat) => stat,
        None => {
            blank = Stat::new(name);
            &blank
        }
    };
    let skill = ability
        .group_link
        .as_ref()
        .or_else(|| ability.extra.get("Skill"))
        .and_then(|named| soul.skills.find(named))
        .or_else(|| soul.skills.find(name));
    let item_mass = interaction
        .item
        .and_then(|item| world.arena.get(item))
        .map(|node| {
            if node.weight_total != 0.0 {
                node.weight_total
            } else {
                node.weight * node.quantity as f64
            }
        })
        .unwrap_or(0.0);
    let pool_max = |kind: IndicatorKind| soul.indicator(kind).map(|i| i.max).unwrap_or(0.0);
    let inputs = AbilityInputs {
        medium_total: soul.ability_total("Medium"),
        discipline_total: soul.ability_total("Discipline"),
        conditioning_total: soul.ability_total("Conditioning"),
        energy_max: pool_max(IndicatorKind::Energy),
        fatigue_max: pool_max(IndicatorKind::Fatigue),
        concentration_max: pool_max(IndicatorKind::Concentration),
        has_body: state.has_body(),
        timing: interaction.timing,
        item_mass,
        distance: interaction.distance_ratio.unwrap_or(0.0),
        skill,
    };
    Ok(as_ability(ability, &inputs))
}

/// Price an ability in the abstract, outside any particular interaction.
pub fn ability_profile(world: &World, who: ActorId, name: &str) -> AbilityCost {
    let probe = Interaction::new(None, None, None, ActionKind::Custom(name.to_string()));
    ability_cost(world, who, name, &probe).unwrap_or_default()
}

/// Raise a demand through a body part.
///
/// The part must be free of pending demands and, for manipulators, must
/// hold something to act through. A demand with no action, or one the
/// part-item pairing refuses, falls back to the item's declared default
/// action; when even the default refuses, the demand is dropped without
/// comment. Accepted demands go on to [`interaction_setup`].
pub fn interact(world: &mut World, who: ActorId, mut interaction: Interaction) -> Result<()> {
    let Some(part) = interaction.part else {
        return Ok(());
    };
    {
        let actor = world.actor(who)?;
        // pending demands hold the part; a due one-shot does not
        let engaged = actor
            .interactions
            .iter()
            .any(|live| live.part == Some(part) && live.start == 0.0);
        if engaged {
            debug!(part = part.0, "part already engaged");
            return Ok(());
        }
    }
    let (is_manipulator, part_name) = {
        let Some(state) = world.actor(who)?.as_character() else {
            return Ok(());
        };
        (
            state.manipulators.contains(&part),
            world.arena.node(part)?.name.clone(),
        )
    };
    let held = world.arena.contents(part, ContainerSlot::Contains);
    if is_manipulator && held.is_empty() {
        world.hooks.handle(
            &hooks::unarmed(&part_name),
            &HookPayload::new().actor(who).part(part),
        );
        return Ok(());
    }
    let item = match interaction.item {
        Some(explicit) => {
            if !held.contains(&explicit) {
                return Ok(());
            }
            explicit
        }
        None => match held.first().copied() {
            Some(first) => first,
            None => return Ok(()),
        },
    };
    interaction.item = Some(item);

    let default_action = world
        .arena
        .node(item)?
        .extra
        .get("Default Action")
        .map(|name| ActionKind::parse(name));
    let requested_ok = !interaction.actions.is_empty()
        && dispatch::can_interact(world, part, item, interaction.action());
    if !requested_ok {
        let Some(default_action) = default_action else {
            return Ok(());
        };
        if interaction.actions.first() == Some(&default_action) {
            return Ok(());
        }
        interaction.actions = vec![default_action.clone()];
        if !dispatch::can_interact(world, part, item, &default_action) {
            return Ok(());
        }
    }
    interaction_setup(world, who, interaction)
}

/// Annotate and register an accepted demand.
///
/// Timing accrues twice: once through the item's supplying function path,
/// once through the body root, each part slowing the total by its lost
/// circulation and divided attention. The control timing is what an
/// unhindered body would have managed; the gap between the two, scaled by
/// psyche resistance and distance, is the modifier - and when the modifier
/// eats the whole timing the psyche refuses and the registered supply is
/// unwound as if never raised.
fn interaction_setup(world: &mut World, who: ActorId, mut interaction: Interaction) -> Result<()> {
    let now = world.now();
    let Some(part) = interaction.part else {
        return Ok(());
    };
    let Some(item) = interaction.item else {
        return Ok(());
    };

    let item_name = world.arena.node(item)?.name.clone();
    interaction.cost = ability_cost(world, who, &item_name, &interaction)?;

    {
        let part_node = world.arena.node(part)?;
        let item_node = world.arena.node(item)?;
        if !item_node.requires.is_empty()
            && !item_node.requires.iter().any(|tag| part_node.has_action(tag))
        {
            debug!(item = %item_node.name, "item requirements unmet");
            return Ok(());
        }
    }

    let action_names: Vec<String> = interaction
        .actions
        .iter()
        .map(|action| action.name().to_string())
        .collect();
    let action_refs: Vec<&str> = action_names.iter().map(|name| name.as_str()).collect();
    let path = world.arena.find_functions(item, &action_refs);
    if path.is_empty() {
        debug!(item = %item_name, "nothing in the item supplies the action");
        return Ok(());
    }
    let leading = interaction.action().clone();
    let leading_name = leading.name().to_string();

    // actuation through the item's supply path
    let mut time = world.arena.node(item)?.action_time;
    let mut control = time;
    for node_id in &path {
        let node = world.arena.node(*node_id)?;
        let avail = node.function_ratio(&leading_name);
        control += control + time;
        time += time * ((1.0 - node.circulation) + (1.0 - avail));
    }
    interaction.timing = time;
    interaction.control_timing = control;

    // register supply and seed the item's internal chain
    let tracker = TrackerId::new();
    interaction.tracker = Some(tracker);
    {
        let actor = world.actor_mut(who)?;
        actor.track(interaction.clone(), now);
        let mut derived =
            Interaction::new(None, Some(item), path.last().copied(), leading.clone())
                .tracked(tracker);
        derived.actions = interaction.actions.clone();
        actor.track_up(tracker);
        actor.interactions.push(derived);
    }
    let supply_index = world.actor(who)?.interactions.len() - 1;
    crate::actors::item::function(world, who, supply_index)?;

    // actuation through the acting body
    let root = world.arena.find_root(part);
    let mut time = world.arena.node(item)?.action_time;
    let mut control = time;
    {
        let node = world.arena.node(root)?;
        let avail = node.function_ratio(&leading_name);
        control += control + time;
        time += time * ((1.0 - node.circulation) + (1.0 - avail));
    }
    interaction.timing += time;
    interaction.control_timing += control;

    let psyche = {
        let Some(state) = world.actor(who)?.as_character() else {
            return Ok(());
        };
        feedback::psychoses_multiplier(
            &[&state.soul.phobias, &state.soul.disorders],
            &action_names,
        )
    };
    let distance = energy::resolve_distance(world, who, &mut interaction) + 1.0;
    let modifier = psyche * (interaction.control_timing - interaction.timing) * distance;
    if interaction.timing - modifier < 0.0 {
        stop_tracked(world, who, tracker)?;
        debug!(action = %leading_name, "psyche refused the interaction");
        return Ok(());
    }
    interaction.modifier = modifier;
    world.actor_mut(who)?.interactions.push(interaction);
    Ok(())
}

/// Unwind a registered supply: the derived chain entries and the tracker
/// go as if the demand had never been accepted.
fn stop_tracked(world: &mut World, who: ActorId, tracker: TrackerId) -> Result<()> {
    let actor = world.actor_mut(who)?;
    actor
        .interactions
        .retain(|live| live.actor.is_some() || live.tracker != Some(tracker));
    actor.tracking.remove(&tracker);
    Ok(())
}

/// Advance one character by one tick.
pub fn tick(world: &mut World, who: ActorId) -> Result<()> {
    refresh_indicators(world, who)?;
    queue_pass(world, who)?;
    settle_tracking(world, who)?;
    age_feedback(world, who)?;
    consolidate_ms(world, who)?;
    {
        let diff = world.clock.diff;
        if let Some(state) = world.actor_mut(who)?.as_character_mut() {
            state.soul.tick_indicators(diff);
        }
    }
    held_bindings(world, who)?;
    announce_vector(world, who)
}

/// Recompute indicator maxima from the body graph and soul stats.
fn refresh_indicators(world: &mut World, who: ActorId) -> Result<()> {
    let body = world.actor(who)?.as_character().and_then(|state| state.body);
    let Some(body) = body else {
        return Ok(());
    };
    let vital: f64 = world
        .arena
        .find_kind(body, "Vital", true)
        .iter()
        .filter_map(|id| world.arena.get(*id))
        .map(|node| node.health_ceiling())
        .sum();
    let (weight, _) = world.arena.measure(body);
    let Some(state) = world.actor_mut(who)?.as_character_mut() else {
        return Ok(());
    };
    let sources = state.soul.indicator_sources(vital, weight);
    for indicator in &mut state.soul.indicators {
        indicator.recalc_max(&sources);
    }
    Ok(())
}

/// Walk the interaction queue once.
///
/// Ownerless entries are item supply chains and run through the item
/// actor code against this character as host. Owned entries dispatch to
/// their resolvers; an entry whose started timing has run out retires
/// into feedback. Demands that never start (annotated waiting work)
/// retire through tracker settlement instead.
fn queue_pass(world: &mut World, who: ActorId) -> Result<()> {
    let mut index = 0;
    loop {
        let entry = {
            let actor = world.actor(who)?;
            match actor.interactions.get(index) {
                Some(entry) if entry.unblocked() => entry.clone(),
                Some(_) => {
                    index += 1;
                    continue;
                }
                None => break,
            }
        };
        match entry.actor {
            None => {
                if !crate::actors::item::function(world, who, index)? {
                    index += 1;
                }
            }
            Some(origin) => {
                let mut live = entry;
                dispatch::dispatch(world, who, &mut live)?;
                let finished = live.start != 0.0 && live.timing <= 0.0;
                let actor = world.actor_mut(who)?;
                if finished {
                    if index < actor.interactions.len() {
                        actor.interactions.remove(index);
                    }
                    interact_feedback(world, origin, &live)?;
                } else {
                    if let Some(slot) = actor.interactions.get_mut(index) {
                        *slot = live;
                    }
                    index += 1;
                }
            }
        }
    }
    Ok(())
}

/// Feed settled trackers back to their demanders. The supplying item
/// wears by the annotated timing once per completed run.
fn settle_tracking(world: &mut World, who: ActorId) -> Result<()> {
    let settled = world.actor_mut(who)?.drain_settled();
    for done in settled {
        if let Some(item) = done.interaction.item {
            if let Ok(node) = world.arena.node_mut(item) {
                node.fatigue += done.interaction.timing;
            }
        }
        if let Some(origin) = done.interaction.actor {
            interact_feedback(world, origin, &done.interaction)?;
        }
    }
    Ok(())
}

/// Queue completion feedback on the originating character.
///
/// The delay before the feedback lands shrinks with the character's
/// analysis; anything staged behind the finished interaction is released
/// immediately so chained work does not wait on comprehension.
pub fn interact_feedback(world: &mut World, who: ActorId, interaction: &Interaction) -> Result<()> {
    if interaction.actor != Some(who) {
        return Ok(());
    }
    let amount = ability_profile(world, who, "Model Analysis").amount_draw;
    let actor = world.actor_mut(who)?;
    if let Some(tracker) = interaction.tracker {
        for waiting in &mut actor.interactions {
            waiting.complete_requirement(tracker);
        }
    }
    let position = actor.interactions.iter().position(|live| {
        (interaction.tracker.is_some() && live.tracker == interaction.tracker)
            || (live.actor == interaction.actor
                && live.part == interaction.part
                && live.actions == interaction.actions)
    });
    let mut done = match position {
        Some(at) => actor.interactions.remove(at),
        None => interaction.clone(),
    };
    done.action_frames = 0.0;
    done.feedback_time = (FEEDBACK_MS - ease_mult(amount, FEEDBACK_MS)).max(0.0);
    let Some(state) = actor.as_character_mut() else {
        return Ok(());
    };
    state.feedback_queue.push(done);
    world.hooks.handle(
        names::INTERACT_FEEDBACK,
        &HookPayload::new().actor(who).detail(json!({
            "action": interaction.action_name(),
            "timing": interaction.timing,
        })),
    );
    Ok(())
}

/// Age queued feedback and land whatever has ripened: practice time on
/// the ability matching the item used, psyche pivots on every phobia and
/// disorder the actions touch.
fn age_feedback(world: &mut World, who: ActorId) -> Result<()> {
    let diff = world.clock.diff;
    let now = world.now();
    let ripened = {
        let Some(state) = world.actor_mut(who)?.as_character_mut() else {
            return Ok(());
        };
        let mut ripe = Vec::new();
        let mut kept = Vec::new();
        for mut done in state.feedback_queue.drain(..) {
            done.action_frames += diff;
            if done.action_frames > done.feedback_time {
                ripe.push(done);
            } else {
                kept.push(done);
            }
        }
        state.feedback_queue = kept;
        ripe
    };
    for done in ripened {
        if let Some(tracker) = done.tracker {
            let actor = world.actor_mut(who)?;
            for waiting in &mut actor.interactions {
                waiting.complete_requirement(tracker);
            }
        }
        let practice = done
            .item
            .and_then(|item| world.arena.get(item))
            .map(|node| node.name.clone())
            .unwrap_or_else(|| done.action_name().to_string());
        let action_names: Vec<String> = done
            .actions
            .iter()
            .map(|action| action.name().to_string())
            .collect();
        let Some(state) = world.actor_mut(who)?.as_character_mut() else {
            return Ok(());
        };
        if let Some(ability) = state.soul.abilities.find_mut(&practice) {
            ability.time = (ability.time + done.timing).max(0.0);
        }
        let landed = feedback::interaction_feedback(
            &mut state.soul.phobias,
            &mut state.soul.disorders,
            &mut state.pivots,
            &action_names,
            done.timing,
            now,
            done.actor,
        );
        world.hooks.handle(
            names::CHARACTER_FEEDBACK,
            &HookPayload::new().actor(who).detail(json!({
                "action": done.action_name(),
                "pivots": landed,
            })),
        );
    }
    Ok(())
}

/// Rebuild the continuous indicator drains from the running queue.
///
/// Each running interaction maps item name -> ability -> skill -> the
/// stats the skill draws through, and each stat's draw ratios route the
/// priced per-millisecond costs into the energy, fatigue, and
/// concentration pools. A bodiless soul holds no fatigue or health at
/// all; an embodied one bleeds health at the sum of its vital parts'
/// decay.
fn consolidate_ms(world: &mut World, who: ActorId) -> Result<()> {
    let running: Vec<(Option<PartId>, String, AbilityCost)> = world
        .actor(who)?
        .interactions
        .iter()
        .map(|live| (live.item, live.action_name().to_string(), live.cost.clone()))
        .collect();
    let mut named: Vec<(String, AbilityCost)> = Vec::with_capacity(running.len());
    for (item, action, cost) in running {
        let search = item
            .and_then(|id| world.arena.get(id))
            .map(|node| node.name.clone())
            .unwrap_or(action);
        named.push((search, cost));
    }
    let body = world.actor(who)?.as_character().and_then(|state| state.body);
    let vital_ms: f64 = body
        .map(|b| {
            world
                .arena
                .find_kind(b, "Vital", true)
                .iter()
                .filter_map(|id| world.arena.get(*id))
                .map(|node| node.health_ms)
                .sum()
        })
        .unwrap_or(0.0);
    let Some(state) = world.actor_mut(who)?.as_character_mut() else {
        return Ok(());
    };
    let mut energy_ms = 0.0;
    let mut fatigue_ms = 0.0;
    let mut concentration_ms = 0.0;
    for (search, cost) in &named {
        let Some(ability) = state.soul.abilities.find(search) else {
            continue;
        };
        let Some(skill) = ability
            .extra
            .get("Skill")
            .and_then(|name| state.soul.skills.find(name))
        else {
            continue;
        };
        let Some(stat_names) = skill.extra.get("Stat") else {
            continue;
        };
        for stat_name in stat_names.split('|') {
            let Some(stat) = state.soul.stats.find(stat_name.trim()) else {
                continue;
            };
            for draw in &stat.draw {
                match draw.name.as_str() {
                    "Energy" => energy_ms += cost.energy_ms * draw.total(),
                    "Fatigue" => fatigue_ms += cost.fatigue_ms * draw.total(),
                    "Concentration" => concentration_ms += cost.concentration_ms * draw.total(),
                    _ => {}
                }
            }
        }
    }
    if let Some(indicator) = state.soul.indicator_mut(IndicatorKind::Energy) {
        indicator.ms = energy_ms;
    }
    if let Some(indicator) = state.soul.indicator_mut(IndicatorKind::Concentration) {
        indicator.ms = concentration_ms;
    }
    if state.has_body() {
        if let Some(indicator) = state.soul.indicator_mut(IndicatorKind::Fatigue) {
            indicator.ms = fatigue_ms;
        }
        if let Some(indicator) = state.soul.indicator_mut(IndicatorKind::Health) {
            indicator.ms = vital_ms;
        }
    } else {
        for kind in [IndicatorKind::Fatigue, IndicatorKind::Health] {
            if let Some(indicator) = state.soul.indicator_mut(kind) {
                indicator.ms = 0.0;
                indicator.offset = indicator.max;
            }
        }
    }
    Ok(())
}

/// Act on keys currently held: melee guards past their wait, and hold
/// thresholds like the reload key's holster-everything.
fn held_bindings(world: &mut World, who: ActorId) -> Result<()> {
    let diff = world.clock.diff;
    let held: Vec<(String, f64, Option<f64>)> = {
        let Some(state) = world.actor_mut(who)?.as_character_mut() else {
            return Ok(());
        };
        state
            .held_keys
            .accumulate(diff)
            .into_iter()
            .map(|(key, total)| {
                let threshold = state.bindings.hold_ms(&key);
                (key, total, threshold)
            })
            .collect()
    };
    for (key, total, threshold) in held {
        match key.as_str() {
            // jumping charges on hold and fires on release
            "space" => {}
            "j" | "k" => {
                if total < MELEE_BLOCK_WAIT {
                    continue;
                }
                let name = if key == "j" {
                    names::MELEE_BLOCK_LEFT
                } else {
                    names::MELEE_BLOCK_RIGHT
                };
                world
                    .hooks
                    .handle(name, &HookPayload::new().actor(who).detail(json!(total)));
            }
            "r" => {
                let Some(threshold) = threshold else { continue };
                if total < threshold {
                    continue;
                }
                let first_crossing = {
                    let Some(state) = world.actor_mut(who)?.as_character_mut() else {
                        return Ok(());
                    };
                    state.skip_release.insert(key.clone())
                };
                if first_crossing {
                    act(world, who, "Holster", None, None)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn announce_vector(world: &mut World, who: ActorId) -> Result<()> {
    let payload = {
        let Some(state) = world.actor(who)?.as_character() else {
            return Ok(());
        };
        json!({
            "movement": state.vector.movement,
            "speed": state.vector.speed,
            "bearing": state.vector.bearing,
            "posture": state.vector.posture,
            "posture_ratio": state.vector.posture_ratio,
        })
    };
    world.hooks.handle(
        names::CHARACTER_VECTOR,
        &HookPayload::new().actor(who).detail(payload),
    );
    Ok(())
}

/// Stop whatever a part is being supplied for a named function: demands
/// running through any of the part's connections that answer the
/// function are cut, their supply chains unwound, and feedback queued as
/// if each had finished where it stood.
pub fn stop_interaction(
    world: &mut World,
    who: ActorId,
    functioning: &str,
    part: Option<PartId>,
) -> Result<()> {
    let part = match part {
        Some(part) => part,
        None => {
            let root = world.actor(who)?.root;
            match world.arena.find_functions(root, &[functioning]).first().copied() {
                Some(found) => found,
                None => return Ok(()),
            }
        }
    };
    let supplying: Vec<PartId> = world
        .arena
        .node(part)?
        .connections
        .iter()
        .copied()
        .filter(|conn| {
            world
                .arena
                .get(*conn)
                .map(|node| node.function_named(functioning).is_some())
                .unwrap_or(false)
        })
        .collect();
    let stopped: Vec<Interaction> = {
        let actor = world.actor_mut(who)?;
        let mut stopped = Vec::new();
        let mut index = 0;
        while index < actor.interactions.len() {
            let live = &actor.interactions[index];
            let cut = live.actor == Some(who)
                && (live.part == Some(part)
                    || live.item.map(|i| supplying.contains(&i)).unwrap_or(false));
            if cut {
                stopped.push(actor.interactions.remove(index));
            } else {
                index += 1;
            }
        }
        stopped
    };
    for live in &stopped {
        if let Some(tracker) = live.tracker {
            stop_tracked(world, who, tracker)?;
        }
    }
    for live in stopped {
        interact_feedback(world, who, &live)?;
    }
    Ok(())
}

/// Route a named act to its handler. Acts are deliberate whole-body
/// manoeuvres; unlike demands they queue their interactions directly.
pub fn act(
    world: &mut World,
    who: ActorId,
    action: &str,
    focus: Option<ActFocus>,
    target: Option<PartId>,
) -> Result<()> {
    match ActionKind::parse(action) {
        ActionKind::PsyCharge => act_psy_charge(world, who, focus, target),
        ActionKind::Throw => act_throw(world, who, focus, target),
        ActionKind::Reload => act_reload(world, who, focus, target),
        kind @ (ActionKind::Holster | ActionKind::Unholster | ActionKind::ToggleHolster) => {
            act_holster(world, who, kind, focus, target)
        }
        other => {
            world.hooks.handle(
                names::ACT_UNKNOWN,
                &HookPayload::new()
                    .actor(who)
                    .detail(json!({ "action": other.name() })),
            );
            Ok(())
        }
    }
}

/// Stage holster or draw work across every manipulator.
///
/// Packing stages one interaction per held item towards its remembered
/// pack location (or wherever the torso will take it); constructs
/// dissolve instead of packing. Drawing stages the reverse, and a hand
/// that must empty itself first chains its draw behind its own packing
/// through a tracker requirement. Readied flags flip at staging time;
/// the resolvers move the actual items when the staged timings lapse.
fn act_holster(
    world: &mut World,
    who: ActorId,
    mode: ActionKind,
    focus: Option<ActFocus>,
    target: Option<PartId>,
) -> Result<()> {
    let (manipulators, torso, pack_snapshot) = {
        let Some(state) = world.actor(who)?.as_character() else {
            return Ok(());
        };
        (state.manipulators.clone(), state.torso, state.pack.clone())
    };
    if manipulators.is_empty() {
        return Ok(());
    }
    let lead = match focus {
        Some(ActFocus::Part(part)) => part,
        _ => manipulators[0],
    };
    if !manipulators.contains(&lead) {
        return Ok(());
    }
    let lead_readied = {
        let Some(state) = world.actor(who)?.as_character() else {
            return Ok(());
        };
        state.is_readied(lead)
    };
    let drawing = match mode {
        ActionKind::Unholster => {
            if lead_readied {
                return Ok(());
            }
            true
        }
        ActionKind::Holster => {
            if !lead_readied {
                return Ok(());
            }
            false
        }
        _ => !lead_readied,
    };

    // only the focused hand moves when one was named
    let hands: Vec<PartId> = match focus {
        Some(ActFocus::Part(part)) => vec![part],
        _ => manipulators.clone(),
    };
    let mut stages: Vec<Interaction> = Vec::new();
    let mut pack_updates: Vec<(PartId, PartId)> = Vec::new();
    for hand in hands.iter().copied() {
        let held = world.arena.contents(hand, ContainerSlot::Contains);
        let wanted: Option<PartId> = if drawing {
            match target {
                Some(t) if t == hand => None,
                Some(t) if hand == lead => Some(t),
                _ => pack_snapshot.get(&hand).and_then(|loc| {
                    world
                        .arena
                        .contents(*loc, ContainerSlot::Contains)
                        .first()
                        .copied()
                }),
            }
        } else {
            None
        };
        if drawing && wanted.is_some() && held.contains(&wanted.unwrap_or(hand)) {
            continue;
        }
        let mut chain: Option<TrackerId> = None;
        let packing = !drawing || (!held.is_empty() && wanted.is_some());
        if packing {
            for item in &held {
                let node = world.arena.node(*item)?;
                let dissolves = node.kind == "Construct";
                let mut stage =
                    Interaction::new(Some(who), Some(hand), Some(*item), ActionKind::Holster);
                if !dissolves {
                    let location = pack_snapshot
                        .get(item)
                        .copied()
                        .or_else(|| torso.and_then(|t| world.arena.find_packable(t, *item)));
                    let Some(location) = location else {
                        debug!(item = item.0, "nowhere to stow");
                        continue;
                    };
                    stage = stage.with_target_part(location);
                    pack_updates.push((*item, location));
                    pack_updates.push((hand, location));
                }
                let tracker = TrackerId::new();
                stage.tracker = Some(tracker);
                chain = Some(tracker);
                stages.push(stage);
            }
        }
        if drawing {
            let mut stage = Interaction::new(Some(who), Some(hand), wanted, ActionKind::Unholster);
            stage.tracker = Some(TrackerId::new());
            if let Some(tracker) = chain {
                stage.requires.insert(tracker);
            }
            stages.push(stage);
        }
    }
    {
        let Some(state) = world.actor_mut(who)?.as_character_mut() else {
            return Ok(());
        };
        for (key, location) in pack_updates {
            state.pack.insert(key, location);
        }
        for hand in &hands {
            state.set_readied(*hand, drawing);
        }
    }
    world.actor_mut(who)?.interactions.extend(stages);
    Ok(())
}

/// Fill ratio shortfall over an item's reload feeds, 0 for items without
/// any, rounded to one decimal so a nearly-full weapon is left alone.
fn reload_needs(world: &World, item: PartId) -> Result<f64> {
    let feeds = world.arena.find_functions(item, &["Reload"]);
    if feeds.is_empty() {
        return Ok(0.0);
    }
    let mut lowest = 1.0_f64;
    for feed in feeds {
        let node = world.arena.node(feed)?;
        let ratio = match node.contains.as_ref().and_then(|c| c.quantity_max) {
            Some(max) if max > 0 => {
                world.arena.stored(feed, ContainerSlot::Contains) as f64 / max as f64
            }
            _ => 1.0,
        };
        lowest = lowest.min(ratio);
    }
    Ok(((1.0 - lowest) * 10.0).round() / 10.0)
}

/// Reload every needy held weapon, most depleted first. One hand works
/// the swaps: an empty hand if there is one, otherwise a hand holding
/// nothing needy, otherwise the least depleted weapon's hand gives way.
fn act_reload(
    world: &mut World,
    who: ActorId,
    _focus: Option<ActFocus>,
    _target: Option<PartId>,
) -> Result<()> {
    let manipulators = {
        let Some(state) = world.actor(who)?.as_character() else {
            return Ok(());
        };
        state.manipulators.clone()
    };
    let mut needy: Vec<(PartId, PartId, f64)> = Vec::new();
    let mut free: Vec<PartId> = Vec::new();
    for hand in &manipulators {
        let held = world.arena.contents(*hand, ContainerSlot::Contains);
        if held.is_empty() {
            free.push(*hand);
            continue;
        }
        let mut worst = 0.0_f64;
        for item in &held {
            let needs = reload_needs(world, *item)?;
            if needs > 0.0 {
                needy.push((*hand, *item, needs));
            }
            worst = worst.max(needs);
        }
        if worst == 0.0 {
            free.push(*hand);
        }
    }
    if needy.is_empty() {
        return Ok(());
    }
    needy.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
    let empty_hand = free
        .iter()
        .copied()
        .find(|hand| world.arena.contents(*hand, ContainerSlot::Contains).is_empty());
    let reloader = empty_hand
        .or_else(|| free.first().copied())
        .or_else(|| (needy.len() >= 2).then(|| needy[needy.len() - 1].0));
    let Some(reloader) = reloader else {
        world
            .hooks
            .handle(names::RELOAD_FAILURE, &HookPayload::new().actor(who));
        return Ok(());
    };
    if !world
        .arena
        .contents(reloader, ContainerSlot::Contains)
        .is_empty()
    {
        act_holster(world, who, ActionKind::Holster, Some(ActFocus::Part(reloader)), None)?;
    }
    let now = world.now();
    for (hand, item, _) in needy {
        let stage = Interaction::new(Some(who), Some(hand), Some(item), ActionKind::Reload).at(now);
        world.actor_mut(who)?.interactions.push(stage);
    }
    Ok(())
}

/// Throw something from a hand. A throwable not currently held is packed
/// for and drawn first, and anything else the hand carried is drawn back
/// once the throw is away.
fn act_throw(
    world: &mut World,
    who: ActorId,
    focus: Option<ActFocus>,
    target: Option<PartId>,
) -> Result<()> {
    let manipulators = {
        let Some(state) = world.actor(who)?.as_character() else {
            return Ok(());
        };
        state.manipulators.clone()
    };
    let hand = match focus {
        Some(ActFocus::Part(part)) => part,
        _ => match manipulators.first().copied() {
            Some(hand) => hand,
            None => return Ok(()),
        },
    };
    let held = world.arena.contents(hand, ContainerSlot::Contains);
    let Some(thrown) = target.or_else(|| held.first().copied()) else {
        return Ok(());
    };
    let now = world.now();
    let mut fling = Interaction::new(Some(who), Some(hand), Some(thrown), ActionKind::Throw).at(now);
    let fling_tracker = TrackerId::new();
    fling.tracker = Some(fling_tracker);
    if !held.contains(&thrown) {
        act_holster(world, who, ActionKind::Holster, Some(ActFocus::Part(hand)), None)?;
        act_holster(
            world,
            who,
            ActionKind::Unholster,
            Some(ActFocus::Part(hand)),
            Some(thrown),
        )?;
        let drawing = world
            .actor(who)?
            .interactions
            .iter()
            .rev()
            .find(|live| live.part == Some(hand) && live.action() == &ActionKind::Unholster)
            .and_then(|live| live.tracker);
        if let Some(tracker) = drawing {
            fling.requires.insert(tracker);
        }
    }
    world.actor_mut(who)?.interactions.push(fling);
    for item in held.iter().filter(|item| **item != thrown) {
        let mut redraw = Interaction::new(Some(who), Some(hand), Some(*item), ActionKind::Unholster);
        redraw.requires.insert(fling_tracker);
        world.actor_mut(who)?.interactions.push(redraw);
    }
    Ok(())
}

/// Whether an item can carry a psychic charge at all.
fn channels_psy(world: &World, item: PartId) -> bool {
    if !world.arena.find_functions(item, &["Psy Charge"]).is_empty() {
        return true;
    }
    let key = search_key("Psy Charge");
    world
        .arena
        .get(item)
        .map(|node| node.requires.iter().any(|r| search_key(r) == key))
        .unwrap_or(false)
}

/// Open psychic charging channels. Without a focus every held channeling
/// item charges through its hand; a focused request charges one target
/// from a named part store or an indicator pool. The queued entries stay
/// until stopped - charging is continuous, not staged.
fn act_psy_charge(
    world: &mut World,
    who: ActorId,
    focus: Option<ActFocus>,
    target: Option<PartId>,
) -> Result<()> {
    let manipulators = {
        let Some(state) = world.actor(who)?.as_character() else {
            return Ok(());
        };
        state.manipulators.clone()
    };
    match focus {
        None => {
            for hand in manipulators {
                let held = world.arena.contents(hand, ContainerSlot::Contains);
                for item in held {
                    if channels_psy(world, item) {
                        let charge =
                            Interaction::new(Some(who), Some(hand), Some(item), ActionKind::PsyCharge);
                        world.actor_mut(who)?.interactions.push(charge);
                    }
                }
            }
            Ok(())
        }
        Some(ActFocus::Indicator(kind)) => {
            let Some(item) = target else {
                return Ok(());
            };
            if !channels_psy(world, item) {
                return Ok(());
            }
            let mut charge = Interaction::new(Some(who), None, Some(item), ActionKind::PsyCharge);
            charge.indicator = Some(kind);
            world.actor_mut(who)?.interactions.push(charge);
            Ok(())
        }
        Some(ActFocus::Part(part)) => {
            let Some(item) = target else {
                return Ok(());
            };
            if !channels_psy(world, item) {
                return Ok(());
            }
            let charge = Interaction::new(Some(who), Some(part), Some(item), ActionKind::PsyCharge);
            world.actor_mut(who)?.interactions.push(charge);
            Ok(())
        }
    }
}

/// Spend allocation points from a console command: stat groups allocate
/// directly, psyche groups land analysed pivots on an existing stat.
pub fn allocate(
    world: &mut World,
    who: ActorId,
    group: &str,
    name: &str,
    points: f64,
) -> Result<()> {
    let now = world.now();
    let ceiling = world.config.stat_alloc;
    let Some(state) = world.actor_mut(who)?.as_character_mut() else {
        return Ok(());
    };
    match group {
        "stats" => {
            state.soul.stats.allocate(name, points);
        }
        "disciplines" => {
            state.soul.disciplines.allocate(name, points);
        }
        "skills" => {
            state.soul.skills.allocate(name, points);
        }
        "disorders" | "phobias" => {
            let found = if group == "disorders" {
                state.soul.disorders.find(name)
            } else {
                state.soul.phobias.find(name)
            };
            let Some(stat) = found else {
                warn!(group, name, "no such psyche stat to deepen");
                return Ok(());
            };
            let key = stat.search.clone();
            let pivot = PsychePivot::new(PivotKind::Analysed, points, 1.0)
                .at(now)
                .to_actor(who);
            state.pivots.entry(key).or_default().push(pivot);
        }
        _ => {
            warn!(group, "unknown allocation group");
            return Ok(());
        }
    }
    state.soul.consolidate(ceiling);
    Ok(())
}

fn allocate_command(world: &mut World, who: ActorId, rest: &str) -> Result<()> {
    let words: Vec<&str> = rest.split_whitespace().collect();
    if words.len() < 3 {
        return Ok(());
    }
    let group = words[0].to_lowercase();
    let Ok(points) = words[words.len() - 1].parse::<f64>() else {
        return Ok(());
    };
    let name = words[1..words.len() - 1].join(" ");
    allocate(world, who, &group, &name, points)
}

/// A key went down.
///
/// Console prefixes ("m ..." allocation, "save") resolve before the
/// binding table; unknown keys are ignored, repeats are suppressed, and
/// an unconscious body registers the press but does nothing with it.
pub fn binding_down(world: &mut World, who: ActorId, physical: &str) -> Result<()> {
    let trimmed = physical.trim();
    if let Some(rest) = trimmed.strip_prefix("m ") {
        return allocate_command(world, who, rest);
    }
    if trimmed == "save" {
        world
            .hooks
            .handle(names::CHARACTER_SAVE, &HookPayload::new().actor(who));
        return Ok(());
    }
    let logical = {
        let Some(state) = world.actor(who)?.as_character() else {
            return Ok(());
        };
        match state.bindings.known(trimmed) {
            Some(logical) => logical.to_string(),
            None => return Ok(()),
        }
    };
    {
        let Some(state) = world.actor_mut(who)?.as_character_mut() else {
            return Ok(());
        };
        if state.held_keys.is_held(&logical)
            || state.last_pressed.as_deref() == Some(logical.as_str())
        {
            return Ok(());
        }
        if !state.pressed.insert(logical.clone()) {
            return Ok(());
        }
        if !state.is_conscious() {
            return Ok(());
        }
    }
    match logical.as_str() {
        "j" | "k" => melee_binding(world, who, &logical)?,
        "w" | "a" | "s" | "d" | "shift" | "ctrl" | "alt" => {
            let update = {
                let Some(state) = world.actor(who)?.as_character() else {
                    return Ok(());
                };
                resolve_movement(&state.held_keys, Some(&logical))
            };
            apply_movement(world, who, update)?;
        }
        "v" => psychic_binding(world, who)?,
        "tab" => {
            world
                .hooks
                .handle(names::TAB_MENU_SHOW, &HookPayload::new().actor(who));
        }
        "i" => {
            world
                .hooks
                .handle(names::INVENTORY_TOGGLE, &HookPayload::new().actor(who));
        }
        "c" => {
            world
                .hooks
                .handle(names::CHARACTER_SHEET_TOGGLE, &HookPayload::new().actor(who));
        }
        "t" => {
            world.hooks.handle(names::NOTES, &HookPayload::new().actor(who));
        }
        "m" => {
            world.hooks.handle(names::MAP, &HookPayload::new().actor(who));
        }
        // space, r, e: hold and release carry the meaning
        _ => {}
    }
    let Some(state) = world.actor_mut(who)?.as_character_mut() else {
        return Ok(());
    };
    if !matches!(logical.as_str(), "i" | "c" | "e") {
        state.held_keys.press(&logical);
    }
    state.last_pressed = Some(logical);
    Ok(())
}

/// A key came up. Movement rereads the remaining chord, melee keys cut
/// their running demands, jump and menus fire, and a release consumed by
/// a hold action is swallowed.
pub fn binding_up(world: &mut World, who: ActorId, physical: &str) -> Result<()> {
    let logical = {
        let Some(state) = world.actor(who)?.as_character() else {
            return Ok(());
        };
        match state.bindings.known(physical.trim()) {
            Some(logical) => logical.to_string(),
            None => return Ok(()),
        }
    };
    {
        let Some(state) = world.actor_mut(who)?.as_character_mut() else {
            return Ok(());
        };
        state.pressed.remove(&logical);
        if state.skip_release.remove(&logical) {
            state.held_keys.release(&logical);
            if state.last_pressed.as_deref() == Some(logical.as_str()) {
                state.last_pressed = None;
            }
            return Ok(());
        }
    }
    match logical.as_str() {
        "j" | "k" => stop_melee(world, who, &logical)?,
        "w" | "a" | "s" | "d" | "shift" | "ctrl" | "alt" => {
            // drop the key first so the chord reads what is still down
            let update = {
                let Some(state) = world.actor_mut(who)?.as_character_mut() else {
                    return Ok(());
                };
                state.held_keys.release(&logical);
                resolve_movement(&state.held_keys, None)
            };
            apply_movement(world, who, update)?;
        }
        "space" => {
            // still held at this point, so the charge window is readable
            let charged = {
                let Some(state) = world.actor(who)?.as_character() else {
                    return Ok(());
                };
                state.held_keys.held_for("space").unwrap_or(0.0) >= JUMP_WAIT
            };
            world.hooks.handle(
                names::JUMP,
                &HookPayload::new().actor(who).detail(json!({ "charged": charged })),
            );
        }
        "tab" => {
            world
                .hooks
                .handle(names::TAB_MENU_HIDE, &HookPayload::new().actor(who));
        }
        "r" => act(world, who, "Reload", None, None)?,
        "v" => {
            let actor = world.actor_mut(who)?;
            actor.interactions.retain(|live| {
                !(live.actor == Some(who) && live.action() == &ActionKind::PsyCharge)
            });
        }
        _ => {}
    }
    let Some(state) = world.actor_mut(who)?.as_character_mut() else {
        return Ok(());
    };
    state.held_keys.release(&logical);
    if state.last_pressed.as_deref() == Some(logical.as_str()) {
        state.last_pressed = None;
    }
    Ok(())
}

/// The melee keys drive the indexed manipulators; an unreadied pair
/// draws first. Holding the stance key routes the strike through the
/// matching foot instead.
fn melee_binding(world: &mut World, who: ActorId, key: &str) -> Result<()> {
    let (hand, ready) = {
        let Some(state) = world.actor(who)?.as_character() else {
            return Ok(());
        };
        let index = if key == "j" { 0 } else { 1 };
        let Some(hand) = state.manipulators.get(index).copied() else {
            return Ok(());
        };
        (hand, state.is_readied(hand))
    };
    if !ready {
        return act(world, who, "UnHolster", None, None);
    }
    let part = {
        let Some(state) = world.actor(who)?.as_character() else {
            return Ok(());
        };
        if state.held_keys.is_held("x") {
            let name = if key == "j" { "Left Foot" } else { "Right Foot" };
            state
                .body
                .and_then(|body| world.arena.find_name(body, name, true).last().copied())
                .unwrap_or(hand)
        } else {
            hand
        }
    };
    // no action named: the held item's default decides what this becomes
    let mut strike = Interaction::new(Some(who), Some(part), None, ActionKind::Impact);
    strike.actions.clear();
    interact(world, who, strike)
}

fn stop_melee(world: &mut World, who: ActorId, key: &str) -> Result<()> {
    let hand = {
        let Some(state) = world.actor(who)?.as_character() else {
            return Ok(());
        };
        let index = if key == "j" { 0 } else { 1 };
        match state.manipulators.get(index).copied() {
            Some(hand) => hand,
            None => return Ok(()),
        }
    };
    let running: Vec<String> = world
        .actor(who)?
        .interactions
        .iter()
        .filter(|live| live.actor == Some(who) && live.part == Some(hand))
        .map(|live| live.action_name().to_string())
        .collect();
    for action in running {
        stop_interaction(world, who, &action, Some(hand))?;
    }
    Ok(())
}

/// The psychic key: when the body supplies the function at all, every
/// held item opens an energy-pool charging channel.
fn psychic_binding(world: &mut World, who: ActorId) -> Result<()> {
    let (body, manipulators) = {
        let Some(state) = world.actor(who)?.as_character() else {
            return Ok(());
        };
        (state.body, state.manipulators.clone())
    };
    let Some(body) = body else {
        return Ok(());
    };
    if world.arena.find_functions(body, &["Psychic"]).is_empty() {
        return Ok(());
    }
    for hand in manipulators {
        let held = world.arena.contents(hand, ContainerSlot::Contains);
        if let Some(item) = held.first().copied() {
            act(
                world,
                who,
                "Psy Charge",
                Some(ActFocus::Indicator(IndicatorKind::Energy)),
                Some(item),
            )?;
        }
    }
    Ok(())
}

fn apply_movement(world: &mut World, who: ActorId, update: (MovementUpdate, bool)) -> Result<()> {
    let (movement, crouch) = update;
    let Some(state) = world.actor_mut(who)?.as_character_mut() else {
        return Ok(());
    };
    match movement {
        MovementUpdate::Keep => {}
        MovementUpdate::Still => {
            let bearing = state.vector.bearing;
            state.vector.set_movement("Still", 0.0, bearing);
        }
        MovementUpdate::Set {
            movement,
            speed,
            bearing,
        } => state.vector.set_movement(movement, speed, bearing),
    }
    state
        .vector
        .set_posture(if crouch { "Crouching" } else { "Standing" });
    Ok(())
}

/// Incarnate a soul into a body graph.
///
/// The root takes the character's name, manipulators and torso are wired
/// up, a fresh account is strapped to the torso, and the indicators reset
/// to full before recalculating against the new flesh. A permanent
/// affects interaction joins the queue so passive effects announce every
/// tick.
pub fn birth(world: &mut World, who: ActorId, root: PartId) -> Result<()> {
    let name = world.actor(who)?.name.clone();
    {
        let node = world.arena.node_mut(root)?;
        node.name = name.clone();
        node.search = search_key(&node.name);
    }
    let manipulators = world.arena.find_functions(root, &["Manipulation"]);
    let torso = world
        .arena
        .find_name(root, "Body", true)
        .first()
        .copied()
        .or_else(|| world.arena.find_affect(root, "Replaces").first().copied())
        .ok_or_else(|| EngineError::Precondition(format!("{name} has no torso to dress")))?;
    let account = world
        .templates
        .spawn(&mut world.arena, "Account")
        .ok_or_else(|| EngineError::Template("Account".into()))?;
    world.arena.attach(torso, account);
    let ceiling = world.config.stat_alloc;
    {
        let actor = world.actor_mut(who)?;
        actor.root = root;
        let Some(state) = actor.as_character_mut() else {
            return Ok(());
        };
        state.body = Some(root);
        state.bound_bodies.retain(|vacated| *vacated != root);
        state.torso = Some(torso);
        state.manipulators = manipulators.clone();
        state.readied = vec![false; manipulators.len()];
        state.vector = BodyVector::still();
        state.conscious += 1;
        state.available = false;
        state.accounts.push(account);
        for indicator in &mut state.soul.indicators {
            indicator.ms = 0.0;
            indicator.offset = 0.0;
        }
        state.soul.consolidate(ceiling);
    }
    // a soul parked by an earlier death rejoins the turn order here
    world.resume(who);
    refresh_indicators(world, who)?;
    let affects = Interaction::new(Some(who), None, None, ActionKind::Affects);
    world.actor_mut(who)?.interactions.push(affects);
    announce_vector(world, who)?;
    world.hooks.handle(
        names::BIRTH,
        &HookPayload::new().actor(who).part(root),
    );
    Ok(())
}

/// Release a soul from its body. The body goes to the bound list for
/// later rebinding, running work is abandoned, and the soul leaves the
/// turn order until something rebinds it. It stays findable for
/// divination the whole while.
pub fn death(world: &mut World, who: ActorId) -> Result<()> {
    {
        let actor = world.actor_mut(who)?;
        actor.interactions.clear();
        actor.tracking.clear();
        let Some(state) = actor.as_character_mut() else {
            return Ok(());
        };
        state.conscious -= 1;
        if let Some(body) = state.body.take() {
            state.bound_bodies.push(body);
        }
        state.available = true;
        state.manipulators.clear();
        state.readied.clear();
        state.torso = None;
        state.held_keys.clear();
    }
    world.suspend(who);
    world
        .hooks
        .handle(names::DEATH, &HookPayload::new().actor(who));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EngineConfig;
    use crate::parts::{BodyPart, ItemContainer};
    use crate::stats::StatType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn armed_character(world: &mut World) -> (ActorId, PartId, PartId) {
        let mut root = BodyPart::new("Recruit");
        root.circulation = 1.0;
        let root = world.arena.alloc(root);
        let mut torso = BodyPart::new("Body");
        torso.kind = "Vital".into();
        torso.health_max = Some(400.0);
        torso.wears = Some(ItemContainer::with_quantity(6));
        let torso = world.arena.alloc(torso);
        world.arena.attach(root, torso);
        let mut hand = BodyPart::new("Right Hand");
        hand.functions.push(StatType::new("Manipulation", 1.0));
        hand.actions.push("Project".into());
        hand.actions.push("Impact".into());
        hand.contains = Some(ItemContainer::with_quantity(2));
        let hand = world.arena.alloc(hand);
        world.arena.attach(root, hand);

        let mut gun = BodyPart::new("Sidearm");
        gun.action_time = 400.0;
        gun.actions.push("Project".into());
        gun.extra.insert("Default Action".into(), "Project".into());
        let gun = world.arena.alloc(gun);
        let mut trigger = BodyPart::new("Trigger");
        trigger.functions.push(StatType::new("Project", 1.0));
        let trigger = world.arena.alloc(trigger);
        world.arena.attach(gun, trigger);
        world
            .arena
            .container_add(hand, ContainerSlot::Contains, gun)
            .unwrap();

        let who = world.spawn_character("Vasquez", root);
        {
            let state = world.actor_mut(who).unwrap().as_character_mut().unwrap();
            state.body = Some(root);
            state.torso = Some(torso);
            state.manipulators = vec![hand];
            state.readied = vec![true];
            state.conscious = 1;
        }
        (who, hand, gun)
    }

    #[test]
    fn test_ability_cost_prices_the_same_twice() {
        let mut world = World::new(EngineConfig::default());
        let (who, _, gun) = armed_character(&mut world);
        let probe = Interaction::new(Some(who), None, Some(gun), ActionKind::Project);
        let first = ability_cost(&world, who, "Sidearm", &probe).unwrap();
        let second = ability_cost(&world, who, "Sidearm", &probe).unwrap();
        assert_eq!(first.amount_draw, second.amount_draw);
        assert_eq!(first.energy_ms, second.energy_ms);
    }

    #[test]
    fn test_interact_accepts_and_annotates_a_demand() {
        let mut world = World::new(EngineConfig::default());
        let (who, hand, gun) = armed_character(&mut world);
        let demand = Interaction::new(Some(who), Some(hand), Some(gun), ActionKind::Project);
        interact(&mut world, who, demand).unwrap();
        let actor = world.actor(who).unwrap();
        // the demand and its derived supply chain entry
        assert_eq!(actor.interactions.len(), 2);
        assert_eq!(actor.tracking.len(), 1);
        let demand = actor
            .interactions
            .iter()
            .find(|live| live.actor == Some(who))
            .unwrap();
        assert!(demand.timing > 0.0);
        assert!(demand.control_timing > demand.timing * 0.99);
        let supply = actor
            .interactions
            .iter()
            .find(|live| live.actor.is_none())
            .unwrap();
        assert_eq!(supply.part, Some(gun));
        assert_eq!(supply.tracker, demand.tracker);
    }

    #[test]
    fn test_interact_holds_the_part_against_second_demands() {
        let mut world = World::new(EngineConfig::default());
        let (who, hand, gun) = armed_character(&mut world);
        interact(
            &mut world,
            who,
            Interaction::new(Some(who), Some(hand), Some(gun), ActionKind::Project),
        )
        .unwrap();
        let queued = world.actor(who).unwrap().interactions.len();
        interact(
            &mut world,
            who,
            Interaction::new(Some(who), Some(hand), Some(gun), ActionKind::Project),
        )
        .unwrap();
        assert_eq!(world.actor(who).unwrap().interactions.len(), queued);
    }

    #[test]
    fn test_interact_substitutes_the_default_action() {
        let mut world = World::new(EngineConfig::default());
        let (who, hand, _) = armed_character(&mut world);
        let mut bare = Interaction::new(Some(who), Some(hand), None, ActionKind::Impact);
        bare.actions.clear();
        interact(&mut world, who, bare).unwrap();
        let actor = world.actor(who).unwrap();
        let demand = actor
            .interactions
            .iter()
            .find(|live| live.actor == Some(who))
            .expect("the default action should have queued");
        assert_eq!(demand.action(), &ActionKind::Project);
    }

    #[test]
    fn test_interact_unarmed_hand_reports_through_hook() {
        let mut world = World::new(EngineConfig::default());
        let (who, hand, gun) = armed_character(&mut world);
        world.arena.container_remove(hand, ContainerSlot::Contains, None, u32::MAX);
        let _ = gun;
        let seen = Arc::new(AtomicUsize::new(0));
        let observer = Arc::clone(&seen);
        world.hooks.observe(&hooks::unarmed("Right Hand"), move |_| {
            observer.fetch_add(1, Ordering::SeqCst);
        });
        let mut bare = Interaction::new(Some(who), Some(hand), None, ActionKind::Impact);
        bare.actions.clear();
        interact(&mut world, who, bare).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(world.actor(who).unwrap().interactions.is_empty());
    }

    #[test]
    fn test_feedback_waits_before_landing_practice() {
        let mut world = World::new(EngineConfig::default());
        let (who, _, gun) = armed_character(&mut world);
        {
            let state = world.actor_mut(who).unwrap().as_character_mut().unwrap();
            let ability = state.soul.abilities.find_or_create("Sidearm");
            ability.time = 0.0;
        }
        let mut done = Interaction::new(Some(who), None, Some(gun), ActionKind::Project);
        done.timing = 1200.0;
        interact_feedback(&mut world, who, &done).unwrap();
        {
            let state = world.actor(who).unwrap().as_character().unwrap();
            assert_eq!(state.feedback_queue.len(), 1);
            assert!(state.feedback_queue[0].feedback_time >= 0.0);
        }
        // age it past the comprehension delay
        world.clock.diff = FEEDBACK_MS + 1.0;
        age_feedback(&mut world, who).unwrap();
        let state = world.actor(who).unwrap().as_character().unwrap();
        assert!(state.feedback_queue.is_empty());
        let ability = state.soul.abilities.find("Sidearm").unwrap();
        assert_eq!(ability.time, 1200.0);
    }

    #[test]
    fn test_act_holster_stages_pack_and_flips_readied() {
        let mut world = World::new(EngineConfig::default());
        let (who, hand, gun) = armed_character(&mut world);
        let mut pocket = BodyPart::new("Holster");
        pocket.contains = Some(ItemContainer::with_quantity(1));
        let pocket = world.arena.alloc(pocket);
        let torso = world.actor(who).unwrap().as_character().unwrap().torso.unwrap();
        world
            .arena
            .container_add(torso, ContainerSlot::Wears, pocket)
            .unwrap();
        act(&mut world, who, "Holster", None, None).unwrap();
        let actor = world.actor(who).unwrap();
        let stage = actor
            .interactions
            .iter()
            .find(|live| live.action() == &ActionKind::Holster)
            .expect("a pack stage should be queued");
        assert_eq!(stage.item, Some(gun));
        assert_eq!(stage.target_part, Some(pocket));
        let state = actor.as_character().unwrap();
        assert!(!state.is_readied(hand));
        assert_eq!(state.pack.get(&gun), Some(&pocket));
    }

    #[test]
    fn test_act_toggle_draws_back_what_was_packed() {
        let mut world = World::new(EngineConfig::default());
        let (who, hand, gun) = armed_character(&mut world);
        let mut pocket = BodyPart::new("Holster");
        pocket.contains = Some(ItemContainer::with_quantity(1));
        let pocket = world.arena.alloc(pocket);
        let torso = world.actor(who).unwrap().as_character().unwrap().torso.unwrap();
        world
            .arena
            .container_add(torso, ContainerSlot::Wears, pocket)
            .unwrap();
        act(&mut world, who, "Holster", None, None).unwrap();
        // pretend the stow resolved: the gun sits in the pocket now
        world.arena.container_remove(hand, ContainerSlot::Contains, None, u32::MAX);
        world
            .arena
            .container_add(pocket, ContainerSlot::Contains, gun)
            .unwrap();
        world.actor_mut(who).unwrap().interactions.clear();
        act(&mut world, who, "ToggleHolster", None, None).unwrap();
        let actor = world.actor(who).unwrap();
        let draw = actor
            .interactions
            .iter()
            .find(|live| live.action() == &ActionKind::Unholster)
            .expect("a draw stage should be queued");
        assert_eq!(draw.item, Some(gun));
        assert!(actor.as_character().unwrap().is_readied(hand));
    }

    #[test]
    fn test_reload_needs_reads_the_emptiest_feed() {
        let mut world = World::new(EngineConfig::default());
        let gun = world.arena.alloc(BodyPart::new("Carbine"));
        let mut well = BodyPart::new("Box Magazine");
        well.functions.push(StatType::new("Reload", 1.0));
        well.contains = Some(ItemContainer::with_quantity(30));
        let well = world.arena.alloc(well);
        world.arena.attach(gun, well);
        let mut rounds = BodyPart::new("5.56mm Round");
        rounds.quantity = 12;
        let rounds = world.arena.alloc(rounds);
        world
            .arena
            .container_add(well, ContainerSlot::Contains, rounds)
            .unwrap();
        let needs = reload_needs(&world, gun).unwrap();
        assert_eq!(needs, 0.6);
    }

    #[test]
    fn test_act_reload_queues_for_the_depleted_weapon() {
        let mut world = World::new(EngineConfig::default());
        let (who, hand, gun) = armed_character(&mut world);
        let mut well = BodyPart::new("Box Magazine");
        well.functions.push(StatType::new("Reload", 1.0));
        well.contains = Some(ItemContainer::with_quantity(15));
        let well = world.arena.alloc(well);
        world.arena.attach(gun, well);
        // a free off-hand does the swapping
        let mut off_hand = BodyPart::new("Left Hand");
        off_hand.functions.push(StatType::new("Manipulation", 1.0));
        off_hand.contains = Some(ItemContainer::with_quantity(2));
        let off_hand = world.arena.alloc(off_hand);
        {
            let state = world.actor_mut(who).unwrap().as_character_mut().unwrap();
            state.manipulators.push(off_hand);
            state.readied.push(false);
        }
        act(&mut world, who, "Reload", None, None).unwrap();
        let actor = world.actor(who).unwrap();
        let stage = actor
            .interactions
            .iter()
            .find(|live| live.action() == &ActionKind::Reload)
            .expect("a reload should be queued");
        assert_eq!(stage.part, Some(hand));
        assert_eq!(stage.item, Some(gun));
        assert!(stage.start > 0.0 || world.now() == 0.0);
    }

    #[test]
    fn test_binding_movement_sets_vector_and_crouch() {
        let mut world = World::new(EngineConfig::default());
        let (who, _, _) = armed_character(&mut world);
        binding_down(&mut world, who, "w").unwrap();
        {
            let state = world.actor(who).unwrap().as_character().unwrap();
            assert_eq!(state.vector.movement, "Paced");
            assert!(state.vector.speed > 0.0);
        }
        binding_down(&mut world, who, "ctrl").unwrap();
        binding_down(&mut world, who, "w").unwrap();
        {
            let state = world.actor(who).unwrap().as_character().unwrap();
            assert_eq!(state.vector.posture, "Crouching");
        }
        binding_up(&mut world, who, "w").unwrap();
        binding_up(&mut world, who, "ctrl").unwrap();
        let state = world.actor(who).unwrap().as_character().unwrap();
        assert_eq!(state.vector.movement, "Still");
        assert_eq!(state.vector.speed, 0.0);
    }

    #[test]
    fn test_binding_repeat_is_suppressed_while_held() {
        let mut world = World::new(EngineConfig::default());
        let (who, _, _) = armed_character(&mut world);
        binding_down(&mut world, who, "w").unwrap();
        let speed = world
            .actor(who)
            .unwrap()
            .as_character()
            .unwrap()
            .vector
            .speed;
        // key repeat from the shell: same key again without a release
        binding_down(&mut world, who, "w").unwrap();
        let state = world.actor(who).unwrap().as_character().unwrap();
        assert_eq!(state.vector.speed, speed);
        assert!(state.held_keys.is_held("w"));
    }

    #[test]
    fn test_unconscious_bodies_ignore_bindings() {
        let mut world = World::new(EngineConfig::default());
        let (who, _, _) = armed_character(&mut world);
        {
            let state = world.actor_mut(who).unwrap().as_character_mut().unwrap();
            state.conscious = 0;
        }
        binding_down(&mut world, who, "w").unwrap();
        let state = world.actor(who).unwrap().as_character().unwrap();
        assert_eq!(state.vector.movement, "Still");
    }

    #[test]
    fn test_hold_reload_key_holsters_once_and_eats_release() {
        let mut world = World::new(EngineConfig::default());
        let (who, hand, _) = armed_character(&mut world);
        let mut pocket = BodyPart::new("Holster");
        pocket.contains = Some(ItemContainer::with_quantity(1));
        let pocket = world.arena.alloc(pocket);
        let torso = world.actor(who).unwrap().as_character().unwrap().torso.unwrap();
        world
            .arena
            .container_add(torso, ContainerSlot::Wears, pocket)
            .unwrap();
        binding_down(&mut world, who, "r").unwrap();
        world.clock.diff = 500.0;
        held_bindings(&mut world, who).unwrap();
        {
            let actor = world.actor(who).unwrap();
            assert!(actor
                .interactions
                .iter()
                .any(|live| live.action() == &ActionKind::Holster));
            assert!(!actor.as_character().unwrap().is_readied(hand));
        }
        // a second pass over the threshold must not holster again
        let staged = world.actor(who).unwrap().interactions.len();
        held_bindings(&mut world, who).unwrap();
        assert_eq!(world.actor(who).unwrap().interactions.len(), staged);
        // the release is consumed, not turned into an act
        binding_up(&mut world, who, "r").unwrap();
        let state = world.actor(who).unwrap().as_character().unwrap();
        assert!(!state.held_keys.is_held("r"));
        assert!(state.skip_release.is_empty());
    }

    #[test]
    fn test_allocate_psyche_points_land_as_pivots() {
        let mut world = World::new(EngineConfig::default());
        let (who, _, _) = armed_character(&mut world);
        {
            let state = world.actor_mut(who).unwrap().as_character_mut().unwrap();
            state.soul.phobias.find_or_create("Hoplophobia");
        }
        binding_down(&mut world, who, "m phobias Hoplophobia 5000").unwrap();
        let state = world.actor(who).unwrap().as_character().unwrap();
        let pivots = state.pivots.get(&search_key("Hoplophobia")).unwrap();
        assert_eq!(pivots.len(), 1);
        assert_eq!(pivots[0].kind, PivotKind::Analysed);
        assert_eq!(pivots[0].duration, 5000.0);
    }

    #[test]
    fn test_birth_wires_body_and_account() {
        let mut world = World::new(EngineConfig::default());
        let root = {
            let mut root = BodyPart::new("Blank");
            root.circulation = 1.0;
            let root = world.arena.alloc(root);
            let mut torso = BodyPart::new("Body");
            torso.kind = "Vital".into();
            torso.health_max = Some(300.0);
            torso.wears = Some(ItemContainer::with_quantity(8));
            let torso = world.arena.alloc(torso);
            world.arena.attach(root, torso);
            let mut hand = BodyPart::new("Left Hand");
            hand.functions.push(StatType::new("Manipulation", 1.0));
            hand.contains = Some(ItemContainer::with_quantity(2));
            let hand = world.arena.alloc(hand);
            world.arena.attach(root, hand);
            root
        };
        let who = world.spawn_character("Ilmare", root);
        birth(&mut world, who, root).unwrap();
        let actor = world.actor(who).unwrap();
        let state = actor.as_character().unwrap();
        assert_eq!(state.body, Some(root));
        assert_eq!(state.manipulators.len(), 1);
        assert_eq!(state.readied, vec![false]);
        assert_eq!(state.conscious, 1);
        assert!(!state.available);
        assert_eq!(state.accounts.len(), 1);
        assert_eq!(world.arena.node(root).unwrap().name, "Ilmare");
        // the permanent affects entry rides the queue
        assert!(actor
            .interactions
            .iter()
            .any(|live| live.action() == &ActionKind::Affects));
    }

    #[test]
    fn test_death_releases_the_body_for_rebinding() {
        let mut world = World::new(EngineConfig::default());
        let (who, _, _) = armed_character(&mut world);
        let body = world.actor(who).unwrap().as_character().unwrap().body.unwrap();
        death(&mut world, who).unwrap();
        let actor = world.actor(who).unwrap();
        assert!(actor.interactions.is_empty());
        let state = actor.as_character().unwrap();
        assert_eq!(state.body, None);
        assert_eq!(state.bound_bodies, vec![body]);
        assert!(state.available);
        assert_eq!(state.conscious, 0);
        // off the turn order, but still findable
        assert!(!world.roster.contains(&who));
        assert!(world.handle_of(who).is_none());
        // rebinding the old body re-enrolls the soul and reclaims it
        birth(&mut world, who, body).unwrap();
        assert!(world.roster.contains(&who));
        assert!(world.handle_of(who).is_some());
        let state = world.actor(who).unwrap().as_character().unwrap();
        assert!(state.bound_bodies.is_empty());
    }

    #[test]
    fn test_stop_interaction_unwinds_the_supply_chain() {
        let mut world = World::new(EngineConfig::default());
        let (who, hand, gun) = armed_character(&mut world);
        interact(
            &mut world,
            who,
            Interaction::new(Some(who), Some(hand), Some(gun), ActionKind::Project),
        )
        .unwrap();
        assert!(!world.actor(who).unwrap().interactions.is_empty());
        stop_interaction(&mut world, who, "Project", Some(hand)).unwrap();
        let actor = world.actor(who).unwrap();
        assert!(actor.interactions.is_empty());
        assert!(actor.tracking.is_empty());
        // the cut demand still reaches comprehension
        let state = actor.as_character().unwrap();
        assert_eq!(state.feedback_queue.len(), 1);
    }
}
