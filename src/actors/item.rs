//! Item actors and the held-item supply loop
//!
//! Items have no will of their own: their queue entries are supply work
//! derived from someone's demand. A held item's entries ride the holder's
//! queue and run through [`function`] against the holder as host; a
//! free-standing item actor runs the same loop from its own [`tick`].
//!
//! Each supply pass serves the entry's leading action at every part that
//! answers it, then walks those parts' own action tags through the
//! action parser, which is where projection scheduling, feeding, and
//! generic re-demands come from. Supply entries retire by frame count;
//! the tracker settles once every derived entry has drained, and exactly
//! one feedback lands on whoever raised the demand.

use serde_json::json;
use tracing::debug;

use crate::actors::FireMode;
use crate::core::constants::TURN_RATE_MIN;
use crate::core::error::{EngineError, Result};
use crate::core::types::{ActorId, PartId, TrackerId};
use crate::hooks::{names, HookPayload};
use crate::interactions::dispatch;
use crate::interactions::interaction::{ActionKind, Interaction};
use crate::parts::ContainerSlot;
use crate::stats::StatType;
use crate::world::World;

/// Run one supply pass over the host's queue entry at `index`.
///
/// The entry's part is the supply root; a root that has left the arena is
/// an error the caller must surface rather than a silent skip. Frames
/// count down by elapsed time (one per call in turn-based play) and the
/// pass itself runs on every call, due or not. Returns true when the
/// entry retired.
pub fn function(world: &mut World, host: ActorId, index: usize) -> Result<bool> {
    let mut entry = match world.actor(host)?.interactions.get(index) {
        Some(entry) => entry.clone(),
        None => return Ok(false),
    };
    let Some(root) = entry.part else {
        return Ok(false);
    };
    world.arena.node(root)?;
    let frame_step = if world.config.turn_based {
        1.0
    } else {
        world.clock.diff
    };
    entry.action_frames -= frame_step;
    let remove_ok = entry.action_frames <= 0.0;

    let action_names: Vec<String> = entry
        .actions
        .iter()
        .map(|action| action.name().to_string())
        .collect();
    let refs: Vec<&str> = action_names.iter().map(String::as_str).collect();
    let leading = entry.action().clone();
    let targets = world.arena.find_functions(root, &refs);
    for target in targets {
        match leading {
            ActionKind::Project => function_project(world, host, &mut entry, target)?,
            ActionKind::Feed => function_feed(world, host, &mut entry, target)?,
            ActionKind::Accuracy => function_accuracy(&mut entry),
            ref other => debug!(action = %other, part = target.0, "no supply resolver"),
        }
        action_parser(world, host, &entry, index, root, target)?;
    }

    let actor = world.actor_mut(host)?;
    if remove_ok {
        if index < actor.interactions.len() {
            actor.interactions.remove(index);
        }
        if let Some(tracker) = entry.tracker {
            actor.track_down(tracker);
        }
        Ok(true)
    } else {
        if let Some(slot) = actor.interactions.get_mut(index) {
            *slot = entry;
        }
        Ok(false)
    }
}

/// Walk one supplying part's action tags and stack the item's own demands
/// for the next pass: projection and feeding schedule through their
/// handlers, anything else re-demands generically unless the item resolves
/// it internally.
fn action_parser(
    world: &mut World,
    host: ActorId,
    entry: &Interaction,
    index: usize,
    root: PartId,
    target: PartId,
) -> Result<()> {
    let tags = world.arena.node(target)?.actions.clone();
    if tags.is_empty() {
        return Ok(());
    }
    let act_enabled: Vec<ActionKind> = world
        .actor(host)?
        .as_item()
        .map(|state| state.act_enabled.clone())
        .unwrap_or_default();
    let mut spawned: Vec<Interaction> = Vec::new();
    for tag in &tags {
        let kind = ActionKind::parse(tag);
        match kind {
            ActionKind::Project => {
                spawned.extend(action_project(world, host, entry, index, root)?)
            }
            ActionKind::Feed => spawned.extend(action_feed(world, host, entry, root)?),
            other => {
                if !act_enabled.contains(&other) {
                    spawned.push(Interaction::new(None, Some(root), None, other));
                }
            }
        }
        world.hooks.handle(
            names::ITEM_ACTION,
            &HookPayload::new()
                .actor(host)
                .part(target)
                .detail(json!({ "action": tag })),
        );
    }
    if spawned.is_empty() {
        return Ok(());
    }
    let actor = world.actor_mut(host)?;
    for mut derived in spawned {
        derived.tracker = entry.tracker;
        if let Some(tracker) = entry.tracker {
            actor.track_up(tracker);
        }
        actor.interactions.push(derived);
    }
    Ok(())
}

/// Fire mode for a supply root: the part data decides, a free-standing
/// item actor's own state is the fallback.
fn fire_mode(world: &World, host: ActorId, root: PartId) -> FireMode {
    if let Some(named) = world
        .arena
        .get(root)
        .and_then(|node| node.extra.get("Fire Mode"))
        .and_then(|name| FireMode::parse(name))
    {
        return named;
    }
    world
        .actor(host)
        .ok()
        .and_then(|actor| actor.as_item())
        .map(|state| state.mode)
        .unwrap_or_default()
}

/// Schedule pending projections at every part tagged for them.
///
/// One release may be pending per projecting part at a time; the next
/// becomes available `release` ms after the previous projection, where
/// `release` sums the part's mode-matched release affects. The fire mode
/// caps how many projections one tracker spends before the demand has to
/// be raised again.
fn action_project(
    world: &mut World,
    host: ActorId,
    entry: &Interaction,
    index: usize,
    root: PartId,
) -> Result<Vec<Interaction>> {
    let Some(tracker) = entry.tracker else {
        return Ok(Vec::new());
    };
    let now = world.now();
    let mode = fire_mode(world, host, root);
    let (last, count) = world
        .actor(host)?
        .tracking
        .get(&tracker)
        .map(|tracking| (tracking.projected, tracking.project_count))
        .unwrap_or((0.0, 0));
    if count >= mode.cap() {
        return Ok(Vec::new());
    }
    let mut scheduled = Vec::new();
    for target in world.arena.find_action(root, "Project", true) {
        let (has_items, mut release) = {
            let node = world.arena.node(target)?;
            let has = node
                .contains
                .as_ref()
                .map(|container| !container.items.is_empty())
                .unwrap_or(false);
            let release: f64 = node
                .affect
                .iter()
                .filter(|affect| affect.name.contains(mode.name()))
                .map(|affect| affect.ratio)
                .sum();
            (has, release)
        };
        if !has_items {
            continue;
        }
        if world.config.turn_based {
            release = (release / TURN_RATE_MIN).max(1.0);
        }
        let allowed = last + release;
        if allowed > now {
            continue;
        }
        let pending = world
            .actor(host)?
            .interactions
            .iter()
            .enumerate()
            .any(|(at, live)| {
                at != index
                    && live.actor.is_none()
                    && live.item.is_none()
                    && live.part == Some(target)
                    && live.has_action(&ActionKind::Project)
            });
        if pending {
            continue;
        }
        if let Some(tracking) = world.actor_mut(host)?.tracking.get_mut(&tracker) {
            tracking.project_count += 1;
            tracking.projecting = allowed;
        }
        let mut release_entry = Interaction::new(None, Some(target), None, ActionKind::Project);
        release_entry.action_frames = release.max(1.0);
        scheduled.push(release_entry);
        break;
    }
    Ok(scheduled)
}

/// Release one round from a projecting part.
///
/// Only a scheduled release with its slot open fires: the round leaves
/// the part's container, takes the merged accuracy of the weapon and its
/// own extras, and enters play as a free item actor carrying the imparted
/// velocity. Telekinetic parts scale the velocity by how accustomed the
/// originating character is to them.
fn function_project(
    world: &mut World,
    host: ActorId,
    entry: &mut Interaction,
    target: PartId,
) -> Result<()> {
    let Some(tracker) = entry.tracker else {
        return Ok(());
    };
    let now = world.now();
    let projecting = world
        .actor(host)?
        .tracking
        .get(&tracker)
        .map(|tracking| tracking.projecting)
        .unwrap_or(0.0);
    if entry.item.is_some() || projecting > now {
        return Ok(());
    }
    let chambered: Vec<PartId> = world
        .arena
        .node(target)?
        .contains
        .as_ref()
        .map(|container| container.items.clone())
        .unwrap_or_default();
    let stack = chambered.into_iter().find(|id| {
        world
            .arena
            .get(*id)
            .map(|node| node.group == "Bullet")
            .unwrap_or(false)
    });
    let Some(stack) = stack else {
        return Ok(());
    };
    let round_name = world.arena.node(stack)?.name.clone();
    let Some(round) =
        world
            .arena
            .container_remove(target, ContainerSlot::Contains, Some(&round_name), 1)
    else {
        return Ok(());
    };
    entry.item = Some(round);
    entry.action_frames = 0.0;
    world.hooks.handle(
        names::POSITION_VECTOR,
        &HookPayload::new().actor(host).part(round),
    );

    let mut ratio = 1.0;
    if world.arena.node(target)?.group == "Telekinesis" {
        let originator = world
            .actor(host)?
            .tracking
            .get(&tracker)
            .and_then(|tracking| tracking.interaction.actor);
        if let Some(origin) = originator {
            ratio =
                crate::actors::character::ability_profile(world, origin, "Telekinesis").accustomed;
        }
    }
    let mut speed = 0.0;
    for affect in &world.arena.node(round)?.affect {
        if affect.name == "Velocity 0" {
            speed = affect.ratio * ratio;
        }
    }

    // accuracy folds the weapon's modifiers and the round's extras into one
    let weapon = world.arena.find_root(target);
    let mut modifier_ratios: Vec<f64> = Vec::new();
    for carrier in world.arena.find_affect(weapon, "Accuracy") {
        if carrier == round {
            continue;
        }
        if let Some(node) = world.arena.get(carrier) {
            modifier_ratios.extend(
                node.affect
                    .iter()
                    .filter(|affect| affect.name == "Accuracy")
                    .map(|affect| affect.ratio),
            );
        }
    }
    let mut base: Option<StatType> = None;
    {
        let node = world.arena.node_mut(round)?;
        let affects = std::mem::take(&mut node.affect);
        let mut kept = Vec::with_capacity(affects.len());
        for affect in affects {
            if affect.name == "Accuracy" {
                if base.is_none() {
                    base = Some(affect);
                } else {
                    modifier_ratios.push(affect.ratio);
                }
            } else {
                kept.push(affect);
            }
        }
        node.affect = kept;
    }
    let mut accuracy = base.unwrap_or_else(|| StatType::new("Accuracy", 1.0));
    accuracy.ratio += modifier_ratios.iter().sum::<f64>();
    let merged = accuracy.ratio;
    world.arena.node_mut(round)?.affect.push(accuracy);

    let launched = world.spawn_item(&round_name, round);
    if let Some(state) = world.actor_mut(launched)?.as_item_mut() {
        state.velocity = speed;
    }
    if let Some(tracking) = world.actor_mut(host)?.tracking.get_mut(&tracker) {
        tracking.projected = now;
    }
    world.hooks.handle(
        names::PROJECT_ACCURACY,
        &HookPayload::new()
            .actor(launched)
            .part(round)
            .detail(json!({ "ratio": merged })),
    );
    Ok(())
}

/// Stage feed moves from every feed-tagged source toward the root's
/// receiving parts, splitting the available receiving space evenly.
fn action_feed(
    world: &mut World,
    host: ActorId,
    _entry: &Interaction,
    root: PartId,
) -> Result<Vec<Interaction>> {
    let pending = world.actor(host)?.interactions.iter().any(|live| {
        live.actor.is_none()
            && live.item.is_some()
            && live.target_part.is_some()
            && live.has_action(&ActionKind::Feed)
    });
    if pending {
        return Ok(Vec::new());
    }
    let receivers = world.arena.find_functions(root, &["Feed"]);
    let distribution = receivers.len();
    let mut space: u32 = 0;
    for receiver in &receivers {
        space += world
            .arena
            .node(*receiver)?
            .contains
            .as_ref()
            .and_then(|container| container.quantity_remaining())
            .unwrap_or(0);
    }
    if space == 0 {
        return Ok(Vec::new());
    }
    let share = space as f64 / distribution.max(1) as f64;
    let mut staged = Vec::new();
    for source in world.arena.find_action(root, "Feed", true) {
        // wells answer the tag too; they are destinations, not donors
        if receivers.contains(&source) {
            continue;
        }
        let stacks: Vec<PartId> = world
            .arena
            .node(source)?
            .contains
            .as_ref()
            .map(|container| container.items.clone())
            .unwrap_or_default();
        for stack in stacks {
            let mut feed = Interaction::new(None, Some(root), Some(stack), ActionKind::Feed)
                .with_target_part(source);
            feed.feed_share = share;
            staged.push(feed);
        }
    }
    Ok(staged)
}

/// Move a staged feed's share into a receiving part. A move that does not
/// fit comes straight back to the source; either way the stage spends its
/// share and retires by frames.
fn function_feed(
    world: &mut World,
    _host: ActorId,
    entry: &mut Interaction,
    receiver: PartId,
) -> Result<()> {
    if entry.feed_share <= 0.0 {
        return Ok(());
    }
    let Some(stack) = entry.item else {
        return Ok(());
    };
    let Some(source) = entry.target_part else {
        return Ok(());
    };
    // one move per stage, whatever becomes of it
    let amount = (entry.feed_share.ceil() as u32).max(1);
    entry.feed_share = 0.0;
    let name = match world.arena.get(stack) {
        Some(node) => node.name.clone(),
        None => return Ok(()),
    };
    let moved =
        match world
            .arena
            .container_remove(source, ContainerSlot::Contains, Some(&name), amount)
        {
            Some(moved) => moved,
            None => return Ok(()),
        };
    if world
        .arena
        .container_add(receiver, ContainerSlot::Contains, moved)
        .is_err()
    {
        // no room after all: the rounds go back where they came from
        if world
            .arena
            .container_add(source, ContainerSlot::Contains, moved)
            .is_err()
        {
            debug!(part = moved.0, "fed stack stranded outside any container");
        }
    }
    Ok(())
}

/// An accuracy supply has nothing to actuate: its affects are read off the
/// weapon at projection time, so the entry completes on the spot.
fn function_accuracy(entry: &mut Interaction) {
    entry.action_frames = 0.0;
}

/// Raise a demand against a free-standing item.
///
/// The item's own requirements must be answered by the demanding part's
/// action tags, and some part of the item must supply the action. The
/// returned interaction carries the accumulated timing and the tracker
/// under which the item registered its supply entry.
pub fn interact(
    world: &mut World,
    who: ActorId,
    mut interaction: Interaction,
) -> Result<Interaction> {
    let root = world.actor(who)?.root;
    let requires = world.arena.node(root)?.requires.clone();
    if !requires.is_empty() {
        let Some(part) = interaction.part else {
            return Err(EngineError::Precondition(
                "interaction brings no part to answer the item's requirements".into(),
            ));
        };
        let part_node = world.arena.node(part)?;
        if !requires.iter().any(|tag| part_node.has_action(tag)) {
            return Err(EngineError::Precondition(format!(
                "{} does not answer the item's requirements",
                part_node.name
            )));
        }
    }
    let action_names: Vec<String> = interaction
        .actions
        .iter()
        .map(|action| action.name().to_string())
        .collect();
    let refs: Vec<&str> = action_names.iter().map(String::as_str).collect();
    let path = world.arena.find_functions(root, &refs);
    if path.is_empty() {
        return Err(EngineError::Precondition(format!(
            "{} is not available from this item",
            interaction.action_name()
        )));
    }
    let mut time = world.arena.node(root)?.action_time;
    let mut control = time;
    for node_id in &path {
        let node = world.arena.node(*node_id)?;
        let avail = node.function_ratio(interaction.action_name());
        control += control + time;
        time += time * ((1.0 - node.circulation) + (1.0 - avail));
    }
    interaction.timing = time;
    interaction.control_timing = control;

    let now = world.now();
    let tracker = TrackerId::new();
    interaction.tracker = Some(tracker);
    let actor = world.actor_mut(who)?;
    actor.track(interaction.clone(), now);
    let mut derived = Interaction::new(
        None,
        Some(root),
        path.last().copied(),
        interaction.action().clone(),
    )
    .tracked(tracker);
    derived.actions = interaction.actions.clone();
    actor.track_up(tracker);
    actor.interactions.push(derived);
    Ok(interaction)
}

/// Advance a free-standing item by one tick.
///
/// A busy queue is all the tick does: entries from item or medium actors
/// dispatch to their resolvers, everything else runs the supply loop, and
/// the item's own echoes are left alone. Only an idle item settles its
/// trackers - wear lands on the root and the originators learn what their
/// demands came to.
pub fn tick(world: &mut World, who: ActorId) -> Result<()> {
    if !world.actor(who)?.interactions.is_empty() {
        let mut index = 0;
        loop {
            let entry = {
                match world.actor(who)?.interactions.get(index) {
                    Some(entry) if entry.unblocked() => entry.clone(),
                    Some(_) => {
                        index += 1;
                        continue;
                    }
                    None => break,
                }
            };
            match entry.actor {
                Some(origin) if origin == who => {
                    index += 1;
                }
                Some(origin) => {
                    let routed = world
                        .actor(origin)
                        .map(|actor| actor.as_item().is_some() || actor.as_medium().is_some())
                        .unwrap_or(false);
                    if routed {
                        let mut live = entry;
                        dispatch::dispatch(world, who, &mut live)?;
                        let finished = live.start != 0.0 && live.timing <= 0.0;
                        let actor = world.actor_mut(who)?;
                        if finished {
                            if index < actor.interactions.len() {
                                actor.interactions.remove(index);
                            }
                            crate::actors::character::interact_feedback(world, origin, &live)?;
                        } else {
                            if let Some(slot) = actor.interactions.get_mut(index) {
                                *slot = live;
                            }
                            index += 1;
                        }
                    } else if !function(world, who, index)? {
                        index += 1;
                    }
                }
                None => {
                    if !function(world, who, index)? {
                        index += 1;
                    }
                }
            }
        }
        return Ok(());
    }
    let root = world.actor(who)?.root;
    let settled = world.actor_mut(who)?.drain_settled();
    for done in settled {
        if let Ok(node) = world.arena.node_mut(root) {
            node.fatigue += done.interaction.timing;
        }
        if let Some(origin) = done.interaction.actor {
            crate::actors::character::interact_feedback(world, origin, &done.interaction)?;
        }
    }
    Ok(())
}
