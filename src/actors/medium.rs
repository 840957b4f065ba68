//! Medium actors: the channels demands travel through
//!
//! A medium is the standing connection between characters - air for
//! speech, a market wire for trade, the universe itself for divining.
//! Demands queue on the medium like any item supply, but resolution is a
//! broadcast: once an entry's frames lapse the channel duplicates the
//! tracked demand to every conscious connected target and routes each
//! copy straight through dispatch on the recipient's side. Trades and
//! bids are brokered here rather than broadcast, because the channel is
//! the only party both sides trust to count goods and payment; searches
//! are targetless and answer only to the searcher, retrying on the same
//! tracker until the channel turns something up.
//!
//! Channel entries step by whole frames, one per pass, whatever the
//! clock mode.

use serde_json::json;
use tracing::debug;

use crate::abilities::ease::{ease_mult, ease_mult_cap};
use crate::actors::character;
use crate::core::constants::{FRAME_RATE_MIN, SEARCH_RATE};
use crate::core::error::{EngineError, Result};
use crate::core::types::{ActorId, PartId, TrackerId};
use crate::hooks::{names, HookPayload};
use crate::interactions::dispatch;
use crate::interactions::energy::template_stack;
use crate::interactions::interaction::{ActionKind, Interaction};
use crate::interactions::trade::{self, TradeSlip, Valuation, LICENSES_TRADE};
use crate::parts::{BodyPart, ContainerSlot};
use crate::psyche::PsycheLeverage;
use crate::stats::search_key;
use crate::world::World;

/// Raise a demand onto a medium's channel.
///
/// The demanding part, when one is named, must answer the medium's
/// requirements; the medium's own part graph must carry the action as a
/// function. The annotated demand is tracked and a derived supply entry
/// queues behind it - searches wait out their listening delay, anything
/// else broadcasts on the next pass. Replies arriving with a tracker
/// keep it, so a conversation settles as one piece of work.
pub fn interact(world: &mut World, via: ActorId, mut interaction: Interaction) -> Result<()> {
    let root = world.actor(via)?.root;
    if let Some(part) = interaction.part {
        let requires = world.arena.node(root)?.requires.clone();
        if !requires.is_empty() {
            let part_node = world.arena.node(part)?;
            if !requires.iter().any(|tag| part_node.has_action(tag)) {
                return Err(EngineError::Precondition(format!(
                    "{} cannot carry into this medium",
                    part_node.name
                )));
            }
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
            "{} is not carried by this medium",
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
    let tracker = interaction.tracker.unwrap_or_else(TrackerId::new);
    interaction.tracker = Some(tracker);
    let actor = world.actor_mut(via)?;
    actor.track(interaction.clone(), now);
    let mut derived =
        Interaction::new(None, Some(root), None, interaction.action().clone()).tracked(tracker);
    derived.actions = interaction.actions.clone();
    if interaction.action().is_search() {
        derived.action_frames = FRAME_RATE_MIN * SEARCH_RATE;
    }
    actor.track_up(tracker);
    actor.interactions.push(derived);
    let seeded = world.actor(via)?.interactions.len() - 1;
    function(world, via, seeded)?;
    Ok(())
}

/// Run one channel pass over the medium's queue entry at `index`.
///
/// Frames step down by one per pass; a lapsed entry resolves exactly
/// once and retires. An originator who has lost consciousness mid-wait
/// takes the entry down with them so the tracker still settles. Returns
/// true when the entry retired.
pub fn function(world: &mut World, via: ActorId, index: usize) -> Result<bool> {
    let mut entry = match world.actor(via)?.interactions.get(index) {
        Some(entry) => entry.clone(),
        None => return Ok(false),
    };
    entry.action_frames -= 1.0;
    if entry.action_frames > 0.0 {
        if let Some(slot) = world.actor_mut(via)?.interactions.get_mut(index) {
            *slot = entry;
        }
        return Ok(false);
    }
    let source = entry.tracker.and_then(|tracker| {
        world
            .actor(via)
            .ok()
            .and_then(|actor| actor.tracking.get(&tracker))
            .map(|tracking| tracking.interaction.clone())
    });
    let Some(source) = source else {
        retire(world, via, index, entry.tracker)?;
        return Ok(true);
    };
    let Some(origin) = source.actor else {
        retire(world, via, index, entry.tracker)?;
        return Ok(true);
    };
    let conscious = world
        .actor(origin)
        .ok()
        .and_then(|actor| actor.as_character())
        .map(|state| state.is_conscious())
        .unwrap_or(false);
    if !conscious {
        retire(world, via, index, entry.tracker)?;
        return Ok(true);
    }
    if let Some(state) = world.actor_mut(via)?.as_medium_mut() {
        state.weightings.entry(origin).or_insert_with(|| vec![0.0; 6]);
    }

    if entry.action().is_search() {
        supply_search(world, via, &entry, &source, origin)?;
        world.hooks.handle(
            names::MEDIUM_FUNCTION,
            &HookPayload::new()
                .actor(via)
                .detail(json!({ "action": entry.action_name() })),
        );
    } else {
        let connected: Vec<ActorId> = world
            .actor(via)?
            .as_medium()
            .map(|state| state.connected.keys().copied().collect())
            .unwrap_or_default();
        let targets: Vec<ActorId> = source
            .targets
            .iter()
            .copied()
            .filter(|target| connected.contains(target))
            .filter(|target| {
                world
                    .actor(*target)
                    .ok()
                    .and_then(|actor| actor.as_character())
                    .map(|state| state.is_conscious())
                    .unwrap_or(false)
            })
            .collect();
        for target in targets {
            match entry.action() {
                ActionKind::Trade => supply_trade(world, via, &source, origin, target)?,
                ActionKind::Bid => supply_bid(world, via, &source, origin, target)?,
                _ => {
                    let mut carried = source.clone();
                    carried.targets.clear();
                    carried.medium = Some(via);
                    carried.tracker = entry.tracker;
                    dispatch::dispatch(world, target, &mut carried)?;
                }
            }
            world.hooks.handle(
                names::MEDIUM_FUNCTION,
                &HookPayload::new()
                    .actor(via)
                    .target(target)
                    .detail(json!({ "action": entry.action_name() })),
            );
        }
    }
    retire(world, via, index, entry.tracker)?;
    Ok(true)
}

fn retire(world: &mut World, via: ActorId, index: usize, tracker: Option<TrackerId>) -> Result<()> {
    let actor = world.actor_mut(via)?;
    if index < actor.interactions.len() {
        actor.interactions.remove(index);
    }
    if let Some(tracker) = tracker {
        actor.track_down(tracker);
    }
    Ok(())
}

/// Advance a medium by one tick: drive the channel while work is queued,
/// settle trackers and notify originators once it goes quiet.
pub fn tick(world: &mut World, via: ActorId) -> Result<()> {
    if !world.actor(via)?.interactions.is_empty() {
        let mut index = 0;
        while index < world.actor(via)?.interactions.len() {
            if !function(world, via, index)? {
                index += 1;
            }
        }
        return Ok(());
    }
    let settled = world.actor_mut(via)?.drain_settled();
    for done in settled {
        if let Some(origin) = done.interaction.actor {
            character::interact_feedback(world, origin, &done.interaction)?;
        }
    }
    Ok(())
}

/// Sales and demand modifiers one buyer's standing earns against a
/// seller, summed over the leverage they are known to hold.
///
/// Each piece rates as the ease of the buyer's share of awareness
/// against its own ceiling, capped by how often the leverage has been
/// enforced, and scales the channel's posted "Sale" and "Demand"
/// affects. No leverage means no movement either way.
pub fn trade_leverage(
    world: &World,
    via: ActorId,
    known: &[PsycheLeverage],
    buyer: ActorId,
) -> (f64, f64) {
    let (sale_total, demand_total) = world
        .actor(via)
        .ok()
        .and_then(|actor| world.arena.get(actor.root))
        .map(|node| {
            let sale: f64 = node
                .affect
                .iter()
                .filter(|affect| affect.name == "Sale")
                .map(|affect| affect.total())
                .sum();
            let demand: f64 = node
                .affect
                .iter()
                .filter(|affect| affect.name == "Demand")
                .map(|affect| affect.total())
                .sum();
            (sale, demand)
        })
        .unwrap_or((0.0, 0.0));
    let mut mod_sales = 0.0;
    let mut mod_demand = 0.0;
    for leverage in known {
        let aware = leverage.aware_from(buyer);
        let rate = ease_mult(aware, aware.ceil()) * ease_mult_cap(leverage.enforced() as f64, aware);
        mod_sales += sale_total * rate;
        mod_demand += demand_total * rate;
    }
    (mod_sales, mod_demand)
}

/// Broker a browse: post the seller's goods as a slip on the buyer's
/// ledger and hand the seller a Trade demand to acknowledge.
///
/// Valuations open at the leverage-weighted prices; a good with no price
/// yet is priced off its recommended retail, the seller's bargaining
/// draw, and its superstition. Saleability is clamped to the open-trade
/// list here - the seller's own licences only come into play when it
/// acknowledges the slip.
fn supply_trade(
    world: &mut World,
    via: ActorId,
    source: &Interaction,
    buyer: ActorId,
    seller: ActorId,
) -> Result<()> {
    let known: Vec<PsycheLeverage> = world
        .actor(seller)?
        .as_character()
        .map(|state| {
            state
                .leveraged
                .iter()
                .filter(|leverage| {
                    leverage
                        .pivots
                        .iter()
                        .any(|pivot| pivot.target_from == Some(buyer))
                })
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    let (mod_sales, mod_demand) = trade_leverage(world, via, &known, buyer);
    if mod_sales < 0.0 {
        world.hooks.handle(
            names::TRADE_DENIED,
            &HookPayload::new().actor(seller).target(buyer),
        );
        return Ok(());
    }
    let body = {
        let actor = world.actor(seller)?;
        actor
            .as_character()
            .and_then(|state| state.body)
            .unwrap_or(actor.root)
    };
    let goods: Vec<PartId> = world
        .arena
        .list_holds(body, ContainerSlot::Contains, true)
        .into_iter()
        .flat_map(|holder| world.arena.contents(holder, ContainerSlot::Contains))
        .collect();
    let bargain = character::ability_cost(world, seller, "Bargain", source)?.amount_draw;
    let snapshot: Vec<(PartId, f64, f64, f64, bool, String)> = goods
        .iter()
        .filter_map(|id| {
            world.arena.get(*id).map(|node| {
                (
                    *id,
                    node.price,
                    node.rrp,
                    node.superstition,
                    node.for_sale,
                    node.kind.clone(),
                )
            })
        })
        .collect();
    let mut items = Vec::with_capacity(snapshot.len());
    let mut valuations = Vec::with_capacity(snapshot.len());
    for (id, price, rrp, superstition, sellable, kind) in snapshot {
        let mut expected = price;
        if expected == 0.0 {
            expected = rrp + bargain + superstition;
            if let Some(node) = world.arena.get_mut(id) {
                node.price = expected;
            }
        }
        let mut for_sale = if sellable { 1.0 } else { 0.0 } - superstition;
        if for_sale < 0.0 {
            for_sale = 0.0;
        }
        if !LICENSES_TRADE
            .iter()
            .any(|open| search_key(open) == search_key(&kind))
        {
            for_sale = 0.0;
        }
        items.push(id);
        valuations.push(Valuation {
            sale: for_sale,
            sale_leveraged: for_sale * mod_sales,
            demand: expected * mod_demand,
            unlicensed: false,
        });
    }
    let slip = TradeSlip::new(seller, items, valuations);
    let slip_id = slip.id;
    match world.actor_mut(buyer)?.as_character_mut() {
        Some(state) => {
            state.trades.insert(slip_id, slip);
        }
        None => {
            debug!(actor = ?buyer, "browse dropped, buyer keeps no ledger");
            return Ok(());
        }
    }
    let mut reply =
        Interaction::new(Some(seller), None, None, ActionKind::Trade).with_targets(vec![buyer]);
    reply.slip = Some(slip_id);
    reply.medium = Some(via);
    reply.tracker = source.tracker;
    dispatch::dispatch(world, seller, &mut reply)
}

/// Settle a bid: count payment out of the buyer, bank the charge with
/// the seller, and detach the selected goods into the slip's receipt for
/// delivery on the buyer's side.
///
/// A bid against leverage running negative is denied outright; a debit
/// that cannot cover the demanded sub-total reports insufficiency and
/// leaves every stack where it was. Payment takes whole credit stacks
/// and the slip carries the change.
fn supply_bid(
    world: &mut World,
    via: ActorId,
    source: &Interaction,
    buyer: ActorId,
    seller: ActorId,
) -> Result<()> {
    let Some(slip_id) = source.slip else {
        return Ok(());
    };
    let ledger: Vec<PsycheLeverage> = world
        .actor(seller)?
        .as_character()
        .map(|state| state.leveraged.clone())
        .unwrap_or_default();
    let (mod_sales, _) = trade_leverage(world, via, &ledger, buyer);
    if mod_sales < 0.0 {
        world.hooks.handle(
            names::BID_DENIED,
            &HookPayload::new().actor(seller).target(buyer),
        );
        return Ok(());
    }
    let Some(account) = trade::trade_account(world, buyer, Some(slip_id)) else {
        world.hooks.handle(
            names::ACCOUNT_SLIP_UNKNOWN,
            &HookPayload::new()
                .actor(buyer)
                .detail(json!({ "slip": slip_id })),
        );
        return Ok(());
    };
    let Some((selected, sub_total)) = world.actor(buyer)?.as_character().and_then(|state| {
        let slip = state.trades.get(&slip_id)?;
        let selected: Vec<PartId> = slip
            .selected
            .iter()
            .filter_map(|line| slip.items.get(*line).copied())
            .collect();
        Some((selected, slip.sub_total()))
    }) else {
        return Ok(());
    };
    if selected.is_empty() {
        return Ok(());
    }
    let charge = sub_total.ceil().max(0.0) as u32;
    let stacks = world
        .arena
        .container_search(account, ContainerSlot::Contains, "Credit");
    let holdings: u32 = stacks
        .iter()
        .filter_map(|id| world.arena.get(*id))
        .map(|node| node.quantity.max(1))
        .sum();
    if holdings < charge {
        world.hooks.handle(
            names::BID_INSUFFICIENT,
            &HookPayload::new()
                .actor(buyer)
                .detail(json!({ "slip": slip_id, "short": charge - holdings })),
        );
        return Ok(());
    }
    let mut paid = 0u32;
    for stack in stacks {
        if paid >= charge {
            break;
        }
        let Some((name, quantity)) = world
            .arena
            .get(stack)
            .map(|node| (node.name.clone(), node.quantity.max(1)))
        else {
            continue;
        };
        // whole stacks only; the spent parts stay detached for the sweep
        if world
            .arena
            .container_remove(account, ContainerSlot::Contains, Some(&name), quantity)
            .is_some()
        {
            paid += quantity;
        }
    }
    if charge > 0 {
        let till = world
            .actor(seller)?
            .as_character()
            .and_then(|state| state.accounts.first().copied());
        if let Some(till) = till {
            let proceeds = template_stack(world, "Credit", charge);
            let _ = world
                .arena
                .container_add(till, ContainerSlot::Contains, proceeds);
        }
    }
    let mut receipts = Vec::with_capacity(selected.len());
    for item in selected {
        let Some((parent, name, quantity)) = world
            .arena
            .get(item)
            .map(|node| (node.parent, node.name.clone(), node.quantity.max(1)))
        else {
            continue;
        };
        let moved = match parent {
            Some(holder) => {
                world
                    .arena
                    .container_remove(holder, ContainerSlot::Contains, Some(&name), quantity)
            }
            None => Some(item),
        };
        if let Some(moved) = moved {
            receipts.push(moved);
        }
    }
    if let Some(slip) = world
        .actor_mut(buyer)?
        .as_character_mut()
        .and_then(|state| state.trades.get_mut(&slip_id))
    {
        slip.debit = paid - charge;
        slip.receipt.extend(receipts);
    }
    let mut reply =
        Interaction::new(Some(seller), None, None, ActionKind::Bid).with_targets(vec![buyer]);
    reply.slip = Some(slip_id);
    reply.medium = Some(via);
    reply.tracker = source.tracker;
    dispatch::dispatch(world, buyer, &mut reply)
}

/// Listen for actors on the channel and answer the searcher.
///
/// The searcher's openness sets the odds; a miss queues a fresh
/// listening delay on the same tracker and the channel tries again. Soul
/// divining through the universe additionally seeds fresh unbound souls
/// into the channel for later searches to turn up. The searcher always
/// hears back, found or not.
fn supply_search(
    world: &mut World,
    via: ActorId,
    entry: &Interaction,
    source: &Interaction,
    searcher: ActorId,
) -> Result<()> {
    let action = source.action().clone();
    let capable = character::ability_profile(world, searcher, "Openess").accustomed;
    let rate = world.random() * 1_000_000_000.0 % SEARCH_RATE + capable;
    let success = rate > SEARCH_RATE - 1.0;
    let mut found = Vec::new();
    if success {
        let pool: Vec<ActorId> = world
            .actor(via)?
            .as_medium()
            .map(|state| {
                state
                    .connected
                    .keys()
                    .copied()
                    .filter(|actor| *actor != searcher)
                    .collect()
            })
            .unwrap_or_default();
        if !pool.is_empty() {
            let picks = rate as usize + 1;
            for _ in 0..picks {
                let at = ((world.random() * pool.len() as f64) as usize).min(pool.len() - 1);
                found.push(pool[at]);
            }
        }
    }
    if action == ActionKind::SoulDivining && world.actor(via)?.name == "Universe" {
        let divining = character::ability_profile(world, searcher, "Soul Divining").accustomed;
        let rate = world.random() * 1_000_000_000.0 % SEARCH_RATE + divining;
        if rate > SEARCH_RATE - 1.0 {
            for _ in 0..(rate as usize + 1) {
                let root = match world.templates.spawn(&mut world.arena, "Soul") {
                    Some(id) => id,
                    None => world.arena.alloc(BodyPart::new("Soul")),
                };
                let soul = world.spawn_character("nobody", root);
                if let Some(state) = world.actor_mut(soul)?.as_character_mut() {
                    state.available = true;
                }
                if let Some(state) = world.actor_mut(via)?.as_medium_mut() {
                    state.connect(soul);
                }
            }
        }
    }
    if !success {
        let mut retry =
            Interaction::new(None, entry.part, None, action.clone());
        retry.actions = entry.actions.clone();
        retry.action_frames = FRAME_RATE_MIN * SEARCH_RATE;
        retry.tracker = entry.tracker;
        let actor = world.actor_mut(via)?;
        if let Some(tracker) = entry.tracker {
            actor.track_up(tracker);
        }
        actor.interactions.push(retry);
    }
    let mut reply = Interaction::new(Some(searcher), None, None, action).with_targets(found);
    reply.medium = Some(via);
    reply.tracker = entry.tracker;
    dispatch::dispatch(world, searcher, &mut reply)
}

/// Stop an originator's in-flight work on this channel: matching entries
/// come off the queue, their trackers close, and the originator hears
/// what the channel had spent so far.
pub fn stop_interaction(
    world: &mut World,
    via: ActorId,
    functioning: &str,
    originator: ActorId,
) -> Result<()> {
    let wanted = ActionKind::parse(functioning);
    let stopped: Vec<(usize, Option<TrackerId>)> = {
        let actor = world.actor(via)?;
        actor
            .interactions
            .iter()
            .enumerate()
            .filter(|(_, live)| live.has_action(&wanted))
            .filter(|(_, live)| {
                let owner = live.actor.or_else(|| {
                    live.tracker.and_then(|tracker| {
                        actor
                            .tracking
                            .get(&tracker)
                            .and_then(|tracking| tracking.interaction.actor)
                    })
                });
                owner == Some(originator)
            })
            .map(|(at, live)| (at, live.tracker))
            .collect()
    };
    let mut settled = Vec::new();
    {
        let actor = world.actor_mut(via)?;
        for (at, tracker) in stopped.into_iter().rev() {
            if at < actor.interactions.len() {
                actor.interactions.remove(at);
            }
            if let Some(tracker) = tracker {
                if let Some(done) = actor.tracking.remove(&tracker) {
                    settled.push(done.interaction);
                }
            }
        }
    }
    for done in settled {
        character::interact_feedback(world, originator, &done)?;
    }
    Ok(())
}
