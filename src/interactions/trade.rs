//! Trade slips and the two-act sale they carry
//!
//! A sale is brokered by a medium but settled between characters. The
//! medium writes a slip onto the buyer's ledger - the goods on offer,
//! one valuation per line - and queues a Trade demand at the seller.
//! The seller's resolver here vets each line against its licences and
//! reprices what it has no business moving, weighted by its own appetite
//! for deviant trade. A later Bid demand settles the slip: the medium
//! has already counted payment out of the buyer and loaded the slip with
//! change and purchased goods, and the seller's resolver banks the
//! change into the buyer's account and packs the goods into whatever
//! the buyer wears, dropping into the world anything that does not fit.

use serde_json::json;

use crate::core::error::Result;
use crate::core::types::{ActorId, PartId};
use crate::hooks::{names, HookPayload};
use crate::interactions::energy::template_stack;
use crate::interactions::interaction::{Interaction, SlipId};
use crate::parts::ContainerSlot;
use crate::psyche::feedback::deviancy_multiplier;
use crate::stats::search_key;
use crate::world::World;

/// Goods kinds anyone may move without holding a licence.
pub const LICENSES_TRADE: &[&str] = &[];

/// Posted prices for one line of a slip.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Valuation {
    /// What the seller would accept.
    pub sale: f64,
    /// Sale price after leverage weighting.
    pub sale_leveraged: f64,
    /// What the buyer is asked to pay.
    pub demand: f64,
    /// Set once the seller finds no licence covering the line.
    pub unlicensed: bool,
}

/// A buyer's open position with one seller.
///
/// The slip lives on the buyer's ledger from the moment the medium
/// brokers the browse; the `SlipId` riding the interactions is how both
/// sides find it again. Items are the seller's real parts, still seated
/// in the seller's containers until a bid detaches them into `receipt`.
#[derive(Debug, Clone)]
pub struct TradeSlip {
    pub id: SlipId,
    pub seller: ActorId,
    /// Goods on offer.
    pub items: Vec<PartId>,
    /// One valuation per line of `items`.
    pub valuations: Vec<Valuation>,
    /// Indices into `items` the buyer has marked for purchase.
    pub selected: Vec<usize>,
    /// Change owed to the buyer after an outstanding bid.
    pub debit: u32,
    /// Purchased goods detached and awaiting delivery.
    pub receipt: Vec<PartId>,
}

impl TradeSlip {
    pub fn new(seller: ActorId, items: Vec<PartId>, valuations: Vec<Valuation>) -> Self {
        Self {
            id: SlipId::new(),
            seller,
            items,
            valuations,
            selected: Vec::new(),
            debit: 0,
            receipt: Vec::new(),
        }
    }

    /// Demand total over the selected lines.
    pub fn sub_total(&self) -> f64 {
        self.selected
            .iter()
            .filter_map(|line| self.valuations.get(*line))
            .map(|valuation| valuation.demand)
            .sum()
    }
}

/// The account part behind a character's trading, which is where credits
/// land. When a slip is named it must already be on the ledger.
pub fn trade_account(world: &World, who: ActorId, slip: Option<SlipId>) -> Option<PartId> {
    let state = world.actor(who).ok()?.as_character()?;
    let account = state.accounts.first().copied()?;
    match slip {
        Some(id) if !state.trades.contains_key(&id) => None,
        _ => Some(account),
    }
}

/// Seller acknowledges a slip, repricing what it is not licensed to move.
///
/// Each line whose kind is covered neither by the open-trade list nor by
/// one of the seller's licences gets its leveraged sale price bumped by
/// the seller's deviancy and its demand price rebuilt from the recommended
/// retail price plus the seller's bargaining draw and the good's
/// superstition, then inflated by the same deviancy. A licensed line is
/// left exactly as the medium posted it.
pub fn resolve_trade(world: &mut World, owner: ActorId, interaction: &mut Interaction) -> Result<()> {
    let (Some(slip_id), Some(&buyer)) = (interaction.slip, interaction.targets.first()) else {
        return Ok(());
    };
    let mut access: Vec<String> = LICENSES_TRADE.iter().map(|kind| search_key(kind)).collect();
    if let Some(state) = world.actor(owner)?.as_character() {
        access.extend(state.licenses.iter().map(|kind| search_key(kind)));
    }
    let Some(items) = world
        .actor(buyer)?
        .as_character()
        .and_then(|state| state.trades.get(&slip_id))
        .map(|slip| slip.items.clone())
    else {
        world.hooks.handle(
            names::ACCOUNT_SLIP_UNKNOWN,
            &HookPayload::new().actor(buyer).detail(json!({ "slip": slip_id })),
        );
        return Ok(());
    };
    let mut repriced = Vec::new();
    for (line, item) in items.iter().enumerate() {
        let Some(node) = world.arena.get(*item) else {
            continue;
        };
        if !access.contains(&search_key(&node.kind)) {
            repriced.push((line, node.rrp, node.superstition));
        }
    }
    if !repriced.is_empty() {
        let bargain = crate::actors::character::ability_cost(world, owner, "Bargain", interaction)?
            .amount_draw;
        let deviant = match world.actor(owner)?.as_character() {
            Some(state) => deviancy_multiplier(&world.profiles, &state.soul.disorders),
            None => 0.0,
        };
        if let Some(slip) = world
            .actor_mut(buyer)?
            .as_character_mut()
            .and_then(|state| state.trades.get_mut(&slip_id))
        {
            for (line, rrp, superstition) in repriced {
                let Some(valuation) = slip.valuations.get_mut(line) else {
                    continue;
                };
                valuation.sale_leveraged += deviant;
                let mut expected = valuation.demand;
                if expected == 0.0 {
                    expected = rrp + bargain + superstition;
                }
                valuation.demand = expected + expected * deviant;
                valuation.unlicensed = true;
            }
        }
    }
    if trade_account(world, buyer, Some(slip_id)).is_none() {
        world.hooks.handle(
            names::ACCOUNT_SLIP_UNKNOWN,
            &HookPayload::new().actor(buyer).detail(json!({ "slip": slip_id })),
        );
        return Ok(());
    }
    world.hooks.handle(
        names::TRADE_SLIP,
        &HookPayload::new()
            .actor(owner)
            .target(buyer)
            .detail(json!({ "slip": slip_id, "lines": items.len() })),
    );
    Ok(())
}

/// Seller settles a bid: change to the buyer's account, goods to the
/// buyer's person.
///
/// The slip's debit and receipt were loaded by the medium when payment
/// was counted. Change is banked as a credit stack in the buyer's first
/// account; each purchased good is packed into the first worn container
/// that will take it, and anything unpackable is released into the world
/// as its own item.
pub fn resolve_bid(world: &mut World, _owner: ActorId, interaction: &mut Interaction) -> Result<()> {
    let (Some(slip_id), Some(&buyer)) = (interaction.slip, interaction.targets.first()) else {
        return Ok(());
    };
    let Some(account) = trade_account(world, buyer, Some(slip_id)) else {
        world.hooks.handle(
            names::ACCOUNT_SLIP_UNKNOWN,
            &HookPayload::new().actor(buyer).detail(json!({ "slip": slip_id })),
        );
        return Ok(());
    };
    let Some((change, receipt)) = world.actor_mut(buyer)?.as_character_mut().and_then(|state| {
        let slip = state.trades.get_mut(&slip_id)?;
        Some((
            std::mem::take(&mut slip.debit),
            std::mem::take(&mut slip.receipt),
        ))
    }) else {
        return Ok(());
    };
    if change > 0 {
        let credit = template_stack(world, "Credit", change);
        let _ = world
            .arena
            .container_add(account, ContainerSlot::Contains, credit);
    }
    let carrier = world.actor(buyer)?;
    let body = carrier
        .as_character()
        .and_then(|state| state.body)
        .unwrap_or(carrier.root);
    for item in receipt {
        let landed = match world.arena.find_packable(body, item) {
            Some(pocket) => world
                .arena
                .container_add(pocket, ContainerSlot::Contains, item)
                .is_ok(),
            None => false,
        };
        if !landed {
            let name = world
                .arena
                .get(item)
                .map(|part| part.name.clone())
                .unwrap_or_default();
            let dropped = world.spawn_item(&name, item);
            world.hooks.handle(
                names::BID_TRANSFER_EXTERNAL,
                &HookPayload::new().actor(dropped).target(buyer),
            );
        }
    }
    // TODO: route settled trades through psyche::feedback::interaction_feedback.
    Ok(())
}
