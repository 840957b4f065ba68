//! Routing due interactions to their resolvers
//!
//! Dispatch is name-keyed and total: every known action routes between
//! its "<action> Pre" and "<action> Post" hooks, the builtin pass-through
//! actions resolve inside the actor supply loops and just announce here,
//! and anything unrecognised is reported once and dropped rather than
//! failing the tick it arrived on.

use serde_json::json;
use tracing::debug;

use crate::core::error::Result;
use crate::core::types::{ActorId, PartId};
use crate::hooks::{self, names, HookPayload};
use crate::interactions::interaction::{ActionKind, Interaction};
use crate::interactions::{energy, holster, impact, reload, speech, trade};
use crate::world::World;

/// Whether a body part may drive this item in the named action: the part
/// must offer an action the item answers or requires, or the action is a
/// builtin every part understands.
pub fn can_interact(world: &World, part: PartId, item: PartId, action: &ActionKind) -> bool {
    let Ok(part_node) = world.arena.node(part) else {
        return false;
    };
    let Ok(item_node) = world.arena.node(item) else {
        return false;
    };
    let able = part_node.actions.iter().any(|action_tag| {
        item_node.has_action(action_tag)
            || item_node
                .requires
                .iter()
                .any(|r| crate::stats::search_key(r) == crate::stats::search_key(action_tag))
    });
    able || action.is_builtin()
}

/// Resolve one due interaction for the actor that owns it.
///
/// Resolvers mutate the interaction in place: staged actions like
/// holstering park their start and timing on it and pick up where they
/// left off next tick. The pre hook fires before any resolver state
/// changes and the post hook after them, whatever the outcome, so shells
/// can bracket animations around either.
pub fn dispatch(world: &mut World, owner: ActorId, interaction: &mut Interaction) -> Result<()> {
    let action = interaction.action().clone();
    let name = action.name().to_string();
    let payload = phase_payload(owner, interaction);
    world.hooks.handle(&hooks::pre(&name), &payload);
    let outcome = route(world, owner, action, interaction);
    world.hooks.handle(&hooks::post(&name), &payload);
    outcome
}

fn route(
    world: &mut World,
    owner: ActorId,
    action: ActionKind,
    interaction: &mut Interaction,
) -> Result<()> {
    match action {
        ActionKind::Impact => impact::resolve_impact(world, owner, interaction),
        ActionKind::Throw => impact::resolve_throw(world, owner, interaction),
        ActionKind::Reload => reload::resolve_reload(world, owner, interaction),
        ActionKind::Holster | ActionKind::Unholster | ActionKind::ToggleHolster => {
            holster::resolve_holster(world, owner, interaction)
        }
        ActionKind::PsyCharge => energy::resolve_psy_charge(world, owner, interaction),
        ActionKind::Construct => energy::resolve_construct(world, owner, interaction),
        ActionKind::Imbue => energy::resolve_imbue(world, owner, interaction),
        ActionKind::Cleansing => energy::resolve_cleansing(world, owner, interaction),
        ActionKind::ImbueSelect => energy::resolve_imbue_select(world, owner, interaction),
        ActionKind::Communication => speech::resolve_communication(world, owner, interaction),
        ActionKind::Leverage => speech::resolve_leverage(world, owner, interaction),
        ActionKind::Trade => trade::resolve_trade(world, owner, interaction),
        ActionKind::Bid => trade::resolve_bid(world, owner, interaction),
        ref search if search.is_search() => speech::resolve_search(world, owner, interaction),
        ActionKind::Custom(unknown) => {
            debug!(action = %unknown, "unknown interaction dropped");
            world.hooks.handle(
                names::UNKNOWN_INTERACTION,
                &HookPayload::new()
                    .actor(owner)
                    .detail(json!({ "action": unknown })),
            );
            Ok(())
        }
        // Builtins and item-internal actions resolve in the supply loops;
        // reaching dispatch just announces them.
        _ => Ok(()),
    }
}

fn phase_payload(owner: ActorId, interaction: &Interaction) -> HookPayload {
    let mut payload = HookPayload::new().actor(owner).detail(json!({
        "action": interaction.action_name(),
        "timing": interaction.timing,
    }));
    if let Some(target) = interaction.targets.first() {
        payload = payload.target(*target);
    }
    if let Some(part) = interaction.part {
        payload = payload.part(part);
    }
    payload
}
