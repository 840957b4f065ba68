//! Engine-to-shell notification hooks
//!
//! The engine never draws, saves, or speaks to a user. Anything a shell
//! might want to observe is announced through a named hook: at most one
//! handler per name, payload only, no way back into world state. Unhandled
//! hooks fall through to a debug log line so a headless run stays quiet
//! but traceable.

use ahash::AHashMap;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::core::types::{ActorId, PartId};

/// Hook names fired by the engine proper. Shells may register anything;
/// these are the ones guaranteed to fire when their situation occurs.
pub mod names {
    pub const ERROR: &str = "Error";
    pub const BIRTH: &str = "Birth";
    pub const DEATH: &str = "Death";
    pub const GARBAGE_COLLECTION: &str = "Garbage Collection";
    pub const BODY_DIMENSIONS: &str = "Body Dimensions";
    pub const POSITION_VECTOR: &str = "Position Vector";
    pub const CHARACTER_VECTOR: &str = "Character Vector";
    pub const DISTANCE_NO_MEDIUM: &str = "Distance No Medium";
    pub const DISTANCE_KM: &str = "Distance KM";
    pub const UNKNOWN_INTERACTION: &str = "Unknown Interaction";
    pub const ACT_UNKNOWN: &str = "Character Act Unknown";
    pub const INTERACT_FEEDBACK: &str = "Interact Feedback";
    pub const CHARACTER_FEEDBACK: &str = "Character Feedback";
    pub const DISORDER_FEEDBACK: &str = "Disorder Feedback";
    pub const PHOBIA_FEEDBACK: &str = "Phobia Feedback";
    pub const PSYCHOSES_MULTIPLIER: &str = "Psychoses Multiplier";
    pub const ITEM_ACTION: &str = "Item Action";
    pub const MEDIUM_FUNCTION: &str = "Medium Function";
    pub const WASTE_ENERGY: &str = "Waste Energy";
    pub const IMPACT_ENERGY: &str = "Impact Energy";
    pub const IMPACT_PART_PRE: &str = "Impact Part Pre";
    pub const IMPACT_PART_POST: &str = "Impact Part Post";
    pub const PROJECT_ACCURACY: &str = "Project Accuracy";
    pub const THROW_ACCURACY: &str = "Throw Accuracy";
    pub const RELOAD_ACTIVE: &str = "Reload Active";
    pub const RELOAD_DISABLED: &str = "Reload Disabled";
    pub const RELOAD_EMPTY: &str = "Reload Empty";
    pub const RELOAD_FAILURE: &str = "Reload Failure";
    pub const CLEANSING_FAILURE: &str = "Cleansing Failure";
    pub const IMBUE_SELECT_FAILED: &str = "Imbue Select Failed";
    pub const PSY_CHARGE_NO_SOURCE: &str = "Psy Charge No Source";
    pub const PSY_CHARGE_NO_TARGET: &str = "Psy Charge No Target";
    pub const PSY_CHARGE_NO_CHARGE: &str = "Psy Charge No Charge";
    pub const PSY_CHARGE_NOPE: &str = "Psy Charge Nope";
    pub const TRADE_SLIP: &str = "Trade Slip";
    pub const ACCOUNT_SLIP_UNKNOWN: &str = "Account TradeSlip Unknown";
    pub const TRADE_DENIED: &str = "Trade Denied";
    pub const BID_DENIED: &str = "Bid Denied";
    pub const BID_INSUFFICIENT: &str = "Bid Insufficient";
    pub const BID_TRANSFER_EXTERNAL: &str = "Bid Transfer External";
    pub const LEVERAGE_SUCCESS: &str = "Leverage Success";
    pub const LEVERAGE_FAILED: &str = "Leverage Failed";
    pub const COMMUNICATION_SUCCESS: &str = "Communication Success";
    pub const COMMUNICATION_FAILED: &str = "Communication Failed";
    pub const COMMUNICATION_FAILED_LEVERAGE: &str = "Communication Failed Leverage";
    pub const RELOAD_CONTAINER: &str = "Reload Container";
    pub const INVENTORY_TOGGLE: &str = "Inventory Toggle";
    pub const CHARACTER_SHEET_TOGGLE: &str = "Character Sheet Toggle";
    pub const NOTES: &str = "Notes";
    pub const MAP: &str = "Map";
    pub const TAB_MENU_SHOW: &str = "TAB Menu Show";
    pub const TAB_MENU_HIDE: &str = "TAB Menu Hide";
    pub const JUMP: &str = "Jump";
    pub const MELEE_BLOCK_LEFT: &str = "Left Melee Block";
    pub const MELEE_BLOCK_RIGHT: &str = "Right Melee Block";
    pub const CHARACTER_LOAD: &str = "Character Load";
    pub const CHARACTER_SAVE: &str = "Character Save";
    pub const ITEM_LOAD: &str = "Item Load";
}

/// Phase hooks bracketing a named action: "Impact Pre", "Impact Post".
pub fn pre(action: &str) -> String {
    format!("{} Pre", action)
}

pub fn post(action: &str) -> String {
    format!("{} Post", action)
}

pub fn finish(action: &str) -> String {
    format!("{} Finish", action)
}

pub fn ready(action: &str) -> String {
    format!("{} Ready", action)
}

/// Spread announcements when an impact carries through a part.
pub fn through(action: &str) -> String {
    format!("{} Through", action)
}

/// Fired when a hand-class part is asked to act while holding nothing.
pub fn unarmed(part_name: &str) -> String {
    format!("{} Unarmed", part_name)
}

/// What a hook handler gets to see. Ids and a detail blob; handlers never
/// receive world access and so cannot reenter a tick in flight.
#[derive(Debug, Clone, Default)]
pub struct HookPayload {
    pub actor: Option<ActorId>,
    pub target: Option<ActorId>,
    pub part: Option<PartId>,
    pub detail: Value,
}

impl HookPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actor(mut self, id: ActorId) -> Self {
        self.actor = Some(id);
        self
    }

    pub fn target(mut self, id: ActorId) -> Self {
        self.target = Some(id);
        self
    }

    pub fn part(mut self, id: PartId) -> Self {
        self.part = Some(id);
        self
    }

    pub fn detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}

type HookFn = Box<dyn FnMut(&HookPayload) -> Option<Value> + Send>;

/// Name-keyed handler table, one handler per name.
#[derive(Default)]
pub struct HookRegistry {
    handlers: AHashMap<String, HookFn>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a handler, displacing any previous one for the name.
    pub fn register<F>(&mut self, name: &str, handler: F)
    where
        F: FnMut(&HookPayload) -> Option<Value> + Send + 'static,
    {
        if self
            .handlers
            .insert(name.to_string(), Box::new(handler))
            .is_some()
        {
            warn!(hook = name, "hook handler replaced");
        }
    }

    /// Install a handler that only observes, never answers.
    pub fn observe<F>(&mut self, name: &str, mut handler: F)
    where
        F: FnMut(&HookPayload) + Send + 'static,
    {
        self.register(name, move |payload| {
            handler(payload);
            None
        });
    }

    pub fn unregister(&mut self, name: &str) {
        self.handlers.remove(name);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Fire a hook. `None` when unhandled or the handler had no answer.
    pub fn handle(&mut self, name: &str, payload: &HookPayload) -> Option<Value> {
        match self.handlers.get_mut(name) {
            Some(handler) => {
                trace!(hook = name, "hook fired");
                handler(payload)
            }
            None => {
                debug!(hook = name, detail = %payload.detail, "hook unhandled");
                None
            }
        }
    }

    /// Fire a hook, falling back to the caller's default answer.
    pub fn handle_or(&mut self, name: &str, payload: &HookPayload, default: Value) -> Value {
        self.handle(name, payload).unwrap_or(default)
    }

    /// Fire a hook with a bare text detail.
    pub fn report(&mut self, name: &str, message: &str) {
        self.handle(
            name,
            &HookPayload::new().detail(Value::String(message.to_string())),
        );
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("HookRegistry").field("handlers", &names).finish()
    }
}
