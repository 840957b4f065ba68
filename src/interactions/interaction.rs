//! The interaction record and its action vocabulary
//!
//! An interaction is the single currency every actor trades in: a demand
//! raised by a character, routed through an item or medium, resolved over
//! ticks by frame countdown, and fed back to the originator exactly once
//! when its tracker drains. The record is deliberately wide - resolvers
//! annotate it in place rather than passing side tables around.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::abilities::calculator::AbilityCost;
use crate::core::types::{ActorId, Millis, PartId, TrackerId};
use crate::stats::IndicatorKind;

/// Correlation key for a trade slip held on a buyer's ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlipId(pub Uuid);

impl SlipId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SlipId {
    fn default() -> Self {
        Self::new()
    }
}

/// Every action the dispatch library resolves by name.
///
/// `Custom` carries anything the data files invent; dispatch reports those
/// through the "Unknown Interaction" hook and drops them rather than
/// failing the tick.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    // Pass-through demands items raise against body parts.
    Manipulation,
    Movement,
    Impact,
    Medium,
    Theatrical,
    Application,
    // Character intents.
    Reload,
    Holster,
    Unholster,
    ToggleHolster,
    Throw,
    Affects,
    Prime,
    // Psychic channel.
    PsyCharge,
    Construct,
    Imbue,
    Cleansing,
    ImbueSelect,
    Focusing,
    // Social channel.
    Communication,
    Leverage,
    Trade,
    Bid,
    Searching,
    SoulDivining,
    // Item internals.
    Project,
    Accuracy,
    Feed,
    Receive,
    Custom(String),
}

impl ActionKind {
    /// Display name, identical to the data-file spelling.
    pub fn name(&self) -> &str {
        match self {
            ActionKind::Manipulation => "Manipulation",
            ActionKind::Movement => "Movement",
            ActionKind::Impact => "Impact",
            ActionKind::Medium => "Medium",
            ActionKind::Theatrical => "Theatrical",
            ActionKind::Application => "Application",
            ActionKind::Reload => "Reload",
            ActionKind::Holster => "Holster",
            ActionKind::Unholster => "UnHolster",
            ActionKind::ToggleHolster => "ToggleHolster",
            ActionKind::Throw => "Throw",
            ActionKind::Affects => "Affects",
            ActionKind::Prime => "Prime",
            ActionKind::PsyCharge => "Psy Charge",
            ActionKind::Construct => "Construct",
            ActionKind::Imbue => "Imbue",
            ActionKind::Cleansing => "Cleansing",
            ActionKind::ImbueSelect => "Imbue Select",
            ActionKind::Focusing => "Focusing",
            ActionKind::Communication => "Communication",
            ActionKind::Leverage => "Leverage",
            ActionKind::Trade => "Trade",
            ActionKind::Bid => "Bid",
            ActionKind::Searching => "Searching",
            ActionKind::SoulDivining => "Soul Divining",
            ActionKind::Project => "Project",
            ActionKind::Accuracy => "Accuracy",
            ActionKind::Feed => "Feed",
            ActionKind::Receive => "Receive",
            ActionKind::Custom(name) => name,
        }
    }

    /// Parse a data-file action name. Matching is case- and
    /// space-insensitive; anything unrecognised survives as `Custom`.
    pub fn parse(name: &str) -> ActionKind {
        let key: String = name
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(|c| c.to_lowercase())
            .collect();
        match key.as_str() {
            "manipulation" => ActionKind::Manipulation,
            "movement" => ActionKind::Movement,
            "impact" => ActionKind::Impact,
            "medium" => ActionKind::Medium,
            "theatrical" => ActionKind::Theatrical,
            "application" => ActionKind::Application,
            "reload" => ActionKind::Reload,
            "holster" => ActionKind::Holster,
            "unholster" => ActionKind::Unholster,
            "toggleholster" => ActionKind::ToggleHolster,
            "throw" => ActionKind::Throw,
            "affects" => ActionKind::Affects,
            "prime" => ActionKind::Prime,
            "psycharge" => ActionKind::PsyCharge,
            "construct" => ActionKind::Construct,
            "imbue" => ActionKind::Imbue,
            "cleansing" => ActionKind::Cleansing,
            "imbueselect" => ActionKind::ImbueSelect,
            "focusing" => ActionKind::Focusing,
            "communication" => ActionKind::Communication,
            "leverage" => ActionKind::Leverage,
            "trade" => ActionKind::Trade,
            "bid" => ActionKind::Bid,
            "searching" => ActionKind::Searching,
            "souldivining" => ActionKind::SoulDivining,
            "project" => ActionKind::Project,
            "accuracy" => ActionKind::Accuracy,
            "feed" => ActionKind::Feed,
            "receive" => ActionKind::Receive,
            _ => ActionKind::Custom(name.to_string()),
        }
    }

    /// The pass-through demands: items raise these against the body parts
    /// acting on them, and any part advertising the action may answer
    /// without a named resolver.
    pub fn is_builtin(&self) -> bool {
        matches!(
            self,
            ActionKind::Manipulation
                | ActionKind::Movement
                | ActionKind::Impact
                | ActionKind::Medium
                | ActionKind::Theatrical
                | ActionKind::Application
                | ActionKind::PsyCharge
        )
    }

    /// Searches resolve without a chosen target; the medium fans them out.
    pub fn is_search(&self) -> bool {
        matches!(self, ActionKind::Searching | ActionKind::SoulDivining)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One action in flight between two bodies.
#[derive(Debug, Clone)]
pub struct Interaction {
    /// Initiating actor. `None` for demands raised internally by an item's
    /// own parts.
    pub actor: Option<ActorId>,
    /// Acting body part.
    pub part: Option<PartId>,
    /// Item the action runs through.
    pub item: Option<PartId>,
    /// Actor targets, when aimed at someone.
    pub targets: Vec<ActorId>,
    /// Part target, when aimed at something (a pack location, a struck
    /// limb, a manipulator to ready).
    pub target_part: Option<PartId>,
    /// Indicator standing in for `part` on indicator-to-container moves.
    pub indicator: Option<IndicatorKind>,
    /// Trade slip riding along on trade and bid responses.
    pub slip: Option<SlipId>,
    /// Emote weights accompanying communication, six understanding axes.
    pub emoting: Vec<f64>,
    /// Trackers this interaction waits on before dispatch.
    pub requires: AHashSet<TrackerId>,
    /// The action tuple; the first entry drives dispatch.
    pub actions: Vec<ActionKind>,
    /// Remaining countdown: elapsed milliseconds in real time, whole turns
    /// in turn-based mode.
    pub action_frames: f64,
    /// Psyche resistance against the action, from the willingness gate.
    pub modifier: f64,
    /// Accumulated actuation time through the supplying path, ms.
    pub timing: Millis,
    /// The timing an unhindered body would have achieved, ms.
    pub control_timing: Millis,
    /// Delay before completion feedback registers on the character, ms.
    pub feedback_time: Millis,
    /// Engine time the interaction started, ms.
    pub start: Millis,
    pub duration: Millis,
    pub distance_km: f64,
    /// Distance success ratio; `None` until something resolves it.
    pub distance_ratio: Option<f64>,
    pub tracker: Option<TrackerId>,
    /// Medium bridging the interaction, when one does.
    pub medium: Option<ActorId>,
    /// Indicator drains priced by the ability calculator.
    pub cost: AbilityCost,
    /// Per-target share on feed distribution.
    pub feed_share: f64,
}

impl Interaction {
    pub fn new(
        actor: Option<ActorId>,
        part: Option<PartId>,
        item: Option<PartId>,
        action: ActionKind,
    ) -> Self {
        Self {
            actor,
            part,
            item,
            targets: Vec::new(),
            target_part: None,
            indicator: None,
            slip: None,
            emoting: Vec::new(),
            requires: AHashSet::new(),
            actions: vec![action],
            action_frames: 1.0,
            modifier: 0.0,
            timing: 0.0,
            control_timing: 0.0,
            feedback_time: 0.0,
            start: 0.0,
            duration: 0.0,
            distance_km: 0.0,
            distance_ratio: None,
            tracker: None,
            medium: None,
            cost: AbilityCost::default(),
            feed_share: 0.0,
        }
    }

    pub fn at(mut self, now: Millis) -> Self {
        self.start = now;
        self
    }

    pub fn with_targets(mut self, targets: Vec<ActorId>) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_target_part(mut self, part: PartId) -> Self {
        self.target_part = Some(part);
        self
    }

    pub fn with_actions(mut self, rest: &[ActionKind]) -> Self {
        self.actions.extend_from_slice(rest);
        self
    }

    pub fn tracked(mut self, tracker: TrackerId) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// The dispatching action.
    pub fn action(&self) -> &ActionKind {
        &self.actions[0]
    }

    pub fn action_name(&self) -> &str {
        self.actions[0].name()
    }

    pub fn has_action(&self, kind: &ActionKind) -> bool {
        self.actions.contains(kind)
    }

    /// Count down and report whether the interaction is due to resolve.
    pub fn count_down(&mut self, amount: f64) -> bool {
        self.action_frames -= amount;
        self.action_frames <= 0.0
    }

    /// Ready for dispatch once nothing it requires is still running.
    pub fn unblocked(&self) -> bool {
        self.requires.is_empty()
    }

    /// Drop a completed dependency.
    pub fn complete_requirement(&mut self, tracker: TrackerId) {
        self.requires.remove(&tracker);
    }
}

/// Book-keeping an actor holds per tracker while supplying a demand.
///
/// `count` rises as derived interactions spawn and falls as they resolve;
/// the originating interaction is fed back exactly once, when the count
/// returns to zero and the actor has nothing else in flight.
#[derive(Debug, Clone)]
pub struct Tracking {
    pub count: u32,
    pub started: Millis,
    pub interaction: Interaction,
    /// Engine time of the last projection through this tracker.
    pub projected: Millis,
    /// Engine time the pending projection releases.
    pub projecting: Millis,
    /// Projections spent against the item's fire mode.
    pub project_count: u32,
}

impl Tracking {
    pub fn new(started: Millis, interaction: Interaction) -> Self {
        Self {
            count: 0,
            started,
            interaction,
            projected: 0.0,
            projecting: 0.0,
            project_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_names() {
        for kind in [
            ActionKind::PsyCharge,
            ActionKind::Unholster,
            ActionKind::SoulDivining,
            ActionKind::ImbueSelect,
        ] {
            assert_eq!(ActionKind::parse(kind.name()), kind);
        }
        assert_eq!(
            ActionKind::parse("psy charge"),
            ActionKind::PsyCharge,
        );
    }

    #[test]
    fn test_parse_keeps_unknown_names() {
        let kind = ActionKind::parse("Interpretive Dance");
        assert_eq!(kind, ActionKind::Custom("Interpretive Dance".into()));
        assert_eq!(kind.name(), "Interpretive Dance");
    }

    #[test]
    fn test_count_down_signals_once_due() {
        let mut interaction = Interaction::new(None, None, None, ActionKind::Impact);
        interaction.action_frames = 40.0;
        assert!(!interaction.count_down(16.0));
        assert!(!interaction.count_down(16.0));
        assert!(interaction.count_down(16.0));
    }

    #[test]
    fn test_requirements_block_dispatch() {
        let mut interaction = Interaction::new(None, None, None, ActionKind::Reload);
        let dependency = TrackerId::new();
        interaction.requires.insert(dependency);
        assert!(!interaction.unblocked());
        interaction.complete_requirement(dependency);
        assert!(interaction.unblocked());
    }
}
