//! Actor roles over the shared part graph
//!
//! Characters, items, and mediums are all the same kind of participant:
//! an actor owns a slice of the part graph, a queue of demands, and the
//! trackers for supply it has in flight. What distinguishes them is the
//! role state - a character carries a soul and a body, an item carries
//! its own action repertoire, a medium carries the actors moving through
//! it. The protocol functions in the sibling modules operate on these
//! records through the world.

pub mod bindings;
pub mod character;
pub mod item;
pub mod medium;

use ahash::{AHashMap, AHashSet};

use crate::core::types::{ActorId, Millis, PartId, TrackerId};
use crate::interactions::interaction::{ActionKind, Interaction, SlipId, Tracking};
use crate::interactions::trade::TradeSlip;
use crate::psyche::{PsycheLeverage, PsychePivot};
use crate::stats::{Indicator, IndicatorKind, IndicatorSources, Stat, StatGroup};

pub use bindings::{BindingTable, BodyVector, HeldKeys, MovementUpdate};

/// One participant in the simulation.
#[derive(Debug)]
pub struct Actor {
    pub id: ActorId,
    pub name: String,
    /// Root node of this actor's slice of the part graph.
    pub root: PartId,
    /// Demands awaiting supply, drained each tick.
    pub interactions: Vec<Interaction>,
    /// Supply in flight, keyed by the originating demand's tracker.
    pub tracking: AHashMap<TrackerId, Tracking>,
    /// Ticks since this actor's state was last swept.
    pub gc_count: u64,
    pub role: ActorRole,
}

#[derive(Debug)]
pub enum ActorRole {
    Character(Box<CharacterState>),
    Item(ItemState),
    Medium(MediumState),
}

impl Actor {
    pub fn character(id: ActorId, name: impl Into<String>, root: PartId) -> Self {
        Self {
            id,
            name: name.into(),
            root,
            interactions: Vec::new(),
            tracking: AHashMap::new(),
            gc_count: 0,
            role: ActorRole::Character(Box::default()),
        }
    }

    pub fn item(id: ActorId, name: impl Into<String>, root: PartId) -> Self {
        Self {
            id,
            name: name.into(),
            root,
            interactions: Vec::new(),
            tracking: AHashMap::new(),
            gc_count: 0,
            role: ActorRole::Item(ItemState::default()),
        }
    }

    pub fn medium(id: ActorId, name: impl Into<String>, root: PartId) -> Self {
        Self {
            id,
            name: name.into(),
            root,
            interactions: Vec::new(),
            tracking: AHashMap::new(),
            gc_count: 0,
            role: ActorRole::Medium(MediumState::default()),
        }
    }

    pub fn role_name(&self) -> &'static str {
        match self.role {
            ActorRole::Character(_) => "character",
            ActorRole::Item(_) => "item",
            ActorRole::Medium(_) => "medium",
        }
    }

    pub fn as_character(&self) -> Option<&CharacterState> {
        match &self.role {
            ActorRole::Character(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_character_mut(&mut self) -> Option<&mut CharacterState> {
        match &mut self.role {
            ActorRole::Character(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_item(&self) -> Option<&ItemState> {
        match &self.role {
            ActorRole::Item(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_item_mut(&mut self) -> Option<&mut ItemState> {
        match &mut self.role {
            ActorRole::Item(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_medium(&self) -> Option<&MediumState> {
        match &self.role {
            ActorRole::Medium(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_medium_mut(&mut self) -> Option<&mut MediumState> {
        match &mut self.role {
            ActorRole::Medium(state) => Some(state),
            _ => None,
        }
    }

    /// Register supply for a demand: allocate the tracker, stamp it on the
    /// interaction, and remember the original for feedback.
    pub fn track(&mut self, mut interaction: Interaction, now: Millis) -> TrackerId {
        let tracker = interaction.tracker.unwrap_or_else(TrackerId::new);
        interaction.tracker = Some(tracker);
        self.tracking
            .entry(tracker)
            .or_insert_with(|| Tracking::new(now, interaction));
        tracker
    }

    /// A derived interaction joined the tracker.
    pub fn track_up(&mut self, tracker: TrackerId) {
        if let Some(entry) = self.tracking.get_mut(&tracker) {
            entry.count += 1;
        }
    }

    /// A derived interaction resolved.
    pub fn track_down(&mut self, tracker: TrackerId) {
        if let Some(entry) = self.tracking.get_mut(&tracker) {
            entry.count = entry.count.saturating_sub(1);
        }
    }

    /// Drain every tracker whose derived interactions have all resolved.
    /// Callers feed the returned originals back to their demanders.
    pub fn drain_settled(&mut self) -> Vec<Tracking> {
        let settled: Vec<TrackerId> = self
            .tracking
            .iter()
            .filter(|(_, entry)| entry.count == 0)
            .map(|(id, _)| *id)
            .collect();
        settled
            .into_iter()
            .filter_map(|id| self.tracking.remove(&id))
            .collect()
    }

    /// Running interactions matching an action and initiator, for the
    /// one-action-per-part gate and stop requests.
    pub fn find_tracked(&self, action: &ActionKind, actor: Option<ActorId>) -> Option<TrackerId> {
        self.tracking
            .iter()
            .find(|(_, entry)| {
                entry.interaction.action() == action
                    && (actor.is_none() || entry.interaction.actor == actor)
            })
            .map(|(id, _)| *id)
    }
}

/// The permanent half of a character: the soul's stat groups and pools.
/// Survives death; the body is whatever part graph it currently drives.
#[derive(Debug)]
pub struct CharacterSoul {
    pub stats: StatGroup,
    pub disciplines: StatGroup,
    pub skills: StatGroup,
    pub abilities: StatGroup,
    pub disorders: StatGroup,
    pub phobias: StatGroup,
    pub indicators: Vec<Indicator>,
}

impl Default for CharacterSoul {
    fn default() -> Self {
        Self {
            stats: StatGroup::new("Stats", 0.0),
            disciplines: StatGroup::new("Disciplines", 0.0),
            skills: StatGroup::new("Skills", 0.0),
            abilities: StatGroup::new("Abilities", 0.0),
            disorders: StatGroup::new("Disorders", 0.0),
            phobias: StatGroup::new("Phobias", 0.0),
            indicators: IndicatorKind::DEFAULT
                .iter()
                .map(|kind| Indicator::new(*kind))
                .collect(),
        }
    }
}

impl CharacterSoul {
    /// Look an ability up across the groups, most specific first.
    pub fn ability(&self, name: &str) -> Option<&Stat> {
        self.abilities
            .find(name)
            .or_else(|| self.skills.find(name))
            .or_else(|| self.disciplines.find(name))
            .or_else(|| self.stats.find(name))
    }

    pub fn ability_total(&self, name: &str) -> f64 {
        self.ability(name).map(|stat| stat.total).unwrap_or(0.0)
    }

    pub fn indicator(&self, kind: IndicatorKind) -> Option<&Indicator> {
        self.indicators.iter().find(|i| i.kind == kind)
    }

    pub fn indicator_mut(&mut self, kind: IndicatorKind) -> Option<&mut Indicator> {
        self.indicators.iter_mut().find(|i| i.kind == kind)
    }

    /// Advance every per-millisecond drain.
    pub fn tick_indicators(&mut self, diff: Millis) {
        for indicator in &mut self.indicators {
            indicator.tick(diff);
        }
    }

    /// Collect the stat readings indicator maxima derive from.
    /// `vital_health_max` and `body_weight` come from the body graph and
    /// are supplied by the caller.
    pub fn indicator_sources(&self, vital_health_max: f64, body_weight: f64) -> IndicatorSources {
        IndicatorSources {
            vital_health_max,
            body_weight,
            carry_by_weight: self.stats.total_of("Carry Weight"),
            carry_by_strength: self.stats.total_of("Carry Strength"),
            energy_base: self.stats.total_of("Energy"),
            concentration_base: self.stats.total_of("Concentration"),
            fatigue_base: self.stats.total_of("Fatigue"),
            strength: self.stats.total_of("Strength"),
            willpower: self.stats.total_of("Willpower"),
            psychic: self.stats.total_of("Psychic"),
            metabolism: self.stats.total_of("Metabolism"),
            belief: self.stats.total_of("Belief"),
            intelligence: self.stats.total_of("Intelligence"),
            endurance: self.stats.total_of("Endurance"),
            acute_stress: self.disorders.total_of("Acute Stress"),
            psychotic_disorder: self.disorders.total_of("Psychotic Disorder"),
            depression: self.disorders.total_of("Depression"),
        }
    }

    /// Re-derive group totals after allocation or education changes.
    pub fn consolidate(&mut self, ceiling: f64) {
        self.stats.consolidate(ceiling);
        self.disciplines.consolidate(ceiling);
        self.skills.consolidate(ceiling);
        self.abilities.consolidate(ceiling);
        self.disorders.update();
        self.phobias.update();
        self.link_abilities();
    }

    /// Backfill each ability's skill linkage. The declared "Skill" extra
    /// wins; an unadorned ability links to the skill sharing its name.
    /// The result is cached on the stat so cost derivation never repeats
    /// the search.
    pub fn link_abilities(&mut self) {
        for ability in &mut self.abilities.stats {
            if ability.group_link.is_some() {
                continue;
            }
            let declared = ability
                .extra
                .get("Skill")
                .cloned()
                .unwrap_or_else(|| ability.name.clone());
            if let Some(skill) = self.skills.find(&declared) {
                ability.group_link = Some(skill.name.clone());
            }
        }
    }
}

/// The transient half of a character: body, bindings, and social ledgers.
#[derive(Debug, Default)]
pub struct CharacterState {
    pub soul: CharacterSoul,
    /// Body root while incarnated.
    pub body: Option<PartId>,
    pub npc: bool,
    /// Consciousness stages remaining; at zero or below the character is
    /// out and mediums stop offering it targets.
    pub conscious: i32,
    /// Free to bind a new body.
    pub available: bool,
    /// Bodies this soul has vacated, most recent last.
    pub bound_bodies: Vec<PartId>,
    /// Manipulation-capable parts in readying order.
    pub manipulators: Vec<PartId>,
    /// Readied state per manipulator, same order.
    pub readied: Vec<bool>,
    pub torso: Option<PartId>,
    pub vector: BodyVector,
    /// Completed interactions waiting out their feedback delay.
    pub feedback_queue: Vec<Interaction>,
    /// Item to the pack location it was last holstered into.
    pub pack: AHashMap<PartId, PartId>,
    /// Physical-to-logical key mapping for this character.
    pub bindings: BindingTable,
    /// Keys currently held down, with hold accounting.
    pub held_keys: HeldKeys,
    /// Most recent key to go down, repeat-suppressed until it lifts.
    pub last_pressed: Option<String>,
    /// Logical bindings already down, to swallow auto-repeats.
    pub pressed: AHashSet<String>,
    /// Releases to swallow because the hold already resolved.
    pub skip_release: AHashSet<String>,
    /// Psyche pivots keyed by the disorder or phobia they attach to.
    pub pivots: AHashMap<String, Vec<PsychePivot>>,
    /// Leverage others hold over this character.
    pub leveraged: Vec<PsycheLeverage>,
    /// Account parts holding credit and receipts.
    pub accounts: Vec<PartId>,
    /// Item kinds this character may trade in.
    pub licenses: Vec<String>,
    /// Open trade slips by correlation id.
    pub trades: AHashMap<SlipId, TradeSlip>,
    /// Souls surfaced by divining searches, in discovery order.
    pub souls: Vec<ActorId>,
}

impl CharacterState {
    pub fn is_conscious(&self) -> bool {
        self.conscious > 0
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Draw a one-off amount from an indicator pool.
    pub fn indicator_draw(&mut self, kind: IndicatorKind, amount: f64) -> f64 {
        self.soul
            .indicator_mut(kind)
            .map(|i| i.draw(amount))
            .unwrap_or(0.0)
    }

    /// Restore a one-off amount into an indicator pool.
    pub fn indicator_restore(&mut self, kind: IndicatorKind, amount: f64) -> f64 {
        self.soul
            .indicator_mut(kind)
            .map(|i| i.pool(amount))
            .unwrap_or(0.0)
    }

    /// Remaining pool of an indicator.
    pub fn indicator_pool(&self, kind: IndicatorKind) -> f64 {
        self.soul.indicator(kind).map(|i| i.value()).unwrap_or(0.0)
    }

    /// Manipulator index, for the readied table.
    pub fn manipulator_index(&self, part: PartId) -> Option<usize> {
        self.manipulators.iter().position(|&p| p == part)
    }

    pub fn is_readied(&self, part: PartId) -> bool {
        self.manipulator_index(part)
            .map(|i| self.readied.get(i).copied().unwrap_or(false))
            .unwrap_or(false)
    }

    pub fn set_readied(&mut self, part: PartId, state: bool) {
        if let Some(index) = self.manipulator_index(part) {
            if let Some(slot) = self.readied.get_mut(index) {
                *slot = state;
            }
        }
    }
}

/// How many projections an item releases per trigger pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FireMode {
    #[default]
    Single,
    Triple,
}

impl FireMode {
    pub fn cap(&self) -> u32 {
        match self {
            FireMode::Single => 1,
            FireMode::Triple => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FireMode::Single => "Single",
            FireMode::Triple => "Triple",
        }
    }

    pub fn parse(name: &str) -> Option<FireMode> {
        match name.trim() {
            "Single" => Some(FireMode::Single),
            "Triple" => Some(FireMode::Triple),
            _ => None,
        }
    }
}

/// Role state for a free-standing item.
#[derive(Debug, Default)]
pub struct ItemState {
    /// Actions the item supplies with its own resolvers instead of
    /// forwarding as generic demands.
    pub act_enabled: Vec<ActionKind>,
    pub mode: FireMode,
    /// Speed imparted by the last throw or projection, m/s.
    pub velocity: f64,
}

/// Role state for a medium channel.
#[derive(Debug, Default)]
pub struct MediumState {
    /// Connection refcounts per actor inside the medium.
    pub connected: AHashMap<ActorId, u32>,
    /// Last understanding weights observed per character, six axes.
    pub weightings: AHashMap<ActorId, Vec<f64>>,
}

impl MediumState {
    pub fn connect(&mut self, actor: ActorId) {
        *self.connected.entry(actor).or_insert(0) += 1;
    }

    /// Returns true when the last connection dropped.
    pub fn disconnect(&mut self, actor: ActorId) -> bool {
        match self.connected.get_mut(&actor) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.connected.remove(&actor);
                true
            }
            None => true,
        }
    }

    pub fn is_connected(&self, actor: ActorId) -> bool {
        self.connected.contains_key(&actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_allocates_once_and_drains_at_zero() {
        let mut actor = Actor::item(ActorId::new(), "Training Pistol", PartId(0));
        let demand = Interaction::new(None, None, None, ActionKind::Impact);
        let tracker = actor.track(demand, 10.0);
        actor.track_up(tracker);
        actor.track_up(tracker);
        assert!(actor.drain_settled().is_empty());
        actor.track_down(tracker);
        assert!(actor.drain_settled().is_empty());
        actor.track_down(tracker);
        let settled = actor.drain_settled();
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].started, 10.0);
        assert!(actor.tracking.is_empty());
    }

    #[test]
    fn test_medium_connections_refcount() {
        let mut medium = MediumState::default();
        let visitor = ActorId::new();
        medium.connect(visitor);
        medium.connect(visitor);
        assert!(!medium.disconnect(visitor));
        assert!(medium.is_connected(visitor));
        assert!(medium.disconnect(visitor));
        assert!(!medium.is_connected(visitor));
    }

    #[test]
    fn test_soul_ability_lookup_prefers_specific_groups() {
        let mut soul = CharacterSoul::default();
        soul.stats.find_or_create("Focus").ratio = 1.0;
        soul.skills.find_or_create("Focus").ratio = 3.0;
        let found = soul.ability("Focus").unwrap();
        assert_eq!(found.ratio, 3.0);
        assert!(soul.ability("Juggling").is_none());
    }

    #[test]
    fn test_link_abilities_caches_skill_names() {
        let mut soul = CharacterSoul::default();
        soul.skills.push(Stat::new("Marksmanship"));
        soul.skills.push(Stat::new("Throw"));
        let declared = soul.abilities.find_or_create("Project");
        declared.extra.insert("Skill".into(), "marksmanship".into());
        soul.abilities.push(Stat::new("Throw"));
        soul.abilities.push(Stat::new("Whistling"));
        soul.link_abilities();
        let by_extra = soul.abilities.find("Project").unwrap();
        assert_eq!(by_extra.group_link.as_deref(), Some("Marksmanship"));
        let by_name = soul.abilities.find("Throw").unwrap();
        assert_eq!(by_name.group_link.as_deref(), Some("Throw"));
        // no matching skill leaves the link open for a later declare
        let unlinked = soul.abilities.find("Whistling").unwrap();
        assert!(unlinked.group_link.is_none());
    }

    #[test]
    fn test_readied_toggles_by_part() {
        let mut state = CharacterState {
            manipulators: vec![PartId(3), PartId(7)],
            readied: vec![false, false],
            ..Default::default()
        };
        state.set_readied(PartId(7), true);
        assert!(!state.is_readied(PartId(3)));
        assert!(state.is_readied(PartId(7)));
    }
}
