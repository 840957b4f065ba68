//! Declarative part templates and the library that instantiates them
//!
//! A template is a part tree in data: the node's own fields, named
//! fittings attached below it, and container contents with `"Name*12"`
//! stack suffixes. Numeric fields accept strings and are coerced once
//! here at load time; resolvers downstream only ever see numbers. A
//! fitting carrying a "Replaces" affect substitutes for the like-named
//! part anywhere in the built tree, which is how variant bodies splice
//! grafts over stock limbs.

use ahash::AHashMap;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::core::error::{CapacityError, EngineError};
use crate::core::types::PartId;
use crate::parts::{BodyPart, ContainerSlot, ItemContainer, PartArena};
use crate::stats::{search_key, StatType};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no template named '{0}'")]
    Unknown(String),
    #[error("template '{0}' nests itself")]
    Recursive(String),
    #[error("template '{name}': '{item}' does not fit: {source}")]
    Capacity {
        name: String,
        item: String,
        #[source]
        source: CapacityError,
    },
    #[error(transparent)]
    Parse(#[from] serde_json::Error),
}

impl From<LoadError> for EngineError {
    fn from(err: LoadError) -> Self {
        EngineError::Template(err.to_string())
    }
}

fn loose_f64<'de, D: Deserializer<'de>>(de: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }
    match Raw::deserialize(de)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                Ok(0.0)
            } else {
                text.parse().map_err(serde::de::Error::custom)
            }
        }
    }
}

fn loose_u32<'de, D: Deserializer<'de>>(de: D) -> Result<u32, D::Error> {
    Ok(loose_f64(de)? as u32)
}

/// A named ratio in template form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatEntry {
    pub name: String,
    #[serde(deserialize_with = "loose_f64")]
    pub ratio: f64,
    pub description: String,
}

impl StatEntry {
    fn as_stat_type(&self) -> StatType {
        let mut stat = StatType::new(&self.name, self.ratio);
        stat.description = self.description.clone();
        stat
    }
}

fn entry(name: &str, ratio: f64) -> StatEntry {
    StatEntry {
        name: name.to_string(),
        ratio,
        description: String::new(),
    }
}

/// A container slot in template form. Zero limits read as unbounded;
/// `items` name other templates, `"Name*12"` for stacks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerTemplate {
    #[serde(deserialize_with = "loose_f64")]
    pub max_volume: f64,
    #[serde(deserialize_with = "loose_f64")]
    pub max_weight: f64,
    #[serde(deserialize_with = "loose_u32")]
    pub max_quantity: u32,
    pub restrict: Vec<String>,
    /// Per-tag quantity ceilings, keyed by restriction tag.
    pub caps: AHashMap<String, u32>,
    pub items: Vec<String>,
}

impl ContainerTemplate {
    fn as_container(&self) -> ItemContainer {
        let mut container = ItemContainer::new(
            (self.max_volume > 0.0).then_some(self.max_volume),
            (self.max_weight > 0.0).then_some(self.max_weight),
        );
        if self.max_quantity > 0 {
            container.quantity_max = Some(self.max_quantity);
        }
        container.restrict = self.restrict.clone();
        for (tag, max) in &self.caps {
            container.cap_tag(tag, *max);
        }
        container
    }
}

/// One part in declarative form. Unset numerics read as zero, matching
/// the loosely typed data this format grew out of; `health_max` of zero
/// means no explicit ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PartTemplate {
    pub name: String,
    pub description: String,
    pub group: String,
    pub kind: String,
    pub actions: Vec<String>,
    pub requires: Vec<String>,
    pub functions: Vec<StatEntry>,
    pub affect: Vec<StatEntry>,
    #[serde(deserialize_with = "loose_f64")]
    pub weight: f64,
    #[serde(deserialize_with = "loose_f64")]
    pub volume: f64,
    #[serde(deserialize_with = "loose_f64")]
    pub health: f64,
    #[serde(deserialize_with = "loose_f64")]
    pub health_max: f64,
    #[serde(deserialize_with = "loose_f64")]
    pub circulation: f64,
    #[serde(deserialize_with = "loose_f64")]
    pub action_time: f64,
    #[serde(deserialize_with = "loose_f64")]
    pub rrp: f64,
    #[serde(deserialize_with = "loose_f64")]
    pub superstition: f64,
    pub for_sale: bool,
    #[serde(deserialize_with = "loose_u32")]
    pub quantity: u32,
    pub contains: Option<ContainerTemplate>,
    pub wears: Option<ContainerTemplate>,
    /// Names of templates fitted below this one, `"Name*2"` for repeats.
    pub connections: Vec<String>,
    pub extra: AHashMap<String, String>,
}

impl Default for PartTemplate {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            group: String::new(),
            kind: String::new(),
            actions: Vec::new(),
            requires: Vec::new(),
            functions: Vec::new(),
            affect: Vec::new(),
            weight: 0.0,
            volume: 0.0,
            health: 0.0,
            health_max: 0.0,
            circulation: 1.0,
            action_time: 0.0,
            rrp: 0.0,
            superstition: 0.0,
            for_sale: false,
            quantity: 1,
            contains: None,
            wears: None,
            connections: Vec::new(),
            extra: AHashMap::new(),
        }
    }
}

impl PartTemplate {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn as_part(&self) -> BodyPart {
        let mut part = BodyPart::new(&self.name);
        part.description = self.description.clone();
        part.group = self.group.clone();
        part.kind = self.kind.clone();
        part.actions = self.actions.clone();
        part.requires = self.requires.clone();
        part.functions = self.functions.iter().map(StatEntry::as_stat_type).collect();
        part.affect = self.affect.iter().map(StatEntry::as_stat_type).collect();
        part.weight = self.weight;
        part.volume = self.volume;
        part.health = if self.health > 0.0 {
            self.health
        } else {
            self.health_max
        };
        part.health_max = (self.health_max > 0.0).then_some(self.health_max);
        part.circulation = self.circulation;
        part.action_time = self.action_time;
        part.rrp = self.rrp;
        part.superstition = self.superstition;
        part.for_sale = self.for_sale;
        part.quantity = self.quantity.max(1);
        part.contains = self.contains.as_ref().map(ContainerTemplate::as_container);
        part.wears = self.wears.as_ref().map(ContainerTemplate::as_container);
        part.extra = self.extra.clone();
        part
    }
}

/// Split a `"Name*12"` reference into name and count.
fn split_stack(reference: &str) -> (&str, u32) {
    match reference.rsplit_once('*') {
        Some((name, count)) => match count.trim().parse() {
            Ok(count) => (name.trim_end(), count),
            Err(_) => (reference, 1),
        },
        None => (reference, 1),
    }
}

/// Name-keyed template library.
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    templates: AHashMap<String, PartTemplate>,
}

impl TemplateLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the template's search key, displacing any previous
    /// holder of the name.
    pub fn register(&mut self, template: PartTemplate) {
        self.templates.insert(search_key(&template.name), template);
    }

    /// Parse a JSON array of templates and register them all.
    pub fn load_json(&mut self, text: &str) -> Result<usize, LoadError> {
        let parsed: Vec<PartTemplate> = serde_json::from_str(text)?;
        let count = parsed.len();
        for template in parsed {
            self.register(template);
        }
        Ok(count)
    }

    pub fn get(&self, name: &str) -> Option<&PartTemplate> {
        self.templates.get(&search_key(name))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Materialise a named template into the arena: the part itself, its
    /// fittings, its container contents, and any "Replaces" substitutions,
    /// measured and ready to hand to an actor.
    pub fn instantiate(&self, arena: &mut PartArena, name: &str) -> Result<PartId, LoadError> {
        let mut visiting = Vec::new();
        let id = self.build(arena, name, &mut visiting)?;
        arena.measure(id);
        Ok(id)
    }

    /// `instantiate` for callers with a fallback on a missing name.
    pub fn spawn(&self, arena: &mut PartArena, name: &str) -> Option<PartId> {
        match self.instantiate(arena, name) {
            Ok(id) => Some(id),
            Err(LoadError::Unknown(_)) => None,
            Err(err) => {
                debug!(template = name, error = %err, "template failed to build");
                None
            }
        }
    }

    fn build(
        &self,
        arena: &mut PartArena,
        name: &str,
        visiting: &mut Vec<String>,
    ) -> Result<PartId, LoadError> {
        let key = search_key(name);
        if visiting.contains(&key) {
            return Err(LoadError::Recursive(name.to_string()));
        }
        let Some(template) = self.templates.get(&key) else {
            return Err(LoadError::Unknown(name.to_string()));
        };
        visiting.push(key);
        let id = arena.alloc(template.as_part());
        for reference in &template.connections {
            let (child_name, count) = split_stack(reference);
            for _ in 0..count.max(1) {
                let child = self.build(arena, child_name, visiting)?;
                arena.attach(id, child);
            }
        }
        for (slot, spec) in [
            (ContainerSlot::Contains, &template.contains),
            (ContainerSlot::Wears, &template.wears),
        ] {
            let Some(spec) = spec else {
                continue;
            };
            for reference in &spec.items {
                let (item_name, count) = split_stack(reference);
                let item = self.build(arena, item_name, visiting)?;
                if count > 1 {
                    if let Some(node) = arena.get_mut(item) {
                        node.quantity = count;
                    }
                }
                if let Err(source) = arena.container_add(id, slot, item) {
                    visiting.pop();
                    return Err(LoadError::Capacity {
                        name: template.name.clone(),
                        item: item_name.to_string(),
                        source,
                    });
                }
            }
        }
        self.apply_replacements(arena, id);
        visiting.pop();
        Ok(id)
    }

    /// Fittings carrying a "Replaces" affect displace the named part
    /// anywhere in the built subtree and take its place in the graph.
    fn apply_replacements(&self, arena: &mut PartArena, id: PartId) {
        let children: Vec<PartId> = arena
            .get(id)
            .map(|node| node.connections.clone())
            .unwrap_or_default();
        for child in children {
            let Some(target) = arena
                .get(child)
                .and_then(|node| node.affect_named("Replaces"))
                .map(|replaces| replaces.description.clone())
            else {
                continue;
            };
            if target.is_empty() {
                continue;
            }
            let Some(displaced) = arena
                .find_name(id, &target, true)
                .into_iter()
                .find(|&found| found != child)
            else {
                continue;
            };
            let Some(parent) = arena.get(displaced).and_then(|node| node.parent) else {
                continue;
            };
            arena.unlink(parent, displaced);
            if parent != id {
                arena.unlink(id, child);
                arena.attach(parent, child);
            }
        }
    }

    /// The built-in set backing the demo shell and the integration tests:
    /// a humanoid body, a sidearm with feedable magazines, an armoured
    /// vest with pouches, a psy focus, trade goods, currency stacks, and
    /// the two mediums.
    pub fn builtin() -> Self {
        let mut library = Self::new();
        for template in builtin_set() {
            library.register(template);
        }
        library
    }
}

fn builtin_set() -> Vec<PartTemplate> {
    let mut set = Vec::new();

    // -- the humanoid body --
    let mut humanoid = PartTemplate::new("Humanoid");
    humanoid.group = "Body".into();
    humanoid.connections = vec!["Body".into()];
    set.push(humanoid);

    let mut body = PartTemplate::new("Body");
    body.group = "Body".into();
    body.kind = "Vital".into();
    body.weight = 34.0;
    body.health_max = 40.0;
    body.action_time = 400.0;
    body.wears = Some(ContainerTemplate {
        max_quantity: 6,
        ..Default::default()
    });
    body.connections = vec![
        "Head".into(),
        "Left Arm".into(),
        "Right Arm".into(),
        "Left Leg".into(),
        "Right Leg".into(),
    ];
    set.push(body);

    let mut head = PartTemplate::new("Head");
    head.group = "Body".into();
    head.kind = "Vital".into();
    head.weight = 4.5;
    head.health_max = 12.0;
    head.connections = vec!["Brain".into()];
    set.push(head);

    let mut brain = PartTemplate::new("Brain");
    brain.group = "Body".into();
    brain.kind = "Vital".into();
    brain.weight = 1.4;
    brain.health_max = 8.0;
    set.push(brain);

    for side in ["Left", "Right"] {
        let mut arm = PartTemplate::new(&format!("{side} Arm"));
        arm.group = "Body".into();
        arm.weight = 3.5;
        arm.health_max = 25.0;
        arm.action_time = 150.0;
        arm.connections = vec![format!("{side} Hand")];
        set.push(arm);

        let mut hand = PartTemplate::new(&format!("{side} Hand"));
        hand.group = "Body".into();
        hand.weight = 0.5;
        hand.health_max = 12.0;
        hand.action_time = 120.0;
        hand.actions = vec![
            "Impact".into(),
            "Throw".into(),
            "Project".into(),
            "Feed".into(),
            "Reload".into(),
            "Holster".into(),
            "UnHolster".into(),
            "Psy Charge".into(),
            "Construct".into(),
            "Imbue".into(),
        ];
        hand.functions = vec![entry("Manipulation", 1.0)];
        hand.contains = Some(ContainerTemplate {
            max_quantity: 2,
            max_weight: 9.0,
            ..Default::default()
        });
        set.push(hand);

        let mut leg = PartTemplate::new(&format!("{side} Leg"));
        leg.group = "Body".into();
        leg.weight = 10.5;
        leg.health_max = 30.0;
        leg.functions = vec![entry("Movement", 1.0)];
        leg.connections = vec![format!("{side} Foot")];
        set.push(leg);

        let mut foot = PartTemplate::new(&format!("{side} Foot"));
        foot.group = "Body".into();
        foot.weight = 1.0;
        foot.health_max = 14.0;
        foot.action_time = 250.0;
        foot.actions = vec!["Impact".into()];
        foot.functions = vec![entry("Movement", 0.6)];
        set.push(foot);
    }

    // -- the sidearm and its feed chain --
    let mut sidearm = PartTemplate::new("Sidearm");
    sidearm.group = "Weapon".into();
    sidearm.kind = "Sidearm".into();
    sidearm.weight = 1.1;
    sidearm.volume = 0.0012;
    sidearm.health_max = 80.0;
    sidearm.action_time = 350.0;
    sidearm.rrp = 420.0;
    sidearm.actions = vec!["Project".into(), "Feed".into()];
    sidearm.requires = vec!["Project".into()];
    sidearm.extra.insert("Default Action".into(), "Project".into());
    sidearm.connections = vec!["Gun Barrel".into(), "Box Magazine".into()];
    set.push(sidearm);

    // the barrel projects and is fed; the magazine reloads and donates
    let mut barrel = PartTemplate::new("Gun Barrel");
    barrel.group = "Weapon".into();
    barrel.kind = "Barrel".into();
    barrel.weight = 0.3;
    barrel.actions = vec!["Project".into(), "Feed".into()];
    barrel.functions = vec![entry("Project", 1.0), entry("Feed", 1.0)];
    barrel.affect = vec![entry("Single Release", 400.0), entry("Triple Release", 1100.0)];
    barrel.contains = Some(ContainerTemplate {
        max_quantity: 15,
        restrict: vec!["Bullet".into()],
        items: vec!["9mm Round*15".into()],
        ..Default::default()
    });
    set.push(barrel);

    let mut magazine = PartTemplate::new("Box Magazine");
    magazine.group = "Ammunition".into();
    magazine.kind = "Magazine".into();
    magazine.weight = 0.22;
    magazine.volume = 0.0004;
    magazine.rrp = 28.0;
    magazine.actions = vec!["Feed".into()];
    magazine.functions = vec![entry("Reload", 1.0)];
    magazine.affect = vec![entry("Reload", 1800.0), entry("Reload Min", 700.0)];
    magazine.contains = Some(ContainerTemplate {
        max_quantity: 15,
        restrict: vec!["Bullet".into()],
        items: vec!["9mm Round*15".into()],
        ..Default::default()
    });
    set.push(magazine);

    let mut round = PartTemplate::new("9mm Round");
    round.group = "Bullet".into();
    round.kind = "Ball".into();
    round.weight = 0.008;
    round.volume = 0.00001;
    round.rrp = 0.4;
    round.affect = vec![
        entry("Velocity 0", 350.0),
        entry("Velocity 152.4", 290.0),
        entry("Accuracy", 0.08),
    ];
    set.push(round);

    // -- worn kit --
    let mut vest = PartTemplate::new("Armoured Vest");
    vest.group = "Apparel".into();
    vest.kind = "Protection".into();
    vest.weight = 6.0;
    vest.volume = 0.008;
    vest.health_max = 60.0;
    vest.rrp = 310.0;
    vest.functions = vec![entry("Impact", 1.0), entry("Project", 1.0)];
    vest.connections = vec!["Magazine Pouch*2".into(), "Holster Rig".into()];
    set.push(vest);

    let mut pouch = PartTemplate::new("Magazine Pouch");
    pouch.group = "Apparel".into();
    pouch.kind = "Pouch".into();
    pouch.weight = 0.15;
    pouch.contains = Some(ContainerTemplate {
        max_quantity: 2,
        restrict: vec!["Magazine".into()],
        items: vec!["Box Magazine".into()],
        ..Default::default()
    });
    set.push(pouch);

    let mut rig = PartTemplate::new("Holster Rig");
    rig.group = "Apparel".into();
    rig.kind = "Holster".into();
    rig.weight = 0.3;
    rig.contains = Some(ContainerTemplate {
        max_quantity: 1,
        restrict: vec!["Sidearm".into()],
        ..Default::default()
    });
    set.push(rig);

    // -- psychic kit --
    let mut focus = PartTemplate::new("Psy Focus");
    focus.group = "Psychic".into();
    focus.kind = "Focus".into();
    focus.weight = 0.3;
    focus.health_max = 40.0;
    focus.action_time = 300.0;
    focus.rrp = 520.0;
    focus.requires = vec!["Psy Charge".into(), "Construct".into(), "Imbue".into()];
    focus.functions = vec![
        entry("Psy Charge", 1.0),
        entry("Construct", 1.0),
        entry("Imbue", 1.0),
    ];
    focus.extra.insert("Default Action".into(), "Psy Charge".into());
    focus.connections = vec!["Psy Cell".into()];
    set.push(focus);

    let mut cell = PartTemplate::new("Psy Cell");
    cell.group = "Psychic".into();
    cell.kind = "Battery".into();
    cell.weight = 0.12;
    cell.rrp = 45.0;
    cell.contains = Some(ContainerTemplate {
        max_quantity: 100,
        restrict: vec!["Psytron".into()],
        items: vec!["Psytron*40".into()],
        ..Default::default()
    });
    set.push(cell);

    let mut psytron = PartTemplate::new("Psytron");
    psytron.group = "Energy".into();
    psytron.kind = "Energy".into();
    psytron.weight = 0.0001;
    set.push(psytron);

    // -- trade goods and currency --
    let mut ration = PartTemplate::new("Ration Pack");
    ration.group = "Goods".into();
    ration.kind = "Food".into();
    ration.weight = 0.8;
    ration.volume = 0.001;
    ration.rrp = 14.0;
    ration.for_sale = true;
    set.push(ration);

    let mut medkit = PartTemplate::new("Medkit");
    medkit.group = "Goods".into();
    medkit.kind = "Medical".into();
    medkit.weight = 1.5;
    medkit.volume = 0.002;
    medkit.rrp = 60.0;
    medkit.for_sale = true;
    set.push(medkit);

    let mut grenade = PartTemplate::new("Frag Grenade");
    grenade.group = "Weapon".into();
    grenade.kind = "Grenade".into();
    grenade.weight = 0.4;
    grenade.rrp = 25.0;
    grenade.for_sale = true;
    grenade.actions = vec!["Throw".into(), "Prime".into()];
    grenade.functions = vec![entry("Prime", 1.0)];
    grenade.affect = vec![entry("Velocity 0", 18.0)];
    set.push(grenade);

    let mut credit = PartTemplate::new("Credit");
    credit.group = "Currency".into();
    credit.kind = "Credit".into();
    credit.weight = 0.002;
    credit.rrp = 1.0;
    set.push(credit);

    let mut account = PartTemplate::new("Account");
    account.group = "Currency".into();
    account.kind = "Account".into();
    account.weight = 0.05;
    account.contains = Some(ContainerTemplate {
        max_quantity: 1_000_000,
        restrict: vec!["Credit".into()],
        items: vec!["Credit*250".into()],
        ..Default::default()
    });
    set.push(account);

    // -- mediums --
    let mut ground = PartTemplate::new("Physical Medium");
    ground.group = "Medium".into();
    ground.kind = "Physical".into();
    ground.action_time = 50.0;
    ground.functions = vec![
        entry("Communication", 1.0),
        entry("Leverage", 1.0),
        entry("Trade", 1.0),
        entry("Bid", 1.0),
        entry("Searching", 1.0),
    ];
    set.push(ground);

    let mut universe = PartTemplate::new("Universe");
    universe.group = "Medium".into();
    universe.kind = "Psychic".into();
    universe.circulation = 0.7;
    universe.action_time = 50.0;
    universe.functions = vec![
        entry("Communication", 1.0),
        entry("Leverage", 1.0),
        entry("Trade", 1.0),
        entry("Bid", 1.0),
        entry("Searching", 1.0),
        entry("Soul Divining", 1.0),
    ];
    set.push(universe);

    // what soul divining seeds into the universe
    let mut soul = PartTemplate::new("Soul");
    soul.group = "Psychic".into();
    soul.kind = "Soul".into();
    set.push(soul);

    set
}
