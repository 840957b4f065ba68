//! Body part nodes
//!
//! A part is one node of the graph every actor is built from: a torso, a
//! hand, a pistol, a magazine, a psychic focus, a belief medium. Parts
//! demand actions, supply functions (with an availability ratio), carry
//! passive affects, and may hold or wear other parts through containers.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::core::types::PartId;
use crate::parts::container::ItemContainer;
use crate::stats::{search_key, StatType};

/// A typed, named node in the part graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyPart {
    pub name: String,
    pub search: String,
    #[serde(default)]
    pub description: String,
    /// Broad family: "Body", "Weapon", "Medium", "Affect", "Credit"...
    pub group: String,
    /// Narrow tag: "Vital", "Construct", "Battery", "Magazine"...
    pub kind: String,
    /// Action tags this part demands when used.
    pub actions: Vec<String>,
    /// Action tags a user must bring before this part will act at all.
    pub requires: Vec<String>,
    /// Functions this part supplies, each with an availability ratio.
    pub functions: Vec<StatType>,
    /// Passive modifiers: resistances, timings, reference velocities.
    pub affect: Vec<StatType>,
    /// Ordered links to connected parts. May point back at ancestors; all
    /// traversal guards against revisits.
    pub connections: Vec<PartId>,
    /// Back-reference to the owning node, if any.
    pub parent: Option<PartId>,
    pub quantity: u32,
    pub weight: f64,
    pub volume: f64,
    /// Subtree weight including containers; refreshed by `PartArena::measure`.
    pub weight_total: f64,
    pub volume_total: f64,
    pub health: f64,
    /// Explicit ceiling from data, or aggregated once from "Vital" children.
    pub health_max: Option<f64>,
    /// Continuous health drain per millisecond, if wounded or decaying.
    pub health_ms: f64,
    /// Flow quality through this part, 0..=1. Scales timing and waste.
    pub circulation: f64,
    /// Base actuation time contributed to interactions, ms.
    pub action_time: f64,
    /// Wear accumulated from being acted through, ms of use.
    pub fatigue: f64,
    /// Recommended retail price, trade valuation baseline.
    pub rrp: f64,
    /// Last price this part actually traded at; 0 until valued.
    pub price: f64,
    /// Seller reluctance born of attachment; taxes valuation and saleability.
    pub superstition: f64,
    pub for_sale: bool,
    /// Held items, if this part is a container.
    pub contains: Option<ItemContainer>,
    /// Worn items, if this part supports wearing.
    pub wears: Option<ItemContainer>,
    /// Fields the loader did not recognise, kept verbatim.
    #[serde(default)]
    pub extra: AHashMap<String, String>,
}

impl BodyPart {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            search: search_key(name),
            description: String::new(),
            group: String::new(),
            kind: String::new(),
            actions: Vec::new(),
            requires: Vec::new(),
            functions: Vec::new(),
            affect: Vec::new(),
            connections: Vec::new(),
            parent: None,
            quantity: 1,
            weight: 0.0,
            volume: 0.0,
            weight_total: 0.0,
            volume_total: 0.0,
            health: 0.0,
            health_max: None,
            health_ms: 0.0,
            circulation: 1.0,
            action_time: 0.0,
            fatigue: 0.0,
            rrp: 0.0,
            price: 0.0,
            superstition: 0.0,
            for_sale: false,
            contains: None,
            wears: None,
            extra: AHashMap::new(),
        }
    }

    /// Effective health ceiling: explicit, or 0 before aggregation.
    pub fn health_ceiling(&self) -> f64 {
        self.health_max.unwrap_or(0.0)
    }

    pub fn has_action(&self, action: &str) -> bool {
        let key = search_key(action);
        self.actions.iter().any(|a| search_key(a) == key)
    }

    pub fn function_named(&self, name: &str) -> Option<&StatType> {
        let key = search_key(name);
        self.functions.iter().find(|f| f.search == key)
    }

    pub fn affect_named(&self, name: &str) -> Option<&StatType> {
        let key = search_key(name);
        self.affect.iter().find(|a| a.search == key)
    }

    /// Sum of an affect's ratio, 0 when absent.
    pub fn affect_ratio(&self, name: &str) -> f64 {
        self.affect_named(name).map(|a| a.ratio).unwrap_or(0.0)
    }

    /// Availability to provide a function: the mean ratio of every *other*
    /// function this part supplies, 1 when it supplies nothing else. A part
    /// busy with many roles provides each one less readily.
    pub fn function_ratio(&self, providing: &str) -> f64 {
        let key = search_key(providing);
        let others: Vec<f64> = self
            .functions
            .iter()
            .filter(|f| f.search != key)
            .map(|f| f.ratio)
            .collect();
        if others.is_empty() {
            1.0
        } else {
            others.iter().sum::<f64>() / others.len() as f64
        }
    }

    pub fn is_medium(&self) -> bool {
        self.group == "Medium"
    }

    /// Imbued construct affects are connected parts of group "Affect" and
    /// kind "Construct".
    pub fn is_construct_affect(&self) -> bool {
        self.group == "Affect" && self.kind == "Construct"
    }
}
