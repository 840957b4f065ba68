//! Named stats, their groups, and allocation bookkeeping
//!
//! A `Stat` total folds four sources together: the owning group's base
//! value, temporary modifiers, permanent education, and cross-stat
//! contributions from sibling stats. Lookup throughout the engine is by
//! search key - lowercase with spaces removed - so data files and hook
//! consumers never fight over exact casing.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Canonical lookup key: case-insensitive, space-insensitive.
pub fn search_key(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// A named value with a ratio, used for modifiers, education entries,
/// affects, function tags, and cross-stat references alike.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatType {
    pub name: String,
    pub search: String,
    #[serde(default)]
    pub description: String,
    pub ratio: f64,
    #[serde(default)]
    pub modifiers: Vec<StatType>,
}

impl StatType {
    pub fn new(name: &str, ratio: f64) -> Self {
        Self {
            name: name.to_string(),
            search: search_key(name),
            description: String::new(),
            ratio,
            modifiers: Vec::new(),
        }
    }

    /// Ratio with stacked modifiers applied.
    pub fn total(&self) -> f64 {
        self.ratio + self.modifiers.iter().map(|m| m.ratio).sum::<f64>()
    }
}

/// A character statistic, discipline, skill, ability, disorder, or phobia.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stat {
    pub name: String,
    pub search: String,
    #[serde(default)]
    pub description: String,
    /// Type tag grouping stats inside a group (e.g. a skill's discipline).
    pub kind: Option<StatType>,
    /// Base value before any allocation.
    pub ratio: f64,
    /// Cached combined total; refreshed by `StatGroup::update`.
    pub total: f64,
    /// Cached sum of `modifiers` ratios.
    pub modified: f64,
    /// Cached sum of `education` ratios.
    pub educated: f64,
    /// Temporary allocation modifiers.
    pub modifiers: Vec<StatType>,
    /// Permanent, experience-earned contributions.
    pub education: Vec<StatType>,
    /// Sibling stats contributing `(their allocation) x ratio` to this total.
    pub cross: Vec<StatType>,
    /// Passive modifiers declared on the stat (damage, healing, timing).
    pub affect: Vec<StatType>,
    /// Resource draw declarations (which pools an ability taxes).
    pub draw: Vec<StatType>,
    /// Logical time this stat last resolved an interaction.
    pub time: f64,
    /// Accumulated practice milliseconds; drives how accustomed an ability is.
    pub interchange_time: f64,
    /// Difficulty dividend for ability costs; coerced to a number at load.
    pub difficulty: f64,
    /// Circulation ratio for mediums and conduits, 0..=1 where relevant.
    pub circulation: f64,
    /// Declared group linkage (e.g. an ability's skill name), resolved lazily.
    pub group_link: Option<String>,
    /// Columns the loader did not recognise, kept verbatim.
    #[serde(default)]
    pub extra: AHashMap<String, String>,
}

impl Stat {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            search: search_key(name),
            description: String::new(),
            kind: None,
            ratio: 0.0,
            total: 0.0,
            modified: 0.0,
            educated: 0.0,
            modifiers: Vec::new(),
            education: Vec::new(),
            cross: Vec::new(),
            affect: Vec::new(),
            draw: Vec::new(),
            time: 0.0,
            interchange_time: 0.0,
            difficulty: 1.0,
            circulation: 1.0,
            group_link: None,
            extra: AHashMap::new(),
        }
    }

    pub fn with_kind(mut self, kind: &str) -> Self {
        self.kind = Some(StatType::new(kind, 1.0));
        self
    }

    /// Refresh the cached modifier and education sums.
    pub fn update_allocated(&mut self) {
        self.educated = self.education.iter().map(|e| e.ratio).sum();
        self.modified = self.modifiers.iter().map(|m| m.ratio).sum();
    }

    /// Points the player has allocated plus experience earned.
    pub fn allocation(&self) -> f64 {
        self.modified + self.educated
    }

    /// Find an affect entry by name.
    pub fn affect_named(&self, name: &str) -> Option<&StatType> {
        let key = search_key(name);
        self.affect.iter().find(|a| a.search == key)
    }
}

/// Owning group of stats with an allocation budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatGroup {
    pub name: String,
    pub search: String,
    #[serde(default)]
    pub description: String,
    /// Base value granted to every member before allocation.
    pub base_value: f64,
    pub stats: Vec<Stat>,
    /// Allocation grants; their ratio sum is the spendable budget.
    pub alloc: Vec<StatType>,
}

impl StatGroup {
    pub fn new(name: &str, base_value: f64) -> Self {
        Self {
            name: name.to_string(),
            search: search_key(name),
            description: String::new(),
            base_value,
            stats: Vec::new(),
            alloc: Vec::new(),
        }
    }

    pub fn push(&mut self, stat: Stat) -> &mut Stat {
        self.stats.push(stat);
        let idx = self.stats.len() - 1;
        &mut self.stats[idx]
    }

    /// Case/space-insensitive lookup.
    pub fn find(&self, name: &str) -> Option<&Stat> {
        let key = search_key(name);
        self.stats.iter().find(|s| s.search == key)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Stat> {
        let key = search_key(name);
        self.stats.iter_mut().find(|s| s.search == key)
    }

    /// Lookup that creates an empty stat when the name is unknown, so
    /// feedback can accrete onto stats the data files never declared.
    pub fn find_or_create(&mut self, name: &str) -> &mut Stat {
        let key = search_key(name);
        if let Some(pos) = self.stats.iter().position(|s| s.search == key) {
            return &mut self.stats[pos];
        }
        self.stats.push(Stat::new(name));
        let idx = self.stats.len() - 1;
        &mut self.stats[idx]
    }

    /// Total of a member stat, 0 when absent.
    pub fn total_of(&self, name: &str) -> f64 {
        self.find(name).map(|s| s.total).unwrap_or(0.0)
    }

    /// Stats bound to a type tag.
    pub fn find_of_kind(&self, kind: &str) -> Vec<&Stat> {
        let key = search_key(kind);
        self.stats
            .iter()
            .filter(|s| s.kind.as_ref().is_some_and(|k| k.search == key))
            .collect()
    }

    /// Points already allocated by the player.
    pub fn allocated(&self) -> f64 {
        self.stats.iter().map(|s| s.modified).sum()
    }

    /// Points earned through education across the group.
    pub fn education(&self) -> f64 {
        self.stats.iter().map(|s| s.educated).sum()
    }

    /// Budget remaining for allocation.
    pub fn remaining(&self) -> f64 {
        self.alloc.iter().map(|a| a.ratio).sum::<f64>() - self.allocated()
    }

    /// Spend allocation budget into a named stat. Returns false (and leaves
    /// everything untouched) when the budget or the stat is missing.
    pub fn allocate(&mut self, name: &str, points: f64) -> bool {
        if self.remaining() < points {
            warn!(
                group = %self.name,
                remaining = self.remaining(),
                points,
                "not enough allocation points"
            );
            return false;
        }
        let base = self.base_value;
        let snapshot = self.allocation_snapshot();
        let Some(stat) = self.find_mut(name) else {
            warn!(group = %self.name, stat = name, "stat is not of this group");
            return false;
        };
        stat.modifiers.push(StatType::new("Modifier", points));
        stat.update_allocated();
        Self::update_stat_total(stat, base, &snapshot);
        true
    }

    /// Condense small allocation grants into one entry.
    pub fn consolidate(&mut self, ceiling: f64) {
        let value: f64 = self
            .alloc
            .iter()
            .filter(|a| a.ratio < ceiling)
            .map(|a| a.ratio)
            .sum();
        if value == 0.0 {
            return;
        }
        let name = self.name.clone();
        self.alloc.retain(|a| a.ratio >= ceiling);
        self.alloc.push(StatType::new(&name, value));
    }

    fn allocation_snapshot(&self) -> AHashMap<String, f64> {
        self.stats
            .iter()
            .map(|s| (s.search.clone(), s.modified + s.educated))
            .collect()
    }

    fn update_stat_total(stat: &mut Stat, base: f64, snapshot: &AHashMap<String, f64>) {
        let mut total = base;
        for item in &stat.cross {
            if let Some(alloc) = snapshot.get(&item.search) {
                total += alloc * item.ratio;
            }
        }
        stat.total = total + stat.modified + stat.educated;
    }

    /// Recompute every member's total. Two passes: allocation sums first,
    /// then totals against a consistent snapshot so cross references do not
    /// depend on member order.
    pub fn update(&mut self) {
        for stat in &mut self.stats {
            stat.update_allocated();
        }
        let snapshot = self.allocation_snapshot();
        let base = self.base_value;
        for stat in &mut self.stats {
            Self::update_stat_total(stat, base, &snapshot);
        }
    }
}
