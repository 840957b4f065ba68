//! Item containers
//!
//! A container is a capacity-bounded slot on a part: a backpack's interior,
//! a holster, a magazine well, the set of garments worn over a torso.
//! Containers hold part ids; all resolution against actual nodes happens in
//! [`crate::parts::PartArena`], which also keeps the load caches fresh.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::core::types::PartId;

/// Which container slot on a part an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerSlot {
    Contains,
    Wears,
}

/// A capacity-bounded collection of held parts.
///
/// Limits left as `None` are unbounded; a container with every limit unset
/// is not a container at all and refuses everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemContainer {
    pub items: Vec<PartId>,
    /// Tags an item must match to enter: name, kind, group, or a function
    /// of the holding part.
    #[serde(default)]
    pub restrict: Vec<String>,
    /// Per-tag quantity ceilings, keyed by restriction tag.
    #[serde(default)]
    pub q_max_type: AHashMap<String, u32>,
    pub quantity_max: Option<u32>,
    pub max_weight: Option<f64>,
    pub max_volume: Option<f64>,
    /// Current load over all held items, refreshed by measure.
    #[serde(default)]
    pub weight_load: f64,
    #[serde(default)]
    pub volume_load: f64,
    #[serde(default)]
    pub quantity_load: u32,
}

impl ItemContainer {
    pub fn new(max_volume: Option<f64>, max_weight: Option<f64>) -> Self {
        Self {
            max_volume,
            max_weight,
            ..Default::default()
        }
    }

    pub fn with_quantity(quantity_max: u32) -> Self {
        Self {
            quantity_max: Some(quantity_max),
            ..Default::default()
        }
    }

    /// True when at least one limit is configured.
    pub fn is_container(&self) -> bool {
        self.quantity_max.is_some() || self.max_weight.is_some() || self.max_volume.is_some()
    }

    /// Units still allowed in, `None` when quantity is unbounded.
    pub fn quantity_remaining(&self) -> Option<u32> {
        self.quantity_max
            .map(|max| max.saturating_sub(self.quantity_load))
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn restrict_tag(&mut self, tag: &str) -> &mut Self {
        self.restrict.push(tag.to_string());
        self
    }

    pub fn cap_tag(&mut self, tag: &str, max: u32) -> &mut Self {
        self.q_max_type.insert(tag.to_string(), max);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_is_not_a_container() {
        let c = ItemContainer::default();
        assert!(!c.is_container());
        assert!(ItemContainer::new(Some(2.0), None).is_container());
        assert!(ItemContainer::with_quantity(5).is_container());
    }

    #[test]
    fn test_quantity_remaining_saturates() {
        let mut c = ItemContainer::with_quantity(3);
        c.quantity_load = 5;
        assert_eq!(c.quantity_remaining(), Some(0));
        c.quantity_load = 1;
        assert_eq!(c.quantity_remaining(), Some(2));
        assert_eq!(ItemContainer::default().quantity_remaining(), None);
    }
}
