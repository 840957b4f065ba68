//! Part arena and graph traversal
//!
//! All part nodes live in one append-only arena and refer to each other by
//! [`PartId`]. The graph is deliberately cyclic (a forearm connects back to
//! its upper arm, mediums link otherwise unrelated bodies), so every walk
//! carries a visited set instead of trusting the shape of the data.

use ahash::AHashSet;

use crate::core::error::{CapacityError, EngineError, Result};
use crate::core::types::PartId;
use crate::parts::container::{ContainerSlot, ItemContainer};
use crate::parts::part::BodyPart;
use crate::stats::search_key;

/// Which attribute a graph search matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindBy {
    Name,
    Action,
    Group,
    Kind,
    Functions,
    Affect,
}

/// Append-only store of every part in the world.
///
/// Ids are never reused; detached parts simply stop being reachable from
/// any actor and are swept by the garbage collection hook.
#[derive(Debug, Default)]
pub struct PartArena {
    nodes: Vec<BodyPart>,
}

impl PartArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn alloc(&mut self, part: BodyPart) -> PartId {
        let id = PartId(self.nodes.len() as u32);
        self.nodes.push(part);
        id
    }

    pub fn get(&self, id: PartId) -> Option<&BodyPart> {
        self.nodes.get(id.index())
    }

    pub fn get_mut(&mut self, id: PartId) -> Option<&mut BodyPart> {
        self.nodes.get_mut(id.index())
    }

    pub fn node(&self, id: PartId) -> Result<&BodyPart> {
        self.get(id).ok_or(EngineError::PartNotFound(id))
    }

    pub fn node_mut(&mut self, id: PartId) -> Result<&mut BodyPart> {
        self.nodes
            .get_mut(id.index())
            .ok_or(EngineError::PartNotFound(id))
    }

    /// Connect `child` under `parent`: forward link plus back-reference.
    pub fn attach(&mut self, parent: PartId, child: PartId) {
        if let Some(node) = self.get_mut(parent) {
            if !node.connections.contains(&child) {
                node.connections.push(child);
            }
        }
        if let Some(node) = self.get_mut(child) {
            node.parent = Some(parent);
        }
    }

    /// Forward link only, for cyclic back-edges and medium hookups.
    pub fn link(&mut self, from: PartId, to: PartId) {
        if let Some(node) = self.get_mut(from) {
            if !node.connections.contains(&to) {
                node.connections.push(to);
            }
        }
    }

    pub fn unlink(&mut self, from: PartId, to: PartId) {
        if let Some(node) = self.get_mut(from) {
            node.connections.retain(|c| *c != to);
        }
    }

    /// Walk parent back-references to the owning root.
    pub fn find_root(&self, id: PartId) -> PartId {
        let mut current = id;
        let mut visited = AHashSet::new();
        while visited.insert(current) {
            match self.get(current).and_then(|p| p.parent) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        current
    }

    // ------------------------------------------------------------------
    // Graph search
    // ------------------------------------------------------------------

    fn matched(part: &BodyPart, by: FindBy, keys: &[String]) -> bool {
        match by {
            FindBy::Name => keys.iter().any(|k| part.search == *k),
            FindBy::Group => keys.iter().any(|k| search_key(&part.group) == *k),
            FindBy::Kind => keys.iter().any(|k| search_key(&part.kind) == *k),
            FindBy::Action => part
                .actions
                .iter()
                .any(|a| keys.contains(&search_key(a))),
            FindBy::Functions => part.functions.iter().any(|f| keys.contains(&f.search)),
            FindBy::Affect => part.affect.iter().any(|f| keys.contains(&f.search)),
        }
    }

    /// Depth-first search from `from`, matching `terms` against the chosen
    /// attribute. Mediums are never descended into: they bridge to other
    /// bodies and a search must stay on its own.
    pub fn find(&self, from: PartId, by: FindBy, terms: &[&str], in_children: bool) -> Vec<PartId> {
        let keys: Vec<String> = terms.iter().map(|t| search_key(t)).collect();
        let mut visited = AHashSet::new();
        let mut found = Vec::new();
        self.find_walk(from, by, &keys, in_children, &mut visited, &mut found);
        found
    }

    /// Search the whole body owning `from`, not just its subtree.
    pub fn find_all(&self, from: PartId, by: FindBy, terms: &[&str]) -> Vec<PartId> {
        self.find(self.find_root(from), by, terms, true)
    }

    fn find_walk(
        &self,
        id: PartId,
        by: FindBy,
        keys: &[String],
        in_children: bool,
        visited: &mut AHashSet<PartId>,
        found: &mut Vec<PartId>,
    ) {
        if !visited.insert(id) {
            return;
        }
        let Some(part) = self.get(id) else {
            return;
        };
        if Self::matched(part, by, keys) {
            found.push(id);
        }
        if !in_children {
            return;
        }
        for &child in &part.connections {
            if visited.contains(&child) {
                continue;
            }
            if self.get(child).map_or(true, |c| c.is_medium()) {
                continue;
            }
            self.find_walk(child, by, keys, true, visited, found);
        }
    }

    pub fn find_name(&self, from: PartId, name: &str, in_children: bool) -> Vec<PartId> {
        self.find(from, FindBy::Name, &[name], in_children)
    }

    pub fn find_action(&self, from: PartId, action: &str, in_children: bool) -> Vec<PartId> {
        self.find(from, FindBy::Action, &[action], in_children)
    }

    pub fn find_group(&self, from: PartId, group: &str, in_children: bool) -> Vec<PartId> {
        self.find(from, FindBy::Group, &[group], in_children)
    }

    pub fn find_kind(&self, from: PartId, kind: &str, in_children: bool) -> Vec<PartId> {
        self.find(from, FindBy::Kind, &[kind], in_children)
    }

    pub fn find_functions(&self, from: PartId, functions: &[&str]) -> Vec<PartId> {
        self.find(from, FindBy::Functions, functions, true)
    }

    pub fn find_affect(&self, from: PartId, name: &str) -> Vec<PartId> {
        self.find(from, FindBy::Affect, &[name], true)
    }

    /// Every part reachable from `from` over connections, visited once.
    pub fn flatten_from(&self, from: PartId) -> Vec<PartId> {
        let mut visited = AHashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(part) = self.get(id) else {
                continue;
            };
            order.push(id);
            for &child in part.connections.iter().rev() {
                if !visited.contains(&child) {
                    stack.push(child);
                }
            }
        }
        order
    }

    /// Imbued construct affects on `from` and everything it wears.
    ///
    /// With a name this returns the matching affect nodes themselves; with
    /// `None` it returns the parts carrying any imbue at all.
    pub fn find_imbued(&self, from: PartId, name: Option<&str>) -> Vec<PartId> {
        let mut origins = vec![from];
        for wearer in self.list_holds(from, ContainerSlot::Wears, true) {
            if let Some(items) = self.slot(wearer, ContainerSlot::Wears) {
                origins.extend(items.items.iter().copied());
            }
        }
        let key = name.map(search_key);
        let mut seen = AHashSet::new();
        let mut found = Vec::new();
        for origin in origins {
            for id in self.flatten_from(origin) {
                if !seen.insert(id) {
                    continue;
                }
                let Some(part) = self.get(id) else {
                    continue;
                };
                let affects: Vec<PartId> = part
                    .connections
                    .iter()
                    .copied()
                    .filter(|c| self.get(*c).is_some_and(|p| p.is_construct_affect()))
                    .collect();
                match &key {
                    None => {
                        if !affects.is_empty() {
                            found.push(id);
                        }
                    }
                    Some(k) => {
                        for aid in affects {
                            let Some(affect) = self.get(aid) else {
                                continue;
                            };
                            if affect.search == *k
                                || affect.affect.iter().any(|f| f.search == *k)
                            {
                                found.push(aid);
                            }
                        }
                    }
                }
            }
        }
        found
    }

    // ------------------------------------------------------------------
    // Holds: containers and wear locations
    // ------------------------------------------------------------------

    fn slot(&self, id: PartId, slot: ContainerSlot) -> Option<&ItemContainer> {
        let part = self.get(id)?;
        match slot {
            ContainerSlot::Contains => part.contains.as_ref(),
            ContainerSlot::Wears => part.wears.as_ref(),
        }
    }

    fn slot_mut(&mut self, id: PartId, slot: ContainerSlot) -> Option<&mut ItemContainer> {
        let part = self.get_mut(id)?;
        match slot {
            ContainerSlot::Contains => part.contains.as_mut(),
            ContainerSlot::Wears => part.wears.as_mut(),
        }
    }

    /// Parts at or below `from` carrying the given container slot.
    pub fn list_holds(&self, from: PartId, slot: ContainerSlot, in_children: bool) -> Vec<PartId> {
        let mut visited = AHashSet::new();
        let mut found = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(part) = self.get(id) else {
                continue;
            };
            if id != from && part.is_medium() {
                continue;
            }
            let has = match slot {
                ContainerSlot::Contains => part.contains.is_some(),
                ContainerSlot::Wears => part.wears.is_some(),
            };
            if has {
                found.push(id);
            }
            if in_children {
                for &child in part.connections.iter().rev() {
                    if !visited.contains(&child) {
                        stack.push(child);
                    }
                }
            }
        }
        found
    }

    /// Holds below `from` whose container accepts `item` right now.
    pub fn holds_validate(&self, from: PartId, item: PartId, slot: ContainerSlot) -> Vec<PartId> {
        self.list_holds(from, slot, true)
            .into_iter()
            .filter(|holder| self.can_contain(*holder, slot, item).is_ok())
            .collect()
    }

    /// First container inside the clothing worn below `from` that can take
    /// `item`. This is where an actor stows things when told to pack.
    pub fn find_packable(&self, from: PartId, item: PartId) -> Option<PartId> {
        for wearer in self.list_holds(from, ContainerSlot::Wears, true) {
            let worn: Vec<PartId> = self
                .slot(wearer, ContainerSlot::Wears)
                .map(|c| c.items.clone())
                .unwrap_or_default();
            for garment in worn {
                if let Some(holder) = self
                    .holds_validate(garment, item, ContainerSlot::Contains)
                    .first()
                {
                    return Some(*holder);
                }
            }
        }
        None
    }

    /// Items matching `name` packed into the clothing below `from`, grouped
    /// by the holding container part.
    pub fn find_packed(&self, from: PartId, name: &str) -> Vec<(PartId, Vec<PartId>)> {
        let mut packed = Vec::new();
        for wearer in self.list_holds(from, ContainerSlot::Wears, true) {
            let worn: Vec<PartId> = self
                .slot(wearer, ContainerSlot::Wears)
                .map(|c| c.items.clone())
                .unwrap_or_default();
            for garment in worn {
                for holder in self.list_holds(garment, ContainerSlot::Contains, true) {
                    let matches = self.container_search(holder, ContainerSlot::Contains, name);
                    if !matches.is_empty() {
                        packed.push((holder, matches));
                    }
                }
            }
        }
        packed
    }

    // ------------------------------------------------------------------
    // Measurement
    // ------------------------------------------------------------------

    /// Effective subtree load of a node: measured totals when present,
    /// otherwise the intrinsic figure, scaled by stack quantity.
    fn effective(&self, id: PartId) -> (f64, f64, u32) {
        match self.get(id) {
            Some(p) => {
                let w = if p.weight_total != 0.0 { p.weight_total } else { p.weight };
                let v = if p.volume_total != 0.0 { p.volume_total } else { p.volume };
                (w * p.quantity as f64, v * p.quantity as f64, p.quantity)
            }
            None => (0.0, 0.0, 0),
        }
    }

    /// Recompute weight and volume totals from `id` down, including
    /// container loads, and aggregate health ceilings from children the
    /// first time a node is measured without an explicit ceiling.
    ///
    /// Returns the node's quantity-scaled (weight, volume).
    pub fn measure(&mut self, id: PartId) -> (f64, f64) {
        let mut visited = AHashSet::new();
        self.measure_walk(id, &mut visited);
        let (w, v, _) = self.effective(id);
        (w, v)
    }

    fn measure_walk(&mut self, id: PartId, visited: &mut AHashSet<PartId>) {
        if !visited.insert(id) {
            return;
        }
        let (connections, contains_items, wears_items) = {
            let Some(part) = self.get(id) else {
                return;
            };
            (
                part.connections.clone(),
                part.contains.as_ref().map(|c| c.items.clone()),
                part.wears.as_ref().map(|c| c.items.clone()),
            )
        };
        // Only children that point back at us count toward this subtree;
        // cyclic links and mediums belong to some other node's total.
        let children: Vec<PartId> = connections
            .into_iter()
            .filter(|c| self.get(*c).is_some_and(|p| p.parent == Some(id)))
            .collect();
        for &child in &children {
            self.measure_walk(child, visited);
        }
        let contains_load = self.measure_items(contains_items.as_deref(), visited);
        let wears_load = self.measure_items(wears_items.as_deref(), visited);

        let mut weight = 0.0;
        let mut volume = 0.0;
        let mut health = 0.0;
        let mut health_max = 0.0;
        for &child in &children {
            let (w, v, _) = self.effective(child);
            weight += w;
            volume += v;
            if let Some(c) = self.get(child) {
                health += c.health;
                health_max += c.health_ceiling();
            }
        }
        if let Some(part) = self.get_mut(id) {
            if let (Some(container), Some((w, v, q))) = (part.contains.as_mut(), contains_load) {
                container.weight_load = w;
                container.volume_load = v;
                container.quantity_load = q;
            }
            if let (Some(container), Some((w, v, q))) = (part.wears.as_mut(), wears_load) {
                container.weight_load = w;
                container.volume_load = v;
                container.quantity_load = q;
            }
            let contains_w = part.contains.as_ref().map_or(0.0, |c| c.weight_load);
            let contains_v = part.contains.as_ref().map_or(0.0, |c| c.volume_load);
            let wears_w = part.wears.as_ref().map_or(0.0, |c| c.weight_load);
            let wears_v = part.wears.as_ref().map_or(0.0, |c| c.volume_load);
            part.weight_total = part.weight + weight + contains_w + wears_w;
            part.volume_total = part.volume + volume + contains_v + wears_v;
            if part.health_max.is_none() {
                part.health_max = Some(health_max);
                part.health = health;
            }
        }
    }

    fn measure_items(
        &mut self,
        items: Option<&[PartId]>,
        visited: &mut AHashSet<PartId>,
    ) -> Option<(f64, f64, u32)> {
        let items = items?;
        let mut weight = 0.0;
        let mut volume = 0.0;
        let mut quantity = 0;
        for &item in items {
            self.measure_walk(item, visited);
            let (w, v, q) = self.effective(item);
            weight += w;
            volume += v;
            quantity += q;
        }
        Some((weight, volume, quantity))
    }

    // ------------------------------------------------------------------
    // Container operations
    // ------------------------------------------------------------------

    /// Parts resident in a container slot, in seating order.
    pub fn contents(&self, holder: PartId, slot: ContainerSlot) -> Vec<PartId> {
        self.slot(holder, slot)
            .map(|c| c.items.clone())
            .unwrap_or_default()
    }

    /// Total quantity stacked inside a container slot right now.
    pub fn stored(&self, holder: PartId, slot: ContainerSlot) -> u32 {
        self.slot(holder, slot)
            .map(|c| {
                c.items
                    .iter()
                    .filter_map(|i| self.get(*i))
                    .map(|p| p.quantity)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Exact-name matches among a container's residents.
    pub fn container_search(&self, holder: PartId, slot: ContainerSlot, name: &str) -> Vec<PartId> {
        let key = search_key(name);
        let Some(container) = self.slot(holder, slot) else {
            return Vec::new();
        };
        container
            .items
            .iter()
            .copied()
            .filter(|item| self.get(*item).is_some_and(|p| p.search == key))
            .collect()
    }

    fn descriptors(&self, holder: PartId, item: &BodyPart) -> Vec<String> {
        let mut keys = vec![
            item.search.clone(),
            search_key(&item.kind),
            search_key(&item.group),
        ];
        if let Some(part) = self.get(holder) {
            keys.extend(part.functions.iter().map(|f| f.search.clone()));
        }
        keys.retain(|k| !k.is_empty());
        keys
    }

    /// Validate the container's limits against its current load plus the
    /// candidate. No state changes.
    pub fn can_contain(
        &self,
        holder: PartId,
        slot: ContainerSlot,
        item: PartId,
    ) -> std::result::Result<(), CapacityError> {
        let Some(candidate) = self.get(item) else {
            return Err(CapacityError::NoItem);
        };
        let Some(container) = self.slot(holder, slot) else {
            return Err(CapacityError::NotAContainer);
        };
        if !container.is_container() {
            return Err(CapacityError::NotAContainer);
        }
        let (item_w, item_v, item_q) = self.effective(item);
        if let Some(max) = container.quantity_max {
            let would = container.quantity_load + item_q;
            if would > max {
                return Err(CapacityError::Quantity {
                    quantity: would,
                    max,
                });
            }
        }
        if let Some(max) = container.max_volume {
            let would = container.volume_load + item_v;
            if would > max {
                return Err(CapacityError::Volume { volume: would, max });
            }
        }
        if let Some(max) = container.max_weight {
            let would = container.weight_load + item_w;
            if would > max {
                return Err(CapacityError::Weight { weight: would, max });
            }
        }
        if container.restrict.is_empty() {
            return Ok(());
        }
        let descriptors = self.descriptors(holder, candidate);
        let matched: Vec<String> = container
            .restrict
            .iter()
            .filter(|r| descriptors.contains(&search_key(r)))
            .cloned()
            .collect();
        if matched.is_empty() {
            return Err(CapacityError::Restricted(container.restrict.clone()));
        }
        for tag in &matched {
            let Some(max) = container.q_max_type.get(tag).copied() else {
                continue;
            };
            let tag_key = search_key(tag);
            let current: u32 = container
                .items
                .iter()
                .filter_map(|i| self.get(*i))
                .filter(|p| {
                    [p.search.clone(), search_key(&p.kind), search_key(&p.group)]
                        .contains(&tag_key)
                })
                .map(|p| p.quantity)
                .sum();
            let would = current + candidate.quantity;
            if would > max {
                return Err(CapacityError::TypeQuantity {
                    name: tag.clone(),
                    max,
                    would,
                });
            }
        }
        Ok(())
    }

    /// Add an item, merging into an existing stack of the same name.
    ///
    /// Returns the resident id holding the item afterwards; on a merge the
    /// donor node is left detached for the sweep.
    pub fn container_add(
        &mut self,
        holder: PartId,
        slot: ContainerSlot,
        item: PartId,
    ) -> std::result::Result<PartId, CapacityError> {
        self.measure(item);
        self.can_contain(holder, slot, item)?;
        let existing = {
            let key = self.get(item).map(|p| p.search.clone()).unwrap_or_default();
            self.slot(holder, slot)
                .and_then(|c| {
                    c.items
                        .iter()
                        .copied()
                        .find(|i| self.get(*i).is_some_and(|p| p.search == key))
                })
        };
        let resident = match existing {
            Some(stack) => {
                let gained = self.get(item).map_or(1, |p| p.quantity.max(1));
                if let Some(node) = self.get_mut(stack) {
                    node.quantity += gained;
                }
                if let Some(node) = self.get_mut(item) {
                    node.parent = None;
                    node.quantity = 0;
                }
                stack
            }
            None => {
                if let Some(container) = self.slot_mut(holder, slot) {
                    container.items.push(item);
                }
                if let Some(node) = self.get_mut(item) {
                    node.parent = Some(holder);
                }
                item
            }
        };
        self.measure(holder);
        Ok(resident)
    }

    /// Remove up to `quantity` of a named item. A partial take splits the
    /// stack into a freshly allocated node; a full take detaches the stack
    /// itself. `None` selects the first resident.
    pub fn container_remove(
        &mut self,
        holder: PartId,
        slot: ContainerSlot,
        name: Option<&str>,
        quantity: u32,
    ) -> Option<PartId> {
        let key = match name {
            Some(n) => search_key(n),
            None => {
                let first = *self.slot(holder, slot)?.items.first()?;
                self.get(first)?.search.clone()
            }
        };
        let stack = self
            .slot(holder, slot)?
            .items
            .iter()
            .copied()
            .find(|i| self.get(*i).is_some_and(|p| p.search == key))?;
        let stack_quantity = self.get(stack).map_or(0, |p| p.quantity);
        let removed = if stack_quantity > quantity {
            let mut split = self.get(stack)?.clone();
            split.quantity = quantity;
            split.parent = None;
            let split_id = self.alloc(split);
            if let Some(node) = self.get_mut(stack) {
                node.quantity = stack_quantity - quantity;
            }
            split_id
        } else {
            if let Some(container) = self.slot_mut(holder, slot) {
                container.items.retain(|i| *i != stack);
            }
            if let Some(node) = self.get_mut(stack) {
                node.parent = None;
            }
            stack
        };
        self.measure(holder);
        Some(removed)
    }

    pub fn container_remove_first(&mut self, holder: PartId, slot: ContainerSlot) -> Option<PartId> {
        let quantity = {
            let first = *self.slot(holder, slot)?.items.first()?;
            self.get(first)?.quantity.max(1)
        };
        self.container_remove(holder, slot, None, quantity)
    }

    /// Detached single-quantity copy of a node: same stats, no links,
    /// emptied containers. The raw material for manifested and spread
    /// affects.
    pub fn duplicate_shell(&mut self, id: PartId) -> Option<PartId> {
        let mut shell = self.get(id)?.clone();
        shell.connections.clear();
        shell.parent = None;
        shell.quantity = 1;
        for container in [shell.contains.as_mut(), shell.wears.as_mut()]
            .into_iter()
            .flatten()
        {
            container.items.clear();
            container.weight_load = 0.0;
            container.volume_load = 0.0;
            container.quantity_load = 0;
        }
        Some(self.alloc(shell))
    }
}
