//! Psyche scoring and feedback
//!
//! Free functions over stat groups: vetting a character's deviancy, scoring
//! mutual understanding in a conversation, and landing the pivots a
//! finished interaction leaves behind. Resolvers call these with the
//! character's own groups; nothing here reaches into world state.

use ahash::AHashMap;

use crate::abilities::ease::ease_mult;
use crate::core::types::{ActorId, Millis};
use crate::psyche::pivot::{PivotKind, PsychePivot};
use crate::psyche::profile::DamageProfile;
use crate::stats::{search_key, StatGroup};

/// Ease-smoothed score of how likely deviant behaviour is, vetted against
/// the character's standing disorders. Criminal profiles whose matching
/// disorder is still unresolved (at or below zero) count; a disorder
/// already above zero is excluded from the vetting.
pub fn deviancy_multiplier(profiles: &[DamageProfile], disorders: &StatGroup) -> f64 {
    let mut sum = 0.0;
    let mut offensive = 0usize;
    for profile in profiles.iter().filter(|p| p.is_criminal()) {
        let Some(disorder) = disorders.find(&profile.name) else {
            continue;
        };
        if disorder.total > 0.0 {
            continue;
        }
        offensive += 1;
        sum += profile.total;
        sum += profile
            .functions
            .iter()
            .map(|f| f.ratio * disorders.total_of(&f.name))
            .sum::<f64>();
        sum += profile
            .resistance
            .iter()
            .map(|r| r.ratio * disorders.total_of(&r.name))
            .sum::<f64>();
    }
    ease_mult(sum, offensive as f64)
}

/// Action tags a stat is mapped onto, from its "Action" extra, '|' split.
fn stat_actions(extra: &AHashMap<String, String>) -> Vec<String> {
    extra
        .get("Action")
        .map(|raw| raw.split('|').map(search_key).collect())
        .unwrap_or_default()
}

/// Search keys of stats in `groups` whose action mapping intersects
/// `actions`, with each stat's own mapping count for weighting.
fn matched_stats(groups: &[&StatGroup], actions: &[String]) -> Vec<(String, usize)> {
    let keys: Vec<String> = actions.iter().map(|a| search_key(a)).collect();
    let mut matched = Vec::new();
    for group in groups {
        for stat in &group.stats {
            let mapped = stat_actions(&stat.extra);
            if mapped.is_empty() {
                continue;
            }
            if mapped.iter().any(|m| keys.contains(m)) {
                matched.push((stat.search.clone(), mapped.len()));
            }
        }
    }
    matched
}

/// Mean phobia/disorder ratio over the stats an interaction's actions
/// touch; zero when nothing in the psyche reacts.
pub fn psychoses_multiplier(groups: &[&StatGroup], actions: &[String]) -> f64 {
    let matched = matched_stats(groups, actions);
    if matched.is_empty() {
        return 0.0;
    }
    let sum: f64 = matched
        .iter()
        .filter_map(|(key, _)| {
            groups
                .iter()
                .find_map(|g| g.stats.iter().find(|s| s.search == *key))
        })
        .map(|s| s.ratio)
        .sum();
    sum / matched.len() as f64
}

/// Land the pivots a completed interaction leaves on a psyche.
///
/// Every phobia and disorder mapped onto one of the interaction's actions
/// receives an explored pivot weighted by the pivot ratio spread across the
/// stat's own action mappings, and its running total grows by the
/// interaction's duration at that weight. Returns how many pivots landed.
pub fn interaction_feedback(
    phobias: &mut StatGroup,
    disorders: &mut StatGroup,
    pivots: &mut AHashMap<String, Vec<PsychePivot>>,
    actions: &[String],
    timing: Millis,
    now: Millis,
    actor: Option<ActorId>,
) -> usize {
    let matched = matched_stats(&[&*phobias, &*disorders], actions);
    let kind = PivotKind::Explored;
    let mut landed = 0;
    for (key, mapping_count) in matched {
        let multiplier = kind.ratio() / mapping_count as f64;
        let stat = phobias
            .stats
            .iter_mut()
            .chain(disorders.stats.iter_mut())
            .find(|s| s.search == key);
        let Some(stat) = stat else {
            continue;
        };
        stat.total += timing * multiplier;
        let mut pivot = PsychePivot::new(kind, timing, multiplier).at(now);
        pivot.target_to = actor;
        pivots.entry(key).or_default().push(pivot);
        landed += 1;
    }
    landed
}

/// One axis of a conversation's understanding score, already resolved
/// through the ability calculator by the caller.
#[derive(Debug, Clone)]
pub struct UnderstandingAxis {
    pub name: String,
    /// The acting side's draw on the profile's function stats.
    pub source_draw: f64,
    /// The receiving side's draw on the profile's resistance stats.
    pub target_draw: f64,
    /// Sum of both sides' standing disorder totals; zero for emote axes.
    pub disorder_total: f64,
}

/// Score each axis from the receiving side's perspective: what the source
/// projects, less what the target deflects, plus however much theatrical
/// delivery leans into the emoted intention.
pub fn understanding(
    axes: &[UnderstandingAxis],
    theatrical_draw: f64,
    emoting: &[f64],
) -> Vec<f64> {
    axes.iter()
        .enumerate()
        .map(|(i, axis)| {
            let emote = emoting.get(i).copied().unwrap_or(0.0);
            axis.source_draw - axis.target_draw + theatrical_draw * emote + axis.disorder_total
        })
        .collect()
}
