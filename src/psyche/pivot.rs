//! Psychological pivots and leverage
//!
//! A pivot is one recorded push on a character's psyche: being trusted,
//! betrayed, analysed, or confronted with a phobia. Leverage bundles the
//! pivots one character holds over another and is what the trade and
//! communication resolvers price in.

use serde::{Deserialize, Serialize};

use crate::core::types::{ActorId, Millis};

/// How a pivot lands, and how hard. Negative ratios erode, positive build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PivotKind {
    Accepted,
    Trusted,
    Shunned,
    Rejected,
    Betrayed,
    Explored,
    Analysed,
    Phobia,
}

impl PivotKind {
    pub fn ratio(self) -> f64 {
        match self {
            PivotKind::Accepted => 1.5,
            PivotKind::Trusted => 1.0,
            PivotKind::Shunned => -1.0,
            PivotKind::Rejected => 2.0,
            PivotKind::Betrayed => -10.0,
            PivotKind::Explored => -5.0,
            PivotKind::Analysed => 1.0,
            PivotKind::Phobia => 5.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PivotKind::Accepted => "Accepted",
            PivotKind::Trusted => "Trusted",
            PivotKind::Shunned => "Shunned",
            PivotKind::Rejected => "Rejected",
            PivotKind::Betrayed => "Betrayed",
            PivotKind::Explored => "Explored",
            PivotKind::Analysed => "Analysed",
            PivotKind::Phobia => "Phobia",
        }
    }
}

/// One psychological push applied to a character.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PsychePivot {
    pub kind: PivotKind,
    /// Interaction duration that produced the pivot, ms.
    pub duration: Millis,
    pub multiplier: f64,
    /// Engine time when the pivot landed, ms.
    pub when: Millis,
    pub target_from: Option<ActorId>,
    pub target_to: Option<ActorId>,
    /// What the pivot was about, when anything specific.
    pub related: Option<String>,
}

impl PsychePivot {
    pub fn new(kind: PivotKind, duration: Millis, multiplier: f64) -> Self {
        Self {
            kind,
            duration,
            multiplier,
            when: 0.0,
            target_from: None,
            target_to: None,
            related: None,
        }
    }

    pub fn from_actor(mut self, id: ActorId) -> Self {
        self.target_from = Some(id);
        self
    }

    pub fn to_actor(mut self, id: ActorId) -> Self {
        self.target_to = Some(id);
        self
    }

    pub fn at(mut self, when: Millis) -> Self {
        self.when = when;
        self
    }

    /// Contribution to a psyche total: duration scaled by how hard and in
    /// which direction the kind lands.
    pub fn weight(&self) -> f64 {
        self.duration * self.multiplier * self.kind.ratio()
    }
}

/// Psychological hold one party has over another, built up pivot by pivot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PsycheLeverage {
    pub name: String,
    /// What the leverage concerns: an item, a secret, a debt.
    pub related: Option<String>,
    /// Engine time when the leverage was established, ms.
    pub when: Millis,
    pub total: f64,
    /// How aware the leveraged party is of the hold, in enforcements.
    pub aware: f64,
    pub pivots: Vec<PsychePivot>,
}

impl PsycheLeverage {
    pub fn new(name: &str, when: Millis) -> Self {
        Self {
            name: name.to_string(),
            related: None,
            when,
            total: 0.0,
            aware: 0.0,
            pivots: Vec::new(),
        }
    }

    /// Times this leverage has been enforced.
    pub fn enforced(&self) -> usize {
        self.pivots.len()
    }

    pub fn enforce(&mut self, pivot: PsychePivot) {
        self.total += pivot.weight();
        self.pivots.push(pivot);
    }

    /// Awareness of the hold attributable to one party.
    pub fn aware_from(&self, target: ActorId) -> f64 {
        self.pivots
            .iter()
            .filter(|p| p.target_from == Some(target))
            .map(|p| p.weight())
            .sum()
    }
}
