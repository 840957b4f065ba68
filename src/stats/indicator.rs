//! Bounded vital pools: health, energy, fatigue, concentration, carry weight
//!
//! An indicator never stores its value directly - it stores the amount
//! consumed (`offset`) against a maximum recomputed every tick from the
//! owning character's stats. `draw` and `pool` are the only mutators and
//! both clamp to the pool bounds, so a draw followed by an equal pool always
//! round-trips exactly.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// The vital pools every character carries.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndicatorKind {
    Health,
    Energy,
    Concentration,
    Fatigue,
    #[display(fmt = "Carry Weight")]
    CarryWeight,
    #[display(fmt = "Peak Carry Weight")]
    PeakCarryWeight,
}

impl IndicatorKind {
    pub const DEFAULT: [IndicatorKind; 6] = [
        IndicatorKind::Health,
        IndicatorKind::Energy,
        IndicatorKind::Concentration,
        IndicatorKind::Fatigue,
        IndicatorKind::CarryWeight,
        IndicatorKind::PeakCarryWeight,
    ];

    /// Carry pools report fullness inverted: an empty pack is ratio 0.
    pub fn reversed_ratio(&self) -> bool {
        matches!(
            self,
            IndicatorKind::CarryWeight | IndicatorKind::PeakCarryWeight
        )
    }
}

/// Everything the per-kind maximum formulas read from a character.
///
/// The character assembles this each tick; keeping it a plain struct keeps
/// the formulas testable without a whole character behind them.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndicatorSources {
    /// Sum of `health_max` across body parts type-tagged "Vital".
    pub vital_health_max: f64,
    pub body_weight: f64,
    pub carry_by_weight: f64,
    pub carry_by_strength: f64,
    pub energy_base: f64,
    pub concentration_base: f64,
    pub fatigue_base: f64,
    pub strength: f64,
    pub willpower: f64,
    pub psychic: f64,
    pub metabolism: f64,
    pub belief: f64,
    pub intelligence: f64,
    pub endurance: f64,
    pub acute_stress: f64,
    pub psychotic_disorder: f64,
    pub depression: f64,
}

/// A disorder divides the pool when present, widens it when negative,
/// and leaves it alone at zero.
fn disorder_scaled(max: f64, disorder: f64) -> f64 {
    if disorder > 0.0 {
        max / disorder
    } else if disorder < 0.0 {
        max * -disorder
    } else {
        max
    }
}

/// A bounded pool owned by a character soul.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Indicator {
    pub kind: IndicatorKind,
    pub min: f64,
    pub max: f64,
    /// Amount consumed from the pool.
    pub offset: f64,
    /// Fullness in 0..=1, inverted for carry pools.
    pub ratio: f64,
    /// Continuous drain per millisecond of clock time.
    pub ms: f64,
}

impl Indicator {
    pub fn new(kind: IndicatorKind) -> Self {
        Self {
            kind,
            min: 0.0,
            max: 100.0,
            offset: 0.0,
            ratio: 1.0,
            ms: 0.0,
        }
    }

    /// Current value of the pool.
    pub fn value(&self) -> f64 {
        self.max - self.offset
    }

    fn update_ratio(&mut self) {
        let value = self.value();
        self.ratio = if value > 0.0 && self.max > 0.0 {
            value / self.max
        } else {
            0.0
        };
        if self.kind.reversed_ratio() {
            self.ratio = 1.0 - self.ratio;
        }
    }

    /// Set the pool to an absolute value, clamped to `[min, max]`.
    pub fn set(&mut self, value: f64) {
        let value = value.clamp(self.min, self.max);
        self.offset = self.max - value;
        self.update_ratio();
    }

    /// Consume from the pool. Returns the amount actually taken; a draw
    /// past `min` clamps exactly at the bound.
    pub fn draw(&mut self, amount: f64) -> f64 {
        let take = amount.min(self.value() - self.min).max(0.0);
        self.offset += take;
        self.update_ratio();
        take
    }

    /// Restore into the pool. Returns the amount actually restored; a pool
    /// past `max` clamps exactly at the bound.
    pub fn pool(&mut self, amount: f64) -> f64 {
        let give = amount.min(self.offset).max(0.0);
        self.offset -= give;
        self.update_ratio();
        give
    }

    /// Apply the continuous drain for an elapsed-time slice.
    pub fn tick(&mut self, diff_ms: f64) {
        if self.ms != 0.0 {
            self.draw(diff_ms * self.ms);
        }
    }

    /// Recompute the pool maximum from character state. The consumed offset
    /// is preserved, so a shrinking maximum lowers the value in place.
    pub fn recalc_max(&mut self, sources: &IndicatorSources) {
        self.max = match self.kind {
            IndicatorKind::Health => sources.vital_health_max,
            IndicatorKind::CarryWeight => sources.carry_by_weight * sources.body_weight,
            IndicatorKind::PeakCarryWeight => {
                let strength_ratio = (sources.strength * sources.carry_by_strength).max(1.0);
                sources.carry_by_weight * sources.body_weight * strength_ratio
            }
            IndicatorKind::Energy => disorder_scaled(
                sources.energy_base * sources.willpower * sources.psychic * sources.metabolism,
                sources.acute_stress,
            ),
            IndicatorKind::Concentration => disorder_scaled(
                sources.concentration_base
                    * sources.willpower
                    * sources.belief
                    * sources.intelligence,
                sources.psychotic_disorder,
            ),
            IndicatorKind::Fatigue => disorder_scaled(
                sources.fatigue_base * sources.strength * sources.metabolism * sources.endurance,
                sources.depression,
            ),
        };
        self.update_ratio();
    }
}
