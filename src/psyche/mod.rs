//! Psyche layer: pivots, leverage, damage profiles, and feedback scoring.

pub mod feedback;
pub mod pivot;
pub mod profile;

pub use feedback::{
    deviancy_multiplier, interaction_feedback, psychoses_multiplier, understanding,
    UnderstandingAxis,
};
pub use pivot::{PivotKind, PsycheLeverage, PsychePivot};
pub use profile::{
    builtin_damage, criminal_profiles, profile_named, DamageProfile, UNDERSTANDING_DISORDERS,
    UNDERSTANDING_EMOTES,
};
