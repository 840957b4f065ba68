//! Ability pricing: easing curves and the cost calculator.

pub mod calculator;
pub mod ease;

pub use calculator::{
    as_ability, distance_difficulty, distance_ratio, distance_relevance, energy_to_mass,
    impact_energy, impact_velocity, mass_to_energy, medium_resistance, AbilityCost,
    AbilityInputs, MediumProfile, DISTANCE_IRRELEVANT,
};
pub use ease::{ease_mult, ease_mult_cap};
