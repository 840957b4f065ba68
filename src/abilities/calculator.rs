//! Ability cost calculator
//!
//! Turns an ability stat plus the circumstances of its use into the
//! indicator drains an interaction will charge. Mass is converted to
//! energy wholesale and then scaled back down by skill, familiarity, and
//! the indicator ceilings, so heavier implements are always costlier to
//! act through.

use crate::abilities::ease::{ease_mult, ease_mult_cap};
use crate::core::constants::{
    CIRCULATION_ZERO, DEFAULT_TIME_UPDATE, DISTANCE_STEP, ENERGY_RATIO, IMPACT_REFERENCE_DISTANCE,
    LIGHT_SPEED, MASTERY_MS,
};
use crate::core::types::Millis;
use crate::stats::Stat;

/// Action requirements for which target distance never matters.
pub const DISTANCE_IRRELEVANT: [&str; 2] = ["Manipulation", "Movement"];

/// Mass (kg) to energy (J).
pub fn mass_to_energy(mass: f64) -> f64 {
    mass * (LIGHT_SPEED * LIGHT_SPEED)
}

/// Energy (J) to mass (kg).
pub fn energy_to_mass(joules: f64) -> f64 {
    joules / (LIGHT_SPEED * LIGHT_SPEED)
}

/// Velocity at `distance` metres, interpolated between the muzzle reading
/// and the reading at the reference distance.
pub fn impact_velocity(distance: f64, measure_0: f64, measure_152: f64) -> f64 {
    ((measure_0 - measure_152) / IMPACT_REFERENCE_DISTANCE)
        * (IMPACT_REFERENCE_DISTANCE - distance)
        + measure_152
}

/// Kinetic energy (J) of `mass` kg at `velocity` m/s.
pub fn impact_energy(mass: f64, velocity: f64) -> f64 {
    0.5 * mass * (velocity * velocity)
}

/// How much a medium resists carrying an interaction. Fully circulating
/// mediums still ease toward a baseline below the saturation point.
pub fn medium_resistance(circulation: f64) -> f64 {
    ease_mult(CIRCULATION_ZERO - circulation, 1.0)
}

/// Success ratio at a distance: attenuates from 1 as the range approaches
/// what familiarity (plus any imbued accuracy) can bridge.
pub fn distance_ratio(distance_km: f64, accustomed: f64, accuracy_bonus: f64) -> f64 {
    1.0 - ease_mult_cap(distance_km, (accustomed + accuracy_bonus) / DISTANCE_STEP)
}

/// Share of a medium's requirements for which distance matters at all.
pub fn distance_relevance(requires: &[String]) -> f64 {
    if requires.is_empty() {
        return 1.0;
    }
    let relevant = requires
        .iter()
        .filter(|r| !DISTANCE_IRRELEVANT.contains(&r.as_str()))
        .count();
    relevant as f64 / requires.len() as f64
}

/// The medium facts the distance calculation needs, resolved by the caller
/// from whatever medium actually bridges the interaction.
#[derive(Debug, Clone)]
pub struct MediumProfile {
    pub requires: Vec<String>,
    pub circulation: f64,
}

/// Distance contribution to difficulty. No medium, or a medium whose
/// requirements make distance irrelevant, contributes nothing.
pub fn distance_difficulty(
    medium: Option<&MediumProfile>,
    distance_km: f64,
    prior_accustomed: f64,
    accuracy_bonus: f64,
) -> f64 {
    let Some(medium) = medium else {
        return 0.0;
    };
    if distance_relevance(&medium.requires) == 0.0 {
        return 0.0;
    }
    distance_ratio(distance_km, prior_accustomed, accuracy_bonus)
        * medium_resistance(medium.circulation)
}

/// What one use of an ability demands, split into per-millisecond drains
/// and one-off draws against each indicator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AbilityCost {
    pub accustomed: f64,
    pub energy_ms: f64,
    pub energy_draw: f64,
    pub fatigue_ms: f64,
    pub fatigue_draw: f64,
    pub concentration_ms: f64,
    pub concentration_draw: f64,
    pub amount_draw: f64,
    pub amount_ms: f64,
    pub distance_ratio: f64,
    pub modifier: f64,
    pub phobia_ratio: f64,
    pub disorder_ratio: f64,
}

impl AbilityCost {
    /// Combine several costs the way a joint demand lands: summed, then
    /// averaged over the number *requested*, so abilities the character
    /// lacks drag the joint capability down rather than vanishing.
    pub fn merge_average(costs: &[AbilityCost], requested: usize) -> AbilityCost {
        let mut merged = AbilityCost::default();
        if requested == 0 {
            return merged;
        }
        for cost in costs {
            merged.accustomed += cost.accustomed;
            merged.energy_ms += cost.energy_ms;
            merged.energy_draw += cost.energy_draw;
            merged.fatigue_ms += cost.fatigue_ms;
            merged.fatigue_draw += cost.fatigue_draw;
            merged.concentration_ms += cost.concentration_ms;
            merged.concentration_draw += cost.concentration_draw;
            merged.amount_draw += cost.amount_draw;
            merged.amount_ms += cost.amount_ms;
            merged.modifier += cost.modifier;
            merged.phobia_ratio += cost.phobia_ratio;
            merged.disorder_ratio += cost.disorder_ratio;
        }
        let n = requested as f64;
        merged.accustomed /= n;
        merged.energy_ms /= n;
        merged.energy_draw /= n;
        merged.fatigue_ms /= n;
        merged.fatigue_draw /= n;
        merged.concentration_ms /= n;
        merged.concentration_draw /= n;
        merged.amount_draw /= n;
        merged.amount_ms /= n;
        merged.modifier /= n;
        merged.phobia_ratio /= n;
        merged.disorder_ratio /= n;
        merged
    }
}

/// Everything about the actor and circumstances that prices an ability.
/// Resolvers assemble this from the acting character and the interaction
/// in flight; the calculator itself never looks at world state.
#[derive(Debug, Clone)]
pub struct AbilityInputs<'a> {
    /// "Medium" skill total.
    pub medium_total: f64,
    /// "Discipline" skill total.
    pub discipline_total: f64,
    /// "Conditioning" skill total.
    pub conditioning_total: f64,
    pub energy_max: f64,
    pub fatigue_max: f64,
    pub concentration_max: f64,
    /// A character without a body pays full fatigue instead of a drain.
    pub has_body: bool,
    /// Interaction duration driving the costs; zero reads as one.
    pub timing: Millis,
    /// Mass of the implement acted through, kg; zero reads as one.
    pub item_mass: f64,
    /// Distance contribution already resolved for this interaction.
    pub distance: f64,
    /// The governing skill, for its draw ratios.
    pub skill: Option<&'a Stat>,
}

impl Default for AbilityInputs<'_> {
    fn default() -> Self {
        Self {
            medium_total: 0.0,
            discipline_total: 0.0,
            conditioning_total: 0.0,
            energy_max: 0.0,
            fatigue_max: 0.0,
            concentration_max: 0.0,
            has_body: true,
            timing: 0.0,
            item_mass: 0.0,
            distance: 0.0,
            skill: None,
        }
    }
}

fn draw_ratio(skill: Option<&Stat>, key: &str) -> f64 {
    skill
        .and_then(|s| s.extra.get(key))
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Price one use of `ability` under `inputs`.
pub fn as_ability(ability: &Stat, inputs: &AbilityInputs) -> AbilityCost {
    let timing = if inputs.timing != 0.0 { inputs.timing } else { 1.0 };
    let mass = if inputs.item_mass != 0.0 {
        inputs.item_mass
    } else {
        1.0
    };
    let joules = mass_to_energy(mass);
    let base_difficulty = if ability.difficulty != 0.0 {
        ability.difficulty
    } else {
        1.0
    };
    let difficulty = inputs.distance + base_difficulty;
    let interchange = if ability.interchange_time != 0.0 {
        ability.interchange_time
    } else {
        DEFAULT_TIME_UPDATE
    };
    let accustomed = ease_mult(interchange + inputs.discipline_total * timing, MASTERY_MS);

    let mut cost = AbilityCost {
        accustomed,
        distance_ratio: inputs.distance,
        ..Default::default()
    };
    cost.energy_ms = joules
        / (((inputs.medium_total * timing) / difficulty) * accustomed * inputs.energy_max)
        * ENERGY_RATIO;
    let energy_ratio = draw_ratio(inputs.skill, "Energy Draw Ratio");
    if energy_ratio != 0.0 {
        cost.energy_draw = cost.energy_ms * energy_ratio;
    }
    cost.fatigue_ms = if inputs.has_body {
        joules
            / (((inputs.conditioning_total * timing) / difficulty)
                * accustomed
                * inputs.fatigue_max)
            * ENERGY_RATIO
    } else {
        inputs.fatigue_max
    };
    let fatigue_ratio = draw_ratio(inputs.skill, "Fatigue Draw Ratio");
    if fatigue_ratio != 0.0 {
        cost.fatigue_draw = cost.fatigue_ms * fatigue_ratio;
    }
    cost.concentration_ms = joules
        / (inputs.discipline_total * timing * accustomed * inputs.concentration_max)
        * ENERGY_RATIO;
    let concentration_ratio = draw_ratio(inputs.skill, "Concentration Draw Ratio");
    if concentration_ratio != 0.0 {
        cost.concentration_draw = cost.concentration_ms * concentration_ratio;
    }
    cost.amount_draw = accustomed * (timing / difficulty);
    cost
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mass_energy_round_trip() {
        let joules = mass_to_energy(0.008);
        assert!((energy_to_mass(joules) - 0.008).abs() < 1e-15);
        assert!(joules > 7.0e14);
    }

    #[test]
    fn test_impact_velocity_interpolates() {
        // 350 m/s at the muzzle falling to 290 m/s at the reference range
        assert!((impact_velocity(0.0, 350.0, 290.0) - 350.0).abs() < 1e-9);
        assert!((impact_velocity(IMPACT_REFERENCE_DISTANCE, 350.0, 290.0) - 290.0).abs() < 1e-9);
        let mid = impact_velocity(IMPACT_REFERENCE_DISTANCE / 2.0, 350.0, 290.0);
        assert!((mid - 320.0).abs() < 1e-9);
        // beyond the reference the trend continues down
        assert!(impact_velocity(300.0, 350.0, 290.0) < 290.0);
    }

    #[test]
    fn test_impact_energy_quadratic_in_velocity() {
        let slow = impact_energy(0.008, 100.0);
        let fast = impact_energy(0.008, 200.0);
        assert!((fast / slow - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_medium_resistance_falls_with_circulation() {
        assert!(medium_resistance(0.2) > medium_resistance(0.9));
        // at the saturation point the medium resists nothing
        assert!(medium_resistance(CIRCULATION_ZERO).abs() < 1e-12);
    }

    #[test]
    fn test_distance_relevance_counts_requirements() {
        let both: Vec<String> = vec!["Manipulation".into(), "Focusing".into()];
        assert!((distance_relevance(&both) - 0.5).abs() < 1e-12);
        let contact: Vec<String> = vec!["Manipulation".into(), "Movement".into()];
        assert_eq!(distance_relevance(&contact), 0.0);
        assert_eq!(distance_relevance(&[]), 1.0);
    }

    #[test]
    fn test_distance_difficulty_gates() {
        assert_eq!(distance_difficulty(None, 1.0, 0.5, 0.0), 0.0);
        let contact = MediumProfile {
            requires: vec!["Movement".into()],
            circulation: 0.5,
        };
        assert_eq!(distance_difficulty(Some(&contact), 1.0, 0.5, 0.0), 0.0);
        let relevant = MediumProfile {
            requires: vec!["Focusing".into()],
            circulation: 0.5,
        };
        assert!(distance_difficulty(Some(&relevant), 0.001, 0.5, 0.0) > 0.0);
    }

    fn inputs<'a>() -> AbilityInputs<'a> {
        AbilityInputs {
            medium_total: 20.0,
            discipline_total: 15.0,
            conditioning_total: 18.0,
            energy_max: 100.0,
            fatigue_max: 100.0,
            concentration_max: 100.0,
            has_body: true,
            timing: 1500.0,
            item_mass: 0.008,
            distance: 0.0,
            skill: None,
        }
    }

    #[test]
    fn test_as_ability_costs_scale_with_mass() {
        let ability = Stat::new("Pistols");
        let light = as_ability(&ability, &inputs());
        let mut heavier = inputs();
        heavier.item_mass = 0.016;
        let heavy = as_ability(&ability, &heavier);
        assert!((heavy.energy_ms / light.energy_ms - 2.0).abs() < 1e-9);
        assert!((heavy.concentration_ms / light.concentration_ms - 2.0).abs() < 1e-9);
        // the amount drawn does not depend on the implement's mass
        assert!((heavy.amount_draw - light.amount_draw).abs() < 1e-12);
    }

    #[test]
    fn test_as_ability_practice_reduces_energy_cost() {
        let novice = Stat::new("Pistols");
        let mut practiced = Stat::new("Pistols");
        practiced.interchange_time = MASTERY_MS * 0.4;
        let fresh = as_ability(&novice, &inputs());
        let seasoned = as_ability(&practiced, &inputs());
        assert!(seasoned.accustomed > fresh.accustomed);
        assert!(seasoned.energy_ms < fresh.energy_ms);
        assert!(seasoned.amount_draw > fresh.amount_draw);
    }

    #[test]
    fn test_as_ability_difficulty_divides_amount() {
        let mut ability = Stat::new("Pistols");
        ability.difficulty = 2.0;
        let hard = as_ability(&ability, &inputs());
        ability.difficulty = 1.0;
        let easy = as_ability(&ability, &inputs());
        assert!((easy.amount_draw / hard.amount_draw - 2.0).abs() < 1e-9);
        assert!(hard.energy_ms > easy.energy_ms);
    }

    #[test]
    fn test_as_ability_bodyless_pays_full_fatigue() {
        let ability = Stat::new("Focusing");
        let mut ghost = inputs();
        ghost.has_body = false;
        let cost = as_ability(&ability, &ghost);
        assert_eq!(cost.fatigue_ms, 100.0);
    }

    #[test]
    fn test_as_ability_draw_ratios_from_skill() {
        let ability = Stat::new("Pistols");
        let mut skill = Stat::new("Pistols");
        skill.extra.insert("Energy Draw Ratio".into(), "0.5".into());
        skill
            .extra
            .insert("Concentration Draw Ratio".into(), "0".into());
        let mut with_skill = inputs();
        with_skill.skill = Some(&skill);
        let cost = as_ability(&ability, &with_skill);
        assert!((cost.energy_draw - cost.energy_ms * 0.5).abs() < 1e-12);
        assert_eq!(cost.concentration_draw, 0.0);
    }

    #[test]
    fn test_merge_average_counts_missing_abilities() {
        let one = AbilityCost {
            amount_draw: 4.0,
            accustomed: 0.8,
            ..Default::default()
        };
        let merged = AbilityCost::merge_average(&[one], 2);
        assert!((merged.amount_draw - 2.0).abs() < 1e-12);
        assert!((merged.accustomed - 0.4).abs() < 1e-12);
        assert_eq!(AbilityCost::merge_average(&[], 0), AbilityCost::default());
    }
}
