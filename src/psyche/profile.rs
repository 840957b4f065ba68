//! Damage profiles
//!
//! Each profile names a kind of harm or social pressure, which stats drive
//! it from the acting side, and which resist it on the receiving side.
//! Criminal profiles feed the deviancy multiplier; the six social profiles
//! are the axes the understanding calculation scores.

use serde::{Deserialize, Serialize};

use crate::stats::{search_key, StatType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DamageProfile {
    pub name: String,
    pub search: String,
    /// Base severity weight of the profile.
    pub total: f64,
    /// Above zero the profile counts toward deviancy vetting.
    pub criminal: f64,
    /// Stats on the acting side that deliver this profile.
    pub functions: Vec<StatType>,
    /// Stats on the receiving side that resist it.
    pub resistance: Vec<StatType>,
    /// Action tags the profile rides on.
    pub actions: Vec<String>,
}

impl DamageProfile {
    pub fn new(name: &str, total: f64) -> Self {
        Self {
            name: name.to_string(),
            search: search_key(name),
            total,
            criminal: 0.0,
            functions: Vec::new(),
            resistance: Vec::new(),
            actions: Vec::new(),
        }
    }

    fn criminal_weight(mut self, weight: f64) -> Self {
        self.criminal = weight;
        self
    }

    fn function(mut self, name: &str, ratio: f64) -> Self {
        self.functions.push(StatType::new(name, ratio));
        self
    }

    fn resist(mut self, name: &str, ratio: f64) -> Self {
        self.resistance.push(StatType::new(name, ratio));
        self
    }

    fn action(mut self, name: &str) -> Self {
        self.actions.push(name.to_string());
        self
    }

    pub fn is_criminal(&self) -> bool {
        self.criminal > 0.0
    }
}

/// The six social axes `understanding` scores, in scoring order. The first
/// three read as emotive traits, the last three as disorders.
pub const UNDERSTANDING_EMOTES: [&str; 3] = ["Humble", "Extroverted", "Thrifty"];
pub const UNDERSTANDING_DISORDERS: [&str; 3] = ["Stressed", "Depressed", "Psychotic"];

/// Built-in damage table. Data-driven installs replace this wholesale.
pub fn builtin_damage() -> Vec<DamageProfile> {
    vec![
        DamageProfile::new("Ballistic", 1.0)
            .criminal_weight(1.0)
            .function("Acute Stress", 0.6)
            .resist("Composure", 0.8)
            .action("Impact"),
        DamageProfile::new("Blunt", 0.8)
            .criminal_weight(0.5)
            .function("Acute Stress", 0.3)
            .resist("Composure", 0.5)
            .action("Impact"),
        DamageProfile::new("Blade", 0.9)
            .criminal_weight(0.8)
            .function("Acute Stress", 0.5)
            .resist("Composure", 0.6)
            .action("Impact"),
        DamageProfile::new("Psychic", 1.2)
            .criminal_weight(1.2)
            .function("Psychotic Disorder", 0.7)
            .resist("Meditation", 1.0)
            .action("Psy Charge")
            .action("Imbue"),
        DamageProfile::new("Humble", 0.5)
            .function("Expression", 1.0)
            .resist("Composure", 1.0)
            .action("Communication"),
        DamageProfile::new("Extroverted", 0.5)
            .function("Theatrical", 0.8)
            .resist("Scrutiny", 1.0)
            .action("Communication"),
        DamageProfile::new("Thrifty", 0.5)
            .function("Negotiation", 1.0)
            .resist("Valuation", 1.0)
            .action("Trade"),
        DamageProfile::new("Stressed", 0.7)
            .function("Intimidation", 1.0)
            .resist("Composure", 0.8)
            .action("Communication"),
        DamageProfile::new("Depressed", 0.7)
            .function("Sincerity", 1.0)
            .resist("Empathy", 1.0)
            .action("Communication"),
        DamageProfile::new("Psychotic", 0.7)
            .criminal_weight(0.3)
            .function("Psychic Focus", 1.0)
            .resist("Meditation", 0.8)
            .action("Communication"),
    ]
}

/// Profiles that count toward deviancy vetting.
pub fn criminal_profiles(profiles: &[DamageProfile]) -> Vec<&DamageProfile> {
    profiles.iter().filter(|p| p.is_criminal()).collect()
}

pub fn profile_named<'a>(profiles: &'a [DamageProfile], name: &str) -> Option<&'a DamageProfile> {
    let key = search_key(name);
    profiles.iter().find(|p| p.search == key)
}
