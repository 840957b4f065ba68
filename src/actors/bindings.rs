//! Key bindings and the body vector they steer
//!
//! Movement is a chord language: the held subset of `wasd` plus a
//! modifier tier picks a row out of a fixed table of speeds and
//! bearings. The table keeps the original data quirks - sprint
//! diagonals pull toward the facing direction, back-pedalling is
//! slower than strafing - rather than deriving anything.

use glam::Vec3;

use crate::core::types::Millis;

/// Postures and the ratio they scale exposure and accuracy by.
pub const POSTURES: [(&str, f64); 4] = [
    ("Standing", 1.0),
    ("Bowing", 0.8),
    ("Crouching", 0.6),
    ("Laying", 0.2),
];

/// Movement gaits and their speed in metres per second.
pub const MOVEMENTS: [(&str, f64); 5] = [
    ("Sprint", 8.0),
    ("Paced", 5.0),
    ("Walking", 3.5),
    ("Crawl", 1.2),
    ("Still", 0.0),
];

/// Chord rows: held keys plus modifier suffix, gait, speed, bearing in
/// degrees clockwise from forward.
const MOVEMENT_MAP: [(&str, &str, f64, f64); 48] = [
    ("w", "Paced", 5.0, 0.0),
    ("s", "Walking", 3.5, 180.0),
    ("a", "Paced", 5.0, 270.0),
    ("d", "Paced", 5.0, 90.0),
    ("wa", "Paced", 5.0, 315.0),
    ("wd", "Paced", 5.0, 45.0),
    ("sa", "Walking", 3.5, 225.0),
    ("sd", "Walking", 3.5, 135.0),
    ("aw", "Paced", 5.0, 315.0),
    ("dw", "Paced", 5.0, 45.0),
    ("as", "Walking", 3.5, 225.0),
    ("ds", "Walking", 3.5, 135.0),
    // shift: sprint tier
    ("w+", "Sprint", 8.0, 0.0),
    ("s+", "Paced", 5.0, 180.0),
    ("a+", "Sprint", 8.0, 270.0),
    ("d+", "Sprint", 8.0, 90.0),
    ("wa+", "Sprint", 6.0, 335.0),
    ("wd+", "Sprint", 6.0, 25.0),
    ("sa+", "Paced", 5.0, 225.0),
    ("sd+", "Paced", 5.0, 135.0),
    ("aw+", "Sprint", 6.0, 335.0),
    ("dw+", "Sprint", 6.0, 25.0),
    ("as+", "Paced", 5.0, 225.0),
    ("ds+", "Paced", 5.0, 135.0),
    // alt: cautious tier
    ("w-", "Walking", 3.5, 0.0),
    ("s-", "Crawl", 1.2, 180.0),
    ("a-", "Walking", 3.5, 270.0),
    ("d-", "Walking", 3.5, 90.0),
    ("wa-", "Walking", 3.5, 315.0),
    ("wd-", "Walking", 3.5, 45.0),
    ("sa-", "Crawl", 1.2, 225.0),
    ("sd-", "Crawl", 1.2, 135.0),
    ("aw-", "Walking", 3.5, 315.0),
    ("dw-", "Walking", 3.5, 45.0),
    ("as-", "Crawl", 1.2, 225.0),
    ("ds-", "Crawl", 1.2, 135.0),
    // ctrl: crouched crawl
    ("w_", "Crawl", 1.2, 0.0),
    ("s_", "Crawl", 1.2, 180.0),
    ("a_", "Crawl", 1.2, 270.0),
    ("d_", "Crawl", 1.2, 90.0),
    ("wa_", "Crawl", 1.2, 315.0),
    ("wd_", "Crawl", 1.2, 45.0),
    ("sa_", "Crawl", 1.2, 225.0),
    ("sd_", "Crawl", 1.2, 135.0),
    ("aw_", "Crawl", 1.2, 315.0),
    ("dw_", "Crawl", 1.2, 45.0),
    ("as_", "Crawl", 1.2, 225.0),
    ("ds_", "Crawl", 1.2, 135.0),
];

/// Where a body is headed and how it carries itself.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyVector {
    pub movement: String,
    /// Metres per second.
    pub speed: f64,
    /// Degrees clockwise from forward.
    pub bearing: f64,
    pub posture: String,
    pub posture_ratio: f64,
}

impl BodyVector {
    pub fn still() -> Self {
        Self {
            movement: "Still".to_string(),
            speed: 0.0,
            bearing: 0.0,
            posture: "Standing".to_string(),
            posture_ratio: 1.0,
        }
    }

    pub fn is_still(&self) -> bool {
        self.speed == 0.0
    }

    pub fn set_movement(&mut self, movement: &str, speed: f64, bearing: f64) {
        self.movement = movement.to_string();
        self.speed = speed;
        self.bearing = bearing;
    }

    /// Adopt a named posture; unknown names leave the posture alone.
    pub fn set_posture(&mut self, name: &str) {
        if let Some((posture, ratio)) = POSTURES.iter().find(|(n, _)| *n == name) {
            self.posture = (*posture).to_string();
            self.posture_ratio = *ratio;
        }
    }

    /// The vector as a ground-plane velocity, metres per second, forward
    /// along +Y with the bearing swinging clockwise.
    pub fn velocity(&self) -> Vec3 {
        let bearing = (self.bearing as f32).to_radians();
        Vec3::new(
            bearing.sin() * self.speed as f32,
            bearing.cos() * self.speed as f32,
            0.0,
        )
    }
}

impl Default for BodyVector {
    fn default() -> Self {
        Self::still()
    }
}

/// What a movement chord asks of the current vector.
#[derive(Debug, Clone, PartialEq)]
pub enum MovementUpdate {
    /// Chord not in the table; the vector stands.
    Keep,
    Still,
    Set {
        movement: &'static str,
        speed: f64,
        bearing: f64,
    },
}

/// Keys currently held, ordered by press so chords read the way they
/// were typed, each with accumulated hold time.
#[derive(Debug, Clone, Default)]
pub struct HeldKeys {
    entries: Vec<(String, Millis)>,
}

impl HeldKeys {
    pub fn press(&mut self, key: &str) {
        if !self.is_held(key) {
            self.entries.push((key.to_string(), 0.0));
        }
    }

    pub fn release(&mut self, key: &str) {
        self.entries.retain(|(k, _)| k != key);
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn held_for(&self, key: &str) -> Option<Millis> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, ms)| *ms)
    }

    /// Advance every hold and return the keys with their new totals.
    pub fn accumulate(&mut self, diff: Millis) -> Vec<(String, Millis)> {
        for (_, ms) in &mut self.entries {
            *ms += diff;
        }
        self.entries.clone()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn chord_row(key: &str) -> Option<MovementUpdate> {
    MOVEMENT_MAP
        .iter()
        .find(|(chord, _, _, _)| *chord == key)
        .map(|(_, movement, speed, bearing)| MovementUpdate::Set {
            movement,
            speed: *speed,
            bearing: *bearing,
        })
}

/// Resolve the held keys (plus the key going down, if any) into a
/// movement update. The second value reports whether the chord crouches
/// the body.
///
/// Three held letters resolve to the one direction not contradicted;
/// more than three is a stalemate and stops the body.
pub fn resolve_movement(held: &HeldKeys, key_down: Option<&str>) -> (MovementUpdate, bool) {
    let mut letters: Vec<&str> = held
        .keys()
        .filter(|k| matches!(*k, "w" | "a" | "s" | "d"))
        .collect();
    if let Some(key) = key_down {
        if !letters.contains(&key) {
            letters.push(key);
        }
    }
    let shift = held.is_held("shift");
    let alt = held.is_held("alt");
    let ctrl = held.is_held("ctrl");
    let mut key: String = letters.concat();
    let mut crouch = false;
    if shift && alt {
        // contradictory tiers cancel out
    } else if !ctrl {
        if shift {
            key.push('+');
        }
        if alt {
            key.push('-');
        }
    } else {
        key.push('_');
        crouch = true;
    }
    let update = match letters.len() {
        0..=2 => chord_row(&key).unwrap_or(MovementUpdate::Keep),
        3 => {
            let missing = if !letters.contains(&"w") {
                "s"
            } else if !letters.contains(&"s") {
                "w"
            } else if !letters.contains(&"a") {
                "d"
            } else {
                "a"
            };
            chord_row(missing).unwrap_or(MovementUpdate::Keep)
        }
        _ => MovementUpdate::Still,
    };
    (update, crouch)
}

/// One row of the binding table: a physical key, the logical binding it
/// lands on, and an optional hold threshold in milliseconds.
#[derive(Debug, Clone)]
pub struct BindingEntry {
    pub physical: String,
    pub logical: String,
    pub hold_ms: Option<Millis>,
}

/// Physical-to-logical key mapping, rebindable per character.
#[derive(Debug, Clone)]
pub struct BindingTable {
    bound: Vec<BindingEntry>,
}

impl BindingTable {
    /// Resolve a physical key to its logical binding.
    pub fn known(&self, physical: &str) -> Option<&str> {
        let key = physical.to_lowercase();
        self.bound
            .iter()
            .find(|entry| entry.physical == key)
            .map(|entry| entry.logical.as_str())
    }

    /// The hold threshold of a logical binding, when it has one.
    pub fn hold_ms(&self, logical: &str) -> Option<Millis> {
        self.bound
            .iter()
            .find(|entry| entry.logical == logical)
            .and_then(|entry| entry.hold_ms)
    }

    /// Point a logical binding at a different physical key. Refused when
    /// the key already serves another binding.
    pub fn rebind(&mut self, logical: &str, physical: &str) -> bool {
        let key = physical.to_lowercase();
        if self.bound.iter().any(|e| e.physical == key && e.logical != logical) {
            return false;
        }
        if let Some(entry) = self.bound.iter_mut().find(|e| e.logical == logical) {
            entry.physical = key;
            return true;
        }
        false
    }
}

impl Default for BindingTable {
    fn default() -> Self {
        let mut bound = Vec::new();
        for key in [
            "w", "a", "s", "d", "shift", "ctrl", "alt", "j", "k", "v", "q", "e", "x", "i", "c",
            "t", "m", "tab", "space",
        ] {
            bound.push(BindingEntry {
                physical: key.to_string(),
                logical: key.to_string(),
                hold_ms: None,
            });
        }
        // holding reload long enough packs the weapons away instead
        bound.push(BindingEntry {
            physical: "r".to_string(),
            logical: "r".to_string(),
            hold_ms: Some(400.0),
        });
        Self { bound }
    }
}
