//! Core type definitions used throughout the engine

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for actors (characters, items, mediums)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub Uuid);

impl ActorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

/// Index of a body part inside the world's part arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartId(pub u32);

impl PartId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Correlation key grouping an initiating interaction with everything it spawns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackerId(pub Uuid);

impl TrackerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TrackerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned when an actor registers with the tick roster.
///
/// Deregistering passes the handle back; the roster never reuses one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TickHandle(pub u64);

/// Logical time in milliseconds (wall clock in real-time mode, fixed steps
/// in turn-based mode)
pub type Millis = f64;
