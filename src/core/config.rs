//! Engine configuration
//!
//! Everything here can be overridden from a TOML file; the defaults match
//! the tuning the interaction formulas were balanced against.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::constants;
use crate::core::error::{EngineError, Result};

/// Runtime configuration for the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Turn-based mode advances the clock by `time_step` per explicit step;
    /// real-time mode tracks wall-clock milliseconds.
    pub turn_based: bool,

    /// Clock advance per step in turn-based mode, ms.
    pub time_step: f64,

    /// Cap on scheduler steps per second in real-time mode.
    ///
    /// The loop thread sleeps `1000 / fps_max` ms between steps. Interaction
    /// frame counts are derived from timings at this rate, floored by
    /// `FRAME_RATE_MIN` so a stalled clock cannot stretch an action forever.
    pub fps_max: u32,

    /// Per-actor tick count between "Garbage Collection" hook invocations.
    pub gc_frequency: u64,

    /// Allocation points granted to a fresh character's stat groups.
    pub stat_alloc: f64,
    pub discipline_alloc: f64,
    pub skill_alloc: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            turn_based: false,
            time_step: constants::TIME_STEP,
            fps_max: 60,
            gc_frequency: constants::GC_FREQUENCY,
            stat_alloc: 10.0,
            discipline_alloc: 15.0,
            skill_alloc: 30.0,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file, falling back to defaults for
    /// missing keys.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.fps_max == 0 {
            return Err(EngineError::Config("fps_max must be positive".into()));
        }
        if self.time_step <= 0.0 {
            return Err(EngineError::Config(format!(
                "time_step ({}) must be positive",
                self.time_step
            )));
        }
        if self.gc_frequency == 0 {
            return Err(EngineError::Config(
                "gc_frequency must be positive".into(),
            ));
        }
        Ok(())
    }
}
