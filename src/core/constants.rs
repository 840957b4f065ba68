//! Engine constants - all tunable values in one place
//!
//! Timings are in milliseconds of logical clock time unless noted. The
//! mastery and feedback windows deliberately compress real-world practice
//! hours by `TIME_RATIO` so a character approaches mastery over a playable
//! horizon rather than ten thousand literal hours.

/// Compression applied to real-world practice time.
pub const TIME_RATIO: f64 = 0.04;

/// Practice time at which an ability saturates: 10,000 hours, compressed.
pub const MASTERY_MS: f64 = 1000.0 * 60.0 * 60.0 * 10_000.0 * TIME_RATIO;

/// Base delay before a completed interaction registers on the character:
/// one hour, compressed. Self-analysis shortens it.
pub const FEEDBACK_MS: f64 = 1000.0 * 60.0 * 60.0 * TIME_RATIO;

/// Fallback interchange time for an ability that has never been exercised.
pub const DEFAULT_TIME_UPDATE: f64 = 100.0;

/// Scale on per-millisecond indicator drains derived from mass-energy.
pub const ENERGY_RATIO: f64 = 1.0;

/// Circulation value at which a medium offers no resistance at all.
/// Resistance eases from `CIRCULATION_ZERO - circulation` toward zero.
pub const CIRCULATION_ZERO: f64 = 2.0;

/// Kilometre step against which distance attenuation is eased.
pub const DISTANCE_STEP: f64 = 0.01;

/// Scale applied when imbuing item energy into an affect. A 0.008 kg round
/// carries ~7.2e14 J as mass-energy; without this ratio a single imbue would
/// dwarf every other cost in the system.
pub const IMBUING_ENERGY_RATIO: f64 = 0.002;

/// Per-actor tick count between invocations of the "Garbage Collection" hook.
pub const GC_FREQUENCY: u64 = 750;

/// Fixed clock step in turn-based mode, ms.
pub const TIME_STEP: f64 = 1000.0;

/// Speed of light, m/s, for mass-energy conversion.
pub const LIGHT_SPEED: f64 = 299_790_000.0;

/// Reference distance (m) for the far impact-velocity affect.
pub const IMPACT_REFERENCE_DISTANCE: f64 = 152.4;

/// Volume (m^3) of an average kilogram of carried matter; used to time
/// residual-affect spread during impacts.
pub const AVERAGE_KILO_VOLUME: f64 = 0.008;

// Frame conversion floors
pub const FRAME_RATE_MIN: f64 = 30.0;
pub const TURN_RATE_MIN: f64 = 500.0;

// Held-key timings for tap/hold discrimination, ms
pub const MELEE_BLOCK_WAIT: f64 = 200.0;
pub const JUMP_WAIT: f64 = 400.0;

/// Below this accustomed level a thrown grenade-like item is fumbled.
pub const GRENADE_ACCUSTOMED_THRESHOLD: f64 = 0.1;

/// Pacing factor for open-medium searches: the odds gate and the requeue
/// delay both scale by it.
pub const SEARCH_RATE: f64 = 13.0;

// Base action times, ms
pub const TIME_ACTION_HOLSTER: f64 = 1500.0;
pub const TIME_ACTION_UNHOLSTER: f64 = 3000.0;
pub const TIME_ACTION_FUTURE_TACTICIAN: f64 = 2500.0;
pub const TIME_ACTION_FOCUSING: f64 = 2000.0;
