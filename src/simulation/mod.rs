//! Tick scheduling: the clock and the per-actor turn loop

pub mod clock;
pub mod tick;

pub use clock::TickClock;
pub use tick::run_tick;
