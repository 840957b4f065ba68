//! Engine clock: real-time frames or whole turns
//!
//! Real-time ticks measure elapsed wall milliseconds and interactions
//! count down by that difference; turn-based play collapses each tick
//! to one frame and rescales millisecond timings into turn counts.

use crate::core::constants::{TIME_STEP, TURN_RATE_MIN};
use crate::core::types::Millis;

#[derive(Debug, Clone)]
pub struct TickClock {
    pub turn_based: bool,
    /// Engine time, ms.
    pub current: Millis,
    pub last: Millis,
    /// Elapsed ms this tick.
    pub diff: Millis,
    pub tick: u64,
}

impl TickClock {
    pub fn new(turn_based: bool) -> Self {
        Self {
            turn_based,
            current: 0.0,
            last: 0.0,
            diff: 0.0,
            tick: 0,
        }
    }

    /// Advance to a wall-clock reading, ms.
    pub fn advance(&mut self, now: Millis) {
        self.last = self.current;
        self.current = now;
        self.diff = self.current - self.last;
        self.tick += 1;
    }

    /// Advance one whole turn.
    pub fn step(&mut self) {
        self.last = self.current;
        self.current += TIME_STEP;
        self.diff = TIME_STEP;
        self.tick += 1;
    }

    /// How much an in-flight interaction counts down this tick.
    pub fn frame_step(&self) -> f64 {
        if self.turn_based {
            1.0
        } else {
            self.diff
        }
    }

    /// Convert an actuation time into countdown frames.
    pub fn frames_for(&self, timing: Millis) -> f64 {
        if self.turn_based {
            (timing / TURN_RATE_MIN).floor().max(1.0)
        } else {
            timing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_time_reads_differences() {
        let mut clock = TickClock::new(false);
        clock.advance(16.0);
        clock.advance(48.0);
        assert_eq!(clock.diff, 32.0);
        assert_eq!(clock.frame_step(), 32.0);
        assert_eq!(clock.frames_for(1500.0), 1500.0);
        assert_eq!(clock.tick, 2);
    }

    #[test]
    fn test_turn_based_counts_whole_turns() {
        let mut clock = TickClock::new(true);
        clock.step();
        assert_eq!(clock.current, TIME_STEP);
        assert_eq!(clock.frame_step(), 1.0);
        assert_eq!(clock.frames_for(1499.0), 2.0);
        // even instant actions take a turn
        assert_eq!(clock.frames_for(100.0), 1.0);
    }
}
