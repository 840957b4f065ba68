//! The tick: advance the clock, then give every registered actor a turn
//!
//! Actors take their turns in registration order. A failing actor is
//! logged, reported through the "Error" hook, and skipped; it never
//! stalls the roster behind it. Every `gc_frequency` ticks an actor
//! also receives a "Garbage Collection" hook so the shell can sweep
//! whatever it caches per actor.

use serde_json::json;
use tracing::error;

use crate::actors::{character, item, medium};
use crate::core::types::{ActorId, Millis};
use crate::hooks::{names, HookPayload};
use crate::world::World;

/// Advance the clock and tick every actor on the roster.
///
/// Real-time mode advances to the wall-clock stamp; turn-based mode
/// takes one whole turn and ignores the stamp. Returns how many actors
/// took a turn, failures included.
pub fn run_tick(world: &mut World, now: Millis) -> usize {
    if world.clock.turn_based {
        world.clock.step();
    } else {
        world.clock.advance(now);
    }
    let gc_frequency = world.config.gc_frequency;
    // actors may spawn or withdraw others mid-tick; newcomers wait a turn
    let roster: Vec<ActorId> = world.roster.clone();
    let mut ticked = 0;
    for id in roster {
        let outcome = match world.actor(id).map(|actor| actor.role_name()) {
            Ok("character") => character::tick(world, id),
            Ok("item") => item::tick(world, id),
            Ok("medium") => medium::tick(world, id),
            _ => continue,
        };
        ticked += 1;
        if let Err(err) = outcome {
            error!(actor = ?id, error = %err, "actor tick failed");
            world.hooks.handle(
                names::ERROR,
                &HookPayload::new().actor(id).detail(json!({
                    "error": err.to_string(),
                    "handle": world.handle_of(id).map(|h| h.0),
                })),
            );
        }
        let mut sweep = false;
        if let Ok(actor) = world.actor_mut(id) {
            actor.gc_count += 1;
            if actor.gc_count >= gc_frequency {
                actor.gc_count = 0;
                sweep = true;
            }
        }
        if sweep {
            world
                .hooks
                .handle(names::GARBAGE_COLLECTION, &HookPayload::new().actor(id));
        }
    }
    ticked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EngineConfig;
    use crate::core::constants::TIME_STEP;
    use crate::core::types::PartId;
    use crate::parts::BodyPart;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_turn_based_tick_steps_whole_turns() {
        let mut config = EngineConfig::default();
        config.turn_based = true;
        let mut world = World::new(config);
        run_tick(&mut world, 0.0);
        run_tick(&mut world, 0.0);
        assert_eq!(world.clock.current, 2.0 * TIME_STEP);
        assert_eq!(world.clock.tick, 2);
    }

    #[test]
    fn test_real_time_tick_reads_the_stamp() {
        let mut world = World::new(EngineConfig::default());
        run_tick(&mut world, 16.0);
        run_tick(&mut world, 48.0);
        assert_eq!(world.clock.current, 48.0);
        assert_eq!(world.clock.diff, 32.0);
    }

    #[test]
    fn test_failing_actor_does_not_stall_roster() {
        use crate::interactions::interaction::{ActionKind, Interaction};
        let mut world = World::new(EngineConfig::default());
        // a due impact on parts that were never allocated fails its turn
        let broken = world.spawn_item("Ghost", PartId(9999));
        let mut hit = Interaction::new(None, None, Some(PartId(9999)), ActionKind::Impact);
        hit.part = Some(PartId(9999));
        world.queue(broken, hit).unwrap();
        let root = world.arena.alloc(BodyPart::new("Stone"));
        let sound = world.spawn_item("Stone", root);
        let errors = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&errors);
        world.hooks.observe(names::ERROR, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let ticked = run_tick(&mut world, 16.0);
        assert_eq!(ticked, 2);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert!(world.actor(broken).is_ok());
        assert!(world.actor(sound).is_ok());
    }

    #[test]
    fn test_gc_hook_fires_on_schedule() {
        let mut config = EngineConfig::default();
        config.gc_frequency = 3;
        let mut world = World::new(config);
        let root = world.arena.alloc(BodyPart::new("Stone"));
        world.spawn_item("Stone", root);
        let sweeps = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&sweeps);
        world.hooks.observe(names::GARBAGE_COLLECTION, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        for frame in 1..=7 {
            run_tick(&mut world, frame as f64 * 16.0);
        }
        assert_eq!(sweeps.load(Ordering::SeqCst), 2);
    }
}
