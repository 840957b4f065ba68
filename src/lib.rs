//! Ember Veil - Real-Time RPG Interaction Engine
//!
//! A simulation core that resolves named interactions (abilities, items,
//! communication) between actors - characters, physical objects, and
//! communication mediums - against a shared graph of body parts, containers,
//! and stat pools. The engine owns the tick clock, the stat and part data
//! model, the ability-cost calculator, the interaction resolver library, and
//! the demand/supply protocol shared by every actor type. Presentation,
//! bulk data loading, and persistence stay outside, connected only through
//! the named hook registry.

pub mod abilities;
pub mod actors;
pub mod core;
pub mod hooks;
pub mod interactions;
pub mod parts;
pub mod psyche;
pub mod simulation;
pub mod stats;
pub mod templates;
pub mod world;
