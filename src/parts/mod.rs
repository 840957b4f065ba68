//! Part graph: nodes, containers, and the arena that owns them.

pub mod arena;
pub mod container;
pub mod part;

pub use arena::{FindBy, PartArena};
pub use container::{ContainerSlot, ItemContainer};
pub use part::BodyPart;
