use thiserror::Error;

/// Why a container refused an item.
///
/// Raised synchronously from `add`; the caller decides the fallback
/// (alternate container, or externalise the item into the world).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CapacityError {
    #[error("No item to contain")]
    NoItem,

    #[error("Not a container")]
    NotAContainer,

    #[error("Quantity exceeded for container: {quantity} of {max}")]
    Quantity { quantity: u32, max: u32 },

    #[error("Size of container cannot be exceeded: {volume} of {max}")]
    Volume { volume: f64, max: f64 },

    #[error("Container will break if more is added: {weight} of {max}")]
    Weight { weight: f64, max: f64 },

    #[error("Type of object is not allowed to be stored here: {0:?}")]
    Restricted(Vec<String>),

    #[error("Object type \"{name}\" is capped at {max}, would reach {would}")]
    TypeQuantity { name: String, max: u32, would: u32 },
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Part not found: {0:?}")]
    PartNotFound(crate::core::types::PartId),

    #[error("Actor not found: {0:?}")]
    ActorNotFound(crate::core::types::ActorId),

    #[error("Capacity violation: {0}")]
    Capacity(#[from] CapacityError),

    #[error("Precondition violation: {0}")]
    Precondition(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
