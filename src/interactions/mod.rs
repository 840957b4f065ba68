//! Name-keyed interaction resolution
//!
//! Every due interaction funnels through [`dispatch::dispatch`], which
//! brackets the named resolver between its pre and post hooks. The
//! resolvers live here by concern: kinetics, magazines and readying,
//! psychic energy work, commerce, and talk.

pub mod dispatch;
pub mod energy;
pub mod holster;
pub mod impact;
pub mod interaction;
pub mod reload;
pub mod speech;
pub mod trade;

pub use dispatch::{can_interact, dispatch};
pub use interaction::{ActionKind, Interaction, SlipId, Tracking};
pub use trade::TradeSlip;
