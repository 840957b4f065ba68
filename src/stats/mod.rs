//! Stat model: typed values, groups with allocation budgets, bounded pools

pub mod indicator;
pub mod stat;

pub use indicator::{Indicator, IndicatorKind, IndicatorSources};
pub use stat::{search_key, Stat, StatGroup, StatType};
