pub mod types;

pub use types::{
    Component, Direction, Jurisdiction, OutcomeMetric, SpendingBreakdown, SpendingCategory,
    SpendingSide, TaxBreakdown, TaxComponent, Tier,
};
