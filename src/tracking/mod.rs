pub mod aggregator;
pub mod packages;
pub mod reporter;
pub mod schedule;
pub mod selection;
