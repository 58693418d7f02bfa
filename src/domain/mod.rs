pub mod approval;
pub mod conflict_policy;
pub mod consolidator;
pub mod diff;
pub mod interval;
pub mod models;
pub mod overlap;
