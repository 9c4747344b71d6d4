//! Policies applied around the per-reference pipeline
//!
//! - spoiled reference strategies
//! - orphan resolution
//! - exception escalation

mod escalation;
mod orphans;
mod spoiled;

pub use escalation::{ErrorKind, StopPolicy};
pub use orphans::{plan_orphans, OrphanAction, OrphansStrategy};
pub use spoiled::{GenericSpoiledStrategizer, SpoiledDecision, SpoiledReferenceStrategizer};
