//! Lorekeeper: Entity Lifecycle bounded context.
//!
//! Tracks the creation status of every entity per owner so dependent logic
//! never treats a half-created entity as ready.

pub mod application;
pub mod domain;

pub use application::tracker::{EntityLifecycleTracker, Registration};
pub use domain::status::{EntityStatus, Status};
