//! Domain layer for the Entity Lifecycle context.

pub mod status;
