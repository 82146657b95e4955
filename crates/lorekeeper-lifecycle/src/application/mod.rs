//! Application layer for the Entity Lifecycle context.

pub mod tracker;
