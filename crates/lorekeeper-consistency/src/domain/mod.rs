//! Domain layer for the Consistency context.

pub mod references;
