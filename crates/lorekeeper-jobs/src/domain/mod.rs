//! Domain layer for the Job Queue context.

pub mod job;
