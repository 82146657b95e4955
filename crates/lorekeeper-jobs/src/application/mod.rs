//! Application layer for the Job Queue context.

pub mod executor;
pub mod queue;
pub mod submitter;
mod worker;
