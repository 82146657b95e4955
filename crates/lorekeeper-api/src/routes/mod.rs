//! Route modules.

pub mod health;
pub mod jobs;
pub mod owners;
