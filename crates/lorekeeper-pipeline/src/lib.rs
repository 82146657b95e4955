//! Lorekeeper job pipeline.
//!
//! Implements the job queue's executor port: every job kind is rendered to a
//! prompt, sent to the completion provider, and the output is interpreted
//! and applied to the owner's state.

pub mod application;
pub mod domain;

pub use application::pipeline::GamePipeline;
pub use domain::context::WORLD_SUMMARY_ID;
