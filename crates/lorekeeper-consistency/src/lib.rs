//! Lorekeeper: Consistency Validator bounded context.
//!
//! Walks an owner's document graph for typed cross-references that resolve
//! to nothing, and repairs them by scheduling creation through the same path
//! the interpreter uses.

pub mod application;
pub mod domain;

pub use application::validator::ConsistencyValidator;
pub use domain::references::{DanglingReference, ReferenceIndex, collect_references};
