//! Lorekeeper Core: shared domain abstractions.
//!
//! This crate defines the identifiers, error taxonomy, and collaborator ports
//! (document store, completion provider, prompt renderer, notifier) that every
//! bounded context depends on. It contains no infrastructure code.

pub mod clock;
pub mod error;
pub mod ids;
pub mod merge;
pub mod notify;
pub mod provider;
pub mod store;
