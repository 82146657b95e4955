//! Application layer for the Combat context.

pub mod service;
