//! Domain layer for the Response Interpreter context.

pub mod payload;
pub mod split;
