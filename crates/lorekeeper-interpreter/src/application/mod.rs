//! Application layer for the Response Interpreter context.

pub mod creator;
pub mod interpreter;
