//! Application layer for the Consistency context.

pub mod validator;
