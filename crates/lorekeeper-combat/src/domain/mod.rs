//! Domain layer for the Combat context.

pub mod stat_block;
pub mod state;
pub mod turn;
