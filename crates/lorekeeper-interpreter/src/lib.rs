//! Lorekeeper: Response Interpreter bounded context.
//!
//! Splits model output into player-visible narrative and the hidden
//! structured block, decodes the block into a closed set of payload shapes,
//! and applies it: entity creation through the shared creation path,
//! merge-patch updates, combat starts and combat turns.

pub mod application;
pub mod domain;

pub use application::creator::{Creation, CreationRequest, EntityCreator};
pub use application::interpreter::{ApplyReport, ResponseInterpreter, TurnContext};
pub use domain::payload::{EntityDocument, NewEntity, StartCombat, StructuredPayload, WorldChanges};
pub use domain::split::{CLOSE_DELIMITER, OPEN_DELIMITER, Split, extract_json, split};
