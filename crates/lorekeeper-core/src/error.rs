//! Domain error types.

use thiserror::Error;

use crate::ids::OwnerId;

/// Top-level domain error type.
///
/// Expected absence ("not created yet") is modelled with `Option` by the
/// ports; `NotFound` is reserved for a prerequisite that a job genuinely
/// needed and could not load.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GameError {
    /// The completion provider call failed (network, rate limit, model error).
    #[error("completion provider failure: {0}")]
    TransientProvider(String),

    /// The structured block in a model response could not be decoded.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A required prerequisite document is missing.
    #[error("document not found: {id} (owner {owner})")]
    NotFound {
        /// The owner partition that was searched.
        owner: OwnerId,
        /// The missing document id.
        id: String,
    },

    /// The owner's document graph is inconsistent.
    #[error("consistency error: {0}")]
    Consistency(String),

    /// Two writers raced on the same document.
    #[error("concurrency conflict on {id} (owner {owner})")]
    ConcurrencyConflict {
        /// The owner partition.
        owner: OwnerId,
        /// The contested document id.
        id: String,
    },

    /// A request or state transition was rejected by domain rules.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl GameError {
    /// Builds a `NotFound` error for the given owner and document id.
    pub fn not_found(owner: &OwnerId, id: impl Into<String>) -> Self {
        Self::NotFound {
            owner: owner.clone(),
            id: id.into(),
        }
    }

    /// Whether a job failing with this error may be attempted again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientProvider(_) | Self::MalformedPayload(_))
    }

    /// Renders the error as a user-safe message of at most `max_len` characters.
    #[must_use]
    pub fn user_message(&self, max_len: usize) -> String {
        truncate_message(&self.to_string(), max_len)
    }
}

/// Truncates `message` to at most `max_len` characters, ending with an
/// ellipsis when anything was cut. Never splits a UTF-8 code point.
#[must_use]
pub fn truncate_message(message: &str, max_len: usize) -> String {
    const ELLIPSIS: &str = "...";

    if message.chars().count() <= max_len {
        return message.to_owned();
    }
    if max_len <= ELLIPSIS.len() {
        return message.chars().take(max_len).collect();
    }
    let mut truncated: String = message.chars().take(max_len - ELLIPSIS.len()).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_message_keeps_short_messages() {
        assert_eq!(truncate_message("boom", 10), "boom");
    }

    #[test]
    fn test_truncate_message_bounds_length_with_ellipsis() {
        let message = "x".repeat(50);

        let truncated = truncate_message(&message, 20);

        assert_eq!(truncated.chars().count(), 20);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_truncate_message_respects_char_boundaries() {
        let message = "ääääääääää";

        let truncated = truncate_message(message, 6);

        assert_eq!(truncated, "äää...");
    }

    #[test]
    fn test_only_provider_and_payload_errors_are_retryable() {
        assert!(GameError::TransientProvider("timeout".into()).is_retryable());
        assert!(GameError::MalformedPayload("eof".into()).is_retryable());
        assert!(!GameError::not_found(&OwnerId::new("p1"), "npc_a").is_retryable());
        assert!(!GameError::Validation("nope".into()).is_retryable());
    }

    #[test]
    fn test_user_message_is_bounded() {
        let err = GameError::Infrastructure("disk ".repeat(100));

        let message = err.user_message(40);

        assert_eq!(message.chars().count(), 40);
        assert!(message.starts_with("infrastructure error: disk"));
    }
}
